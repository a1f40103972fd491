//! Logging key constants and test-logger init, grounded on
//! `chainflip-engine`'s `logging.rs`, ported from `slog` to `tracing` to
//! match the idiom of the newer `engine/src/evm/*` modules this crate is
//! otherwise grounded on.

pub const CHAIN_ID_KEY: &str = "chain_id";
pub const ADAPTER_KEY: &str = "adapter";
pub const ACCOUNT_KEY: &str = "account";

/// Installs a process-wide `tracing` subscriber reading `RUST_LOG`. Adapters
/// do not call this themselves (it would clobber a host application's own
/// subscriber); it exists for binaries and tests embedding this crate.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}
