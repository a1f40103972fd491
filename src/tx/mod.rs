//! Transaction Pipeline (spec §4.5, component C5).

pub mod pipeline;

pub use pipeline::{classify_broadcast_error, FilledTransaction, RetryClass, TxPipeline, TxSender, UnsignedCall};
