//! Rate-Swap Adapter (spec §4.10, component C11) — the fixed-rate
//! orderbook venue exemplar.
//!
//! Grounded on `boros_adapter/adapter.py`: this struct mirrors its
//! `marketAcc` packing, orderbook-walk tick selection, and calldata
//! broadcasting one-for-one, but exposes them as typed inherent methods
//! rather than the `(bool, dict)` return convention. It does not implement
//! `ProtocolAdapter` (spec §4.8): the trait's capability set is shaped for
//! variable-rate lending markets and has no place for order placement,
//! cancellation, or cross-chain bridging.

use std::{sync::Arc, time::SystemTime};

use ethers::{
    contract::{AbiDecode, AbiEncode},
    types::{Address, Bytes, H256, I256, U256},
};

use crate::{
    adapter::WriteReceipt,
    adapters::rate_swap::{
        client::RateSwapClient,
        types::{ActivePosition, CalldataEnvelope, MarketPositionRow, MarketSnapshot, RawLimitOrder, WithdrawalStatus},
    },
    chain::{BlockTag, ChainGatewayPool, ChainReader},
    codec::{
        oft_endpoint::{OftEndpointCalls, QuoteSendCall, SendCall as OftSendCall, SendParam},
        rate_swap_market_hub::{FinalizeVaultWithdrawalCall, GetPersonalCooldownCall, RateSwapMarketHubCalls},
    },
    constants::{
        CROSS_MARGIN_SENTINEL, DEFAULT_ORDERBOOK_TICK_SIZE, DEFAULT_PLACE_ORDER_SLIPPAGE,
        DEFAULT_WITHDRAWAL_COOLDOWN_SECONDS, LZ_EID_ARBITRUM, LZ_EID_HYPEREVM,
    },
    erc20,
    error::{require_positive_amount, AdapterError, AdapterResult},
    math::{
        normalize_apr,
        tick::{rate_from_tick, tick_from_rate, Side},
    },
    schema::{LimitOrder, OrderSide, OrderStatus, RateSwapMarket},
    tx::{TxPipeline, TxSender, UnsignedCall},
};

/// Where this venue's market hub/router live, and the router address the
/// `{calldatas: [...]}` batch-broadcast form targets (spec §4.10 "Calldata
/// broadcasting").
#[derive(Debug, Clone)]
pub struct RateSwapDeployment {
    pub chain_name: String,
    pub market_hub: Address,
    pub router: Address,
}

/// The HYPE OFT bridge's two endpoints. The OFT adapter contract is deployed
/// at the same address on both chains (spec §4.10, §8 scenario 5).
#[derive(Debug, Clone)]
pub struct OftBridgeDeployment {
    pub hyperevm_chain_name: String,
    pub arbitrum_chain_name: String,
    pub arbitrum_chain_id: u64,
    pub oft_address: Address,
}

/// Time-in-force for a limit order (spec §4.10 `place_rate_order`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeInForce {
    Gtc,
    Ioc,
    Fok,
}

impl TimeInForce {
    fn as_u8(self) -> u8 {
        match self {
            TimeInForce::Gtc => 0,
            TimeInForce::Ioc => 1,
            TimeInForce::Fok => 2,
        }
    }
}

/// `close_positions_market`'s three outcomes: no open position, a
/// zero-sized row (treated as already closed), or an actual close write
/// (spec §4.10, §8 scenario 6).
#[derive(Debug, Clone)]
pub enum ClosePositionOutcome {
    NoPosition,
    ZeroSize,
    Closed(WriteReceipt),
}

/// Outcome of `bridge_hype_oft` (spec §4.10, §8 scenario 5).
#[derive(Debug, Clone)]
pub struct BridgeReceipt {
    pub tx_hash: H256,
    pub amount_sent_wei: U256,
    pub native_fee_wei: U256,
    pub lz_token_fee_wei: U256,
}

/// Which leg of the HYPE OFT route a bridge call is taking (spec §4.10, §8
/// scenario 5): `HyperevmToArbitrum` moves native HYPE and pays
/// `amount + fee` as `msg.value`; `ArbitrumToHyperevm` moves the ERC20
/// wrapper and pays only the LayerZero fee as `msg.value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeDirection {
    HyperevmToArbitrum,
    ArbitrumToHyperevm,
}

/// State: the venue's HTTP client, a shared chain gateway pool, this
/// venue's on-chain deployment, the optional OFT bridge deployment, the
/// transaction pipeline, an optional signer, and the account this adapter
/// acts on behalf of (spec §4.10 "State").
pub struct RateSwapAdapter {
    client: RateSwapClient,
    chain_pool: ChainGatewayPool,
    deployment: RateSwapDeployment,
    oft: Option<OftBridgeDeployment>,
    tx_pipeline: TxPipeline,
    sender: Option<Arc<dyn TxSender>>,
    user_address: Address,
    account_id: u8,
}

impl RateSwapAdapter {
    pub fn new(
        client: RateSwapClient,
        chain_pool: ChainGatewayPool,
        deployment: RateSwapDeployment,
        oft: Option<OftBridgeDeployment>,
        sender: Option<Arc<dyn TxSender>>,
        user_address: Address,
        account_id: u8,
    ) -> Self {
        Self { client, chain_pool, deployment, oft, tx_pipeline: TxPipeline::new(), sender, user_address, account_id }
    }

    fn sender(&self) -> AdapterResult<&Arc<dyn TxSender>> {
        self.sender.as_ref().ok_or_else(|| AdapterError::config("no signer configured for this adapter instance"))
    }

    async fn chain(&self) -> AdapterResult<impl ChainReader> {
        self.chain_pool.get(&self.deployment.chain_name).await
    }

    // ======= Market discovery and quoting =======

    pub async fn list_markets(&self) -> AdapterResult<Vec<RateSwapMarket>> {
        let snapshots = self.client.list_markets_all().await?;
        let mut markets = Vec::with_capacity(snapshots.len());
        for snapshot in &snapshots {
            markets.push(self.to_canonical_market(snapshot).await?);
        }
        Ok(markets)
    }

    pub async fn get_market(&self, market_id: u32) -> AdapterResult<RateSwapMarket> {
        let snapshot = self.client.get_market(market_id).await?;
        self.to_canonical_market(&snapshot).await
    }

    async fn to_canonical_market(&self, snapshot: &MarketSnapshot) -> AdapterResult<RateSwapMarket> {
        let tick_step = snapshot.im_data.as_ref().and_then(|d| d.tick_step).unwrap_or(1);
        let maturity_ts = snapshot.maturity_ts.unwrap_or(0);
        let (mid_apr, best_bid_apr, best_ask_apr) = self.quote_market(snapshot).await?;
        let data = snapshot.data.as_ref();

        Ok(RateSwapMarket {
            market_id: snapshot.market_id,
            address: snapshot.address.unwrap_or_default(),
            symbol: snapshot.symbol.clone().unwrap_or_default(),
            underlying: snapshot.underlying.unwrap_or_default(),
            collateral_token_id: snapshot.collateral_token_id.unwrap_or_default(),
            tick_step,
            maturity_ts,
            tenor_days: time_to_maturity_days(maturity_ts),
            mid_apr,
            best_bid_apr,
            best_ask_apr,
            mark_apr: normalize_apr(data.and_then(|d| d.mark_apr)),
            floating_apr: normalize_apr(data.and_then(|d| d.floating_apr)),
            volume_24h: data.and_then(|d| d.volume_24h),
            notional_oi: data.and_then(|d| d.notional_oi),
        })
    }

    /// `(mid_apr, best_bid_apr, best_ask_apr)`. Prefers the `/markets`
    /// snapshot's embedded `data.{bestBid,bestAsk,midApr}`; falls back to the
    /// order book only when that snapshot is missing either side (spec
    /// §4.10 `quote_market`).
    async fn quote_market(&self, snapshot: &MarketSnapshot) -> AdapterResult<(Option<f64>, Option<f64>, Option<f64>)> {
        let data = snapshot.data.as_ref();
        let data_bid = normalize_apr(data.and_then(|d| d.best_bid));
        let data_ask = normalize_apr(data.and_then(|d| d.best_ask));
        let data_mid = normalize_apr(data.and_then(|d| d.mid_apr));

        if let (Some(bid), Some(ask)) = (data_bid, data_ask) {
            return Ok((Some(data_mid.unwrap_or((bid + ask) / 2.0)), Some(bid), Some(ask)));
        }

        let book = self.client.get_orderbook(snapshot.market_id, DEFAULT_ORDERBOOK_TICK_SIZE).await?;
        let best_bid = book.long.ia.iter().copied().max().map(ia_bps_to_decimal);
        let best_ask = book.short.ia.iter().copied().min().map(ia_bps_to_decimal);
        let mid = match (best_bid, best_ask) {
            (Some(bid), Some(ask)) => Some((bid + ask) / 2.0),
            (Some(bid), None) => Some(bid),
            (None, Some(ask)) => Some(ask),
            (None, None) => data_mid,
        };
        Ok((mid, best_bid, best_ask))
    }

    async fn tick_step(&self, market_id: u32) -> i64 {
        match self.client.get_market(market_id).await {
            Ok(market) => market.im_data.and_then(|d| d.tick_step).unwrap_or(1),
            Err(_) => 1,
        }
    }

    /// Walks the orderbook opposite `side` — bids for a short fill, asks
    /// for a long fill — accumulating depth sorted by price aggressiveness
    /// until either the requested size is covered or the walk has deviated
    /// more than `DEFAULT_MAX_IA_DEVIATION_BPS` from the best price. Returns
    /// `0` (the caller's cue to reject) when the relevant side is empty
    /// (spec §4.10, §8 scenarios 3–4).
    pub async fn pick_limit_tick_for_fill(&self, market_id: u32, side: OrderSide, size_yu_wei: U256) -> AdapterResult<i64> {
        let book = match self.client.get_orderbook(market_id, DEFAULT_ORDERBOOK_TICK_SIZE).await {
            Ok(book) => book,
            Err(_) => return Ok(0),
        };

        let is_short = side == OrderSide::Short;
        let (ia, sz) = if is_short { (&book.long.ia, &book.long.sz) } else { (&book.short.ia, &book.short.sz) };
        if ia.is_empty() || sz.is_empty() {
            return Ok(0);
        }

        let mut levels = ia
            .iter()
            .copied()
            .zip(sz.iter())
            .map(|(ia_bps, size_str)| parse_unsigned_amount(size_str).map(|size| (ia_bps, size)))
            .collect::<AdapterResult<Vec<_>>>()?;
        if is_short {
            levels.sort_by(|a, b| b.0.cmp(&a.0));
        } else {
            levels.sort_by(|a, b| a.0.cmp(&b.0));
        }

        let best_ia = levels[0].0;
        let max_deviation = i64::from(crate::constants::DEFAULT_MAX_IA_DEVIATION_BPS);
        let mut cumulative = U256::zero();
        let mut chosen_ia = best_ia;
        for (ia_bps, size_wei) in &levels {
            let deviation = if is_short { best_ia - ia_bps } else { ia_bps - best_ia };
            if deviation > max_deviation {
                break;
            }
            cumulative += *size_wei;
            chosen_ia = *ia_bps;
            if cumulative >= size_yu_wei {
                break;
            }
        }

        let tick_step = self.tick_step(market_id).await;
        let chosen_rate = ia_bps_to_decimal(chosen_ia);
        let round_side = if is_short { Side::Short } else { Side::Long };
        let tick = tick_from_rate(chosen_rate, tick_step, round_side);
        tracing::debug!(
            market_id,
            ?side,
            chosen_ia,
            tick_step,
            tick,
            verify_rate = rate_from_tick(tick, tick_step),
            "picked limit tick for fill"
        );
        Ok(tick)
    }

    // ======= marketAcc packing =======

    fn pack_market_acc_local(&self, token_id: u16) -> String {
        pack_market_acc(self.user_address, self.account_id, token_id, CROSS_MARGIN_SENTINEL)
    }

    /// Prefers the `marketAcc` the API already attributes to this user's
    /// cross position; falls back to local packing when the API call fails
    /// or doesn't return one (spec §4.10 "marketAcc packing").
    async fn market_acc(&self, token_id: u16) -> String {
        if let Ok(collaterals) = self.client.get_collaterals(self.user_address, self.account_id).await {
            let found = collaterals
                .collaterals
                .iter()
                .find(|row| row.token_id == token_id)
                .and_then(|row| row.cross_position.as_ref())
                .and_then(|cross| cross.market_acc.clone())
                .filter(|acc| !acc.is_empty());
            if let Some(market_acc) = found {
                return market_acc;
            }
        }
        self.pack_market_acc_local(token_id)
    }

    // ======= Calldata broadcasting =======

    /// Broadcasts an upstream calldata envelope: a `{calldatas: [...]}`
    /// batch is sent sequentially to this venue's router, stopping at the
    /// first failure; a single `{to, data, value}` transaction goes through
    /// the transaction pipeline's own retry classifier (spec §4.10
    /// "Calldata broadcasting").
    async fn broadcast_calldata(&self, envelope: &CalldataEnvelope) -> AdapterResult<WriteReceipt> {
        let sender = self.sender()?;
        let chain = self.chain().await?;

        if let Some(calldatas) = envelope.calldatas.as_ref().filter(|c| !c.is_empty()) {
            let mut last_hash = None;
            for raw in calldatas {
                let data = parse_hex_bytes(raw)?;
                let hash =
                    self.tx_pipeline.send_and_wait(&chain, sender.as_ref(), self.deployment.router, data, U256::zero()).await?;
                last_hash = Some(hash);
            }
            return Ok(WriteReceipt {
                tx_hash: last_hash.expect("calldatas checked non-empty above"),
                approval_tx_hash: None,
            });
        }

        let to = envelope.to.ok_or_else(|| AdapterError::Schema("calldata envelope missing 'to'".into()))?;
        let data = envelope.data.as_deref().map(parse_hex_bytes).transpose()?.unwrap_or_default();
        let value = envelope.value.as_deref().map(parse_unsigned_amount).transpose()?.unwrap_or_default();

        let hash = self.tx_pipeline.send_transaction(&chain, sender.as_ref(), UnsignedCall::new(to, data, value), true).await?;
        Ok(WriteReceipt { tx_hash: hash, approval_tx_hash: None })
    }

    // ======= Collateral: deposit, sweep, withdraw =======

    pub async fn cash_transfer(&self, market_id: u32, amount_wei: U256, is_deposit: bool) -> AdapterResult<WriteReceipt> {
        let envelope = self.client.build_cash_transfer_calldata(self.user_address, market_id, amount_wei, is_deposit).await?;
        self.broadcast_calldata(&envelope).await
    }

    /// Moves every isolated-cash row for `token_id` (optionally scoped to
    /// one `market_id`) back to cross margin, stopping at the first
    /// transfer failure (spec §4.10 "Deposit → cross margin").
    pub async fn sweep_isolated_to_cross(&self, token_id: u16, market_id: Option<u32>) -> AdapterResult<Vec<H256>> {
        let collaterals = self.client.get_collaterals(self.user_address, self.account_id).await?;
        let mut hashes = Vec::new();

        for row in collaterals.collaterals.iter().filter(|row| row.token_id == token_id) {
            for iso in &row.isolated_positions {
                let Some(iso_market_id) = iso.market_acc.as_deref().and_then(market_id_from_market_acc) else {
                    continue;
                };
                if market_id.is_some_and(|target| target != iso_market_id) {
                    continue;
                }
                let raw_balance = iso.available_balance.as_deref().or(iso.net_balance.as_deref()).unwrap_or("0");
                let balance = parse_unsigned_amount(raw_balance)?;
                if balance.is_zero() {
                    continue;
                }
                let receipt = self.cash_transfer(iso_market_id, balance, false).await?;
                hashes.push(receipt.tx_hash);
            }
        }
        Ok(hashes)
    }

    /// Deposits `amount_native` of `collateral` into cross margin, capped to
    /// the caller's on-chain balance to avoid off-by-wei reverts on
    /// 18-decimal tokens, then sweeps any isolated cash the venue credited
    /// back to cross (spec §4.10, §8 scenario 1).
    pub async fn deposit_to_cross_margin(
        &self,
        collateral: Address,
        amount_native: U256,
        token_id: u16,
        market_id: u32,
    ) -> AdapterResult<WriteReceipt> {
        let chain = self.chain().await?;
        let sender = self.sender()?;

        let amount = match erc20::balance_of(&chain, collateral, self.user_address, BlockTag::Latest).await {
            Ok(balance) => amount_native.min(balance),
            Err(_) => amount_native,
        };
        require_positive_amount(amount)?;

        // Cross margin deposits always use account_id 0.
        let envelope = self.client.build_deposit_calldata(token_id, amount, market_id, self.user_address, 0).await?;
        let spender = envelope
            .spender
            .or(envelope.to)
            .ok_or_else(|| AdapterError::Schema("deposit calldata missing spender address".into()))?;

        let allowance =
            erc20::ensure_allowance(&chain, &self.tx_pipeline, sender.as_ref(), collateral, self.user_address, spender, amount, amount)
                .await?;

        let deposit_receipt = self.broadcast_calldata(&envelope).await?;
        self.sweep_isolated_to_cross(token_id, Some(market_id)).await?;

        Ok(WriteReceipt { tx_hash: deposit_receipt.tx_hash, approval_tx_hash: allowance.approve_tx_hash })
    }

    pub async fn withdraw_collateral(&self, token_id: u16, amount_native: U256, account_id: Option<u8>) -> AdapterResult<WriteReceipt> {
        require_positive_amount(amount_native)?;
        let envelope = self
            .client
            .build_withdraw_calldata(token_id, amount_native, self.user_address, account_id.unwrap_or(self.account_id))
            .await?;
        self.broadcast_calldata(&envelope).await
    }

    async fn personal_cooldown_seconds(&self) -> (u64, &'static str) {
        match self.read_personal_cooldown_onchain().await {
            Ok(seconds) => (seconds, "onchain"),
            Err(_) => (DEFAULT_WITHDRAWAL_COOLDOWN_SECONDS, "default_3600s"),
        }
    }

    async fn read_personal_cooldown_onchain(&self) -> AdapterResult<u64> {
        let chain = self.chain().await?;
        let call = RateSwapMarketHubCalls::GetPersonalCooldown(GetPersonalCooldownCall { account: self.user_address });
        let data: Bytes = call.encode().into();
        let raw = chain.eth_call(self.deployment.market_hub, data, BlockTag::Latest).await?;
        let cooldown: U256 =
            AbiDecode::decode(raw.as_ref()).map_err(|e| AdapterError::Schema(format!("decoding getPersonalCooldown return: {e}")))?;
        Ok(cooldown.as_u64())
    }

    /// Withdrawal cooldown progress for `token_id`. Prefers the on-chain
    /// `getPersonalCooldown` read, falling back to a 3600s estimate tagged
    /// `cooldown_source = "default_3600s"` when that read fails (spec §4.10
    /// "Two-phase withdrawal").
    pub async fn withdrawal_status(&self, token_id: u16) -> AdapterResult<WithdrawalStatus> {
        let collaterals = self.client.get_collaterals(self.user_address, self.account_id).await?;
        let (cooldown_seconds, cooldown_source) = self.personal_cooldown_seconds().await;

        let Some(row) = collaterals.collaterals.iter().find(|row| row.token_id == token_id) else {
            return Ok(WithdrawalStatus {
                amount_native: 0,
                request_time: 0,
                elapsed_seconds: 0,
                cooldown_seconds,
                cooldown_source,
                can_finalize: false,
                wait_seconds: None,
            });
        };

        let request_time = row.withdrawal.last_withdrawal_request_time;
        let amount_native = parse_unsigned_amount(&row.withdrawal.last_withdrawal_amount).unwrap_or_default().as_u128();

        let now = SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs();
        let elapsed_seconds = if request_time > 0 { now.saturating_sub(request_time) } else { 0 };
        let can_finalize = request_time > 0 && elapsed_seconds >= cooldown_seconds;
        let wait_seconds = (request_time > 0).then(|| cooldown_seconds.saturating_sub(elapsed_seconds));

        Ok(WithdrawalStatus { amount_native, request_time, elapsed_seconds, cooldown_seconds, cooldown_source, can_finalize, wait_seconds })
    }

    /// Sends collateral previously requested for withdrawal to `root`
    /// (defaulting to this adapter's user address) once the cooldown has
    /// matured. Encodes `finalizeVaultWithdrawal` directly — the venue has
    /// no calldata-building endpoint for it (spec §4.10 "Two-phase
    /// withdrawal").
    pub async fn finalize_vault_withdrawal(&self, token_id: u16, root: Option<Address>) -> AdapterResult<WriteReceipt> {
        let destination = root.unwrap_or(self.user_address);
        let sender = self.sender()?;
        let chain = self.chain().await?;

        let call = RateSwapMarketHubCalls::FinalizeVaultWithdrawal(FinalizeVaultWithdrawalCall { root: destination, token_id });
        let data: Bytes = call.encode().into();

        let hash = self.tx_pipeline.send_and_wait(&chain, sender.as_ref(), self.deployment.market_hub, data, U256::zero()).await?;
        Ok(WriteReceipt { tx_hash: hash, approval_tx_hash: None })
    }

    // ======= Orders and positions =======

    pub async fn place_rate_order(
        &self,
        market_id: u32,
        token_id: u16,
        size_yu_wei: U256,
        side: OrderSide,
        limit_tick: Option<i64>,
        tif: TimeInForce,
        slippage: Option<f64>,
    ) -> AdapterResult<WriteReceipt> {
        let market_acc = self.market_acc(token_id).await;
        let limit_tick = match limit_tick {
            Some(tick) => tick,
            None => self.pick_limit_tick_for_fill(market_id, side, size_yu_wei).await?,
        };
        if limit_tick == 0 {
            return Err(AdapterError::Protocol(
                "could not determine a limit tick: the orderbook may be empty or has no liquidity on this side".into(),
            ));
        }

        let envelope = self
            .client
            .build_place_order_calldata(
                &market_acc,
                market_id,
                order_side_to_u8(side),
                size_yu_wei,
                limit_tick,
                tif.as_u8(),
                slippage.unwrap_or(DEFAULT_PLACE_ORDER_SLIPPAGE),
            )
            .await?;
        self.broadcast_calldata(&envelope).await
    }

    /// This user's resting and partially-filled limit orders (spec §4.10,
    /// grounded on `boros_adapter/adapter.py`'s `get_open_limit_orders`).
    /// Per-order parse failures are skipped rather than failing the whole
    /// batch, matching that per-order try/except.
    pub async fn list_open_orders(&self, limit: u32) -> AdapterResult<Vec<LimitOrder>> {
        let rows = self.client.get_open_orders(self.user_address, limit).await?;
        Ok(rows.iter().filter_map(to_limit_order).collect())
    }

    async fn active_positions(&self, market_id: Option<u32>) -> AdapterResult<Vec<ActivePosition>> {
        let collaterals = self.client.get_collaterals(self.user_address, self.account_id).await?;
        let mut positions = Vec::new();

        for row in &collaterals.collaterals {
            if let Some(cross) = &row.cross_position {
                positions.extend(cross.market_positions.iter().filter_map(|mp| to_active_position(mp, true)));
            }
            for iso in &row.isolated_positions {
                positions.extend(iso.market_positions.iter().filter_map(|mp| to_active_position(mp, false)));
            }
        }

        if let Some(target) = market_id {
            positions.retain(|p| p.market_id == target);
        }
        Ok(positions)
    }

    /// Closes the (first) open position on `market_id` at market, via an
    /// IOC order on the opposite side. Treats "no open position" and
    /// "zero-sized position" as successful no-ops rather than errors,
    /// matching the venue's own idempotent close semantics (spec §4.10, §8
    /// scenario 6).
    pub async fn close_positions_market(
        &self,
        market_id: u32,
        token_id: u16,
        size_yu_wei: Option<U256>,
    ) -> AdapterResult<ClosePositionOutcome> {
        let positions = self.active_positions(Some(market_id)).await?;
        let Some(position) = positions.first() else {
            return Ok(ClosePositionOutcome::NoPosition);
        };
        if position.size_wei.is_zero() {
            return Ok(ClosePositionOutcome::ZeroSize);
        }

        let close_size = size_yu_wei.unwrap_or_else(|| position.size_wei.unsigned_abs());
        let close_side = if position.side == 0 { OrderSide::Short } else { OrderSide::Long };

        let market_acc = self.market_acc(token_id).await;
        let limit_tick = self.pick_limit_tick_for_fill(market_id, close_side, close_size).await?;
        if limit_tick == 0 {
            return Err(AdapterError::Protocol(
                "could not determine a limit tick: the orderbook may be empty or has no liquidity on this side".into(),
            ));
        }

        let envelope = self
            .client
            .build_close_position_calldata(&market_acc, market_id, order_side_to_u8(close_side), close_size, limit_tick, TimeInForce::Ioc.as_u8())
            .await?;
        let receipt = self.broadcast_calldata(&envelope).await?;
        Ok(ClosePositionOutcome::Closed(receipt))
    }

    pub async fn cancel_orders(
        &self,
        market_id: u32,
        token_id: u16,
        order_ids: Option<Vec<String>>,
        cancel_all: bool,
    ) -> AdapterResult<WriteReceipt> {
        let market_acc = self.market_acc(token_id).await;
        let envelope = self.client.build_cancel_order_calldata(&market_acc, market_id, order_ids.as_deref(), cancel_all).await?;
        self.broadcast_calldata(&envelope).await
    }

    // ======= HYPE OFT bridge (LayerZero) =======

    /// Bridges HYPE between HyperEVM (native) and Arbitrum (ERC20-wrapped)
    /// via the LayerZero OFT standard. `amount_wei` is rounded down to a
    /// multiple of `decimalConversionRate()` before quoting, since the OFT
    /// contract rejects amounts with dust below its internal shared
    /// decimals (spec §4.10, §8 scenario 5).
    ///
    /// For `HyperevmToArbitrum`, `max_value_wei` (if given) caps
    /// `amount + fee`: the amount is clamped down and the fee re-quoted.
    /// For `ArbitrumToHyperevm`, `max_fee_wei` (if given) instead bounds the
    /// LayerZero fee itself and the call is rejected outright if exceeded,
    /// since the amount there is an ERC20 transfer independent of
    /// `msg.value`.
    pub async fn bridge_hype_oft(
        &self,
        direction: BridgeDirection,
        amount_wei: U256,
        recipient: Option<Address>,
        dst_eid: Option<u32>,
        max_value_wei: Option<U256>,
        max_fee_wei: Option<U256>,
    ) -> AdapterResult<BridgeReceipt> {
        let oft = self.oft.as_ref().ok_or_else(|| AdapterError::config("no OFT bridge deployment configured"))?;
        let sender = self.sender()?;
        let to = recipient.unwrap_or(self.user_address);

        let (chain_name, default_dst_eid) = match direction {
            BridgeDirection::HyperevmToArbitrum => (&oft.hyperevm_chain_name, LZ_EID_ARBITRUM),
            BridgeDirection::ArbitrumToHyperevm => (&oft.arbitrum_chain_name, LZ_EID_HYPEREVM),
        };
        let dst_eid = dst_eid.unwrap_or(default_dst_eid);
        let chain = self.chain_pool.get(chain_name).await?;

        let conversion_rate = self.read_decimal_conversion_rate(&chain, oft.oft_address).await?;
        let mut amount = round_down_to_conversion_rate(amount_wei, conversion_rate);
        if amount.is_zero() {
            return Err(AdapterError::input("amount rounds down to zero at this OFT's conversion rate"));
        }

        let mut send_param = oft_send_param(dst_eid, to, amount);
        let (mut native_fee, mut lz_token_fee) = self.quote_oft_send(&chain, oft.oft_address, &send_param).await?;

        match direction {
            BridgeDirection::HyperevmToArbitrum => {
                if let Some(max_value) = max_value_wei {
                    let mut max_send = max_value.saturating_sub(native_fee);
                    max_send = round_down_to_conversion_rate(max_send, conversion_rate);
                    if amount > max_send {
                        amount = max_send;
                        if amount.is_zero() {
                            return Err(AdapterError::input("insufficient balance to cover OFT fee"));
                        }
                        send_param = oft_send_param(dst_eid, to, amount);
                        (native_fee, lz_token_fee) = self.quote_oft_send(&chain, oft.oft_address, &send_param).await?;
                    }
                    let total = amount + native_fee;
                    if total > max_value {
                        return Err(AdapterError::input("insufficient balance after fee quote"));
                    }
                }
            },
            BridgeDirection::ArbitrumToHyperevm => {
                if let Some(max_fee) = max_fee_wei {
                    if native_fee > max_fee {
                        return Err(AdapterError::input("LayerZero fee exceeds max_fee_wei"));
                    }
                }
            },
        }

        let msg_value = match direction {
            BridgeDirection::HyperevmToArbitrum => amount + native_fee,
            BridgeDirection::ArbitrumToHyperevm => native_fee,
        };

        let call = OftEndpointCalls::Send(OftSendCall {
            send_param: send_param.clone(),
            fee: crate::codec::oft_endpoint::MessagingFee { native_fee, lz_token_fee },
            refund_address: sender.address(),
        });
        let data: Bytes = call.encode().into();

        let tx_hash = self
            .tx_pipeline
            .send_transaction(&chain, sender.as_ref(), UnsignedCall::new(oft.oft_address, data, msg_value), true)
            .await?;

        Ok(BridgeReceipt { tx_hash, amount_sent_wei: amount, native_fee_wei: native_fee, lz_token_fee_wei: lz_token_fee })
    }

    async fn read_decimal_conversion_rate(&self, chain: &dyn ChainReader, oft_address: Address) -> AdapterResult<U256> {
        let call = OftEndpointCalls::DecimalConversionRate(crate::codec::oft_endpoint::DecimalConversionRateCall);
        let data: Bytes = call.encode().into();
        let raw = chain.eth_call(oft_address, data, BlockTag::Latest).await?;
        AbiDecode::decode(raw.as_ref()).map_err(|e| AdapterError::Schema(format!("decoding decimalConversionRate return: {e}")))
    }

    async fn quote_oft_send(&self, chain: &dyn ChainReader, oft_address: Address, send_param: &SendParam) -> AdapterResult<(U256, U256)> {
        let call = OftEndpointCalls::QuoteSend(QuoteSendCall { send_param: send_param.clone(), pay_in_lz_token: false });
        let data: Bytes = call.encode().into();
        let raw = chain.eth_call(oft_address, data, BlockTag::Latest).await?;
        let fee: crate::codec::oft_endpoint::MessagingFee =
            AbiDecode::decode(raw.as_ref()).map_err(|e| AdapterError::Schema(format!("decoding quoteSend return: {e}")))?;
        Ok((fee.native_fee, fee.lz_token_fee))
    }
}

fn order_side_to_u8(side: OrderSide) -> u8 {
    match side {
        OrderSide::Long => 0,
        OrderSide::Short => 1,
    }
}

/// `Cancelled` from the raw status string when present; otherwise derived
/// from `filled` vs `size`, matching the invariant `LimitOrder` carries
/// (spec §3 "LimitOrder").
fn order_status(raw_status: Option<&str>, size: U256, filled: U256) -> OrderStatus {
    if raw_status.is_some_and(|s| s.eq_ignore_ascii_case("cancelled") || s.eq_ignore_ascii_case("canceled")) {
        return OrderStatus::Cancelled;
    }
    if !size.is_zero() && filled >= size {
        OrderStatus::Filled
    } else if filled.is_zero() {
        OrderStatus::Open
    } else {
        OrderStatus::PartiallyFilled
    }
}

fn to_limit_order(row: &RawLimitOrder) -> Option<LimitOrder> {
    let order_id = row.order_id.clone().filter(|id| !id.is_empty())?;
    let market_id = row.market_id?;
    let tick_step = row.tick_step.unwrap_or(1);
    let limit_tick = row.limit_tick.unwrap_or(0);
    let limit_apr = rate_from_tick(limit_tick, tick_step);
    let size = row.size_wei.as_deref().map(parse_unsigned_amount).unwrap_or(Ok(U256::zero())).ok()?;
    let filled_size = row.filled_size_wei.as_deref().map(parse_unsigned_amount).unwrap_or(Ok(U256::zero())).ok()?;
    let remaining_size = size.saturating_sub(filled_size);
    let side = match row.side.unwrap_or(0) {
        0 => OrderSide::Long,
        _ => OrderSide::Short,
    };
    let status = order_status(row.status.as_deref(), size, filled_size);

    Some(LimitOrder { order_id, market_id, side, size, limit_tick, limit_apr, filled_size, remaining_size, status })
}

fn to_active_position(row: &MarketPositionRow, is_cross: bool) -> Option<ActivePosition> {
    let market_id = row.market_id?;
    let size_wei = I256::from_dec_str(row.size_wei.as_deref()?).ok()?;
    if size_wei.is_zero() {
        return None;
    }
    Some(ActivePosition { market_id, side: row.side.unwrap_or(0), size_wei, is_cross })
}

fn oft_send_param(dst_eid: u32, to: Address, amount: U256) -> SendParam {
    SendParam {
        dst_eid,
        to: address_to_bytes32(to),
        amount_ld: amount,
        min_amount_ld: amount,
        extra_options: Bytes::default(),
        compose_msg: Bytes::default(),
        oft_cmd: Bytes::default(),
    }
}

fn address_to_bytes32(address: Address) -> [u8; 32] {
    let mut padded = [0u8; 32];
    padded[12..].copy_from_slice(address.as_bytes());
    padded
}

fn round_down_to_conversion_rate(amount: U256, conversion_rate: U256) -> U256 {
    if conversion_rate.is_zero() {
        amount
    } else {
        (amount / conversion_rate) * conversion_rate
    }
}

/// `marketAcc = address(20) ‖ accountId(1) ‖ tokenId(2) ‖ marketId(3)` (spec
/// §4.10 "marketAcc packing").
fn pack_market_acc(address: Address, account_id: u8, token_id: u16, market_id: u32) -> String {
    format!("0x{}{:02x}{:04x}{:06x}", hex::encode(address.as_bytes()), account_id, token_id, market_id & CROSS_MARGIN_SENTINEL)
}

/// Parses a packed `marketAcc`'s trailing 3 bytes, treating the cross-margin
/// sentinel as "no isolated market" (spec §4.10 "marketAcc packing").
fn market_id_from_market_acc(market_acc: &str) -> Option<u32> {
    let hex_str = market_acc.trim_start_matches("0x");
    if hex_str.len() < 6 {
        return None;
    }
    let market_id = u32::from_str_radix(&hex_str[hex_str.len() - 6..], 16).ok()?;
    (market_id != CROSS_MARGIN_SENTINEL).then_some(market_id)
}

/// Orderbook `ia` buckets are implied APR in bps (spec §4.10): `116` means
/// `1.16%`.
fn ia_bps_to_decimal(ia_bps: i64) -> f64 {
    ia_bps as f64 / 10_000.0
}

fn time_to_maturity_days(maturity_ts: u64) -> u32 {
    if maturity_ts == 0 {
        return 0;
    }
    let now = SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs();
    maturity_ts.saturating_sub(now).div_euclid(86_400) as u32
}

fn parse_hex_bytes(raw: &str) -> AdapterResult<Bytes> {
    let trimmed = raw.trim_start_matches("0x").trim_start_matches("0X");
    let bytes = hex::decode(trimmed).map_err(|e| AdapterError::Schema(format!("decoding calldata hex: {e}")))?;
    Ok(Bytes::from(bytes))
}

fn parse_unsigned_amount(raw: &str) -> AdapterResult<U256> {
    if let Some(hex_str) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        U256::from_str_radix(hex_str, 16).map_err(|e| AdapterError::Schema(format!("decoding hex amount {raw:?}: {e}")))
    } else {
        U256::from_dec_str(raw).map_err(|e| AdapterError::Schema(format!("decoding decimal amount {raw:?}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn market_acc_packs_and_parses_back() {
        let address: Address = "0x00000000000000000000000000000000000001".parse().unwrap();
        let packed = pack_market_acc(address, 1, 3, 42);
        assert_eq!(market_id_from_market_acc(&packed), Some(42));
    }

    #[test]
    fn cross_margin_sentinel_parses_to_none() {
        let address: Address = "0x00000000000000000000000000000000000001".parse().unwrap();
        let packed = pack_market_acc(address, 0, 3, CROSS_MARGIN_SENTINEL);
        assert_eq!(market_id_from_market_acc(&packed), None);
    }

    #[test]
    fn market_acc_too_short_is_unparseable() {
        assert_eq!(market_id_from_market_acc("0xff"), None);
    }

    #[test]
    fn ia_bps_converts_to_decimal_rate() {
        assert!((ia_bps_to_decimal(116) - 0.0116).abs() < 1e-9);
    }

    #[test]
    fn round_down_to_conversion_rate_truncates_dust() {
        assert_eq!(round_down_to_conversion_rate(U256::from(1_234_567u64), U256::from(1000u64)), U256::from(1_234_000u64));
        assert_eq!(round_down_to_conversion_rate(U256::from(1_234_567u64), U256::zero()), U256::from(1_234_567u64));
    }

    #[test]
    fn parse_unsigned_amount_accepts_decimal_and_hex() {
        assert_eq!(parse_unsigned_amount("100").unwrap(), U256::from(100u64));
        assert_eq!(parse_unsigned_amount("0x64").unwrap(), U256::from(100u64));
    }

    fn raw_order(order_id: &str, size: &str, filled: &str, status: Option<&str>) -> crate::adapters::rate_swap::types::RawLimitOrder {
        crate::adapters::rate_swap::types::RawLimitOrder {
            order_id: Some(order_id.into()),
            market_id: Some(3),
            side: Some(0),
            limit_tick: Some(10),
            tick_step: Some(1),
            size_wei: Some(size.into()),
            filled_size_wei: Some(filled.into()),
            status: status.map(String::from),
        }
    }

    #[test]
    fn to_limit_order_computes_remaining_and_status() {
        let order = to_limit_order(&raw_order("1", "100", "40", None)).unwrap();
        assert_eq!(order.remaining_size, U256::from(60u64));
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
    }

    #[test]
    fn to_limit_order_marks_fully_filled_orders() {
        let order = to_limit_order(&raw_order("2", "100", "100", None)).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.remaining_size, U256::zero());
    }

    #[test]
    fn to_limit_order_respects_cancelled_status_override() {
        let order = to_limit_order(&raw_order("3", "100", "20", Some("cancelled"))).unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
    }

    #[test]
    fn to_limit_order_skips_rows_without_an_order_id() {
        let mut row = raw_order("", "100", "0", None);
        row.order_id = None;
        assert!(to_limit_order(&row).is_none());
    }
}
