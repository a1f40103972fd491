//! Lending-Pool Adapter (spec §4.9, component C10) — the variable-rate,
//! Aave-v3-style exemplar.
//!
//! Grounded on `other_examples/72f91595_…aave_strategy.rs` for the
//! contract surface (pool, UI data provider, rewards controller) and on
//! `engine/src/evm/rpc/address_checker.rs` for the `abigen!`-generated
//! typed-call idiom. Every read goes through the Multicall Read Engine per
//! the flow diagram in spec §2, even the single lens call.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use ethers::{
    contract::{AbiDecode, AbiEncode},
    types::{Address, Bytes, U256},
};
use tokio::sync::RwLock;

use crate::{
    adapter::{unsupported, BorrowParams, ChainPositions, LendParams, ProtocolAdapter, SetCollateralParams, WriteReceipt},
    chain::{BlockTag, ChainGatewayPool, ChainReader},
    codec::{
        lending_pool::{
            BorrowCall, LendingPoolCalls, RepayCall, SetUserUseReserveAsCollateralCall, SupplyCall,
            WithdrawCall as PoolWithdrawCall,
        },
        pool_data_lens::{
            AggregatedReserveIncentiveData, BaseCurrencyInfo, GetReservesDataCall, GetReservesIncentivesDataCall,
            GetUserReservesDataCall, GetUserReservesIncentivesDataCall, PoolDataLensCalls, ReserveData,
            UserAggregatedIncentiveData, UserReserveData,
        },
        rewards_controller::{ClaimAllRewardsCall, RewardsControllerCalls},
        wrapped_native::{DepositCall as WrappedDepositCall, WithdrawCall as WrappedWithdrawCall, WrappedNativeCalls},
    },
    erc20::{self, ensure_allowance},
    error::{require_positive_amount, AdapterError, AdapterResult},
    math::{apr_from_ray, apy_from_apr, ray, supply_cap_headroom},
    multicall,
    schema::{Incentive, LendingMarket, MarketSide, Position, ReserveFlags, UserState},
    tx::{TxPipeline, TxSender, UnsignedCall},
};

/// Per-chain contract addresses this adapter calls (spec §4.9 "State: per-
/// chain pool addresses, lens contracts, rewards controller").
#[derive(Debug, Clone)]
pub struct LendingDeployment {
    pub chain_name: String,
    pub pool: Address,
    pub lens: Address,
    pub addresses_provider: Address,
    pub rewards_controller: Address,
    pub wrapped_native: Address,
    pub referral_code: u16,
}

const ADAPTER_NAME: &str = "lending-pool";
const REFERRAL_CODE_PLACEHOLDER: u16 = 0;

pub struct LendingPoolAdapter {
    chain_pool: ChainGatewayPool,
    deployments: HashMap<u64, LendingDeployment>,
    tx_pipeline: TxPipeline,
    sender: Option<Arc<dyn TxSender>>,
    /// `underlying -> variable debt token` cache, populated lazily from lens
    /// reads (spec §3 "per-chain resolver caches").
    variable_debt_token_cache: Arc<RwLock<HashMap<(u64, Address), Address>>>,
}

impl LendingPoolAdapter {
    pub fn new(
        chain_pool: ChainGatewayPool,
        deployments: HashMap<u64, LendingDeployment>,
        sender: Option<Arc<dyn TxSender>>,
    ) -> Self {
        Self {
            chain_pool,
            deployments,
            tx_pipeline: TxPipeline::new(),
            sender,
            variable_debt_token_cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn deployment(&self, chain_id: u64) -> AdapterResult<&LendingDeployment> {
        self.deployments
            .get(&chain_id)
            .ok_or_else(|| AdapterError::config(format!("no lending-pool deployment configured for chain {chain_id}")))
    }

    async fn chain(&self, chain_id: u64) -> AdapterResult<impl ChainReader> {
        let deployment = self.deployment(chain_id)?;
        self.chain_pool.get(&deployment.chain_name).await
    }

    fn sender(&self) -> AdapterResult<&Arc<dyn TxSender>> {
        self.sender.as_ref().ok_or_else(|| AdapterError::config("no signer configured for this adapter instance"))
    }

    async fn reserves_data(
        &self,
        chain: &dyn ChainReader,
        deployment: &LendingDeployment,
    ) -> AdapterResult<(Vec<ReserveData>, BaseCurrencyInfo)> {
        let call = PoolDataLensCalls::GetReservesData(GetReservesDataCall { provider: deployment.addresses_provider });
        let data: Bytes = call.encode().into();
        let raw = multicall::call_one(chain, deployment.lens, data, BlockTag::Latest).await?;
        AbiDecode::decode(raw.as_ref()).map_err(|e| AdapterError::Schema(format!("decoding getReservesData: {e}")))
    }

    async fn incentives_data(
        &self,
        chain: &dyn ChainReader,
        deployment: &LendingDeployment,
    ) -> AdapterResult<Vec<AggregatedReserveIncentiveData>> {
        let call =
            PoolDataLensCalls::GetReservesIncentivesData(GetReservesIncentivesDataCall { provider: deployment.addresses_provider });
        let data: Bytes = call.encode().into();
        let raw = multicall::call_one(chain, deployment.lens, data, BlockTag::Latest).await?;
        AbiDecode::decode(raw.as_ref())
            .map_err(|e| AdapterError::Schema(format!("decoding getReservesIncentivesData: {e}")))
    }

    /// Resolves `underlying`'s variable-debt-token address from the resolver
    /// cache `markets_for_chain` populates, falling back to a fresh
    /// `getReservesData` read when the cache hasn't been warmed for this
    /// chain yet (spec §3 "per-chain resolver caches").
    async fn variable_debt_token_for(
        &self,
        chain: &dyn ChainReader,
        deployment: &LendingDeployment,
        underlying: Address,
    ) -> AdapterResult<Address> {
        if let Some(token) = self.variable_debt_token_cache.read().await.get(&(chain.chain_id(), underlying)) {
            return Ok(*token);
        }

        let (reserves, _) = self.reserves_data(chain, deployment).await?;
        let mut cache = self.variable_debt_token_cache.write().await;
        for reserve in &reserves {
            cache.entry((chain.chain_id(), reserve.underlying_asset)).or_insert(reserve.variable_debt_token_address);
        }
        cache
            .get(&(chain.chain_id(), underlying))
            .copied()
            .ok_or_else(|| AdapterError::input(format!("no reserve found for underlying {underlying:#x}")))
    }

    /// Per-user claimable-reward state via `getUserReservesIncentivesData`
    /// (spec §6 lens-function list; surfaced through `UserState.rewards`).
    async fn user_incentives_data(
        &self,
        chain: &dyn ChainReader,
        deployment: &LendingDeployment,
        account: Address,
    ) -> AdapterResult<Vec<UserAggregatedIncentiveData>> {
        let call = PoolDataLensCalls::GetUserReservesIncentivesData(GetUserReservesIncentivesDataCall {
            provider: deployment.addresses_provider,
            user: account,
        });
        let data: Bytes = call.encode().into();
        let raw = multicall::call_one(chain, deployment.lens, data, BlockTag::Pending).await?;
        AbiDecode::decode(raw.as_ref())
            .map_err(|e| AdapterError::Schema(format!("decoding getUserReservesIncentivesData: {e}")))
    }

    async fn user_reserves_data(
        &self,
        chain: &dyn ChainReader,
        deployment: &LendingDeployment,
        account: Address,
    ) -> AdapterResult<Vec<UserReserveData>> {
        let call = PoolDataLensCalls::GetUserReservesData(GetUserReservesDataCall {
            provider: deployment.addresses_provider,
            user: account,
        });
        let data: Bytes = call.encode().into();
        let raw = multicall::call_one(chain, deployment.lens, data, BlockTag::Pending).await?;
        let (rows, _average_unused): (Vec<UserReserveData>, u8) =
            AbiDecode::decode(raw.as_ref()).map_err(|e| AdapterError::Schema(format!("decoding getUserReservesData: {e}")))?;
        Ok(rows)
    }

    /// Builds the canonical `LendingMarket` list for one chain (spec §4.9
    /// `get_all_markets`).
    async fn markets_for_chain(
        &self,
        chain: &dyn ChainReader,
        deployment: &LendingDeployment,
        include_rewards: bool,
    ) -> AdapterResult<Vec<LendingMarket>> {
        let (reserves, base_currency) = self.reserves_data(chain, deployment).await?;
        let ref_unit = base_currency.market_reference_currency_unit;
        let ref_usd = base_currency_ref_usd(&base_currency);

        let incentives_by_asset = if include_rewards {
            self.incentives_data(chain, deployment)
                .await?
                .into_iter()
                .map(|row| (row.underlying_asset, row))
                .collect::<HashMap<_, _>>()
        } else {
            HashMap::new()
        };

        let mut markets = Vec::with_capacity(reserves.len());
        {
            let mut cache = self.variable_debt_token_cache.write().await;
            for reserve in &reserves {
                cache.entry((chain.chain_id(), reserve.underlying_asset)).or_insert(reserve.variable_debt_token_address);
            }
        }

        for reserve in reserves {
            let price_usd = (u256_to_f64(reserve.price_in_market_reference_currency) / u256_to_f64(ref_unit)) * ref_usd;

            let supply_apr = apr_from_ray(U256::from(reserve.liquidity_rate));
            let supply_apy = apy_from_apr(supply_apr);
            let variable_borrow_apr = apr_from_ray(U256::from(reserve.variable_borrow_rate));
            let mut variable_borrow_apy = apy_from_apr(variable_borrow_apr);

            let total_variable_debt = reserve.total_scaled_variable_debt * U256::from(reserve.variable_borrow_index) / ray();
            let tvl = reserve.available_liquidity + total_variable_debt;

            let mut incentives = Vec::new();
            if let Some(row) = incentives_by_asset.get(&reserve.underlying_asset) {
                let supply_denominator_usd =
                    u256_to_f64(reserve.available_liquidity) / 10f64.powi(reserve.decimals.as_u32() as i32) * price_usd;
                let borrow_denominator_usd =
                    u256_to_f64(total_variable_debt) / 10f64.powi(reserve.decimals.as_u32() as i32) * price_usd;

                let mut total_borrow_reward_apr = 0.0;
                for incentive_row in row.a_incentive_data.iter() {
                    if let Some(incentive) =
                        reward_incentive(incentive_row, MarketSide::Supply, supply_denominator_usd)
                    {
                        incentives.push(incentive);
                    }
                }
                for incentive_row in row.v_incentive_data.iter() {
                    if let Some(incentive) =
                        reward_incentive(incentive_row, MarketSide::Borrow, borrow_denominator_usd)
                    {
                        total_borrow_reward_apr += incentive.apr;
                        incentives.push(incentive);
                    }
                }
                // Rewards reduce the effective cost of borrowing (spec §4.9).
                variable_borrow_apy = (variable_borrow_apy - total_borrow_reward_apr).max(0.0);
            }

            let flags = ReserveFlags {
                active: reserve.is_active,
                frozen: reserve.is_frozen,
                paused: reserve.is_paused,
                siloed: reserve.is_siloed_borrowing,
                stable: false,
                collateral_enabled: reserve.usage_as_collateral_enabled,
                borrowing_enabled: reserve.borrowing_enabled,
            };

            markets.push(LendingMarket {
                chain_id: chain.chain_id(),
                pool: deployment.pool,
                underlying: reserve.underlying_asset,
                symbol_canonical: reserve.symbol,
                decimals: reserve.decimals.as_u32() as u8,
                a_token: reserve.a_token_address,
                variable_debt_token: reserve.variable_debt_token_address,
                ltv_bps: reserve.base_ltv_bps.as_u32(),
                liquidation_threshold_bps: reserve.liquidation_threshold_bps.as_u32(),
                price_usd,
                supply_apr,
                supply_apy,
                variable_borrow_apr,
                variable_borrow_apy,
                available_liquidity: reserve.available_liquidity,
                total_variable_debt,
                tvl,
                supply_cap: reserve.supply_cap,
                supply_cap_headroom: supply_cap_headroom(
                    reserve.supply_cap,
                    reserve.decimals.as_u32(),
                    reserve.available_liquidity,
                    total_variable_debt,
                ),
                borrow_cap: reserve.borrow_cap,
                flags,
                incentives,
            });
        }

        Ok(markets)
    }
}

fn reward_incentive(row: &crate::codec::pool_data_lens::IncentiveRow, side: MarketSide, denominator_usd: f64) -> Option<Incentive> {
    if denominator_usd <= 0.0 {
        return None;
    }
    let reward_price_usd = i256_to_f64(row.price_in_market_reference_currency) / 1e8;
    let numerator = u256_to_f64(row.emission_per_second) * crate::constants::SECONDS_PER_YEAR
        / 10f64.powi(row.reward_token_decimals.as_u32() as i32)
        * reward_price_usd;
    let apr = numerator / denominator_usd;

    Some(Incentive {
        side,
        token: row.reward_token,
        symbol: row.reward_token_symbol.clone(),
        apr,
        emission_per_second: row.emission_per_second,
        distribution_end: Some(row.distribution_end.as_u64()),
        price_usd: reward_price_usd,
    })
}

/// Flattens `getUserReservesIncentivesData` rows into a JSON array of
/// nonzero claimable-reward entries, skipping zero-balance rows rather than
/// reporting every reward stream the reserve happens to have (spec §3
/// `UserState.rewards`).
fn claimable_rewards_json(rows: &[UserAggregatedIncentiveData]) -> serde_json::Value {
    let mut entries = Vec::new();
    for row in rows {
        for (side, user_rows) in [
            (MarketSide::Supply, &row.a_token_incentives_user_data),
            (MarketSide::Borrow, &row.v_token_incentives_user_data),
        ] {
            for user_row in user_rows {
                if user_row.user_unclaimed_rewards.is_zero() {
                    continue;
                }
                entries.push(serde_json::json!({
                    "underlying_asset": format!("{:#x}", row.underlying_asset),
                    "side": side,
                    "reward_token": format!("{:#x}", user_row.reward_token_address),
                    "reward_token_symbol": user_row.reward_token_symbol,
                    "unclaimed_raw": user_row.user_unclaimed_rewards.to_string(),
                    "reward_token_decimals": user_row.reward_token_decimals.as_u64(),
                }));
            }
        }
    }
    serde_json::Value::Array(entries)
}

fn u256_to_f64(x: U256) -> f64 {
    x.to_string().parse().unwrap_or(f64::INFINITY)
}

fn i256_to_f64(x: ethers::types::I256) -> f64 {
    x.to_string().parse().unwrap_or(0.0)
}

/// `ref_usd = ref_usd_raw / 10^ref_usd_decimals` when `decimals>0`, else
/// `float(ref_usd_raw)` (spec §4.9 `get_all_markets`).
fn base_currency_ref_usd(base_currency: &BaseCurrencyInfo) -> f64 {
    let ref_usd_raw = i256_to_f64(base_currency.market_reference_currency_price_in_usd);
    if base_currency.network_base_token_price_decimals > 0 {
        ref_usd_raw / 10f64.powi(base_currency.network_base_token_price_decimals as i32)
    } else {
        ref_usd_raw
    }
}

#[async_trait]
impl ProtocolAdapter for LendingPoolAdapter {
    fn name(&self) -> &'static str {
        ADAPTER_NAME
    }

    async fn get_all_markets(&self, chain_id: u64, include_rewards: bool) -> AdapterResult<Vec<LendingMarket>> {
        let deployment = self.deployment(chain_id)?.clone();
        let chain = self.chain(chain_id).await?;
        self.markets_for_chain(&chain, &deployment, include_rewards).await
    }

    async fn get_full_user_state(&self, account: Address, include_zero_positions: bool) -> AdapterResult<UserState> {
        let mut state = UserState::new(ADAPTER_NAME, account);

        let fan_out = self.deployments.keys().copied().collect::<Vec<_>>();
        let tasks: Vec<_> = fan_out
            .into_iter()
            .map(|chain_id| {
                let account = account;
                async move {
                    let result = self.fetch_chain_positions(chain_id, account, include_zero_positions).await;
                    (chain_id, result)
                }
            })
            .collect();

        let results = futures::future::join_all(tasks).await;
        let mut rewards_by_chain = Vec::new();
        for (chain_id, result) in results {
            match result {
                Ok(chain_positions) => {
                    state.chains.push(chain_id);
                    state.positions.extend(chain_positions.positions);
                    if let Some(rewards) = chain_positions.rewards {
                        rewards_by_chain.push(serde_json::json!({"chain_id": chain_id, "rewards": rewards}));
                    }
                },
                Err(err) => state.errors.push(format!("chain {chain_id}: {err}")),
            }
        }
        if !rewards_by_chain.is_empty() {
            state.rewards = Some(serde_json::Value::Array(rewards_by_chain));
        }

        Ok(state)
    }

    async fn lend(&self, params: LendParams) -> AdapterResult<WriteReceipt> {
        require_positive_amount(params.amount)?;
        let deployment = self.deployment(params.chain_id)?.clone();
        let chain = self.chain(params.chain_id).await?;
        let sender = self.sender()?.clone();
        let owner = sender.address();

        if params.native {
            let wrap_data: Bytes = WrappedNativeCalls::Deposit(WrappedDepositCall).encode().into();
            self.tx_pipeline
                .send_and_wait(&chain, sender.as_ref(), deployment.wrapped_native, wrap_data, params.amount)
                .await?;

            let allowance_outcome = ensure_allowance(
                &chain,
                &self.tx_pipeline,
                sender.as_ref(),
                deployment.wrapped_native,
                owner,
                deployment.pool,
                params.amount,
                params.amount,
            )
            .await?;

            let supply_data: Bytes = LendingPoolCalls::Supply(SupplyCall {
                asset: deployment.wrapped_native,
                amount: params.amount,
                on_behalf_of: owner,
                referral_code: deployment.referral_code.max(REFERRAL_CODE_PLACEHOLDER),
            })
            .encode()
            .into();
            let tx_hash = self
                .tx_pipeline
                .send_and_wait(&chain, sender.as_ref(), deployment.pool, supply_data, U256::zero())
                .await?;

            return Ok(WriteReceipt { tx_hash, approval_tx_hash: allowance_outcome.approve_tx_hash });
        }

        let allowance_outcome = ensure_allowance(
            &chain,
            &self.tx_pipeline,
            sender.as_ref(),
            params.underlying,
            owner,
            deployment.pool,
            params.amount,
            params.amount,
        )
        .await?;

        let supply_data: Bytes = LendingPoolCalls::Supply(SupplyCall {
            asset: params.underlying,
            amount: params.amount,
            on_behalf_of: owner,
            referral_code: deployment.referral_code.max(REFERRAL_CODE_PLACEHOLDER),
        })
        .encode()
        .into();
        let tx_hash =
            self.tx_pipeline.send_and_wait(&chain, sender.as_ref(), deployment.pool, supply_data, U256::zero()).await?;

        Ok(WriteReceipt { tx_hash, approval_tx_hash: allowance_outcome.approve_tx_hash })
    }

    async fn unlend(&self, params: LendParams) -> AdapterResult<WriteReceipt> {
        if !params.full {
            require_positive_amount(params.amount)?;
        }
        let deployment = self.deployment(params.chain_id)?.clone();
        let chain = self.chain(params.chain_id).await?;
        let sender = self.sender()?.clone();
        let owner = sender.address();

        let withdraw_target = if params.native { deployment.wrapped_native } else { params.underlying };
        let withdraw_to = if params.native { sender.address() } else { owner };
        let withdraw_amount = if params.full { U256::MAX } else { params.amount };

        let pre_balance = if params.native {
            erc20::balance_of(&chain, deployment.wrapped_native, owner, BlockTag::Latest).await?
        } else {
            U256::zero()
        };

        let withdraw_data: Bytes = LendingPoolCalls::Withdraw(PoolWithdrawCall {
            asset: withdraw_target,
            amount: withdraw_amount,
            to: withdraw_to,
        })
        .encode()
        .into();
        let tx_hash =
            self.tx_pipeline.send_and_wait(&chain, sender.as_ref(), deployment.pool, withdraw_data, U256::zero()).await?;

        if params.native {
            let post_balance = erc20::balance_of(&chain, deployment.wrapped_native, owner, BlockTag::Pending).await?;
            let delta = post_balance.saturating_sub(pre_balance);
            if !delta.is_zero() {
                let unwrap_data: Bytes =
                    WrappedNativeCalls::Withdraw(WrappedWithdrawCall { wad: delta }).encode().into();
                self.tx_pipeline
                    .send_and_wait(&chain, sender.as_ref(), deployment.wrapped_native, unwrap_data, U256::zero())
                    .await?;
            }
        }

        Ok(WriteReceipt { tx_hash, approval_tx_hash: None })
    }

    async fn borrow(&self, params: BorrowParams) -> AdapterResult<WriteReceipt> {
        require_positive_amount(params.amount)?;
        let deployment = self.deployment(params.chain_id)?.clone();
        let chain = self.chain(params.chain_id).await?;
        let sender = self.sender()?.clone();
        let owner = sender.address();

        let asset = if params.native { deployment.wrapped_native } else { params.underlying };

        let borrow_data: Bytes = LendingPoolCalls::Borrow(BorrowCall {
            asset,
            amount: params.amount,
            interest_rate_mode: U256::from(2u64),
            referral_code: deployment.referral_code.max(REFERRAL_CODE_PLACEHOLDER),
            on_behalf_of: owner,
        })
        .encode()
        .into();
        let tx_hash =
            self.tx_pipeline.send_and_wait(&chain, sender.as_ref(), deployment.pool, borrow_data, U256::zero()).await?;

        if params.native {
            let unwrap_data: Bytes =
                WrappedNativeCalls::Withdraw(WrappedWithdrawCall { wad: params.amount }).encode().into();
            self.tx_pipeline
                .send_and_wait(&chain, sender.as_ref(), deployment.wrapped_native, unwrap_data, U256::zero())
                .await?;
        }

        Ok(WriteReceipt { tx_hash, approval_tx_hash: None })
    }

    async fn repay(&self, params: BorrowParams) -> AdapterResult<WriteReceipt> {
        if !params.full {
            require_positive_amount(params.amount)?;
        }
        let deployment = self.deployment(params.chain_id)?.clone();
        let chain = self.chain(params.chain_id).await?;
        let sender = self.sender()?.clone();
        let owner = sender.address();
        let repay_amount = if params.full { U256::MAX } else { params.amount };
        // Aave repays a full debt unconditionally; only a partial repay needs an
        // exact-sized approval.
        let approve_to_full = |need: U256| if params.full { U256::MAX } else { need };

        if params.native {
            let wrap_amount = if params.full {
                let debt_token = self.variable_debt_token_for(&chain, &deployment, params.underlying).await?;
                let debt_balance = erc20::balance_of(&chain, debt_token, owner, BlockTag::Latest).await?;
                let buffer = (debt_balance / U256::from(10_000u64)).max(U256::one());
                let native_balance = chain.get_balance(owner, BlockTag::Latest).await?;
                let desired = debt_balance.saturating_add(buffer);
                if desired <= native_balance {
                    desired
                } else if debt_balance <= native_balance {
                    debt_balance
                } else {
                    return Err(AdapterError::input("native balance insufficient to cover outstanding debt"));
                }
            } else {
                let buffer = (params.amount / U256::from(10_000u64)).max(U256::one());
                let native_balance = chain.get_balance(owner, BlockTag::Latest).await?;
                let desired = params.amount.saturating_add(buffer);
                if desired <= native_balance {
                    desired
                } else if params.amount <= native_balance {
                    params.amount
                } else {
                    return Err(AdapterError::input("native balance insufficient to cover repay amount"));
                }
            };

            let wrap_data: Bytes = WrappedNativeCalls::Deposit(WrappedDepositCall).encode().into();
            self.tx_pipeline
                .send_and_wait(&chain, sender.as_ref(), deployment.wrapped_native, wrap_data, wrap_amount)
                .await?;

            let allowance_outcome = ensure_allowance(
                &chain,
                &self.tx_pipeline,
                sender.as_ref(),
                deployment.wrapped_native,
                owner,
                deployment.pool,
                wrap_amount,
                approve_to_full(wrap_amount),
            )
            .await?;

            let repay_data: Bytes = LendingPoolCalls::Repay(RepayCall {
                asset: deployment.wrapped_native,
                amount: repay_amount,
                interest_rate_mode: U256::from(2u64),
                on_behalf_of: owner,
            })
            .encode()
            .into();
            let tx_hash =
                self.tx_pipeline.send_and_wait(&chain, sender.as_ref(), deployment.pool, repay_data, U256::zero()).await?;

            return Ok(WriteReceipt { tx_hash, approval_tx_hash: allowance_outcome.approve_tx_hash });
        }

        let allowance_outcome = ensure_allowance(
            &chain,
            &self.tx_pipeline,
            sender.as_ref(),
            params.underlying,
            owner,
            deployment.pool,
            repay_amount,
            approve_to_full(repay_amount),
        )
        .await?;

        let repay_data: Bytes = LendingPoolCalls::Repay(RepayCall {
            asset: params.underlying,
            amount: repay_amount,
            interest_rate_mode: U256::from(2u64),
            on_behalf_of: owner,
        })
        .encode()
        .into();
        let tx_hash =
            self.tx_pipeline.send_and_wait(&chain, sender.as_ref(), deployment.pool, repay_data, U256::zero()).await?;

        Ok(WriteReceipt { tx_hash, approval_tx_hash: allowance_outcome.approve_tx_hash })
    }

    async fn set_collateral(&self, params: SetCollateralParams) -> AdapterResult<WriteReceipt> {
        let deployment = self.deployment(params.chain_id)?.clone();
        let chain = self.chain(params.chain_id).await?;
        let sender = self.sender()?.clone();

        let data: Bytes = LendingPoolCalls::SetUserUseReserveAsCollateral(SetUserUseReserveAsCollateralCall {
            asset: params.underlying,
            use_as_collateral: params.use_as_collateral,
        })
        .encode()
        .into();
        let tx_hash = self.tx_pipeline.send_and_wait(&chain, sender.as_ref(), deployment.pool, data, U256::zero()).await?;

        Ok(WriteReceipt { tx_hash, approval_tx_hash: None })
    }

    async fn claim_rewards(&self, chain_id: u64, assets: Option<Vec<Address>>) -> AdapterResult<WriteReceipt> {
        let deployment = self.deployment(chain_id)?.clone();
        let chain = self.chain(chain_id).await?;
        let sender = self.sender()?.clone();

        let assets = match assets {
            Some(assets) => assets,
            None => {
                // `claimAllRewards` expects the incentive-bearing aToken/variableDebtToken
                // addresses, not the underlyings `reserves_data` carries.
                let incentives = self.incentives_data(&chain, &deployment).await?;
                incentives
                    .iter()
                    .flat_map(|row| row.a_incentive_data.iter().chain(row.v_incentive_data.iter()))
                    .map(|row| row.token_address)
                    .filter(|addr| *addr != Address::zero())
                    .collect::<std::collections::HashSet<_>>()
                    .into_iter()
                    .collect()
            },
        };

        let data: Bytes = RewardsControllerCalls::ClaimAllRewards(ClaimAllRewardsCall { assets, to: sender.address() })
            .encode()
            .into();
        let tx_hash = self
            .tx_pipeline
            .send_and_wait(&chain, sender.as_ref(), deployment.rewards_controller, data, U256::zero())
            .await?;

        Ok(WriteReceipt { tx_hash, approval_tx_hash: None })
    }
}

impl LendingPoolAdapter {
    async fn fetch_chain_positions(
        &self,
        chain_id: u64,
        account: Address,
        include_zero_positions: bool,
    ) -> AdapterResult<ChainPositions> {
        let deployment = self.deployment(chain_id)?.clone();
        let chain = self.chain(chain_id).await?;
        let (reserves, base_currency) = self.reserves_data(&chain, &deployment).await?;
        let user_rows = self.user_reserves_data(&chain, &deployment, account).await?;
        let incentives = self.incentives_data(&chain, &deployment).await?;

        let ref_unit = base_currency.market_reference_currency_unit;
        let ref_usd = base_currency_ref_usd(&base_currency);

        let reserves_by_asset = reserves.into_iter().map(|r| (r.underlying_asset, r)).collect::<HashMap<_, _>>();
        let incentives_by_asset = incentives.into_iter().map(|row| (row.underlying_asset, row)).collect::<HashMap<_, _>>();

        let mut positions = Vec::new();
        for row in user_rows {
            let supply_raw = row.scaled_a_token_balance * U256::from(
                reserves_by_asset.get(&row.underlying_asset).map(|r| r.liquidity_index).unwrap_or_default(),
            ) / ray();
            let debt_raw = row.scaled_variable_debt * U256::from(
                reserves_by_asset.get(&row.underlying_asset).map(|r| r.variable_borrow_index).unwrap_or_default(),
            ) / ray();

            if supply_raw.is_zero() && debt_raw.is_zero() && !include_zero_positions {
                continue;
            }

            let reserve = match reserves_by_asset.get(&row.underlying_asset) {
                Some(reserve) => reserve,
                None => continue,
            };

            let price_usd = (u256_to_f64(reserve.price_in_market_reference_currency) / u256_to_f64(ref_unit)) * ref_usd;
            let supply_apy = apy_from_apr(apr_from_ray(U256::from(reserve.liquidity_rate)));
            let borrow_apy = apy_from_apr(apr_from_ray(U256::from(reserve.variable_borrow_rate)));

            // Same reward-APR wiring `markets_for_chain` uses at the market level,
            // applied to this one reserve (spec §3 `Position.reward_*_apr`).
            let mut reward_supply_apr = 0.0;
            let mut reward_borrow_apr = 0.0;
            if let Some(incentive_row) = incentives_by_asset.get(&row.underlying_asset) {
                let supply_denominator_usd =
                    u256_to_f64(reserve.available_liquidity) / 10f64.powi(reserve.decimals.as_u32() as i32) * price_usd;
                let total_variable_debt = reserve.total_scaled_variable_debt * U256::from(reserve.variable_borrow_index) / ray();
                let borrow_denominator_usd =
                    u256_to_f64(total_variable_debt) / 10f64.powi(reserve.decimals.as_u32() as i32) * price_usd;

                for row in incentive_row.a_incentive_data.iter() {
                    if let Some(incentive) = reward_incentive(row, MarketSide::Supply, supply_denominator_usd) {
                        reward_supply_apr += incentive.apr;
                    }
                }
                for row in incentive_row.v_incentive_data.iter() {
                    if let Some(incentive) = reward_incentive(row, MarketSide::Borrow, borrow_denominator_usd) {
                        reward_borrow_apr += incentive.apr;
                    }
                }
            }

            positions.push(Position {
                chain_id,
                protocol: ADAPTER_NAME.to_string(),
                underlying: row.underlying_asset,
                decimals: reserve.decimals.as_u32() as u8,
                share_or_balance_raw: supply_raw,
                debt_raw,
                usage_as_collateral: row.usage_as_collateral_enabled_on_user,
                supply_apy,
                borrow_apy,
                reward_supply_apr,
                reward_borrow_apr,
                price_usd,
                usd_value: None,
            });
        }

        let rewards = match self.user_incentives_data(&chain, &deployment, account).await {
            Ok(rows) => {
                let json = claimable_rewards_json(&rows);
                matches!(&json, serde_json::Value::Array(entries) if !entries.is_empty()).then_some(json)
            },
            // Claimable-reward state is advisory; a lens read failing here
            // shouldn't fail the whole chain's position fetch.
            Err(_) => None,
        };

        Ok(ChainPositions { chain_id, positions, rewards })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{atomic::AtomicUsize, Mutex};

    use ethers::types::{FeeHistory, TransactionReceipt, H256, I256};

    use super::*;
    use crate::{chain::MockChainReader, codec::multicall3::Call3Result, tx::FilledTransaction};

    fn sample_reserve(underlying: Address) -> ReserveData {
        ReserveData {
            underlying_asset: underlying,
            symbol: "USDC".into(),
            decimals: U256::from(6u64),
            base_ltv_bps: U256::from(7_500u64),
            liquidation_threshold_bps: U256::from(8_000u64),
            usage_as_collateral_enabled: true,
            borrowing_enabled: true,
            is_active: true,
            is_frozen: false,
            is_paused: false,
            is_siloed_borrowing: false,
            liquidity_index: ray().as_u128(),
            variable_borrow_index: ray().as_u128(),
            liquidity_rate: (ray() / U256::from(20u64)).as_u128(),
            variable_borrow_rate: (ray() / U256::from(10u64)).as_u128(),
            a_token_address: Address::repeat_byte(0xaa),
            variable_debt_token_address: Address::repeat_byte(0xbb),
            available_liquidity: U256::from(10_000_000_000u64),
            total_scaled_variable_debt: U256::from(2_000_000_000u64),
            price_in_market_reference_currency: U256::from(100_000_000u64),
            borrow_cap: U256::zero(),
            supply_cap: U256::from(50_000u64),
        }
    }

    fn sample_base_currency() -> BaseCurrencyInfo {
        BaseCurrencyInfo {
            market_reference_currency_unit: U256::from(100_000_000u64),
            market_reference_currency_price_in_usd: I256::from(100_000_000i64),
            network_base_token_price_in_usd: I256::from(100_000_000i64),
            network_base_token_price_decimals: 8,
        }
    }

    fn sample_deployment() -> LendingDeployment {
        LendingDeployment {
            chain_name: "ethereum".into(),
            pool: Address::repeat_byte(0x01),
            lens: Address::repeat_byte(0x02),
            addresses_provider: Address::repeat_byte(0x03),
            rewards_controller: Address::repeat_byte(0x04),
            wrapped_native: Address::repeat_byte(0x05),
            referral_code: 0,
        }
    }

    /// Wraps `inner_return` the way `try_aggregate_chunk` expects: a single
    /// successful `Call3Result` whose `return_data` is itself ABI-encoded.
    fn encode_aggregate3_response(inner_return: Bytes) -> Bytes {
        let rows = vec![Call3Result { success: true, return_data: inner_return }];
        AbiEncode::encode(rows).into()
    }

    fn adapter() -> LendingPoolAdapter {
        let mut deployments = HashMap::new();
        deployments.insert(1u64, sample_deployment());
        LendingPoolAdapter::new(ChainGatewayPool::new(crate::config::RuntimeConfig::default()), deployments, None)
    }

    #[tokio::test]
    async fn markets_for_chain_wires_apr_apy_and_supply_cap_headroom() {
        let underlying = Address::repeat_byte(0x06);
        let reserve = sample_reserve(underlying);
        let base_currency = sample_base_currency();
        let inner: Bytes = AbiEncode::encode((vec![reserve], base_currency)).into();
        let response = encode_aggregate3_response(inner);

        let mut mock = MockChainReader::new();
        mock.expect_chain_id().returning(|| 1);
        mock.expect_eth_call().returning(move |_to, _data, _block| Ok(response.clone()));

        let adapter = adapter();
        let deployment = sample_deployment();
        let markets = adapter.markets_for_chain(&mock, &deployment, false).await.unwrap();

        assert_eq!(markets.len(), 1);
        let market = &markets[0];
        assert_eq!(market.underlying, underlying);
        assert!((market.supply_apr - 0.05).abs() < 1e-9);
        assert!((market.variable_borrow_apr - 0.10).abs() < 1e-9);
        assert!((market.supply_apy - apy_from_apr(0.05)).abs() < 1e-9);
        assert_eq!(market.total_variable_debt, U256::from(2_000_000_000u64));
        assert_eq!(market.supply_cap_headroom, Some(U256::from(38_000_000_000u64)));
        assert!(market.incentives.is_empty());
    }

    struct RecordingSender {
        address: Address,
        captured: std::sync::Arc<Mutex<Option<Bytes>>>,
    }

    #[async_trait]
    impl TxSender for RecordingSender {
        async fn sign(&self, tx: &FilledTransaction) -> AdapterResult<Bytes> {
            let data = match tx {
                FilledTransaction::Eip1559 { data, .. } => data.clone(),
                FilledTransaction::Legacy { data, .. } => data.clone(),
            };
            *self.captured.lock().unwrap() = Some(data);
            Ok(Bytes::from(vec![0x01]))
        }

        fn address(&self) -> Address {
            self.address
        }
    }

    /// Exercises the same building blocks `unlend`'s native branch chains
    /// together — `erc20::balance_of` pre/post the withdraw, and
    /// `TxPipeline::send_and_wait` broadcasting the resulting unwrap call —
    /// without going through the adapter itself, since `ChainGatewayPool`
    /// only ever hands back a live `EvmChainGateway`.
    #[tokio::test]
    async fn native_unwrap_amount_matches_wrapped_balance_delta() {
        let owner = Address::repeat_byte(0x07);
        let wrapped_native = Address::repeat_byte(0x05);

        let mut mock = MockChainReader::new();
        mock.expect_chain_id().returning(|| 10);

        let balance_calls = std::sync::Arc::new(AtomicUsize::new(0));
        let balance_calls_inner = balance_calls.clone();
        mock.expect_eth_call().returning(move |_to, _data, _block| {
            let n = balance_calls_inner.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let balance = if n == 0 { U256::from(1_000u64) } else { U256::from(1_500u64) };
            Ok(AbiEncode::encode(balance).into())
        });
        mock.expect_get_transaction_count().returning(|_, _| Ok(U256::from(5u64)));
        mock.expect_estimate_gas().returning(|_| Ok(U256::from(21_000u64)));
        mock.expect_fee_history().returning(|_, _, _| {
            Ok(FeeHistory { base_fee_per_gas: vec![U256::zero()], gas_used_ratio: vec![], oldest_block: U256::zero(), reward: vec![] })
        });
        mock.expect_gas_price().returning(|| Ok(U256::from(1_000_000_000u64)));
        mock.expect_send_raw_transaction().returning(|_| Ok(H256::repeat_byte(0xab)));
        mock.expect_get_transaction_receipt()
            .returning(|_| Ok(Some(TransactionReceipt { block_number: Some(1u64.into()), ..Default::default() })));

        let pre_balance = erc20::balance_of(&mock, wrapped_native, owner, BlockTag::Latest).await.unwrap();
        let post_balance = erc20::balance_of(&mock, wrapped_native, owner, BlockTag::Pending).await.unwrap();
        let delta = post_balance.saturating_sub(pre_balance);
        assert_eq!(delta, U256::from(500u64));

        let captured = std::sync::Arc::new(Mutex::new(None));
        let sender = RecordingSender { address: owner, captured: captured.clone() };
        let pipeline = TxPipeline::new();

        let unwrap_data: Bytes = WrappedNativeCalls::Withdraw(WrappedWithdrawCall { wad: delta }).encode().into();
        let tx_hash =
            pipeline.send_and_wait(&mock, &sender, wrapped_native, unwrap_data.clone(), U256::zero()).await.unwrap();
        assert_eq!(tx_hash, H256::repeat_byte(0xab));

        let recorded = captured.lock().unwrap().clone().unwrap();
        assert_eq!(recorded, unwrap_data);
    }
}
