//! Calldata Codec (spec §4.2, component C2).
//!
//! ABIs are opaque descriptors per spec §1/§6; rather than loading JSON files
//! off disk (the teacher's `abigen!(AddressChecker, "$CF_ETH_CONTRACT_ABI_ROOT/...")`
//! pattern in `engine/src/evm/rpc/address_checker.rs`), this crate inlines
//! the human-readable ABI strings `abigen!` also accepts — there is no
//! build-time contract-artifact pipeline here, so inlining keeps the opaque
//! descriptors colocated with their only consumers.
//!
//! Each contract gets its own submodule: several of these ABIs share a
//! function name (`withdraw`, `decimals`) and `abigen!` expands call/return
//! types into whatever scope it is invoked in, so two contracts sharing a
//! function name in one module would collide.

use ethers::{abi::Token, types::Bytes};

use crate::error::AdapterError;

pub mod erc20 {
    use ethers::contract::abigen;

    abigen!(
        Erc20,
        r#"[
            function balanceOf(address) external view returns (uint256)
            function decimals() external view returns (uint8)
            function symbol() external view returns (string)
            function name() external view returns (string)
            function allowance(address owner, address spender) external view returns (uint256)
            function approve(address spender, uint256 amount) external returns (bool)
            function transfer(address to, uint256 amount) external returns (bool)
            event Transfer(address indexed from, address indexed to, uint256 value)
            event Approval(address indexed owner, address indexed spender, uint256 value)
        ]"#
    );
}

pub mod wrapped_native {
    use ethers::contract::abigen;

    abigen!(
        WrappedNative,
        r#"[
            function deposit() external payable
            function withdraw(uint256 wad) external
        ]"#
    );
}

pub mod lending_pool {
    use ethers::contract::abigen;

    abigen!(
        LendingPool,
        r#"[
            function supply(address asset, uint256 amount, address onBehalfOf, uint16 referralCode) external
            function withdraw(address asset, uint256 amount, address to) external returns (uint256)
            function borrow(address asset, uint256 amount, uint256 interestRateMode, uint16 referralCode, address onBehalfOf) external
            function repay(address asset, uint256 amount, uint256 interestRateMode, address onBehalfOf) external returns (uint256)
            function setUserUseReserveAsCollateral(address asset, bool useAsCollateral) external
        ]"#
    );
}

pub mod pool_data_lens {
    use ethers::contract::abigen;

    abigen!(
        PoolDataLens,
        r#"[
            struct ReserveData {
                address underlyingAsset;
                string symbol;
                uint256 decimals;
                uint256 baseLtvBps;
                uint256 liquidationThresholdBps;
                bool usageAsCollateralEnabled;
                bool borrowingEnabled;
                bool isActive;
                bool isFrozen;
                bool isPaused;
                bool isSiloedBorrowing;
                uint128 liquidityIndex;
                uint128 variableBorrowIndex;
                uint128 liquidityRate;
                uint128 variableBorrowRate;
                address aTokenAddress;
                address variableDebtTokenAddress;
                uint256 availableLiquidity;
                uint256 totalScaledVariableDebt;
                uint256 priceInMarketReferenceCurrency;
                uint256 borrowCap;
                uint256 supplyCap;
            }
            struct BaseCurrencyInfo {
                uint256 marketReferenceCurrencyUnit;
                int256 marketReferenceCurrencyPriceInUsd;
                int256 networkBaseTokenPriceInUsd;
                uint8 networkBaseTokenPriceDecimals;
            }
            struct UserReserveData {
                address underlyingAsset;
                uint256 scaledATokenBalance;
                bool usageAsCollateralEnabledOnUser;
                uint256 scaledVariableDebt;
            }
            struct IncentiveRow {
                address tokenAddress;
                address rewardToken;
                string rewardTokenSymbol;
                uint256 emissionPerSecond;
                uint256 rewardTokenDecimals;
                uint256 distributionEnd;
                int256 priceInMarketReferenceCurrency;
            }
            struct AggregatedReserveIncentiveData {
                address underlyingAsset;
                IncentiveRow[] aIncentiveData;
                IncentiveRow[] vIncentiveData;
            }
            struct UserIncentiveRow {
                address tokenAddress;
                address rewardTokenAddress;
                string rewardTokenSymbol;
                uint256 userUnclaimedRewards;
                uint256 rewardTokenDecimals;
                int256 rewardPriceFeed;
            }
            struct UserAggregatedIncentiveData {
                address underlyingAsset;
                UserIncentiveRow[] aTokenIncentivesUserData;
                UserIncentiveRow[] vTokenIncentivesUserData;
            }
            function getReservesData(address provider) external view returns (ReserveData[] memory, BaseCurrencyInfo memory)
            function getUserReservesData(address provider, address user) external view returns (UserReserveData[] memory, uint8)
            function getReservesIncentivesData(address provider) external view returns (AggregatedReserveIncentiveData[] memory)
            function getUserReservesIncentivesData(address provider, address user) external view returns (UserAggregatedIncentiveData[] memory)
        ]"#
    );
}

pub mod rewards_controller {
    use ethers::contract::abigen;

    abigen!(
        RewardsController,
        r#"[
            function claimAllRewards(address[] assets, address to) external returns (address[] rewardsList, uint256[] claimedAmounts)
        ]"#
    );
}

pub mod multicall3 {
    use ethers::contract::abigen;

    abigen!(
        Multicall3,
        r#"[
            struct Call3 { address target; bool allowFailure; bytes callData; }
            struct Call3Result { bool success; bytes returnData; }
            function aggregate3(Call3[] calls) external returns (Call3Result[] returnData)
        ]"#
    );
}

pub mod rate_swap_market_hub {
    use ethers::contract::abigen;

    abigen!(
        RateSwapMarketHub,
        r#"[
            function getPersonalCooldown(address account) external view returns (uint256)
            function finalizeVaultWithdrawal(address root, uint16 tokenId) external
        ]"#
    );
}

pub mod oft_endpoint {
    use ethers::contract::abigen;

    abigen!(
        OftEndpoint,
        r#"[
            struct SendParam { uint32 dstEid; bytes32 to; uint256 amountLD; uint256 minAmountLD; bytes extraOptions; bytes composeMsg; bytes oftCmd; }
            struct MessagingFee { uint256 nativeFee; uint256 lzTokenFee; }
            struct MessagingReceipt { bytes32 guid; uint64 nonce; MessagingFee fee; }
            struct OFTReceipt { uint256 amountSentLD; uint256 amountReceivedLD; }
            function quoteSend(SendParam _sendParam, bool _payInLzToken) external view returns (MessagingFee msgFee)
            function send(SendParam _sendParam, MessagingFee _fee, address _refundAddress) external payable returns (MessagingReceipt, OFTReceipt)
            function decimalConversionRate() external view returns (uint256)
        ]"#
    );
}

/// Left-pads a value (hex string, raw bytes, or an address) to 32 bytes,
/// failing if it is already wider than 32 bytes (spec §4.2).
pub fn to_bytes32(value: &[u8]) -> Result<[u8; 32], AdapterError> {
    if value.len() > 32 {
        return Err(AdapterError::Schema(format!(
            "value of {} bytes exceeds 32-byte word size",
            value.len()
        )));
    }
    let mut padded = [0u8; 32];
    padded[32 - value.len()..].copy_from_slice(value);
    Ok(padded)
}

/// Decodes ABI-encoded `output` against `types`; an empty return yields the
/// unit tuple (spec §4.2: "a zero-length return yields the unit tuple").
pub fn decode_return(types: &[ethers::abi::ParamType], output: &Bytes) -> Result<Vec<Token>, AdapterError> {
    if output.is_empty() {
        return Ok(Vec::new());
    }
    ethers::abi::decode(types, output).map_err(|e| AdapterError::Schema(e.to_string()))
}

/// `topic0 = keccak(signature)`, used to key event-log decoding; unknown
/// topics are ignored by callers (spec §4.2).
pub fn topic0(event_signature: &str) -> ethers::types::H256 {
    ethers::utils::keccak256(event_signature.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_bytes32_left_pads() {
        let padded = to_bytes32(&[1, 2, 3]).unwrap();
        assert_eq!(&padded[29..], &[1, 2, 3]);
        assert_eq!(&padded[..29], &[0u8; 29]);
    }

    #[test]
    fn to_bytes32_rejects_oversized_input() {
        let oversized = [0u8; 33];
        assert!(to_bytes32(&oversized).is_err());
    }

    #[test]
    fn decode_return_of_empty_bytes_is_unit() {
        let decoded = decode_return(&[ethers::abi::ParamType::Uint(256)], &Bytes::default()).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn topic0_matches_transfer_signature() {
        let expected = ethers::utils::keccak256("Transfer(address,address,uint256)".as_bytes());
        assert_eq!(topic0("Transfer(address,address,uint256)").as_bytes(), &expected);
    }
}
