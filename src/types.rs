//! Domain value types shared across the swap pipeline: chain/token configs,
//! swap identity, and the persisted status enum.

#![allow(dead_code)]

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::fmt;

/// EVM address (20 bytes), following the teacher's `EvmAddress` convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn from_hex(hex: &str) -> eyre::Result<Self> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let bytes = hex::decode(hex)?;
        if bytes.len() != 20 {
            return Err(eyre::eyre!("address must be 20 bytes, got {}", bytes.len()));
        }
        let mut out = [0u8; 20];
        out.copy_from_slice(&bytes);
        Ok(Address(out))
    }

    pub fn from_bytes32(bytes: &[u8]) -> eyre::Result<Self> {
        if bytes.len() != 32 {
            return Err(eyre::eyre!("expected 32-byte word, got {}", bytes.len()));
        }
        let mut out = [0u8; 20];
        out.copy_from_slice(&bytes[12..32]);
        Ok(Address(out))
    }

    pub fn as_bytes32(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out[12..].copy_from_slice(&self.0);
        out
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Lowercase hex, the form used as a map key throughout the bridge/registry.
    pub fn to_lower_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// A 32-byte transaction hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHash(pub [u8; 32]);

impl TxHash {
    pub fn from_hex(hex: &str) -> eyre::Result<Self> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let bytes = hex::decode(hex)?;
        if bytes.len() != 32 {
            return Err(eyre::eyre!("tx hash must be 32 bytes, got {}", bytes.len()));
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(TxHash(out))
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Compound identity of a swap: `(fromChainID, txID, logIndex)`, formatted as a
/// colon-joined string for use as the store's primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SwapIdentifier {
    pub from_chain_id: u64,
    pub tx_id: TxHash,
    pub log_index: u32,
}

impl SwapIdentifier {
    pub fn new(from_chain_id: u64, tx_id: TxHash, log_index: u32) -> Self {
        Self {
            from_chain_id,
            tx_id,
            log_index,
        }
    }

    /// Colon-joined primary-key string, e.g. `56:0xabc...:2`.
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.from_chain_id, self.tx_id, self.log_index)
    }

    /// Inverse of [`Self::key`], used by the admin API to turn a swap key
    /// back into an identifier.
    pub fn parse_key(key: &str) -> eyre::Result<Self> {
        let mut parts = key.splitn(3, ':');
        let from_chain_id: u64 = parts
            .next()
            .ok_or_else(|| eyre::eyre!("malformed swap key: {}", key))?
            .parse()?;
        let tx_id = TxHash::from_hex(
            parts
                .next()
                .ok_or_else(|| eyre::eyre!("malformed swap key: {}", key))?,
        )?;
        let log_index: u32 = parts
            .next()
            .ok_or_else(|| eyre::eyre!("malformed swap key: {}", key))?
            .parse()?;
        Ok(Self::new(from_chain_id, tx_id, log_index))
    }
}

impl fmt::Display for SwapIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Persisted status enum (§6). Stored as an integer; ordinal order matters for
/// invariant I3 ("no transition ever decreases the ordinal of a terminal status")
/// only in the sense that we never rewrite a terminal row backwards - callers
/// should consult [`Status::is_terminal`] before issuing an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum Status {
    TxNotStable = 0,
    TxVerifyFailed = 1,
    TxNotSwapped = 2,
    TxProcessed = 3,
    MatchTxEmpty = 4,
    MatchTxNotStable = 5,
    MatchTxStable = 6,
    MatchTxFailed = 7,
    TxWithWrongValue = 8,
    TxWithWrongPath = 9,
    TxWithWrongMemo = 10,
    BindAddrIsContract = 11,
    MissTokenConfig = 12,
    TxWithBigValue = 13,
    SwapInBlacklist = 14,
    TxSenderNotRegistered = 15,
    TxWithWrongSender = 16,
    TxIncompatible = 17,
    RPCQueryError = 18,
}

impl Status {
    pub fn from_i32(v: i32) -> Option<Self> {
        use Status::*;
        let s = match v {
            0 => TxNotStable,
            1 => TxVerifyFailed,
            2 => TxNotSwapped,
            3 => TxProcessed,
            4 => MatchTxEmpty,
            5 => MatchTxNotStable,
            6 => MatchTxStable,
            7 => MatchTxFailed,
            8 => TxWithWrongValue,
            9 => TxWithWrongPath,
            10 => TxWithWrongMemo,
            11 => BindAddrIsContract,
            12 => MissTokenConfig,
            13 => TxWithBigValue,
            14 => SwapInBlacklist,
            15 => TxSenderNotRegistered,
            16 => TxWithWrongSender,
            17 => TxIncompatible,
            18 => RPCQueryError,
            _ => return None,
        };
        Some(s)
    }

    /// Terminal statuses are never retried by any worker and are never
    /// rewritten by a subsequent pass.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Status::MatchTxStable
                | Status::MatchTxFailed
                | Status::TxWithWrongValue
                | Status::TxWithWrongPath
                | Status::TxWithWrongMemo
                | Status::BindAddrIsContract
                | Status::MissTokenConfig
                | Status::SwapInBlacklist
                | Status::TxSenderNotRegistered
                | Status::TxWithWrongSender
                | Status::TxIncompatible
        )
    }
}

/// Per-chain configuration, owned by the Config Registry (§3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub block_chain: String,
    pub router_contract: Address,
    pub confirmations: u64,
    pub initial_height: u64,
    pub wait_time_to_replace: u64,
    pub max_replace_count: u32,
    pub swap_deadline_offset: u64,
    pub plus_gas_price_percentage: u64,
    pub max_gas_price_fluct_percent: u64,
    pub default_gas_limit: u64,
}

impl ChainConfig {
    pub const DEFAULT_WAIT_TIME_TO_REPLACE: u64 = 900;
    pub const DEFAULT_MAX_REPLACE_COUNT: u32 = 20;
    pub const DEFAULT_SWAP_DEADLINE_OFFSET: u64 = 36_000;
}

/// Per-token configuration, owned by the Config Registry (§3). Human-unit
/// fields are loaded verbatim from the config contract; the `*_bi` fields are
/// their base-unit (big-integer) equivalents, derived once at load time by
/// scaling by `10^decimals` (fee rate by `10^6`), per Data Model §3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenConfig {
    pub id: String,
    pub decimals: u8,
    pub contract_address: Address,
    pub contract_version: u32,
    pub maximum_swap: f64,
    pub minimum_swap: f64,
    pub big_value_threshold: f64,
    pub swap_fee_rate: f64,
    pub maximum_swap_fee: f64,
    pub minimum_swap_fee: f64,

    pub max_swap: BigInt,
    pub min_swap: BigInt,
    pub max_swap_fee: BigInt,
    pub min_swap_fee: BigInt,
    pub big_val_threshold: BigInt,
    pub swap_fee_rate_scaled: BigInt,
}

impl TokenConfig {
    /// Scale a human-unit float by `10^decimals` into a big integer, per the
    /// Data Model's "derived big-integer forms" rule.
    fn scale(value: f64, decimals: u32) -> BigInt {
        let scaled = value * 10f64.powi(decimals as i32);
        BigInt::from(scaled.round() as i128)
    }

    /// Build a `TokenConfig` from the human-unit fields fetched from the
    /// config contract, computing the derived big-integer forms.
    pub fn from_human_units(
        id: String,
        decimals: u8,
        contract_address: Address,
        contract_version: u32,
        maximum_swap: f64,
        minimum_swap: f64,
        big_value_threshold: f64,
        swap_fee_rate: f64,
        maximum_swap_fee: f64,
        minimum_swap_fee: f64,
    ) -> Self {
        let d = decimals as u32;
        Self {
            max_swap: Self::scale(maximum_swap, d),
            min_swap: Self::scale(minimum_swap, d),
            max_swap_fee: Self::scale(maximum_swap_fee, d),
            min_swap_fee: Self::scale(minimum_swap_fee, d),
            big_val_threshold: Self::scale(big_value_threshold, d),
            swap_fee_rate_scaled: Self::scale(swap_fee_rate, 6),
            id,
            decimals,
            contract_address,
            contract_version,
            maximum_swap,
            minimum_swap,
            big_value_threshold,
            swap_fee_rate,
            maximum_swap_fee,
            minimum_swap_fee,
        }
    }

    /// `CalcSwapValue(token, value)`: P5 — `value` unchanged when the fee rate
    /// is zero; otherwise `value - fee` clamped into `[value - maxFee, value - minFee]`
    /// and floored at zero.
    pub fn calc_swap_value(&self, value: &BigInt) -> BigInt {
        if self.swap_fee_rate_scaled == BigInt::from(0) {
            return value.clone();
        }
        let fee = (value * &self.swap_fee_rate_scaled) / BigInt::from(1_000_000);
        let fee = fee.max(self.min_swap_fee.clone());
        let fee = fee.min(self.max_swap_fee.clone());
        let result = value - fee;
        result.max(BigInt::from(0))
    }

    pub fn value_in_bounds(&self, value: &BigInt) -> bool {
        value >= &self.min_swap && value <= &self.max_swap
    }

    pub fn is_big_value(&self, value: &BigInt) -> bool {
        value > &self.big_val_threshold
    }
}

/// The canonical, decoded representation of a swap-out event, produced by the
/// Verifier (§4.4) and persisted (mapped to `Swap`/`SwapResult` rows) by the
/// pipeline.
#[derive(Debug, Clone)]
pub struct SwapInfo {
    pub identifier: SwapIdentifier,
    pub to_chain_id: u64,
    pub token_id: String,
    pub token: Address,
    pub path: Vec<Address>,
    pub bind: Address,
    pub from: Address,
    pub value: BigInt,
    pub amount_out_min: BigInt,
    pub for_native: bool,
    pub for_underlying: bool,
    pub timestamp: u64,
    pub memo: String,
}

impl SwapInfo {
    pub fn is_trade(&self) -> bool {
        !self.path.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_cfg(decimals: u8, fee_rate: f64, min_fee: f64, max_fee: f64) -> TokenConfig {
        TokenConfig::from_human_units(
            "usdt".to_string(),
            decimals,
            Address::ZERO,
            1,
            1_000_000.0,
            1.0,
            100_000.0,
            fee_rate,
            max_fee,
            min_fee,
        )
    }

    #[test]
    fn address_round_trips_through_hex_and_bytes32() {
        let a = Address::from_hex("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266").unwrap();
        assert_eq!(a.as_bytes32()[12..], a.0);
        let back = Address::from_bytes32(&a.as_bytes32()).unwrap();
        assert_eq!(a, back);
        assert_eq!(a.to_lower_hex(), "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266");
    }

    #[test]
    fn tx_hash_from_hex_rejects_wrong_length() {
        assert!(TxHash::from_hex("0xabcd").is_err());
    }

    #[test]
    fn swap_identifier_key_round_trips() {
        let tx = TxHash::from_hex(&format!("0x{}", "ab".repeat(32))).unwrap();
        let id = SwapIdentifier::new(56, tx, 2);
        let key = id.key();
        assert_eq!(key, format!("56:0x{}:2", "ab".repeat(32)));
        let parsed = SwapIdentifier::parse_key(&key).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn status_ordinal_round_trips_and_terminal_is_correct() {
        for v in 0..=18 {
            let s = Status::from_i32(v).unwrap();
            assert_eq!(s as i32, v);
        }
        assert!(Status::from_i32(19).is_none());
        assert!(Status::MatchTxStable.is_terminal());
        assert!(Status::TxWithWrongPath.is_terminal());
        assert!(!Status::TxNotStable.is_terminal());
        assert!(!Status::MatchTxNotStable.is_terminal());
    }

    #[test]
    fn calc_swap_value_is_identity_when_fee_rate_is_zero() {
        let cfg = token_cfg(18, 0.0, 0.0, 0.0);
        let value = BigInt::from(1_000_000u64);
        assert_eq!(cfg.calc_swap_value(&value), value);
    }

    #[test]
    fn calc_swap_value_clamps_fee_between_min_and_max() {
        // fee_rate 1% scaled by 1e6 -> 10_000; min fee 10, max fee 1000 (human units,
        // decimals=0 here so human units equal base units for this test).
        let cfg = token_cfg(0, 0.01, 10.0, 1000.0);
        // value 500 * 1% = 5, clamped up to min fee 10.
        let small = cfg.calc_swap_value(&BigInt::from(500));
        assert_eq!(small, BigInt::from(490));
        // value 1_000_000 * 1% = 10_000, clamped down to max fee 1000.
        let big = cfg.calc_swap_value(&BigInt::from(1_000_000));
        assert_eq!(big, BigInt::from(999_000));
    }

    #[test]
    fn value_bounds_and_big_value_threshold() {
        let cfg = token_cfg(0, 0.0, 0.0, 0.0);
        assert!(cfg.value_in_bounds(&BigInt::from(1)));
        assert!(!cfg.value_in_bounds(&BigInt::from(0)));
        assert!(cfg.value_in_bounds(&BigInt::from(1_000_000)));
        assert!(!cfg.value_in_bounds(&BigInt::from(1_000_001)));
        assert!(!cfg.is_big_value(&BigInt::from(100_000)));
        assert!(cfg.is_big_value(&BigInt::from(100_001)));
    }

    #[test]
    fn token_config_scales_decimals_into_big_integer_forms() {
        let cfg = TokenConfig::from_human_units(
            "usdc".to_string(),
            6,
            Address::ZERO,
            1,
            10.0,
            1.0,
            5.0,
            0.001, // swap_fee_rate scaled by 1e6, not decimals
            2.0,
            0.5,
        );
        assert_eq!(cfg.max_swap, BigInt::from(10_000_000i64));
        assert_eq!(cfg.min_swap, BigInt::from(1_000_000i64));
        assert_eq!(cfg.big_val_threshold, BigInt::from(5_000_000i64));
        assert_eq!(cfg.swap_fee_rate_scaled, BigInt::from(1_000i64));
    }
}
