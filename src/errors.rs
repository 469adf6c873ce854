//! Typed error taxonomy for the relayer core.
//!
//! Domain code returns [`RelayerError`]; the binary and worker loops wrap these
//! (and ad-hoc I/O failures) in `eyre::Result` for top-level reporting.

use thiserror::Error;

/// Errors raised while verifying a swap-out transaction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("transaction not found")]
    TxNotFound,
    #[error("transaction not yet stable ({confirmations}/{required} confirmations)")]
    TxNotStable { confirmations: u64, required: u64 },
    #[error("transaction receipt status is failure")]
    WrongReceipt,
    #[error("transaction recipient is not the router contract")]
    WrongContract,
    #[error("log was removed (reorg)")]
    RemovedLog,
    #[error("no swap log found at the given index")]
    SwapLogNotFound,
    #[error("log topics do not match a known swap event")]
    WrongTopics,
    #[error("log data could not be decoded")]
    WrongLogData,
    #[error("swap value out of bounds")]
    WrongValue,
    #[error("swap path has no valid pair route on the destination chain")]
    WrongPath,
    #[error("no local token config for the decoded token address")]
    MissTokenConfig,
    #[error("underlying token not configured")]
    NoUnderlyingToken,
    #[error("bind address failed destination address validation")]
    WrongMemo,
    #[error("bind address is a contract")]
    BindAddrIsContract,
    #[error("transaction block height is before the chain's configured initial height")]
    TxBeforeInitialHeight,
    #[error("sender or bind address is blacklisted")]
    SwapInBlacklist,
    #[error("router swap not supported on this chain pair")]
    RouterSwapNotSupport,
    #[error("transport error while verifying: {0}")]
    RpcQueryError(String),
}

impl VerifyError {
    /// Whether this verification outcome is "registerable" per the Register variant
    /// (`RegisterSwap`): the caller has something actionable to record even though
    /// the swap itself did not fully verify.
    pub fn is_registerable(&self) -> bool {
        matches!(
            self,
            VerifyError::WrongValue
                | VerifyError::WrongPath
                | VerifyError::MissTokenConfig
                | VerifyError::NoUnderlyingToken
        )
    }

    /// Whether this outcome is transient and should be retried on the next pass
    /// rather than persisted as a terminal status.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            VerifyError::TxNotFound | VerifyError::TxNotStable { .. }
        )
    }
}

/// Errors raised while building and signing a destination transaction.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("MPC account balance insufficient for value + gas reserve")]
    InsufficientBalance,
    #[error("failed to fetch nonce after retries: {0}")]
    NonceFetchFailed(String),
    #[error("signing failed: {0}")]
    SignFailed(String),
    #[error("timed out waiting for MPC signature")]
    MpcTimeout,
    #[error("transport error: {0}")]
    RpcQueryError(String),
}

/// Errors raised by the durable swap store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("row already exists")]
    AlreadyExists,
    #[error("row not found")]
    NotFound,
    #[error("driver error: {0}")]
    DriverError(#[from] sqlx::Error),
}

/// Errors raised by the on-chain config registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("all gateways failed: {0}")]
    AllGatewaysFailed(String),
    #[error("chain config not found for chain {0}")]
    ChainConfigNotFound(u64),
    #[error("token config not found for chain {0} token {1}")]
    TokenConfigNotFound(u64, String),
    #[error("ABI decode error: {0}")]
    AbiDecode(String),
}

/// Top-level error for anything the swap pipeline core can fail with. Most
/// call sites instead propagate the more specific variants above and only
/// reach for this enum at fan-in points (e.g. the Verify worker's match arm).
#[derive(Debug, Error)]
pub enum RelayerError {
    #[error(transparent)]
    Verify(#[from] VerifyError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("domain policy violation: {0}")]
    Policy(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registerable_errors_match_the_register_variant_allowlist() {
        // §4.4.a: "registerable only if its error is among: nil, WrongValue,
        // WrongPath, MissTokenConfig, NoUnderlyingToken".
        assert!(VerifyError::WrongValue.is_registerable());
        assert!(VerifyError::WrongPath.is_registerable());
        assert!(VerifyError::MissTokenConfig.is_registerable());
        assert!(VerifyError::NoUnderlyingToken.is_registerable());
        assert!(!VerifyError::TxNotFound.is_registerable());
        assert!(!VerifyError::WrongContract.is_registerable());
        assert!(!VerifyError::SwapInBlacklist.is_registerable());
    }

    #[test]
    fn transient_errors_are_only_txnotfound_and_txnotstable() {
        assert!(VerifyError::TxNotFound.is_transient());
        assert!(VerifyError::TxNotStable {
            confirmations: 1,
            required: 3
        }
        .is_transient());
        assert!(!VerifyError::WrongValue.is_transient());
        assert!(!VerifyError::MissTokenConfig.is_transient());
    }
}
