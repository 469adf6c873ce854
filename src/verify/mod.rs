//! Verifier (C4): turns a `(txHash, logIndex)` on a source chain into a
//! validated [`SwapInfo`] or a typed [`VerifyError`]. Pure with respect to
//! the store - it never writes.

use crate::chain::RouterBridges;
use crate::errors::VerifyError;
use crate::registry::{abi, ConfigRegistry};
use crate::types::{Address, SwapIdentifier, SwapInfo, TxHash};
use std::sync::Arc;

/// `topic0` of each known router event, computed the same way function
/// selectors are (§6: "ABI log topics").
fn topic_swap_out() -> [u8; 32] {
    abi::topic("LogAnySwapOut(address,address,address,uint256,uint256,uint256)")
}
fn topic_trade_for_tokens() -> [u8; 32] {
    abi::topic("LogAnySwapTradeTokensForTokens(address[],address,address,uint256,uint256,uint256,uint256)")
}
fn topic_trade_for_native() -> [u8; 32] {
    abi::topic("LogAnySwapTradeTokensForNative(address[],address,address,uint256,uint256,uint256,uint256)")
}

enum LogKind {
    SwapOut,
    Trade,
}

fn classify_topic(topic0: &[u8]) -> Option<LogKind> {
    if topic0 == topic_swap_out() {
        Some(LogKind::SwapOut)
    } else if topic0 == topic_trade_for_tokens() || topic0 == topic_trade_for_native() {
        Some(LogKind::Trade)
    } else {
        None
    }
}

pub struct Verifier {
    registry: Arc<ConfigRegistry>,
}

impl Verifier {
    pub fn new(registry: Arc<ConfigRegistry>) -> Self {
        Self { registry }
    }

    /// `Verify(txHash, logIndex, allowUnstable)` (§4.4).
    pub async fn verify(
        &self,
        bridges: &RouterBridges,
        from_chain_id: u64,
        tx_id: TxHash,
        log_index: u32,
        allow_unstable: bool,
    ) -> Result<SwapInfo, VerifyError> {
        let source = bridges
            .get(&from_chain_id)
            .ok_or(VerifyError::RouterSwapNotSupport)?;
        let chain_cfg = self
            .registry
            .get_chain_config(from_chain_id)
            .await
            .map_err(|_| VerifyError::RouterSwapNotSupport)?;

        // 1. Receipt lookup.
        let receipt = source
            .get_transaction_receipt(tx_id.0)
            .await
            .map_err(|e| VerifyError::RpcQueryError(e.to_string()))?
            .ok_or(VerifyError::TxNotFound)?;
        let block_number = receipt.block_number.unwrap_or(0);
        if block_number == 0 {
            return Err(VerifyError::TxNotFound);
        }

        // 2. Stability.
        if !allow_unstable {
            let current = source
                .block_number()
                .await
                .map_err(|e| VerifyError::RpcQueryError(e.to_string()))?;
            let confirmations = current.saturating_sub(block_number) + 1;
            if confirmations < chain_cfg.confirmations {
                return Err(VerifyError::TxNotStable {
                    confirmations,
                    required: chain_cfg.confirmations,
                });
            }
        }

        // 3. Receipt status and recipient.
        if !receipt.status() {
            return Err(VerifyError::WrongReceipt);
        }
        let recipient = receipt
            .to
            .map(|a| Address(a.into_array()))
            .unwrap_or(Address::ZERO);
        if recipient.to_lower_hex() != chain_cfg.router_contract.to_lower_hex() {
            return Err(VerifyError::WrongContract);
        }

        // 4. Log fetch.
        let log = receipt
            .logs()
            .get(log_index as usize)
            .ok_or(VerifyError::SwapLogNotFound)?;
        if log.removed {
            return Err(VerifyError::RemovedLog);
        }
        let topics = log.topics();
        let topic0 = topics.first().ok_or(VerifyError::WrongTopics)?;
        let kind = classify_topic(topic0.as_slice()).ok_or(VerifyError::SwapLogNotFound)?;
        let data = log.data().data.as_ref();

        // 5. Decode per kind.
        let (token, from_addr, bind, value, amount_out_min, to_chain_id, for_native, for_underlying, mut path) =
            match kind {
                LogKind::SwapOut => {
                    if topics.len() < 4 || data.len() < 128 {
                        return Err(VerifyError::WrongLogData);
                    }
                    let token = Address::from_bytes32(topics[1].as_slice())
                        .map_err(|_| VerifyError::WrongLogData)?;
                    let from_addr = Address::from_bytes32(topics[2].as_slice())
                        .map_err(|_| VerifyError::WrongLogData)?;
                    let bind = Address::from_bytes32(topics[3].as_slice())
                        .map_err(|_| VerifyError::WrongLogData)?;
                    let r = abi::WordReader::new(data);
                    let value = r.bigint_at(0).map_err(|_| VerifyError::WrongLogData)?;
                    let to_chain_id = r.u64_at(2).map_err(|_| VerifyError::WrongLogData)?;
                    let for_underlying = r.bool_at(3).map_err(|_| VerifyError::WrongLogData)?;
                    (
                        token,
                        from_addr,
                        bind,
                        value,
                        num_bigint::BigInt::from(0),
                        to_chain_id,
                        false,
                        for_underlying,
                        Vec::new(),
                    )
                }
                LogKind::Trade => {
                    if topics.len() < 3 || data.len() < 192 {
                        return Err(VerifyError::WrongLogData);
                    }
                    let from_addr = Address::from_bytes32(topics[1].as_slice())
                        .map_err(|_| VerifyError::WrongLogData)?;
                    let bind = Address::from_bytes32(topics[2].as_slice())
                        .map_err(|_| VerifyError::WrongLogData)?;
                    let r = abi::WordReader::new(data);
                    let path = r.address_array_at(0).map_err(|_| VerifyError::WrongLogData)?;
                    if path.is_empty() {
                        return Err(VerifyError::WrongPath);
                    }
                    let token = path[0];
                    // Data layout (192 bytes, 6 words): path-offset, value,
                    // amountOutMin, fromChainID, toChainID, forUnderlying.
                    let value = r.bigint_at(1).map_err(|_| VerifyError::WrongLogData)?;
                    let amount_out_min = r.bigint_at(2).map_err(|_| VerifyError::WrongLogData)?;
                    let to_chain_id = r.u64_at(4).map_err(|_| VerifyError::WrongLogData)?;
                    let for_native = topic0.as_slice() == topic_trade_for_native();
                    (token, from_addr, bind, value, amount_out_min, to_chain_id, for_native, false, path)
                }
            };

        // 6. Local token config lookup.
        let token_cfg = self
            .registry
            .get_token_config(from_chain_id, &token)
            .await
            .map_err(|_| VerifyError::MissTokenConfig)?;

        // 7. Bounds check.
        if !token_cfg.value_in_bounds(&value) {
            return Err(VerifyError::WrongValue);
        }
        let swap_value = token_cfg.calc_swap_value(&value);
        if swap_value <= num_bigint::BigInt::from(0) {
            return Err(VerifyError::WrongValue);
        }

        // 8. Path amendment and destination factory check.
        if !path.is_empty() {
            if let Some(peer) = self
                .registry
                .get_peer_token_on_chain(&token_cfg.id, from_chain_id)
                .await
            {
                if path[0] == peer {
                    path[0] = token;
                }
            }
            if path.len() < 2 {
                return Err(VerifyError::WrongPath);
            }
            let dest = bridges.get(&to_chain_id).ok_or(VerifyError::WrongPath)?;
            let dest_cfg = self
                .registry
                .get_chain_config(to_chain_id)
                .await
                .map_err(|_| VerifyError::WrongPath)?;
            for pair in path.windows(2) {
                let exists = dest
                    .factory_pair_exists(&dest_cfg.router_contract, &pair[0], &pair[1])
                    .await
                    .map_err(|e| VerifyError::RpcQueryError(e.to_string()))?;
                if !exists {
                    return Err(VerifyError::WrongPath);
                }
            }
        }

        // 9. Bind address validation: must look like a destination address,
        // and must not itself be a contract (the router cannot mint to one).
        if bind.is_zero() {
            return Err(VerifyError::WrongMemo);
        }
        if let Some(dest) = bridges.get(&to_chain_id) {
            if dest
                .is_contract(&bind)
                .await
                .map_err(|e| VerifyError::RpcQueryError(e.to_string()))?
            {
                return Err(VerifyError::BindAddrIsContract);
            }
        }

        let identifier = SwapIdentifier::new(from_chain_id, tx_id, log_index);
        Ok(SwapInfo {
            identifier,
            to_chain_id,
            token_id: token_cfg.id.clone(),
            token,
            path,
            bind,
            from: from_addr,
            value,
            amount_out_min,
            for_native,
            for_underlying,
            timestamp: chrono::Utc::now().timestamp() as u64,
            memo: String::new(),
        })
    }

    /// `RegisterSwap(txHash, logIndex)` (§4.4.a): walk all logs (`logIndex ==
    /// 0`) or the one specified, returning only the registerable outcomes.
    pub async fn register_swap(
        &self,
        bridges: &RouterBridges,
        from_chain_id: u64,
        tx_id: TxHash,
        log_index: u32,
        allow_unstable: bool,
    ) -> Result<Vec<(u32, Result<SwapInfo, VerifyError>)>, VerifyError> {
        let mut out = Vec::new();
        if log_index != 0 {
            let result = self
                .verify(bridges, from_chain_id, tx_id, log_index, allow_unstable)
                .await;
            if is_registerable_result(&result) {
                out.push((log_index, result));
            }
            return Ok(out);
        }

        let source = bridges
            .get(&from_chain_id)
            .ok_or(VerifyError::RouterSwapNotSupport)?;
        let receipt = source
            .get_transaction_receipt(tx_id.0)
            .await
            .map_err(|e| VerifyError::RpcQueryError(e.to_string()))?
            .ok_or(VerifyError::TxNotFound)?;
        let log_count = receipt.logs().len() as u32;

        for idx in 0..log_count {
            let result = self
                .verify(bridges, from_chain_id, tx_id, idx, allow_unstable)
                .await;
            if is_registerable_result(&result) {
                out.push((idx, result));
            }
        }
        Ok(out)
    }
}

fn is_registerable_result(result: &Result<SwapInfo, VerifyError>) -> bool {
    match result {
        Ok(_) => true,
        Err(e) => e.is_registerable(),
    }
}
