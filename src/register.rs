//! `RegisterRouterSwap(chainID, txID, logIndex)`: the one entry point both
//! the Scanner (C7) and the admin JSON-RPC surface (C9) use to turn a
//! discovered log into a persisted `Swap` row, following the teacher's
//! pattern of a single shared registration routine called from both a
//! background task and an external handler (`discovery::run_discovery_task`
//! vs. an on-demand admin call).

use crate::errors::StoreError;
use crate::pipeline::Relayer;
use crate::store::NewSwapRow;
use crate::types::{Status, SwapInfo, TxHash};
use std::collections::HashMap;
use tracing::warn;

/// Per-log outcome, keyed by log index, matching `map[int]string` from the
/// distilled spec: either the resulting swap key or an error description.
pub async fn register_router_swap(
    relayer: &Relayer,
    chain_id: u64,
    tx_id: TxHash,
    log_index: u32,
) -> HashMap<u32, String> {
    let outcomes = relayer
        .verifier
        .register_swap(&relayer.bridges, chain_id, tx_id, log_index, false)
        .await;

    let outcomes = match outcomes {
        Ok(o) => o,
        Err(e) => {
            let mut out = HashMap::new();
            out.insert(log_index, e.to_string());
            return out;
        }
    };

    let mut results = HashMap::new();
    for (idx, outcome) in outcomes {
        let msg = match outcome {
            Ok(info) => persist_swap(relayer, &info).await,
            Err(e) => format!("rejected: {}", e),
        };
        results.insert(idx, msg);
    }
    results
}

async fn persist_swap(relayer: &Relayer, info: &SwapInfo) -> String {
    let new_row = NewSwapRow {
        swap_key: info.identifier.key(),
        from_chain_id: info.identifier.from_chain_id as i64,
        tx_id: info.identifier.tx_id.to_string(),
        log_index: info.identifier.log_index as i32,
        to_chain_id: info.to_chain_id as i64,
        token_id: info.token_id.clone(),
        token: info.token.to_lower_hex(),
        path: info.path.iter().map(|a| a.to_lower_hex()).collect(),
        bind: info.bind.to_lower_hex(),
        from_address: info.from.to_lower_hex(),
        value: info.value.to_string(),
        amount_out_min: info.amount_out_min.to_string(),
        for_native: info.for_native,
        for_underlying: info.for_underlying,
        timestamp: info.timestamp as i64,
        status: Status::TxNotStable as i32,
        memo: info.memo.clone(),
    };

    match relayer.store.add_swap(&new_row).await {
        Ok(()) => info.identifier.key(),
        Err(StoreError::AlreadyExists) => info.identifier.key(),
        Err(e) => {
            warn!(swap_key = %info.identifier.key(), error = %e, "failed to persist registered swap");
            format!("store error: {}", e)
        }
    }
}
