//! Verify worker (§4.6.1): scans `NotStable` swaps, calls the Verifier in
//! stable mode, and maps the outcome onto a persisted status plus (for a
//! clean pass) a fresh `swap_result` row.

use super::{now_secs, Relayer};
use crate::errors::VerifyError;
use crate::store::{NewSwapResultRow, SwapRow};
use crate::types::{Address, Status, SwapIdentifier, TxHash};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, warn};

pub async fn run(relayer: Arc<Relayer>, shutdown: &mut broadcast::Receiver<()>) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("verify worker shutting down");
                return;
            }
            _ = tokio::time::sleep(Duration::from_secs(relayer.tuning.rest_interval_secs)) => {
                if let Err(e) = pass(&relayer).await {
                    error!(error = %e, "verify worker pass failed");
                }
            }
        }
    }
}

async fn pass(relayer: &Arc<Relayer>) -> eyre::Result<()> {
    let since_ts = 0; // the store caps result count; a full backlog scan is bounded by FIND_PAGE_LIMIT
    let rows = relayer.store.find_swaps_with_status(Status::TxNotStable, since_ts).await?;

    for row in rows {
        if let Err(e) = process_one(relayer, &row).await {
            warn!(swap_key = %row.swap_key, error = %e, "verify worker could not process swap");
        }
    }
    Ok(())
}

async fn process_one(relayer: &Arc<Relayer>, row: &SwapRow) -> eyre::Result<()> {
    let tx_id = TxHash::from_hex(&row.tx_id)?;
    let identifier = SwapIdentifier::new(row.from_chain_id as u64, tx_id, row.log_index as u32);
    let from_address = Address::from_hex(&row.from_address)?;
    let bind = Address::from_hex(&row.bind)?;

    if relayer.store.is_blacklisted(&from_address.to_lower_hex()).await?
        || relayer.store.is_blacklisted(&bind.to_lower_hex()).await?
    {
        relayer
            .store
            .update_swap_status(&identifier, Status::SwapInBlacklist, now_secs(), "sender or bind blacklisted")
            .await?;
        return Ok(());
    }

    let chain_cfg = match relayer.registry.get_chain_config(identifier.from_chain_id).await {
        Ok(c) => c,
        Err(_) => return Ok(()), // config not loaded yet; retry next pass
    };

    let source = match relayer.bridges.get(&identifier.from_chain_id) {
        Some(b) => b,
        None => return Ok(()),
    };
    if let Some(receipt) = source.get_transaction_receipt(tx_id.0).await? {
        let height = receipt.block_number.unwrap_or(0);
        if height != 0 && height < chain_cfg.initial_height {
            relayer
                .store
                .update_swap_status(&identifier, Status::TxVerifyFailed, now_secs(), "TxBeforeInitialHeight")
                .await?;
            return Ok(());
        }
    }

    let verify_result = relayer
        .verifier
        .verify(&relayer.bridges, identifier.from_chain_id, tx_id, row.log_index as u32, false)
        .await;

    match verify_result {
        Ok(info) => {
            let token_cfg = relayer
                .registry
                .get_token_config(identifier.from_chain_id, &info.token)
                .await;
            let is_big = token_cfg.map(|t| t.is_big_value(&info.value)).unwrap_or(false);

            let (swap_status, result_status) = if is_big {
                (Status::TxWithBigValue, Status::TxWithBigValue)
            } else {
                (Status::TxNotSwapped, Status::MatchTxEmpty)
            };

            relayer
                .store
                .update_swap_status(&identifier, swap_status, now_secs(), "")
                .await?;

            let new_result = NewSwapResultRow {
                swap_key: identifier.key(),
                from_chain_id: identifier.from_chain_id as i64,
                tx_id: identifier.tx_id.to_string(),
                log_index: identifier.log_index as i32,
                status: result_status as i32,
                memo: String::new(),
                timestamp: now_secs(),
            };
            match relayer.store.add_swap_result(&new_result).await {
                Ok(()) | Err(crate::errors::StoreError::AlreadyExists) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Err(VerifyError::TxNotFound)
        | Err(VerifyError::TxNotStable { .. })
        | Err(VerifyError::RpcQueryError(_)) => {
            // transient - leave in NotStable for the next pass.
        }
        Err(e) => {
            let status = status_for_verify_error(&e);
            relayer
                .store
                .update_swap_status(&identifier, status, now_secs(), &e.to_string())
                .await?;
        }
    }

    Ok(())
}

fn status_for_verify_error(e: &VerifyError) -> Status {
    match e {
        VerifyError::WrongValue => Status::TxWithWrongValue,
        VerifyError::WrongPath => Status::TxWithWrongPath,
        VerifyError::MissTokenConfig => Status::MissTokenConfig,
        VerifyError::WrongMemo => Status::TxWithWrongMemo,
        VerifyError::BindAddrIsContract => Status::BindAddrIsContract,
        VerifyError::RpcQueryError(_) => Status::RPCQueryError,
        _ => Status::TxVerifyFailed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_the_outcome_table() {
        // §4.6.1's outcome table.
        assert_eq!(status_for_verify_error(&VerifyError::WrongValue), Status::TxWithWrongValue);
        assert_eq!(status_for_verify_error(&VerifyError::WrongPath), Status::TxWithWrongPath);
        assert_eq!(status_for_verify_error(&VerifyError::MissTokenConfig), Status::MissTokenConfig);
        assert_eq!(status_for_verify_error(&VerifyError::WrongMemo), Status::TxWithWrongMemo);
        assert_eq!(status_for_verify_error(&VerifyError::BindAddrIsContract), Status::BindAddrIsContract);
        assert_eq!(
            status_for_verify_error(&VerifyError::RpcQueryError("timeout".into())),
            Status::RPCQueryError
        );
        assert_eq!(status_for_verify_error(&VerifyError::WrongContract), Status::TxVerifyFailed);
        assert_eq!(status_for_verify_error(&VerifyError::SwapInBlacklist), Status::TxVerifyFailed);
    }
}
