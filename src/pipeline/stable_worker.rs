//! Stable worker (§4.6.3): scans `MatchTxNotStable` results, re-queries the
//! destination chain, and promotes a confirmed result to `MatchTxStable` or
//! marks it `MatchTxFailed`.

use super::{now_secs, Relayer};
use crate::store::SwapResultUpdate;
use crate::types::{Status, SwapIdentifier, TxHash};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, warn};

pub async fn run(relayer: Arc<Relayer>, shutdown: &mut broadcast::Receiver<()>) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("stable worker shutting down");
                return;
            }
            _ = tokio::time::sleep(Duration::from_secs(relayer.tuning.rest_interval_secs)) => {
                if let Err(e) = pass(&relayer).await {
                    error!(error = %e, "stable worker pass failed");
                }
            }
        }
    }
}

async fn pass(relayer: &Arc<Relayer>) -> eyre::Result<()> {
    let results = relayer
        .store
        .find_swap_results_with_status(Status::MatchTxNotStable, 0)
        .await?;

    for result in results {
        if let Err(e) = check_one(relayer, &result).await {
            warn!(swap_key = %result.swap_key, error = %e, "stable worker could not check result");
        }
    }
    Ok(())
}

async fn check_one(relayer: &Arc<Relayer>, result: &crate::store::SwapResultRow) -> eyre::Result<()> {
    let Some(swap_tx) = &result.swap_tx else {
        return Ok(());
    };
    let identifier = SwapIdentifier::new(
        result.from_chain_id as u64,
        TxHash::from_hex(&result.tx_id)?,
        result.log_index as u32,
    );

    let Some(swap) = relayer.store.find_swap(&identifier).await? else {
        return Ok(());
    };
    let to_chain_id = swap.to_chain_id as u64;

    let Some(dest_bridge) = relayer.bridges.get(&to_chain_id) else {
        return Ok(());
    };
    let chain_cfg = relayer.registry.get_chain_config(to_chain_id).await?;

    let dest_hash = TxHash::from_hex(swap_tx)?;
    let Some(receipt) = dest_bridge.get_transaction_receipt(dest_hash.0).await? else {
        // not found yet; Replace worker decides whether it's stuck.
        return Ok(());
    };

    let success = receipt.status();
    let block_height = receipt.block_number.unwrap_or(0);

    if !success {
        relayer
            .store
            .update_swap_result(
                &identifier,
                &SwapResultUpdate {
                    status: Some(Status::MatchTxFailed as i32),
                    ..Default::default()
                },
            )
            .await?;
        relayer
            .store
            .update_swap_status(&identifier, Status::TxProcessed, now_secs(), "MatchTxFailed")
            .await?;
        return Ok(());
    }

    let current_height = dest_bridge.block_number().await?;
    let confirmations = current_height.saturating_sub(block_height);
    if confirmations < chain_cfg.confirmations {
        return Ok(());
    }

    relayer
        .store
        .update_swap_result(
            &identifier,
            &SwapResultUpdate {
                status: Some(Status::MatchTxStable as i32),
                swap_height: Some(Some(block_height as i64)),
                swap_time: Some(Some(now_secs())),
                ..Default::default()
            },
        )
        .await?;
    relayer
        .store
        .update_swap_status(&identifier, Status::TxProcessed, now_secs(), "")
        .await?;

    Ok(())
}
