//! Swap worker (§4.6.2): the producer scans `NotSwapped` swaps per chain and
//! enqueues build+sign+send work; a dedicated consumer per destination
//! chain drains its channel, builds, signs, commits the result row, and
//! sends.

use super::{now_secs, QueuedSwap, Relayer};
use crate::build::{self, BuildExtra, BuildTxArgs, Signer};
use crate::errors::BuildError;
use crate::store::{SwapResultUpdate, SwapRow};
use crate::types::{Address, Status, SwapIdentifier, TxHash};
use num_bigint::BigInt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

pub async fn run_producer(relayer: Arc<Relayer>, shutdown: &mut broadcast::Receiver<()>) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("swap worker (producer) shutting down");
                return;
            }
            _ = tokio::time::sleep(Duration::from_secs(relayer.tuning.rest_interval_secs)) => {
                for chain_id in relayer.registry.get_all_chain_ids().await {
                    if let Err(e) = producer_pass(&relayer, chain_id).await {
                        error!(chain_id, error = %e, "swap worker producer pass failed");
                    }
                }
            }
        }
    }
}

async fn producer_pass(relayer: &Arc<Relayer>, chain_id: u64) -> eyre::Result<()> {
    let rows = relayer
        .store
        .find_swaps_by_chain_and_status(chain_id, Status::TxNotSwapped, 0)
        .await?;

    for row in rows {
        if let Err(e) = try_enqueue(relayer, &row).await {
            warn!(swap_key = %row.swap_key, error = %e, "could not enqueue swap for build+send");
        }
    }
    Ok(())
}

async fn try_enqueue(relayer: &Arc<Relayer>, row: &SwapRow) -> eyre::Result<()> {
    let tx_id = TxHash::from_hex(&row.tx_id)?;
    let identifier = SwapIdentifier::new(row.from_chain_id as u64, tx_id, row.log_index as u32);
    let from_address = Address::from_hex(&row.from_address)?;
    let bind = Address::from_hex(&row.bind)?;

    let result_row = relayer.store.find_swap_result(&identifier).await?;
    if let Some(result) = &result_row {
        if prevent_reswap(relayer, &identifier, row.to_chain_id as u64, result).await? {
            relayer
                .store
                .update_swap_status(&identifier, Status::TxProcessed, now_secs(), "AlreadySwapped")
                .await?;
            return Ok(());
        }
    }

    if relayer.store.is_blacklisted(&from_address.to_lower_hex()).await?
        || relayer.store.is_blacklisted(&bind.to_lower_hex()).await?
    {
        relayer
            .store
            .update_swap_status(&identifier, Status::SwapInBlacklist, now_secs(), "sender or bind blacklisted")
            .await?;
        return Ok(());
    }

    let value: BigInt = row.value.parse().map_err(|_| eyre::eyre!("malformed stored value"))?;
    let amount_out_min: BigInt = row
        .amount_out_min
        .parse()
        .unwrap_or_else(|_| BigInt::from(0));
    let path = row
        .path
        .iter()
        .map(|s| Address::from_hex(s))
        .collect::<eyre::Result<Vec<_>>>()?;
    let source_token = Address::from_hex(&row.token)?;

    let item = QueuedSwap {
        identifier,
        to_chain_id: row.to_chain_id as u64,
        from_address,
        source_token,
        token_id: row.token_id.clone(),
        path,
        bind,
        value,
        amount_out_min,
        for_native: row.for_native,
        for_underlying: row.for_underlying,
    };

    if relayer.try_dispatch(item).is_err() {
        warn!(swap_key = %row.swap_key, "dispatch channel full or unknown destination chain, retrying next pass");
    }
    Ok(())
}

/// `preventReswap` (§4.6.2): a result row with a still-retrievable
/// destination tx, or a hit in the in-memory history ring, means this swap
/// has already been handled.
async fn prevent_reswap(
    relayer: &Arc<Relayer>,
    identifier: &SwapIdentifier,
    to_chain_id: u64,
    result: &crate::store::SwapResultRow,
) -> eyre::Result<bool> {
    let dest_bridge = match relayer.bridges.get(&to_chain_id) {
        Some(b) => b,
        None => return Ok(false),
    };

    if let Some(existing) = &result.swap_tx {
        if let Ok(hash) = TxHash::from_hex(existing) {
            if dest_bridge.get_transaction_exists(hash.0).await.unwrap_or(false) {
                return Ok(true);
            }
        }
    }

    if let Some(dest_tx) = relayer
        .history
        .lookup(identifier.from_chain_id, identifier.tx_id, identifier.log_index)
        .await
    {
        if dest_bridge.get_transaction_exists(dest_tx.0).await.unwrap_or(false) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Consumer loop for one destination chain's dispatch channel: build, sign,
/// commit the result row, then send (§4.6.2).
pub async fn run_dispatch_consumer(
    relayer: Arc<Relayer>,
    to_chain_id: u64,
    mut rx: mpsc::Receiver<QueuedSwap>,
    shutdown: &mut broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!(to_chain_id, "dispatch consumer shutting down");
                return;
            }
            item = rx.recv() => {
                match item {
                    Some(item) => {
                        if let Err(e) = handle_one(&relayer, item).await {
                            error!(to_chain_id, error = %e, "build+sign+send failed");
                        }
                    }
                    None => return,
                }
            }
        }
    }
}

async fn handle_one(relayer: &Arc<Relayer>, item: QueuedSwap) -> eyre::Result<()> {
    let identifier = item.identifier;

    let dest_bridge = relayer
        .bridges
        .get(&item.to_chain_id)
        .ok_or_else(|| eyre::eyre!("no bridge configured for destination chain {}", item.to_chain_id))?;
    let dest_cfg = relayer.registry.get_chain_config(item.to_chain_id).await?;

    let dest_token = relayer
        .registry
        .get_peer_token_on_chain(&item.token_id, item.to_chain_id)
        .await
        .ok_or_else(|| eyre::eyre!("no peer token for {} on chain {}", item.token_id, item.to_chain_id))?;

    let source_token_cfg = relayer
        .registry
        .get_token_config(identifier.from_chain_id, &item.source_token)
        .await?;
    let swap_value = source_token_cfg.calc_swap_value(&item.value);
    if swap_value <= BigInt::from(0) {
        warn!(swap_key = %identifier.key(), "CalcSwapValue <= 0 at build time, leaving NotSwapped");
        return Ok(());
    }

    let args = BuildTxArgs {
        identifier,
        to_chain_id: item.to_chain_id,
        from: dest_bridge.mpc_address,
        token: dest_token,
        origin_value: item.value.clone(),
        amount_out_min: item.amount_out_min,
        path: item.path,
        bind: item.bind,
        for_native: item.for_native,
        for_underlying: item.for_underlying,
        extra: BuildExtra::default(),
    };

    let signer_key = relayer.local_keys.get(&dest_bridge.mpc_address);
    let signer = match signer_key {
        Some(key) => Signer::Local(key),
        None => Signer::Mpc {
            client: &relayer.mpc,
            pubkey: None,
        },
    };

    let built = match build::build_and_sign(args, dest_bridge, &dest_cfg, signer).await {
        Ok(b) => b,
        Err(BuildError::InsufficientBalance) => {
            relayer
                .store
                .update_swap_status(&identifier, Status::TxVerifyFailed, now_secs(), "InsufficientBalance")
                .await?;
            return Ok(());
        }
        Err(e) => {
            warn!(swap_key = %identifier.key(), error = %e, "build/sign failed, leaving NotSwapped for retry");
            return Ok(());
        }
    };

    let dest_hash = TxHash(built.tx_hash);

    // Commit point: the result row is written before the transaction is
    // broadcast (§4.6.2).
    relayer
        .store
        .update_swap_result(
            &identifier,
            &SwapResultUpdate {
                swap_tx: Some(Some(dest_hash.to_string())),
                old_swap_txs: Some(vec![dest_hash.to_string()]),
                swap_value: Some(Some(swap_value.to_string())),
                swap_nonce: Some(Some(built.nonce as i64)),
                status: Some(Status::MatchTxNotStable as i32),
                memo: Some(String::new()),
                ..Default::default()
            },
        )
        .await?;
    relayer
        .store
        .update_swap_status(&identifier, Status::TxProcessed, now_secs(), "")
        .await?;
    relayer
        .history
        .record(identifier.from_chain_id, identifier.tx_id, identifier.log_index, dest_hash)
        .await;

    match dest_bridge.send_raw_transaction(built.raw).await {
        Ok(_) => info!(swap_key = %identifier.key(), tx = %dest_hash, "destination transaction broadcast"),
        Err(e) => error!(swap_key = %identifier.key(), tx = %dest_hash, error = %e, "broadcast failed, Replace worker will retry"),
    }

    Ok(())
}
