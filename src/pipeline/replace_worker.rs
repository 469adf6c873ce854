//! Replace worker (§4.6.4): re-submits transactions stuck in
//! `MatchTxNotStable` past `waitTimeToReplace`, keeping the same nonce but a
//! higher gas price.

use super::{now_secs, Relayer};
use crate::build::{self, BuildExtra, BuildTxArgs, Signer};
use crate::store::{SwapResultRow, SwapResultUpdate};
use crate::types::{Address, Status, SwapIdentifier, TxHash};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, warn};

pub async fn run(relayer: Arc<Relayer>, shutdown: &mut broadcast::Receiver<()>) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("replace worker shutting down");
                return;
            }
            _ = tokio::time::sleep(Duration::from_secs(relayer.tuning.rest_interval_secs)) => {
                if let Err(e) = pass(&relayer).await {
                    error!(error = %e, "replace worker pass failed");
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
        if let Err(e) = maybe_replace(relayer, &result, false).await {
            warn!(swap_key = %result.swap_key, error = %e, "replace worker could not process result");
        }
    }
    Ok(())
}

/// `replaceswap` admin call (§6): replace a stuck swap immediately,
/// bypassing the `waitTimeToReplace` aging check.
pub async fn force_replace(relayer: &Relayer, identifier: &SwapIdentifier) -> eyre::Result<()> {
    let Some(result) = relayer.store.find_swap_result(identifier).await? else {
        return Err(eyre::eyre!("no swap result for {}", identifier.key()));
    };
    if result.status != Status::MatchTxNotStable as i32 {
        return Err(eyre::eyre!(
            "swap {} is not in MatchTxNotStable, cannot replace",
            identifier.key()
        ));
    }
    maybe_replace(relayer, &result, true).await
}

async fn maybe_replace(relayer: &Relayer, result: &SwapResultRow, force: bool) -> eyre::Result<()> {
    let Some(swap_nonce) = result.swap_nonce else {
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

    let chain_cfg = relayer.registry.get_chain_config(to_chain_id).await?;

    // Aging check: "old enough" rows get replaced, rows still within the
    // wait window are skipped. An admin-forced replace bypasses it.
    if !force && now_secs() - result.timestamp < chain_cfg.wait_time_to_replace as i64 {
        return Ok(());
    }
    if result.old_swap_txs.len() as u32 > chain_cfg.max_replace_count {
        warn!(swap_key = %result.swap_key, "max replace count exceeded, giving up");
        return Ok(());
    }

    let Some(dest_bridge) = relayer.bridges.get(&to_chain_id) else {
        return Ok(());
    };

    // Pre-condition: the pool nonce must not have advanced past this
    // result's nonce, otherwise some hash has already been mined.
    let pool_nonce = dest_bridge.get_pool_nonce_with_retry(&dest_bridge.mpc_address).await?;
    if pool_nonce as i64 > swap_nonce {
        return Ok(());
    }

    let dest_token = relayer
        .registry
        .get_peer_token_on_chain(&swap.token_id, to_chain_id)
        .await
        .ok_or_else(|| eyre::eyre!("no peer token for {} on chain {}", swap.token_id, to_chain_id))?;

    let value: num_bigint::BigInt = swap.value.parse().map_err(|_| eyre::eyre!("malformed stored value"))?;
    let amount_out_min: num_bigint::BigInt = swap.amount_out_min.parse().unwrap_or_else(|_| 0.into());
    let path = swap
        .path
        .iter()
        .map(|s| Address::from_hex(s))
        .collect::<eyre::Result<Vec<_>>>()?;
    let bind = Address::from_hex(&swap.bind)?;

    let previous_gas_price = dest_bridge.cached_gas_price();
    let gas_price = dest_bridge.bumped_gas_price(&chain_cfg, previous_gas_price).await?;

    let args = BuildTxArgs {
        identifier,
        to_chain_id,
        from: dest_bridge.mpc_address,
        token: dest_token,
        origin_value: value,
        amount_out_min,
        path,
        bind,
        for_native: swap.for_native,
        for_underlying: swap.for_underlying,
        extra: BuildExtra {
            nonce: Some(swap_nonce as u64),
            gas_price: Some(gas_price),
        },
    };

    let signer_key = relayer.local_keys.get(&dest_bridge.mpc_address);
    let signer = match signer_key {
        Some(key) => Signer::Local(key),
        None => Signer::Mpc {
            client: &relayer.mpc,
            pubkey: None,
        },
    };

    let built = build::build_and_sign(args, dest_bridge, &chain_cfg, signer).await?;
    let new_hash = TxHash(built.tx_hash);

    let mut old_swap_txs = result.old_swap_txs.clone();
    old_swap_txs.push(new_hash.to_string());

    // Commit point: the new hash is recorded before it's broadcast.
    relayer
        .store
        .update_swap_result(
            &identifier,
            &SwapResultUpdate {
                swap_tx: Some(Some(new_hash.to_string())),
                old_swap_txs: Some(old_swap_txs),
                ..Default::default()
            },
        )
        .await?;
    relayer
        .history
        .record(identifier.from_chain_id, identifier.tx_id, identifier.log_index, new_hash)
        .await;

    match dest_bridge.send_raw_transaction(built.raw).await {
        Ok(_) => tracing::info!(swap_key = %result.swap_key, tx = %new_hash, "replacement transaction broadcast"),
        Err(e) => error!(swap_key = %result.swap_key, tx = %new_hash, error = %e, "replacement broadcast failed"),
    }

    Ok(())
}
