//! Scanner (C7): walks a block range for a chain's router contract and
//! registers every swap-out log it finds, following the teacher's
//! `watchers::evm` convention of a per-chain polling task built on `alloy`'s
//! provider, fanned out across partitions with `tokio::spawn` +
//! `futures::future::join_all` (§4.7).

use crate::pipeline::Relayer;
use crate::register::register_router_swap;
use crate::types::{Address, TxHash};
use alloy::primitives::{Address as AlloyAddress, B256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::eth::BlockTransactionsKind;
use eyre::{eyre, Result};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

const MAX_ATTEMPTS: u32 = 3;
const DEDUP_RING_CAPACITY: usize = 100;

/// One-shot range scan: partition `[start, end)` into `jobs` roughly-equal
/// ranges and walk each concurrently.
pub async fn scan_range(
    relayer: Arc<Relayer>,
    chain_id: u64,
    gateway: String,
    start: u64,
    end: u64,
    jobs: u32,
) -> Result<()> {
    if end <= start || jobs == 0 {
        return Ok(());
    }
    let span = end - start;
    let chunk = (span / jobs as u64).max(1);

    let mut handles = Vec::new();
    let mut from = start;
    while from < end {
        let to = (from + chunk).min(end);
        let relayer = relayer.clone();
        let gateway = gateway.clone();
        handles.push(tokio::spawn(async move {
            scan_partition(relayer, chain_id, &gateway, from, to).await
        }));
        from = to;
    }

    for handle in futures::future::join_all(handles).await {
        match handle {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(chain_id, error = %e, "scanner partition failed"),
            Err(e) => error!(chain_id, error = %e, "scanner partition task panicked"),
        }
    }
    Ok(())
}

async fn scan_partition(
    relayer: Arc<Relayer>,
    chain_id: u64,
    gateway: &str,
    start: u64,
    end: u64,
) -> Result<()> {
    let provider = ProviderBuilder::new()
        .on_builtin(gateway)
        .await
        .map_err(|e| eyre!("failed to build provider for {}: {}", gateway, e))?;

    let router_contract = relayer
        .registry
        .get_chain_config(chain_id)
        .await
        .map_err(|e| eyre!("no chain config for {}: {}", chain_id, e))?
        .router_contract;

    for height in start..end {
        if let Err(e) = scan_block(&relayer, &provider, chain_id, &router_contract, height).await {
            warn!(chain_id, height, error = %e, "failed to scan block");
        }
    }
    Ok(())
}

async fn scan_block(
    relayer: &Arc<Relayer>,
    provider: &impl Provider,
    chain_id: u64,
    router_contract: &Address,
    height: u64,
) -> Result<()> {
    let Some(block) = provider
        .get_block_by_number(height.into(), BlockTransactionsKind::Full)
        .await?
    else {
        return Ok(());
    };

    let router = AlloyAddress::from_slice(&router_contract.0);
    for tx in block.transactions.txns() {
        if tx.to != Some(router) {
            continue;
        }
        register_with_retry(relayer, chain_id, TxHash(tx.hash.0)).await;
    }
    Ok(())
}

async fn register_with_retry(relayer: &Arc<Relayer>, chain_id: u64, tx_hash: TxHash) {
    for attempt in 0..MAX_ATTEMPTS {
        let outcomes = register_router_swap(relayer, chain_id, tx_hash, 0).await;
        // "rejected: ..." is a terminal verify outcome, not worth retrying;
        // only a bare store error (driver hiccup) is.
        let should_retry = outcomes
            .values()
            .any(|outcome| outcome.starts_with("store error:"));

        for (log_index, outcome) in &outcomes {
            debug!(chain_id, %tx_hash, log_index, outcome, "swap registration outcome");
        }
        if !should_retry || attempt + 1 == MAX_ATTEMPTS {
            return;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

/// Continuously re-scan the last `stable_height` blocks, deduping against a
/// fixed-capacity ring of recently-scanned block hashes (§4.7 "tailing
/// mode").
pub async fn run_tailing(
    relayer: Arc<Relayer>,
    chain_id: u64,
    gateway: String,
    stable_height: u64,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    let seen = Mutex::new(VecDeque::<B256>::with_capacity(DEDUP_RING_CAPACITY));

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!(chain_id, "scanner tailing task shutting down");
                return;
            }
            _ = tokio::time::sleep(Duration::from_secs(relayer.tuning.rest_interval_secs)) => {
                if let Err(e) = tail_once(&relayer, chain_id, &gateway, stable_height, &seen).await {
                    error!(chain_id, error = %e, "scanner tailing pass failed");
                }
            }
        }
    }
}

async fn tail_once(
    relayer: &Arc<Relayer>,
    chain_id: u64,
    gateway: &str,
    stable_height: u64,
    seen: &Mutex<VecDeque<B256>>,
) -> Result<()> {
    let provider = ProviderBuilder::new()
        .on_builtin(gateway)
        .await
        .map_err(|e| eyre!("failed to build provider for {}: {}", gateway, e))?;
    let latest = provider.get_block_number().await?;
    let start = latest.saturating_sub(stable_height);

    let router_contract = relayer
        .registry
        .get_chain_config(chain_id)
        .await
        .map_err(|e| eyre!("no chain config for {}: {}", chain_id, e))?
        .router_contract;

    for height in start..=latest {
        let Some(block) = provider
            .get_block_by_number(height.into(), BlockTransactionsKind::Full)
            .await?
        else {
            continue;
        };

        {
            let mut guard = seen.lock().await;
            if guard.contains(&block.header.hash) {
                continue;
            }
            guard.push_front(block.header.hash);
            while guard.len() > DEDUP_RING_CAPACITY {
                guard.pop_back();
            }
        }

        let router = AlloyAddress::from_slice(&router_contract.0);
        for tx in block.transactions.txns() {
            if tx.to != Some(router) {
                continue;
            }
            register_with_retry(relayer, chain_id, TxHash(tx.hash.0)).await;
        }
    }
    Ok(())
}
