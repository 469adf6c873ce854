//! In-memory swap-history ring (§4.6.2, §9 "Swap history ring"): a bounded,
//! newest-first structure for the Swap worker's `preventReswap` fast path.
//! Empty after restart - correctness always falls back to the store's
//! `swapTx` field and the destination RPC, this is purely an optimization.

use crate::types::TxHash;
use std::collections::VecDeque;
use tokio::sync::RwLock;

const CAPACITY: usize = 1000;

#[derive(Clone)]
struct Entry {
    from_chain_id: u64,
    tx_id: TxHash,
    log_index: u32,
    dest_tx: TxHash,
}

pub struct SwapHistory {
    ring: RwLock<VecDeque<Entry>>,
}

impl SwapHistory {
    pub fn new() -> Self {
        Self {
            ring: RwLock::new(VecDeque::with_capacity(CAPACITY)),
        }
    }

    /// Record a just-submitted destination tx for `(fromChainID, txID, logIndex)`.
    pub async fn record(&self, from_chain_id: u64, tx_id: TxHash, log_index: u32, dest_tx: TxHash) {
        let mut ring = self.ring.write().await;
        ring.push_front(Entry {
            from_chain_id,
            tx_id,
            log_index,
            dest_tx,
        });
        while ring.len() > CAPACITY {
            ring.pop_back();
        }
    }

    /// Newest-first lookup of a prior attempt for this swap identity.
    pub async fn lookup(&self, from_chain_id: u64, tx_id: TxHash, log_index: u32) -> Option<TxHash> {
        let ring = self.ring.read().await;
        ring.iter()
            .find(|e| e.from_chain_id == from_chain_id && e.tx_id == tx_id && e.log_index == log_index)
            .map(|e| e.dest_tx)
    }
}

impl Default for SwapHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(byte: u8) -> TxHash {
        TxHash([byte; 32])
    }

    #[tokio::test]
    async fn lookup_misses_on_an_empty_ring() {
        let history = SwapHistory::new();
        assert_eq!(history.lookup(56, tx(1), 0).await, None);
    }

    #[tokio::test]
    async fn record_then_lookup_finds_the_exact_identity() {
        let history = SwapHistory::new();
        history.record(56, tx(1), 2, tx(0xaa)).await;
        assert_eq!(history.lookup(56, tx(1), 2).await, Some(tx(0xaa)));
        // Different log index on the same tx is a distinct identity.
        assert_eq!(history.lookup(56, tx(1), 3).await, None);
    }

    #[tokio::test]
    async fn lookup_returns_the_newest_entry_for_a_repeated_identity() {
        let history = SwapHistory::new();
        history.record(56, tx(1), 0, tx(0xaa)).await;
        history.record(56, tx(1), 0, tx(0xbb)).await;
        assert_eq!(history.lookup(56, tx(1), 0).await, Some(tx(0xbb)));
    }

    #[tokio::test]
    async fn ring_evicts_oldest_entries_past_capacity() {
        let history = SwapHistory::new();
        for i in 0..(CAPACITY + 10) {
            history.record(56, tx((i % 256) as u8), i as u32, tx(0xff)).await;
        }
        // The very first entry recorded should have been evicted.
        assert_eq!(history.lookup(56, tx(0), 0).await, None);
        // The most recent entry is still present.
        let last = CAPACITY + 9;
        assert_eq!(
            history.lookup(56, tx((last % 256) as u8), last as u32).await,
            Some(tx(0xff))
        );
    }
}
