//! Per-bridge nonce allocator (§4.2): the single source of truth for the next
//! nonce to use when building a transaction for a given sender on this chain.

use crate::types::Address;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct NonceAllocator {
    cache: Mutex<HashMap<Address, u64>>,
}

impl NonceAllocator {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn set_nonce(&self, addr: Address, n: u64) {
        self.cache.lock().await.insert(addr, n);
    }

    /// Returns `max(cached, candidate)` and atomically stores that value.
    pub async fn adjust_nonce(&self, addr: Address, candidate: u64) -> u64 {
        let mut guard = self.cache.lock().await;
        let next = guard.get(&addr).copied().unwrap_or(0).max(candidate);
        guard.insert(addr, next);
        next
    }

    pub async fn increase_nonce(&self, addr: Address, k: u64) {
        let mut guard = self.cache.lock().await;
        let entry = guard.entry(addr).or_insert(0);
        *entry += k;
    }

    pub async fn cached(&self, addr: Address) -> Option<u64> {
        self.cache.lock().await.get(&addr).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn adjust_nonce_takes_the_max_and_remembers_it() {
        let allocator = NonceAllocator::new();
        let addr = Address::ZERO;
        assert_eq!(allocator.adjust_nonce(addr, 5).await, 5);
        // A lower candidate than the cached value doesn't regress it.
        assert_eq!(allocator.adjust_nonce(addr, 3).await, 5);
        assert_eq!(allocator.adjust_nonce(addr, 9).await, 9);
        assert_eq!(allocator.cached(addr).await, Some(9));
    }

    #[tokio::test]
    async fn set_nonce_overrides_regardless_of_prior_value() {
        let allocator = NonceAllocator::new();
        let addr = Address::ZERO;
        allocator.adjust_nonce(addr, 100).await;
        allocator.set_nonce(addr, 1).await;
        assert_eq!(allocator.cached(addr).await, Some(1));
    }

    #[tokio::test]
    async fn increase_nonce_adds_to_the_cache() {
        let allocator = NonceAllocator::new();
        let addr = Address::ZERO;
        allocator.set_nonce(addr, 10).await;
        allocator.increase_nonce(addr, 3).await;
        assert_eq!(allocator.cached(addr).await, Some(13));
    }

    #[tokio::test]
    async fn cached_is_none_for_unknown_address() {
        let allocator = NonceAllocator::new();
        assert_eq!(allocator.cached(Address::ZERO).await, None);
    }

    #[tokio::test]
    async fn nonces_for_distinct_addresses_are_independent() {
        let allocator = NonceAllocator::new();
        let a = Address::ZERO;
        let mut b_bytes = [0u8; 20];
        b_bytes[19] = 1;
        let b = Address(b_bytes);
        allocator.adjust_nonce(a, 5).await;
        allocator.adjust_nonce(b, 50).await;
        assert_eq!(allocator.cached(a).await, Some(5));
        assert_eq!(allocator.cached(b).await, Some(50));
    }
}
