//! On-chain config registry (C1): chain/token configs fetched from a
//! configuration smart contract over one of several redundant gateway URLs,
//! hot-reloaded on `UpdateConfig()` log events.

pub mod abi;

use crate::errors::RegistryError;
use crate::types::{Address, ChainConfig, TokenConfig};
use abi::{build_calldata, selector, WordReader};
use alloy::primitives::{Address as AlloyAddress, Bytes};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::eth::TransactionRequest;
use alloy::rpc::types::eth::Filter;
use eyre::Result;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// `keccak256("UpdateConfig()")`, the hot-reload trigger topic (§4.1).
fn update_config_topic() -> [u8; 32] {
    abi::topic("UpdateConfig()")
}

/// Immutable point-in-time view of the registry, swapped atomically on
/// reload (§9: "Cyclic references (bridges ↔ registry)").
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    pub chain_configs: HashMap<u64, ChainConfig>,
    pub token_configs: HashMap<(u64, String), TokenConfig>,
    pub peer_tokens: HashMap<(String, u64), Address>,
    pub mpc_pubkeys: HashMap<Address, Vec<u8>>,
}

/// The on-chain config registry (C1). Holds the list of redundant gateway
/// URLs and the config contract address; `reload()` rebuilds the snapshot
/// from scratch (idempotent, per §4.1).
pub struct ConfigRegistry {
    contract: Address,
    gateways: Vec<String>,
    chain_ids: Vec<u64>,
    snapshot: RwLock<Arc<RegistrySnapshot>>,
    highest_update_block: AtomicU64,
}

impl ConfigRegistry {
    pub fn new(contract: Address, gateways: Vec<String>, chain_ids: Vec<u64>) -> Self {
        Self {
            contract,
            gateways,
            chain_ids,
            snapshot: RwLock::new(Arc::new(RegistrySnapshot::default())),
            highest_update_block: AtomicU64::new(0),
        }
    }

    pub async fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.snapshot.read().await.clone()
    }

    pub async fn get_chain_config(&self, chain_id: u64) -> Result<ChainConfig, RegistryError> {
        self.snapshot()
            .await
            .chain_configs
            .get(&chain_id)
            .cloned()
            .ok_or(RegistryError::ChainConfigNotFound(chain_id))
    }

    pub async fn get_token_config(
        &self,
        chain_id: u64,
        token: &Address,
    ) -> Result<TokenConfig, RegistryError> {
        self.snapshot()
            .await
            .token_configs
            .get(&(chain_id, token.to_lower_hex()))
            .cloned()
            .ok_or_else(|| RegistryError::TokenConfigNotFound(chain_id, token.to_lower_hex()))
    }

    pub async fn get_all_chain_ids(&self) -> Vec<u64> {
        self.snapshot().await.chain_configs.keys().copied().collect()
    }

    pub async fn get_all_token_ids(&self) -> Vec<String> {
        let snap = self.snapshot().await;
        let mut ids: Vec<String> = snap
            .peer_tokens
            .keys()
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub async fn get_peer_token_on_chain(
        &self,
        token_id: &str,
        chain_id: u64,
    ) -> Option<Address> {
        self.snapshot()
            .await
            .peer_tokens
            .get(&(token_id.to_string(), chain_id))
            .copied()
    }

    pub async fn get_mpc_pubkey(&self, addr: &Address) -> Option<Vec<u8>> {
        self.snapshot().await.mpc_pubkeys.get(addr).cloned()
    }

    async fn do_reload(&self) -> Result<RegistrySnapshot, RegistryError> {
        let mut chain_configs = HashMap::new();
        let mut token_configs = HashMap::new();
        let mut peer_tokens = HashMap::new();

        for &chain_id in &self.chain_ids {
            let cfg = self.fetch_chain_config(chain_id).await?;
            let token_ids = self.fetch_token_ids_for_chain(chain_id).await?;
            for token_id in token_ids {
                let tok = self.fetch_token_config(chain_id, &token_id).await?;
                // `getPeerTokenOnChain(tokenID, chainID)` resolves to exactly the
                // contract address already carried by this chain's own token
                // config, so the registry derives the peer-token map from the
                // token configs it fetches rather than issuing a second call.
                peer_tokens.insert((token_id.clone(), chain_id), tok.contract_address);
                token_configs.insert((chain_id, tok.contract_address.to_lower_hex()), tok);
            }
            chain_configs.insert(chain_id, cfg);
        }

        Ok(RegistrySnapshot {
            chain_configs,
            token_configs,
            peer_tokens,
            mpc_pubkeys: HashMap::new(),
        })
    }

    /// Full reload, rebuilding the chain/token maps from scratch (§4.1:
    /// "The reload is idempotent"). On startup, failure is fatal (returned to
    /// the caller, which `main` treats as a process-terminating error per
    /// §4.1 "Contract-level failure"); during hot reload the caller instead
    /// logs and retries on the next event.
    pub async fn reload(&self) -> Result<(), RegistryError> {
        let fresh = self.do_reload().await?;
        let mut guard = self.snapshot.write().await;
        *guard = Arc::new(fresh);
        info!(
            chains = guard.chain_configs.len(),
            tokens = guard.token_configs.len(),
            "config registry reloaded"
        );
        Ok(())
    }

    async fn fetch_chain_config(&self, chain_id: u64) -> Result<ChainConfig, RegistryError> {
        let sel = selector("getChainConfig(uint256)");
        let calldata = build_calldata(sel, &[abi::encode_u256(chain_id)]);
        let data = self.eth_call(calldata).await?;
        let r = WordReader::new(&data);
        if r.word_count() < 12 {
            return Err(RegistryError::AbiDecode(format!(
                "getChainConfig returned {} words, expected 12",
                r.word_count()
            )));
        }
        let decode = || -> Result<ChainConfig> {
            Ok(ChainConfig {
                chain_id,
                block_chain: r.short_string_at(0)?,
                router_contract: r.address_at(1)?,
                confirmations: r.u64_at(2)?,
                initial_height: r.u64_at(3)?,
                wait_time_to_replace: r.u64_at(4)?,
                max_replace_count: r.u32_at(5)?,
                swap_deadline_offset: r.u64_at(6)?,
                plus_gas_price_percentage: r.u64_at(7)?,
                max_gas_price_fluct_percent: r.u64_at(8)?,
                default_gas_limit: r.u64_at(9)?,
            })
        };
        decode().map_err(|e| RegistryError::AbiDecode(e.to_string()))
    }

    async fn fetch_token_ids_for_chain(&self, chain_id: u64) -> Result<Vec<String>, RegistryError> {
        let sel = selector("getAllTokenIDs(uint256)");
        let calldata = build_calldata(sel, &[abi::encode_u256(chain_id)]);
        let data = self.eth_call(calldata).await?;
        let r = WordReader::new(&data);
        if r.word_count() == 0 {
            return Ok(Vec::new());
        }
        // Dynamic bytes32[] laid out as a standard dynamic array: offset word
        // then length then elements, each a right-padded short string.
        let len = r.u64_at(1).unwrap_or(0) as usize;
        let mut out = Vec::with_capacity(len);
        for i in 0..len {
            if let Ok(s) = r.short_string_at(2 + i) {
                if !s.is_empty() {
                    out.push(s);
                }
            }
        }
        Ok(out)
    }

    async fn fetch_token_config(
        &self,
        chain_id: u64,
        token_id: &str,
    ) -> Result<TokenConfig, RegistryError> {
        let mut id_word = [0u8; 32];
        let bytes = token_id.as_bytes();
        let n = bytes.len().min(32);
        id_word[..n].copy_from_slice(&bytes[..n]);

        let sel = selector("getTokenConfig(uint256,bytes32)");
        let calldata = build_calldata(sel, &[abi::encode_u256(chain_id), id_word]);
        let data = self.eth_call(calldata).await?;
        let r = WordReader::new(&data);
        if r.word_count() < 10 {
            return Err(RegistryError::AbiDecode(format!(
                "getTokenConfig returned {} words, expected 10",
                r.word_count()
            )));
        }
        let decode = || -> Result<TokenConfig> {
            let decimals = r.u64_at(0)? as u8;
            Ok(TokenConfig::from_human_units(
                token_id.to_string(),
                decimals,
                r.address_at(1)?,
                r.u32_at(2)?,
                r.fixed_point_at(3, 6)?,
                r.fixed_point_at(4, 6)?,
                r.fixed_point_at(5, 6)?,
                r.fixed_point_at(6, 6)?,
                r.fixed_point_at(7, 6)?,
                r.fixed_point_at(8, 6)?,
            ))
        };
        decode().map_err(|e| RegistryError::AbiDecode(e.to_string()))
    }

    /// Issue an `eth_call` against the first gateway that answers
    /// successfully, falling through to the next on error (§4.1).
    async fn eth_call(&self, calldata: Vec<u8>) -> Result<Vec<u8>, RegistryError> {
        let to = AlloyAddress::from_slice(&self.contract.0);
        let mut last_err = None;

        for gateway in &self.gateways {
            let provider = match ProviderBuilder::new().on_builtin(gateway).await {
                Ok(p) => p,
                Err(e) => {
                    warn!(gateway = %gateway, error = %e, "failed to build provider for gateway");
                    last_err = Some(e.to_string());
                    continue;
                }
            };

            let tx = TransactionRequest::default()
                .to(to)
                .input(Bytes::from(calldata.clone()).into());

            match provider.call(&tx).await {
                Ok(result) => return Ok(result.to_vec()),
                Err(e) => {
                    debug!(gateway = %gateway, error = %e, "gateway eth_call failed, trying next");
                    last_err = Some(e.to_string());
                    continue;
                }
            }
        }

        Err(RegistryError::AllGatewaysFailed(
            last_err.unwrap_or_else(|| "no gateways configured".to_string()),
        ))
    }

    /// Called by the hot-reload subscriber on receipt of an `UpdateConfig()`
    /// log (§4.1): sleep a random 0-1000ms jitter, then CAS-advance the
    /// highest observed update block; only trigger a reload if this event is
    /// newer than any previously observed.
    pub async fn on_update_event(&self, observed_block: u64) {
        let jitter_ms = rand::thread_rng().gen_range(0..1000);
        tokio::time::sleep(std::time::Duration::from_millis(jitter_ms)).await;

        let prev = self.highest_update_block.fetch_max(observed_block, Ordering::SeqCst);
        if observed_block <= prev {
            debug!(observed_block, prev, "stale UpdateConfig event, skipping reload");
            return;
        }

        if let Err(e) = self.reload().await {
            error!(error = %e, "hot reload failed, will retry on next event");
        }
    }

    /// Poll one gateway for `UpdateConfig()` logs on the config contract
    /// (§4.1: "subscribe to logs matching the `UpdateConfig()` event topic...
    /// across all gateways"). Gateways that only speak plain HTTP JSON-RPC
    /// cannot hold an `eth_subscribe` stream open, so every gateway is
    /// watched the same way: a short poll loop over `eth_getLogs` windows.
    /// Failure of one gateway's poll does not affect the others - each is
    /// its own independent task.
    pub async fn watch_gateway_for_updates(self: Arc<Self>, gateway: String) {
        let provider = match ProviderBuilder::new().on_builtin(&gateway).await {
            Ok(p) => p,
            Err(e) => {
                warn!(gateway = %gateway, error = %e, "cannot watch gateway for config updates");
                return;
            }
        };

        let mut from_block = provider.get_block_number().await.unwrap_or(0);
        let topic = update_config_topic();

        loop {
            tokio::time::sleep(std::time::Duration::from_secs(15)).await;

            let latest = match provider.get_block_number().await {
                Ok(n) => n,
                Err(e) => {
                    debug!(gateway = %gateway, error = %e, "get_block_number failed while polling for updates");
                    continue;
                }
            };
            if latest < from_block {
                continue;
            }

            let filter = Filter::new()
                .address(AlloyAddress::from_slice(&self.contract.0))
                .event_signature(alloy::primitives::B256::from(topic))
                .from_block(from_block)
                .to_block(latest);

            match provider.get_logs(&filter).await {
                Ok(logs) => {
                    for log in &logs {
                        let block = log.block_number.unwrap_or(latest);
                        self.on_update_event(block).await;
                    }
                    from_block = latest + 1;
                }
                Err(e) => {
                    debug!(gateway = %gateway, error = %e, "get_logs failed while polling for updates");
                }
            }
        }
    }
}
