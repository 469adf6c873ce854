//! Chain Bridge (C2): one handle per chain ID, bundling an RPC client,
//! nonce allocator, gas price policy, and the chain's token map.

pub mod nonce;

use crate::errors::BuildError;
use crate::registry::abi;
use crate::types::{Address, ChainConfig, TokenConfig};
use alloy::primitives::{Address as AlloyAddress, Bytes, TxHash as AlloyTxHash, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::eth::{BlockNumberOrTag, TransactionReceipt, TransactionRequest};
use eyre::{eyre, Result};
use nonce::NonceAllocator;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Default reserve, in wei-equivalent base units, kept aside for gas on top
/// of the swap value (§4.2).
pub const DEFAULT_RESERVE_GAS: u128 = 10_000_000_000_000_000; // 1e16

/// The process-wide chain-ID-to-bridge map (§9: "the three process-wide
/// items - `RouterBridges`, `PeerTokens`, and `routerConfig`").
pub type RouterBridges = HashMap<u64, std::sync::Arc<ChainBridge>>;

/// Per-chain handle (§4.2). Every RPC method tries each configured gateway
/// in order, first success wins, mirroring the Config Registry's `eth_call`
/// fallover (§4.1).
pub struct ChainBridge {
    pub chain_id: u64,
    gateways: Vec<String>,
    pub mpc_address: Address,
    token_configs: RwLock<HashMap<String, TokenConfig>>,
    nonce: NonceAllocator,
    /// `latestGasPrice` from the last clamp, in wei. Starts at 0 (unset);
    /// the first call through `suggest_gas_price` seeds it from the chain.
    latest_gas_price: AtomicU64,
}

impl ChainBridge {
    pub fn new(chain_id: u64, gateways: Vec<String>, mpc_address: Address) -> Self {
        Self {
            chain_id,
            gateways,
            mpc_address,
            token_configs: RwLock::new(HashMap::new()),
            nonce: NonceAllocator::new(),
            latest_gas_price: AtomicU64::new(0),
        }
    }

    pub async fn set_token_configs(&self, tokens: HashMap<String, TokenConfig>) {
        *self.token_configs.write().await = tokens;
    }

    /// Token config lookup keyed by lowercased token address (§4.2).
    pub async fn token_config(&self, token: &Address) -> Option<TokenConfig> {
        self.token_configs.read().await.get(&token.to_lower_hex()).cloned()
    }

    pub fn nonce_allocator(&self) -> &NonceAllocator {
        &self.nonce
    }

    async fn provider_for(&self, gateway: &str) -> Result<impl Provider> {
        ProviderBuilder::new()
            .on_builtin(gateway)
            .await
            .map_err(|e| eyre!("failed to build provider for {}: {}", gateway, e))
    }

    /// `GetPoolNonce(addr, block_tag)`, used both for initial nonce fetch
    /// (§4.5) and the Replace worker's precondition check (§4.6.4).
    pub async fn get_pool_nonce(&self, addr: &Address, tag: &str) -> Result<u64> {
        let a = AlloyAddress::from_slice(&addr.0);
        let block_tag = match tag {
            "pending" => BlockNumberOrTag::Pending,
            _ => BlockNumberOrTag::Latest,
        };

        let mut last_err = None;
        for gateway in &self.gateways {
            let provider = match self.provider_for(gateway).await {
                Ok(p) => p,
                Err(e) => {
                    warn!(chain_id = self.chain_id, gateway = %gateway, error = %e, "provider build failed");
                    last_err = Some(e.to_string());
                    continue;
                }
            };
            match provider.get_transaction_count(a).block_id(block_tag.into()).await {
                Ok(n) => return Ok(n),
                Err(e) => {
                    debug!(chain_id = self.chain_id, gateway = %gateway, error = %e, "get_transaction_count failed");
                    last_err = Some(e.to_string());
                }
            }
        }
        Err(eyre!(
            "all gateways failed for chain {} get_pool_nonce: {}",
            self.chain_id,
            last_err.unwrap_or_else(|| "no gateways configured".into())
        ))
    }

    /// `GetPoolNonce(from, "pending")` with up to 3 retries at 1-second
    /// intervals (§4.5).
    pub async fn get_pool_nonce_with_retry(&self, addr: &Address) -> Result<u64, BuildError> {
        let mut last_err = None;
        for attempt in 0..3 {
            match self.get_pool_nonce(addr, "pending").await {
                Ok(n) => return Ok(n),
                Err(e) => {
                    last_err = Some(e.to_string());
                    if attempt < 2 {
                        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                    }
                }
            }
        }
        Err(BuildError::NonceFetchFailed(
            last_err.unwrap_or_else(|| "unknown error".to_string()),
        ))
    }

    /// Suggested gas price from the chain, adjusted per the policy in §4.2:
    /// multiply by `(100 + plusGasPricePercentage)/100`, then clamp so that
    /// `gasPrice >= latestGasPrice * (1 - maxGasPriceFluctPercent/100)`. The
    /// clamped price becomes the new `latestGasPrice`.
    pub async fn suggest_gas_price(&self, chain_cfg: &ChainConfig) -> Result<u128> {
        let mut suggested: Option<u128> = None;
        let mut last_err = None;
        for gateway in &self.gateways {
            let provider = match self.provider_for(gateway).await {
                Ok(p) => p,
                Err(e) => {
                    last_err = Some(e.to_string());
                    continue;
                }
            };
            match provider.get_gas_price().await {
                Ok(p) => {
                    suggested = Some(p);
                    break;
                }
                Err(e) => last_err = Some(e.to_string()),
            }
        }
        let suggested = suggested.ok_or_else(|| {
            eyre!(
                "all gateways failed for chain {} get_gas_price: {}",
                self.chain_id,
                last_err.unwrap_or_else(|| "no gateways configured".into())
            )
        })?;

        let adjusted = suggested
            .saturating_mul(100 + chain_cfg.plus_gas_price_percentage as u128)
            / 100;

        let prev = self.latest_gas_price.load(Ordering::SeqCst) as u128;
        let floor = if prev == 0 {
            0
        } else {
            prev.saturating_mul(100u128.saturating_sub(chain_cfg.max_gas_price_fluct_percent as u128))
                / 100
        };
        let clamped = adjusted.max(floor);

        self.latest_gas_price
            .store(clamped.min(u64::MAX as u128) as u64, Ordering::SeqCst);
        Ok(clamped)
    }

    /// The last gas price this bridge clamped to, consulted by the Replace
    /// worker as the "previous" price to bump past (§4.6.4).
    pub fn cached_gas_price(&self) -> u128 {
        self.latest_gas_price.load(Ordering::SeqCst) as u128
    }

    /// Bumped gas price for a Replace attempt: the gas-price policy applied
    /// again, floored at least 5% above the stuck transaction's price
    /// (§4.6.4: "a higher gas price... by the gas-price policy of 4.2").
    pub async fn bumped_gas_price(&self, chain_cfg: &ChainConfig, previous: u128) -> Result<u128> {
        let candidate = self.suggest_gas_price(chain_cfg).await?;
        Ok(candidate.max(previous + previous / 20))
    }

    /// Balance check before building (§4.2): verifies the MPC account holds
    /// `value + reserveGas` of the relevant token (native or ERC-20).
    pub async fn check_balance(
        &self,
        token: Option<&Address>,
        value: u128,
        reserve: u128,
    ) -> Result<(), BuildError> {
        let required = U256::from(value.saturating_add(reserve));

        let balance = match token {
            None => self
                .native_balance(&self.mpc_address)
                .await
                .map_err(|e| BuildError::RpcQueryError(e.to_string()))?,
            Some(token_addr) => self
                .erc20_balance_of(token_addr, &self.mpc_address)
                .await
                .map_err(|e| BuildError::RpcQueryError(e.to_string()))?,
        };

        if balance < required {
            return Err(BuildError::InsufficientBalance);
        }
        Ok(())
    }

    async fn native_balance(&self, owner: &Address) -> Result<U256> {
        let a = AlloyAddress::from_slice(&owner.0);
        let mut last_err = None;
        for gateway in &self.gateways {
            let provider = match self.provider_for(gateway).await {
                Ok(p) => p,
                Err(e) => {
                    last_err = Some(e.to_string());
                    continue;
                }
            };
            match provider.get_balance(a).await {
                Ok(b) => return Ok(b),
                Err(e) => last_err = Some(e.to_string()),
            }
        }
        Err(eyre!(
            "all gateways failed for chain {} get_balance: {}",
            self.chain_id,
            last_err.unwrap_or_else(|| "no gateways configured".into())
        ))
    }

    async fn call_contract(&self, to: &Address, calldata: Vec<u8>) -> Result<Vec<u8>> {
        let to = AlloyAddress::from_slice(&to.0);
        let mut last_err = None;
        for gateway in &self.gateways {
            let provider = match self.provider_for(gateway).await {
                Ok(p) => p,
                Err(e) => {
                    last_err = Some(e.to_string());
                    continue;
                }
            };
            let tx = TransactionRequest::default()
                .to(to)
                .input(Bytes::from(calldata.clone()).into());
            match provider.call(&tx).await {
                Ok(data) => return Ok(data.to_vec()),
                Err(e) => last_err = Some(e.to_string()),
            }
        }
        Err(eyre!(
            "all gateways failed for chain {} eth_call: {}",
            self.chain_id,
            last_err.unwrap_or_else(|| "no gateways configured".into())
        ))
    }

    async fn erc20_balance_of(&self, token: &Address, owner: &Address) -> Result<U256> {
        let sel = abi::selector("balanceOf(address)");
        let calldata = abi::build_calldata(sel, &[abi::encode_address(owner)]);
        let data = self.call_contract(token, calldata).await?;
        Ok(U256::try_from_be_slice(&data).unwrap_or_default())
    }

    pub async fn send_raw_transaction(&self, raw: Vec<u8>) -> Result<[u8; 32]> {
        let bytes = Bytes::from(raw);
        let mut last_err = None;
        for gateway in &self.gateways {
            let provider = match self.provider_for(gateway).await {
                Ok(p) => p,
                Err(e) => {
                    last_err = Some(e.to_string());
                    continue;
                }
            };
            match provider.send_raw_transaction(&bytes).await {
                Ok(pending) => {
                    let hash: AlloyTxHash = *pending.tx_hash();
                    return Ok(hash.0);
                }
                Err(e) => last_err = Some(e.to_string()),
            }
        }
        Err(eyre!(
            "all gateways failed for chain {} send_raw_transaction: {}",
            self.chain_id,
            last_err.unwrap_or_else(|| "no gateways configured".into())
        ))
    }

    pub async fn get_transaction_receipt(
        &self,
        tx_hash: [u8; 32],
    ) -> Result<Option<TransactionReceipt>> {
        let h = AlloyTxHash::from(tx_hash);
        for gateway in &self.gateways {
            let provider = match self.provider_for(gateway).await {
                Ok(p) => p,
                Err(_) => continue,
            };
            if let Ok(receipt) = provider.get_transaction_receipt(h).await {
                return Ok(receipt);
            }
        }
        Ok(None)
    }

    pub async fn get_transaction_exists(&self, tx_hash: [u8; 32]) -> Result<bool> {
        let h = AlloyTxHash::from(tx_hash);
        for gateway in &self.gateways {
            let provider = match self.provider_for(gateway).await {
                Ok(p) => p,
                Err(_) => continue,
            };
            if let Ok(found) = provider.get_transaction_by_hash(h).await {
                return Ok(found.is_some());
            }
        }
        Ok(false)
    }

    pub async fn block_number(&self) -> Result<u64> {
        let mut last_err = None;
        for gateway in &self.gateways {
            let provider = match self.provider_for(gateway).await {
                Ok(p) => p,
                Err(e) => {
                    last_err = Some(e.to_string());
                    continue;
                }
            };
            match provider.get_block_number().await {
                Ok(n) => return Ok(n),
                Err(e) => last_err = Some(e.to_string()),
            }
        }
        Err(eyre!(
            "all gateways failed for chain {} block_number: {}",
            self.chain_id,
            last_err.unwrap_or_else(|| "no gateways configured".into())
        ))
    }

    /// Whether `addr` carries contract code on this chain, consulted by the
    /// Verifier's bind-address check (§4.4 step 9 / `BindAddrIsContract`).
    pub async fn is_contract(&self, addr: &Address) -> Result<bool> {
        let a = AlloyAddress::from_slice(&addr.0);
        for gateway in &self.gateways {
            let provider = match self.provider_for(gateway).await {
                Ok(p) => p,
                Err(_) => continue,
            };
            if let Ok(code) = provider.get_code_at(a).await {
                return Ok(!code.is_empty());
            }
        }
        Err(eyre!(
            "all gateways failed for chain {} get_code: no gateway answered",
            self.chain_id
        ))
    }

    /// `getPair(tokenA, tokenB)` on the destination chain's factory (§4.4
    /// step 8). Returns `true` if the pair exists (non-zero address).
    pub async fn factory_pair_exists(
        &self,
        factory: &Address,
        token_a: &Address,
        token_b: &Address,
    ) -> Result<bool> {
        let sel = abi::selector("getPair(address,address)");
        let calldata = abi::build_calldata(
            sel,
            &[abi::encode_address(token_a), abi::encode_address(token_b)],
        );
        let data = self.call_contract(factory, calldata).await?;
        let reader = abi::WordReader::new(&data);
        Ok(reader.address_at(0).map(|a| !a.is_zero()).unwrap_or(false))
    }
}
