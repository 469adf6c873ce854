//! Swap Pipeline (C6): the four perpetual workers (Verify, Swap, Stable,
//! Replace) plus the per-chain dispatch channels that connect them, all
//! owned by a root [`Relayer`] value (§9: "Global mutable state... become
//! explicit state owned by a root `Relayer` value passed into every
//! worker"), following the teacher's `WriterManager`/`ConfirmationTracker`
//! convention of a struct with a `run`/`spawn` entry point and a
//! `tokio::select!` shutdown race against a sleeping find-loop.

mod history;
pub mod replace_worker;
mod stable_worker;
mod swap_worker;
mod verify_worker;

use crate::build::mpc::MpcClient;
use crate::chain::RouterBridges;
use crate::config::RelayerTuning;
use crate::registry::ConfigRegistry;
use crate::store::SwapStore;
use crate::types::{Address, SwapIdentifier};
use crate::verify::Verifier;
use history::SwapHistory;
use num_bigint::BigInt;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::info;

/// Capacity of the per-destination-chain build+sign+send task channel
/// (§4.6.2: "Enqueue a `BuildTxArgs` onto the per-chain task channel
/// (capacity 10)").
const DISPATCH_CHANNEL_CAPACITY: usize = 10;

/// Everything the Swap worker's producer loop hands to a destination
/// chain's dedicated build+sign+send consumer.
pub struct QueuedSwap {
    pub identifier: SwapIdentifier,
    pub to_chain_id: u64,
    pub from_address: Address,
    /// Token address as recorded on the *source* chain - the key under
    /// which fee/bounds parameters are looked up again at build time.
    pub source_token: Address,
    pub token_id: String,
    pub path: Vec<Address>,
    pub bind: Address,
    pub value: BigInt,
    pub amount_out_min: BigInt,
    pub for_native: bool,
    pub for_underlying: bool,
}

/// The root process-owned struct (§9 "Relayer"): bridges, registry, store,
/// verifier, MPC client, and swap history, held behind `Arc` and cloned
/// cheaply into every spawned task.
pub struct Relayer {
    pub registry: Arc<ConfigRegistry>,
    pub bridges: RouterBridges,
    pub store: Arc<SwapStore>,
    pub verifier: Verifier,
    pub mpc: MpcClient,
    /// Locally held signing keys, keyed by MPC address - present only for
    /// chains where the operator holds key material directly instead of
    /// going through the MPC gateway (§4.5: "if the token's key material is
    /// present locally, sign in-process").
    pub local_keys: HashMap<Address, String>,
    pub admins: Vec<Address>,
    pub tuning: RelayerTuning,
    history: SwapHistory,
    dispatch_tx: HashMap<u64, mpsc::Sender<QueuedSwap>>,
    /// Taken once, synchronously, by [`Relayer::spawn_server`] - a plain
    /// `std::sync::Mutex` rather than `tokio::sync::Mutex` since it is never
    /// held across an `.await`.
    dispatch_rx: StdMutex<HashMap<u64, mpsc::Receiver<QueuedSwap>>>,
}

impl Relayer {
    pub fn new(
        registry: Arc<ConfigRegistry>,
        bridges: RouterBridges,
        store: Arc<SwapStore>,
        mpc: MpcClient,
        local_keys: HashMap<Address, String>,
        admins: Vec<Address>,
        tuning: RelayerTuning,
    ) -> Self {
        let verifier = Verifier::new(registry.clone());

        let mut dispatch_tx = HashMap::new();
        let mut dispatch_rx = HashMap::new();
        for &chain_id in bridges.keys() {
            let (tx, rx) = mpsc::channel(DISPATCH_CHANNEL_CAPACITY);
            dispatch_tx.insert(chain_id, tx);
            dispatch_rx.insert(chain_id, rx);
        }

        Self {
            registry,
            bridges,
            store,
            verifier,
            mpc,
            local_keys,
            admins,
            tuning,
            history: SwapHistory::new(),
            dispatch_tx,
            dispatch_rx: StdMutex::new(dispatch_rx),
        }
    }

    /// Best-effort enqueue onto a destination chain's dispatch channel. A
    /// full channel means that chain's consumer is behind; the Swap worker
    /// simply leaves the swap in `NotSwapped` for the next pass rather than
    /// blocking (§4.6.2's channel is explicitly bounded for this reason).
    fn try_dispatch(&self, item: QueuedSwap) -> Result<(), QueuedSwap> {
        match self.dispatch_tx.get(&item.to_chain_id) {
            Some(tx) => tx.try_send(item).map_err(|e| match e {
                mpsc::error::TrySendError::Full(item) => item,
                mpsc::error::TrySendError::Closed(item) => item,
            }),
            None => Err(item),
        }
    }

    /// Spawn the four perpetual workers plus one build+sign+send consumer
    /// per destination chain, staggered at startup the way the teacher's
    /// managers are spawned side-by-side under one `tokio::select!` (here,
    /// independent tasks since a panic in one worker should not take down
    /// the others).
    pub fn spawn_server(self: &Arc<Self>, shutdown: broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        let consumers = {
            let mut guard = self.dispatch_rx.lock().expect("dispatch_rx mutex poisoned");
            std::mem::take(&mut *guard)
        };
        for (chain_id, rx) in consumers {
            let relayer = self.clone();
            let mut shutdown_rx = shutdown.subscribe();
            handles.push(tokio::spawn(async move {
                swap_worker::run_dispatch_consumer(relayer, chain_id, rx, &mut shutdown_rx).await;
            }));
        }

        let stagger = std::time::Duration::from_millis(250);

        {
            let relayer = self.clone();
            let mut shutdown_rx = shutdown.subscribe();
            handles.push(tokio::spawn(async move {
                verify_worker::run(relayer, &mut shutdown_rx).await;
            }));
        }
        {
            let relayer = self.clone();
            let mut shutdown_rx = shutdown.subscribe();
            handles.push(tokio::spawn(async move {
                tokio::time::sleep(stagger).await;
                swap_worker::run_producer(relayer, &mut shutdown_rx).await;
            }));
        }
        {
            let relayer = self.clone();
            let mut shutdown_rx = shutdown.subscribe();
            handles.push(tokio::spawn(async move {
                tokio::time::sleep(stagger * 2).await;
                stable_worker::run(relayer, &mut shutdown_rx).await;
            }));
        }
        {
            let relayer = self.clone();
            let mut shutdown_rx = shutdown.subscribe();
            handles.push(tokio::spawn(async move {
                tokio::time::sleep(stagger * 3).await;
                replace_worker::run(relayer, &mut shutdown_rx).await;
            }));
        }

        info!(workers = handles.len(), "swap pipeline workers spawned");
        handles
    }
}

/// Wall-clock seconds, used throughout the pipeline as the `timestamp`
/// column and for aging comparisons (`waitTimeToReplace`, `sinceTs`).
pub(crate) fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}
