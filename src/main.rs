//! CLI entry point (C10): loads configuration, wires the Config Registry,
//! Chain Bridges, Swap Store, MPC client, and root `Relayer`, then spawns
//! the pipeline workers, scanner tasks, and admin API, following the
//! teacher's `operator/src/main.rs` convention of `color_eyre` + a
//! multi-thread `tokio` runtime built by hand, `tracing-subscriber` init,
//! and a signal task fanning shutdown out over a broadcast channel.

use clap::Parser;
use eyre::{eyre, Result, WrapErr};
use router_relayer::api;
use router_relayer::build::mpc::MpcClient;
use router_relayer::chain::{ChainBridge, RouterBridges};
use router_relayer::config::{Config, Role as ConfigRole};
use router_relayer::metrics::Metrics;
use router_relayer::pipeline::Relayer;
use router_relayer::registry::ConfigRegistry;
use router_relayer::scanner;
use router_relayer::store::SwapStore;
use router_relayer::types::Address;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "router-relayer", about = "Cross-chain router swap relayer")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, default_value = "config.toml")]
    config: String,

    /// `server` runs the full pipeline plus scanner and admin API;
    /// `client` runs nothing beyond the MPC accept-sign loop (not modeled
    /// further here, per §9).
    #[arg(long, default_value = "server")]
    role: CliRole,

    /// Local signing key (hex, no 0x) for the MPC address, used instead of
    /// the MPC gateway when present. Normally sourced from the environment
    /// rather than the command line.
    #[arg(long, env = "RELAYER_LOCAL_SIGNER_KEY")]
    local_signer_key: Option<String>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliRole {
    Server,
    Client,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let role = match cli.role {
        CliRole::Server => ConfigRole::Server,
        CliRole::Client => ConfigRole::Client,
    };

    let config = Config::load(&cli.config, role).wrap_err("failed to load configuration")?;
    info!(identifier = %config.identifier, ?role, "configuration loaded");

    match role {
        ConfigRole::Server => run_server(config, cli.local_signer_key).await,
        ConfigRole::Client => run_client(config).await,
    }
}

async fn run_server(config: Config, local_signer_key: Option<String>) -> Result<()> {
    let db_cfg = config
        .database
        .as_ref()
        .expect("validated present for server role");
    let store = Arc::new(
        SwapStore::connect(&db_cfg.url, db_cfg.max_connections)
            .await
            .wrap_err("failed to connect to database")?,
    );
    store.run_migrations().await.wrap_err("failed to run database migrations")?;
    info!("database connected and migrated");

    let contract = Address::from_hex(&config.onchain.contract)
        .wrap_err("invalid Onchain.Contract address")?;
    let chain_ids: Vec<u64> = config
        .gateways
        .keys()
        .map(|s| s.parse::<u64>().map_err(|_| eyre!("invalid chain id in Gateways: {}", s)))
        .collect::<Result<_>>()?;

    let registry = Arc::new(ConfigRegistry::new(contract, config.onchain.api_address.clone(), chain_ids));
    registry.reload().await.wrap_err("initial config registry reload failed")?;
    info!("config registry loaded");

    let mpc_address =
        Address::from_hex(&config.dcrm.mpc_address).wrap_err("invalid Dcrm.MPCAddress")?;

    let mut bridges: RouterBridges = HashMap::new();
    for (chain_id_str, urls) in &config.gateways {
        let chain_id: u64 = chain_id_str.parse()?;
        let bridge = Arc::new(ChainBridge::new(chain_id, urls.clone(), mpc_address));
        sync_bridge_token_configs(&registry, &bridge).await;
        bridges.insert(chain_id, bridge);
    }

    let mpc = MpcClient::new(
        config.dcrm.api_address.clone(),
        config.dcrm.group_id.clone(),
        config.dcrm.threshold.clone(),
        config.dcrm.mode,
        config.dcrm.sign_timeout_secs,
    );

    let mut local_keys = HashMap::new();
    if let Some(key) = local_signer_key {
        info!(address = %mpc_address, "local signing key configured, bypassing MPC gateway for this address");
        local_keys.insert(mpc_address, key);
    }

    let admins: Vec<Address> = config
        .admins
        .as_ref()
        .expect("validated present for server role")
        .iter()
        .map(|a| Address::from_hex(a))
        .collect::<Result<_>>()
        .wrap_err("invalid address in Admins")?;

    let relayer = Arc::new(Relayer::new(
        registry.clone(),
        bridges,
        store,
        mpc,
        local_keys,
        admins,
        config.relayer.clone(),
    ));

    let metrics = Arc::new(Metrics::new());
    metrics.up.set(1);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    spawn_shutdown_signal_task(shutdown_tx.clone());

    let mut handles = relayer.spawn_server(shutdown_tx.clone());

    for gateway in &config.onchain.api_address {
        let registry = registry.clone();
        let gateway = gateway.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();
        handles.push(tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => {}
                _ = registry.watch_gateway_for_updates(gateway) => {}
            }
        }));
    }

    for (&chain_id, gateways) in &config.gateways {
        let relayer = relayer.clone();
        let gateway = gateways.first().cloned().unwrap_or_default();
        let stable_height = config.relayer.scanner_stable_height;
        let shutdown_rx = shutdown_tx.subscribe();
        handles.push(tokio::spawn(async move {
            scanner::run_tailing(relayer, chain_id, gateway, stable_height, shutdown_rx).await;
        }));
    }

    let api_cfg = config
        .api_server
        .as_ref()
        .expect("validated present for server role")
        .clone();
    let api_relayer = relayer.clone();
    let api_metrics = metrics.clone();
    let api_shutdown = shutdown_tx.subscribe();
    handles.push(tokio::spawn(async move {
        if let Err(e) = api::start_server(&api_cfg.host, api_cfg.port, api_relayer, api_metrics, api_shutdown).await {
            error!(error = %e, "admin API server error");
        }
    }));

    info!(workers = handles.len(), "relayer running");
    for handle in handles {
        if let Err(e) = handle.await {
            error!(error = %e, "a relayer task panicked");
        }
    }

    info!("relayer stopped");
    Ok(())
}

/// Populate `bridge`'s local token-config cache from the registry's current
/// snapshot, keyed by contract address (§4.2).
async fn sync_bridge_token_configs(registry: &Arc<ConfigRegistry>, bridge: &Arc<ChainBridge>) {
    let mut tokens = HashMap::new();
    for token_id in registry.get_all_token_ids().await {
        let Some(addr) = registry.get_peer_token_on_chain(&token_id, bridge.chain_id).await else {
            continue;
        };
        if let Ok(cfg) = registry.get_token_config(bridge.chain_id, &addr).await {
            tokens.insert(addr.to_lower_hex(), cfg);
        }
    }
    bridge.set_token_configs(tokens).await;
}

/// Client role: connects to the MPC group and signs what it is asked to,
/// without running the swap pipeline (§9). The accept-sign loop is driven
/// entirely by the MPC group's own protocol and is out of scope here; this
/// role exists only so `--role client` is a recognized, documented no-op
/// rather than a silent misconfiguration.
async fn run_client(config: Config) -> Result<()> {
    info!(dcrm_group = %config.dcrm.group_id, "running in client role (MPC accept-sign loop not modeled)");
    let mut shutdown_rx = {
        let (tx, rx) = broadcast::channel::<()>(1);
        spawn_shutdown_signal_task(tx);
        rx
    };
    let _ = shutdown_rx.recv().await;
    Ok(())
}

fn spawn_shutdown_signal_task(shutdown_tx: broadcast::Sender<()>) {
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(());
    });
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,router_relayer=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(filter)
        .init();
}

async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, initiating shutdown"),
        _ = terminate => info!("received SIGTERM, initiating shutdown"),
    }
}
