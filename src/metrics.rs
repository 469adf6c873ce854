//! Prometheus metrics (ambient), exposed on the API server's `/metrics`
//! route, following the teacher's `canceler::server::Metrics` convention of
//! a dedicated `Registry` plus typed counters/gauges constructed once at
//! startup.

use prometheus::{IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};

pub struct Metrics {
    pub swaps_verified_total: IntCounterVec,
    pub swaps_rejected_total: IntCounterVec,
    pub swaps_dispatched_total: IntCounter,
    pub swaps_replaced_total: IntCounter,
    pub swaps_stable_total: IntCounter,
    pub pending_by_status: IntGaugeVec,
    pub dispatch_channel_depth: IntGaugeVec,
    pub latest_gas_price: IntGaugeVec,
    pub up: IntGauge,
    pub registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let swaps_verified_total = IntCounterVec::new(
            Opts::new("relayer_swaps_verified_total", "Swaps that passed verification"),
            &["chain"],
        )
        .expect("constant metric name is valid");

        let swaps_rejected_total = IntCounterVec::new(
            Opts::new("relayer_swaps_rejected_total", "Swaps rejected at verify time"),
            &["reason"],
        )
        .expect("constant metric name is valid");

        let swaps_dispatched_total = IntCounter::new(
            "relayer_swaps_dispatched_total",
            "Destination transactions built and broadcast",
        )
        .expect("constant metric name is valid");

        let swaps_replaced_total = IntCounter::new(
            "relayer_swaps_replaced_total",
            "Stuck transactions replaced with a higher gas price",
        )
        .expect("constant metric name is valid");

        let swaps_stable_total = IntCounter::new(
            "relayer_swaps_stable_total",
            "Swaps confirmed stable on the destination chain",
        )
        .expect("constant metric name is valid");

        let pending_by_status = IntGaugeVec::new(
            Opts::new("relayer_pending_by_status", "Swaps currently in each status"),
            &["status"],
        )
        .expect("constant metric name is valid");

        let dispatch_channel_depth = IntGaugeVec::new(
            Opts::new("relayer_dispatch_channel_depth", "Queued items per destination chain"),
            &["chain"],
        )
        .expect("constant metric name is valid");

        let latest_gas_price = IntGaugeVec::new(
            Opts::new("relayer_latest_gas_price_wei", "Last clamped gas price per chain"),
            &["chain"],
        )
        .expect("constant metric name is valid");

        let up = IntGauge::new("relayer_up", "Whether the relayer process is up")
            .expect("constant metric name is valid");

        registry
            .register(Box::new(swaps_verified_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(swaps_rejected_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(swaps_dispatched_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(swaps_replaced_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(swaps_stable_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(pending_by_status.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(dispatch_channel_depth.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(latest_gas_price.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(up.clone()))
            .expect("metric registration must not be called twice");

        Self {
            swaps_verified_total,
            swaps_rejected_total,
            swaps_dispatched_total,
            swaps_replaced_total,
            swaps_stable_total,
            pending_by_status,
            dispatch_channel_depth,
            latest_gas_price,
            up,
            registry,
        }
    }
}
