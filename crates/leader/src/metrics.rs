//! Prometheus text-exposition `/metrics` endpoint.

use prometheus::{Encoder, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

use fleet_store::Stores;

pub struct Metrics {
    registry: Registry,
    workers_online: IntGauge,
    workers_total: IntGauge,
    deployments_running: IntGauge,
    join_tokens_active: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let workers_online = IntGauge::new("fleet_workers_online", "Workers currently online")?;
        let workers_total = IntGauge::new("fleet_workers_total", "Workers registered")?;
        let deployments_running =
            IntGauge::new("fleet_deployments_running", "Deployments currently running")?;
        let join_tokens_active =
            IntGauge::new("fleet_join_tokens_active", "Join tokens not yet expired or exhausted")?;

        registry.register(Box::new(workers_online.clone()))?;
        registry.register(Box::new(workers_total.clone()))?;
        registry.register(Box::new(deployments_running.clone()))?;
        registry.register(Box::new(join_tokens_active.clone()))?;

        Ok(Self {
            registry,
            workers_online,
            workers_total,
            deployments_running,
            join_tokens_active,
        })
    }

    /// Refreshes gauges from the store, then renders the text exposition
    /// format. Scrapes are infrequent enough that a full store scan per
    /// request is acceptable.
    pub fn render(&self, stores: &Stores) -> anyhow::Result<String> {
        let workers = stores.nodes.list(&fleet_core::worker::WorkerFilter::default())?;
        self.workers_total.set(workers.len() as i64);
        self.workers_online.set(
            workers
                .iter()
                .filter(|w| w.status == fleet_core::worker::Status::Online)
                .count() as i64,
        );

        let deployments = stores.deployments.list()?;
        self.deployments_running.set(
            deployments
                .iter()
                .filter(|d| d.status == fleet_core::deployment::Status::Running)
                .count() as i64,
        );

        self.join_tokens_active
            .set(stores.tokens.active_count(chrono::Utc::now())? as i64);

        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

pub type SharedMetrics = Arc<Metrics>;
