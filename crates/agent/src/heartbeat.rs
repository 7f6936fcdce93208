//! Outbound heartbeat loop: reports this worker's status to the leader on a
//! fixed interval. Structurally identical to `HeartbeatService` — a single
//! in-flight task behind `Mutex<Option<JoinHandle<_>>>`, aborted on `Drop`
//! and on an explicit `stop()`.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sysinfo::{Disks, System};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::docker::ContainerRuntime;

#[derive(Debug, Clone, Serialize)]
pub struct HeartbeatMetrics {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
    pub container_count: u32,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeartbeatPayload {
    pub hostname: String,
    pub status: &'static str,
    pub agent_version: String,
    pub services_running: BTreeSet<String>,
    pub metrics: HeartbeatMetrics,
}

fn sample_metrics(container_count: u32) -> HeartbeatMetrics {
    let mut sys = System::new_all();
    sys.refresh_cpu_usage();
    let cpu_percent = f64::from(sys.global_cpu_usage());

    sys.refresh_memory();
    let memory_percent = if sys.total_memory() > 0 {
        (sys.used_memory() as f64 / sys.total_memory() as f64) * 100.0
    } else {
        0.0
    };

    let disks = Disks::new_with_refreshed_list();
    let (total, available) = disks
        .list()
        .iter()
        .fold((0u64, 0u64), |(t, a), d| (t + d.total_space(), a + d.available_space()));
    let disk_percent = if total > 0 {
        ((total - available) as f64 / total as f64) * 100.0
    } else {
        0.0
    };

    HeartbeatMetrics {
        cpu_percent,
        memory_percent,
        disk_percent,
        container_count,
        timestamp: chrono::Utc::now(),
    }
}

pub struct HeartbeatLoop {
    hostname: String,
    agent_version: String,
    leader_url: String,
    worker_secret: String,
    interval: Duration,
    runtime: ContainerRuntime,
    http: reqwest::Client,
    running: Arc<Mutex<bool>>,
    task_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl HeartbeatLoop {
    #[must_use]
    pub fn new(
        hostname: String,
        leader_url: String,
        worker_secret: String,
        interval: Duration,
        runtime: ContainerRuntime,
    ) -> Self {
        Self {
            hostname,
            agent_version: env!("CARGO_PKG_VERSION").to_string(),
            leader_url,
            worker_secret,
            interval,
            runtime,
            http: reqwest::Client::new(),
            running: Arc::new(Mutex::new(false)),
            task_handle: Arc::new(Mutex::new(None)),
        }
    }

    async fn send_once(&self) {
        let containers = self.runtime.list().await.unwrap_or_default();
        let running_count = containers.iter().filter(|c| c.running).count() as u32;
        let services_running = containers
            .into_iter()
            .filter(|c| c.running)
            .map(|c| c.container_id)
            .collect();

        let payload = HeartbeatPayload {
            hostname: self.hostname.clone(),
            status: "online",
            agent_version: self.agent_version.clone(),
            services_running,
            metrics: sample_metrics(running_count),
        };

        let result = self
            .http
            .post(format!("{}/heartbeat", self.leader_url))
            .header("X-Node-Secret", &self.worker_secret)
            .json(&payload)
            .timeout(Duration::from_secs(10))
            .send()
            .await;

        match result {
            Ok(resp) if !resp.status().is_success() => {
                warn!(status = %resp.status(), "leader rejected heartbeat");
            }
            Err(err) => warn!(error = %err, "heartbeat delivery failed, will retry next tick"),
            Ok(_) => {}
        }
    }

    pub async fn start(self: &Arc<Self>) {
        let mut running = self.running.lock().await;
        if *running {
            return;
        }
        *running = true;
        drop(running);

        let service = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                service.send_once().await;
                tokio::time::sleep(service.interval).await;
                if !*service.running.lock().await {
                    break;
                }
            }
        });
        *self.task_handle.lock().await = Some(handle);
    }

    pub async fn stop(&self) {
        *self.running.lock().await = false;
        if let Some(handle) = self.task_handle.lock().await.take() {
            handle.abort();
        }
    }
}

impl Drop for HeartbeatLoop {
    fn drop(&mut self) {
        if let Ok(mut handle) = self.task_handle.try_lock() {
            if let Some(h) = handle.take() {
                h.abort();
            }
        }
    }
}
