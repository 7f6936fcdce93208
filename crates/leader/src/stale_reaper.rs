//! Background task that demotes workers whose heartbeat has gone quiet.
//!
//! Structurally mirrors the heartbeat loop on the agent side: a cancellable
//! `tokio` task owned behind an `Arc`, stopped explicitly or on drop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fleet_core::worker::{Status, WorkerUpdate};
use fleet_store::Stores;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct StaleReaper {
    stores: Arc<Stores>,
    interval: Duration,
    stale_threshold: chrono::Duration,
    task_handle: Mutex<Option<JoinHandle<()>>>,
}

impl StaleReaper {
    #[must_use]
    pub fn new(stores: Arc<Stores>, interval: Duration, stale_threshold_secs: i64) -> Arc<Self> {
        Arc::new(Self {
            stores,
            interval,
            stale_threshold: chrono::Duration::seconds(stale_threshold_secs),
            task_handle: Mutex::new(None),
        })
    }

    pub async fn start(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let mut ticker = tokio::time::interval(this.interval);
        let handle = tokio::spawn(async move {
            loop {
                ticker.tick().await;
                if let Err(err) = this.reap_once() {
                    warn!(error = %err, "stale reaper pass failed");
                }
            }
        });
        *self.task_handle.lock().await = Some(handle);
    }

    pub async fn stop(&self) {
        if let Some(handle) = self.task_handle.lock().await.take() {
            handle.abort();
        }
    }

    fn reap_once(&self) -> fleet_core::Result<()> {
        let cutoff = Utc::now() - self.stale_threshold;
        let stale = self.stores.nodes.stale_since(cutoff)?;
        for worker in stale {
            if worker.status == Status::Offline {
                continue;
            }
            self.stores.nodes.update_worker(
                &worker.hostname,
                WorkerUpdate {
                    status: Some(Status::Offline),
                    ..Default::default()
                },
            )?;
            info!(hostname = %worker.hostname, "marked worker offline after missed heartbeats");
        }
        Ok(())
    }
}

impl Drop for StaleReaper {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.task_handle.try_lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}
