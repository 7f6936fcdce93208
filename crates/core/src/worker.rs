use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    Macos,
    Windows,
    Unknown,
}

impl Default for Platform {
    fn default() -> Self {
        Platform::Unknown
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Leader,
    Standby,
    Worker,
}

impl Default for Role {
    fn default() -> Self {
        Role::Worker
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Online,
    Offline,
    Connecting,
    Error,
}

/// Resource and feature capabilities a worker advertises at registration and
/// refreshes on every heartbeat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    pub docker: bool,
    pub gpu: bool,
    pub leader_eligible: bool,
    pub memory_mb: u64,
    pub cpu_cores: f64,
    pub disk_gb: f64,
}

/// Point-in-time resource usage, attached to each heartbeat.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
    pub container_count: u32,
    pub timestamp: DateTime<Utc>,
}

/// A host registered with the cluster, as held in the store.
///
/// `secret_hash` backs constant-time auth checks; `encrypted_secret` is the
/// reversible copy the leader unseals when it must itself authenticate to
/// the worker (command relay, upgrade). Both fields round-trip through
/// storage like any other field — callers that expose a `Worker` over HTTP
/// must go through [`WorkerView`], which omits them, rather than relying on
/// serde attributes here (this type is also the storage encoding).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: String,
    pub hostname: String,
    pub display_name: Option<String>,
    pub vpn_address: String,
    pub platform: Platform,
    pub role: Role,
    pub status: Status,
    pub capabilities: Capabilities,
    pub labels: BTreeMap<String, String>,
    pub services_running: BTreeSet<String>,
    pub agent_version: String,
    pub registered_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub encrypted_secret: Vec<u8>,
    pub secret_hash: String,
}

/// The subset of [`Worker`] safe to return from the HTTP API: everything
/// except the secret material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerView {
    pub id: String,
    pub hostname: String,
    pub display_name: Option<String>,
    pub vpn_address: String,
    pub platform: Platform,
    pub role: Role,
    pub status: Status,
    pub capabilities: Capabilities,
    pub labels: BTreeMap<String, String>,
    pub services_running: BTreeSet<String>,
    pub agent_version: String,
    pub registered_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl From<&Worker> for WorkerView {
    fn from(w: &Worker) -> Self {
        Self {
            id: w.id.clone(),
            hostname: w.hostname.clone(),
            display_name: w.display_name.clone(),
            vpn_address: w.vpn_address.clone(),
            platform: w.platform,
            role: w.role,
            status: w.status,
            capabilities: w.capabilities.clone(),
            labels: w.labels.clone(),
            services_running: w.services_running.clone(),
            agent_version: w.agent_version.clone(),
            registered_at: w.registered_at,
            last_seen: w.last_seen,
        }
    }
}

impl From<Worker> for WorkerView {
    fn from(w: Worker) -> Self {
        WorkerView::from(&w)
    }
}

/// Filter applied to [`crate::worker::Worker`] listings.
#[derive(Debug, Clone, Default)]
pub struct WorkerFilter {
    pub status: Option<Status>,
    pub role: Option<Role>,
    pub label: Option<(String, String)>,
}

impl WorkerFilter {
    #[must_use]
    pub fn matches(&self, worker: &Worker) -> bool {
        if let Some(status) = self.status {
            if worker.status != status {
                return false;
            }
        }
        if let Some(role) = self.role {
            if worker.role != role {
                return false;
            }
        }
        if let Some((key, value)) = &self.label {
            if worker.labels.get(key) != Some(value) {
                return false;
            }
        }
        true
    }
}

/// The subset of a [`Worker`] an administrative update may mutate.
#[derive(Debug, Clone, Default)]
pub struct WorkerUpdate {
    pub vpn_address: Option<String>,
    pub platform: Option<Platform>,
    pub status: Option<Status>,
    pub capabilities: Option<Capabilities>,
    pub services_running: Option<BTreeSet<String>>,
    pub agent_version: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
    pub labels: Option<BTreeMap<String, String>>,
}

impl WorkerUpdate {
    pub fn apply(self, worker: &mut Worker) {
        if let Some(v) = self.vpn_address {
            worker.vpn_address = v;
        }
        if let Some(v) = self.platform {
            worker.platform = v;
        }
        if let Some(v) = self.status {
            worker.status = v;
        }
        if let Some(v) = self.capabilities {
            worker.capabilities = v;
        }
        if let Some(v) = self.services_running {
            worker.services_running = v;
        }
        if let Some(v) = self.agent_version {
            worker.agent_version = v;
        }
        if let Some(v) = self.last_seen {
            worker.last_seen = v;
        }
        if let Some(v) = self.labels {
            worker.labels = v;
        }
    }
}
