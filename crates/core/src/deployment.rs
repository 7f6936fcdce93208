use crate::service::ServiceDefinition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Deploying,
    Running,
    Stopped,
    Failed,
    Removing,
}

/// A running (or recently-running) instance of a [`ServiceDefinition`] on a
/// specific worker.
///
/// `deployed_config` is a snapshot of the `ServiceDefinition` taken at
/// deploy time (see [`crate::service::ServiceDefinition`] doc comment) —
/// later catalog edits never retroactively change it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub id: String,
    pub service_id: String,
    pub worker_hostname: String,
    pub status: Status,
    pub container_id: Option<String>,
    pub container_name: String,
    pub deployed_config: ServiceDefinition,
    pub created_at: DateTime<Utc>,
    pub deployed_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub last_health_check: Option<DateTime<Utc>>,
    pub healthy: Option<bool>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub exposed_port: Option<u16>,
}

/// Deterministic `"<service_id>-<short-id>"` container name.
///
/// Stable across a stop/restart of the *same* deployment id, but distinct
/// for a replacement deployment against the same (service, worker) slot, so
/// the two never collide on the container runtime.
#[must_use]
pub fn container_name(service_id: &str, deployment_id: &str) -> String {
    let short = deployment_id.chars().take(8).collect::<String>();
    format!("{service_id}-{short}")
}

impl Status {
    /// Whether a transition from `self` to `next` is one of the allowed edges
    /// in the deployment state machine.
    #[must_use]
    pub fn can_transition_to(self, next: Status) -> bool {
        use Status::{Deploying, Failed, Pending, Removing, Running, Stopped};
        matches!(
            (self, next),
            (Pending, Deploying)
                | (Deploying, Running)
                | (Deploying, Failed)
                | (Running, Stopped)
                | (Running, Failed)
                | (Running, Removing)
                | (Stopped, Deploying)
                | (Stopped, Removing)
                | (Failed, Deploying)
                | (Failed, Removing)
        )
    }
}
