use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    No,
    Always,
    UnlessStopped,
    OnFailure,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        RestartPolicy::No
    }
}

/// A catalog entry describing how to run a container image.
///
/// Immutable once deployed: [`crate::deployment::Deployment::deployed_config`]
/// embeds a snapshot taken at deploy time, so later edits to the catalog entry
/// never retroactively change a running deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub service_id: String,
    pub name: String,
    pub description: String,
    pub image: String,
    /// container_port (e.g. `"80/tcp"`) -> host_port
    pub ports: BTreeMap<String, u16>,
    pub env: BTreeMap<String, String>,
    pub volumes: Vec<String>,
    pub command: Option<Vec<String>>,
    pub restart_policy: RestartPolicy,
    pub network: Option<String>,
    pub health_path: Option<String>,
    pub health_port: Option<u16>,
    pub tags: Vec<String>,
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
}

#[derive(Debug, Clone, Default)]
pub struct ServiceUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub ports: Option<BTreeMap<String, u16>>,
    pub env: Option<BTreeMap<String, String>>,
    pub volumes: Option<Vec<String>>,
    pub command: Option<Option<Vec<String>>>,
    pub restart_policy: Option<RestartPolicy>,
    pub network: Option<Option<String>>,
    pub health_path: Option<Option<String>>,
    pub health_port: Option<Option<u16>>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<BTreeMap<String, String>>,
}

impl ServiceUpdate {
    pub fn apply(self, svc: &mut ServiceDefinition, now: DateTime<Utc>) {
        if let Some(v) = self.name {
            svc.name = v;
        }
        if let Some(v) = self.description {
            svc.description = v;
        }
        if let Some(v) = self.image {
            svc.image = v;
        }
        if let Some(v) = self.ports {
            svc.ports = v;
        }
        if let Some(v) = self.env {
            svc.env = v;
        }
        if let Some(v) = self.volumes {
            svc.volumes = v;
        }
        if let Some(v) = self.command {
            svc.command = v;
        }
        if let Some(v) = self.restart_policy {
            svc.restart_policy = v;
        }
        if let Some(v) = self.network {
            svc.network = v;
        }
        if let Some(v) = self.health_path {
            svc.health_path = v;
        }
        if let Some(v) = self.health_port {
            svc.health_port = v;
        }
        if let Some(v) = self.tags {
            svc.tags = v;
        }
        if let Some(v) = self.metadata {
            svc.metadata = v;
        }
        svc.updated_at = now;
    }
}
