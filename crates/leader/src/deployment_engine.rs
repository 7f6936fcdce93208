//! Deployment lifecycle: placing a service onto a worker, and driving it
//! through the `pending -> deploying -> running -> stopped` state machine.

use std::time::Duration;

use chrono::Utc;
use fleet_core::deployment::{self, Deployment, Status};
use fleet_core::worker::Status as WorkerStatus;
use fleet_core::{Error, Result};
use tracing::{error, info};

use crate::cluster_manager::ClusterManager;

#[derive(Clone)]
pub struct DeploymentEngine {
    cluster: ClusterManager,
}

impl DeploymentEngine {
    #[must_use]
    pub fn new(cluster: ClusterManager) -> Self {
        Self { cluster }
    }

    pub async fn deploy(&self, service_id: &str, worker_hostname: &str) -> Result<Deployment> {
        let service = self
            .cluster
            .stores
            .services
            .get(service_id)?
            .ok_or_else(|| Error::NotFound(service_id.to_string()))?;
        let worker = self
            .cluster
            .stores
            .nodes
            .get(worker_hostname)?
            .ok_or_else(|| Error::NotFound(worker_hostname.to_string()))?;
        if worker.status != WorkerStatus::Online {
            return Err(Error::PreconditionFailed(format!(
                "worker {worker_hostname} is not online"
            )));
        }
        if self
            .cluster
            .stores
            .deployments
            .active_for_slot(service_id, worker_hostname)?
            .is_some()
        {
            return Err(Error::Conflict(format!(
                "a deployment is already active for {service_id} on {worker_hostname}"
            )));
        }

        let reused = self
            .cluster
            .stores
            .deployments
            .latest_for_slot(service_id, worker_hostname)?;
        let id = reused
            .as_ref()
            .map(|d| d.id.clone())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let container_name = deployment::container_name(service_id, &id);

        let now = Utc::now();
        let mut record = Deployment {
            id: id.clone(),
            service_id: service_id.to_string(),
            worker_hostname: worker_hostname.to_string(),
            status: Status::Deploying,
            container_id: None,
            container_name: container_name.clone(),
            deployed_config: service.clone(),
            created_at: reused.map(|d| d.created_at).unwrap_or(now),
            deployed_at: None,
            stopped_at: None,
            last_health_check: None,
            healthy: None,
            error: None,
            retry_count: 0,
            exposed_port: service.ports.values().next().copied(),
        };
        self.cluster.stores.deployments.put(&record)?;

        let body = serde_json::json!({
            "container_name": container_name,
            "image": service.image,
            "ports": service.ports,
            "env": service.env,
            "volumes": service.volumes,
            "command": service.command,
            "restart_policy": service.restart_policy,
            "network": service.network,
        });

        match self
            .cluster
            .relay(worker_hostname, "deploy", Some(body), Duration::from_secs(120))
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                let parsed: serde_json::Value = resp.json().await.unwrap_or_default();
                let success = parsed.get("success").and_then(|v| v.as_bool()).unwrap_or(false);
                if success {
                    record.status = Status::Running;
                    record.container_id = parsed
                        .get("container_id")
                        .and_then(|v| v.as_str())
                        .map(str::to_string);
                    record.deployed_at = Some(Utc::now());
                    info!(%id, %worker_hostname, "deployment running");
                } else {
                    record.status = Status::Failed;
                    record.error = parsed
                        .get("error")
                        .and_then(|v| v.as_str())
                        .map(str::to_string);
                    error!(%id, error = ?record.error, "deploy relay reported failure");
                }
            }
            Ok(resp) => {
                record.status = Status::Failed;
                record.error = Some(format!("agent returned status {}", resp.status()));
            }
            Err(err) => {
                record.status = Status::Failed;
                record.error = Some(err.to_string());
            }
        }

        self.cluster.stores.deployments.put(&record)?;
        Ok(record)
    }

    pub async fn stop(&self, deployment_id: &str) -> Result<Deployment> {
        let mut record = self.load(deployment_id)?;
        if !record.status.can_transition_to(Status::Stopped) {
            return Err(Error::PreconditionFailed(format!(
                "cannot stop: deployment is {:?}",
                record.status
            )));
        }

        let body = serde_json::json!({ "name": record.container_name });
        match self
            .cluster
            .relay(&record.worker_hostname, "stop", Some(body), Duration::from_secs(30))
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                record.status = Status::Stopped;
                record.stopped_at = Some(Utc::now());
            }
            Ok(resp) => record.error = Some(format!("agent returned status {}", resp.status())),
            Err(err) => record.error = Some(err.to_string()),
        }

        self.cluster.stores.deployments.put(&record)?;
        Ok(record)
    }

    /// Restarts a running or stopped deployment in place. Unlike `deploy`,
    /// this keeps the existing deployment id and container name; it does not
    /// walk the `Stopped -> Deploying` redeploy path.
    pub async fn restart(&self, deployment_id: &str) -> Result<Deployment> {
        let mut record = self.load(deployment_id)?;
        if !matches!(record.status, Status::Running | Status::Stopped) {
            return Err(Error::PreconditionFailed(format!(
                "cannot restart: deployment is {:?}",
                record.status
            )));
        }

        let body = serde_json::json!({ "name": record.container_name });
        match self
            .cluster
            .relay(&record.worker_hostname, "restart", Some(body), Duration::from_secs(30))
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                record.status = Status::Running;
                record.stopped_at = None;
                record.error = None;
            }
            Ok(resp) => record.error = Some(format!("agent returned status {}", resp.status())),
            Err(err) => record.error = Some(err.to_string()),
        }

        self.cluster.stores.deployments.put(&record)?;
        Ok(record)
    }

    fn load(&self, deployment_id: &str) -> Result<Deployment> {
        self.cluster
            .stores
            .deployments
            .get(deployment_id)?
            .ok_or_else(|| Error::NotFound(deployment_id.to_string()))
    }

    /// Best-effort: issues `remove` to the agent but does not block the
    /// record deletion on its outcome.
    pub async fn remove(&self, deployment_id: &str) -> Result<()> {
        let record = self.load(deployment_id)?;

        if !record.status.can_transition_to(Status::Removing) {
            return Err(Error::PreconditionFailed(format!(
                "cannot remove: deployment is {:?}",
                record.status
            )));
        }

        let body = serde_json::json!({ "name": record.container_name });
        if let Err(err) = self
            .cluster
            .relay(&record.worker_hostname, "remove", Some(body), Duration::from_secs(30))
            .await
        {
            error!(%deployment_id, error = %err, "remove relay failed, deleting record anyway");
        }

        self.cluster.stores.deployments.delete(deployment_id)?;
        Ok(())
    }

    pub async fn logs(&self, deployment_id: &str, tail: u32) -> Result<Option<String>> {
        let record = self.load(deployment_id)?;

        let url_suffix = format!("logs/{}?tail={tail}", record.container_name);
        match self
            .cluster
            .relay_method(
                &record.worker_hostname,
                reqwest::Method::GET,
                &url_suffix,
                None,
                Duration::from_secs(15),
            )
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                let parsed: serde_json::Value = resp.json().await.unwrap_or_default();
                Ok(parsed.get("logs").and_then(|v| v.as_str()).map(str::to_string))
            }
            _ => Ok(None),
        }
    }
}
