//! Thin wrapper over `bollard` implementing the deploy/stop/restart/remove/
//! logs/status operations the control API exposes, grounded on the same
//! `ContainerCreateBody`/`HostConfig`/`query_parameters` shapes used by the
//! retrieval pack's Docker-backed test harness.

use std::collections::HashMap;

use bollard::models::{ContainerCreateBody, HostConfig, PortBinding, RestartPolicy as BollardRestartPolicy, RestartPolicyNameEnum};
use bollard::query_parameters::{
    CreateContainerOptionsBuilder, InspectContainerOptionsBuilder, LogsOptionsBuilder,
    RemoveContainerOptionsBuilder, RestartContainerOptionsBuilder, StartContainerOptions,
    StopContainerOptionsBuilder,
};
use bollard::Docker;
use fleet_core::service::RestartPolicy;
use futures_util::StreamExt;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum DockerError {
    #[error("image not found: {0}")]
    ImageNotFound(String),
    #[error("container not found: {0}")]
    ContainerNotFound(String),
    #[error(transparent)]
    Bollard(#[from] bollard::errors::Error),
}

pub type Result<T> = std::result::Result<T, DockerError>;

#[derive(Debug, Clone)]
pub struct DeploySpec {
    pub container_name: String,
    pub image: String,
    pub ports: HashMap<String, u16>,
    pub env: HashMap<String, String>,
    pub volumes: Vec<String>,
    pub command: Option<Vec<String>>,
    pub restart_policy: RestartPolicy,
    pub network: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ContainerState {
    pub container_id: String,
    pub status: String,
    pub running: bool,
}

/// The subset of a running container's configuration a self-upgrade needs to
/// carry forward into its replacement: env, published ports, bind-mounted
/// volumes, network mode, and restart policy.
#[derive(Debug, Clone, Default)]
pub struct ContainerConfig {
    pub env: HashMap<String, String>,
    pub ports: HashMap<String, u16>,
    pub volumes: Vec<String>,
    pub network: Option<String>,
    pub restart_policy: RestartPolicy,
}

#[derive(Clone)]
pub struct ContainerRuntime {
    docker: Docker,
}

impl ContainerRuntime {
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }

    pub async fn ping(&self) -> bool {
        self.docker.ping().await.is_ok()
    }

    /// Idempotently (re)create and start a container under `spec.container_name`.
    ///
    /// If a container with that name already exists it is stopped and
    /// removed first so the new image and configuration take effect.
    pub async fn deploy(&self, spec: &DeploySpec) -> Result<ContainerState> {
        if self.inspect(&spec.container_name).await.is_ok() {
            self.remove(&spec.container_name, true).await.ok();
        }

        self.pull_image(&spec.image).await?;

        let port_bindings = spec
            .ports
            .iter()
            .map(|(container_port, host_port)| {
                (
                    container_port.clone(),
                    Some(vec![PortBinding {
                        host_ip: None,
                        host_port: Some(host_port.to_string()),
                    }]),
                )
            })
            .collect::<HashMap<_, _>>();

        let restart_policy = match spec.restart_policy {
            RestartPolicy::No => None,
            RestartPolicy::Always => Some(BollardRestartPolicy {
                name: Some(RestartPolicyNameEnum::ALWAYS),
                maximum_retry_count: None,
            }),
            RestartPolicy::UnlessStopped => Some(BollardRestartPolicy {
                name: Some(RestartPolicyNameEnum::UNLESS_STOPPED),
                maximum_retry_count: None,
            }),
            RestartPolicy::OnFailure => Some(BollardRestartPolicy {
                name: Some(RestartPolicyNameEnum::ON_FAILURE),
                maximum_retry_count: Some(5),
            }),
        };

        let host_config = HostConfig {
            port_bindings: Some(port_bindings),
            binds: Some(spec.volumes.clone()),
            network_mode: spec.network.clone(),
            restart_policy,
            ..Default::default()
        };

        let env = spec
            .env
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>();

        let exposed_ports = spec
            .ports
            .keys()
            .map(|p| (p.clone(), HashMap::new()))
            .collect::<HashMap<_, _>>();

        let body = ContainerCreateBody {
            image: Some(spec.image.clone()),
            env: Some(env),
            cmd: spec.command.clone(),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = Some(
            CreateContainerOptionsBuilder::default()
                .name(&spec.container_name)
                .build(),
        );

        let created = self.docker.create_container(options, body).await?;
        self.docker
            .start_container(&created.id, None::<StartContainerOptions>)
            .await?;

        info!(container = %spec.container_name, id = %created.id, "deployed container");
        Ok(ContainerState {
            container_id: created.id,
            status: "running".to_string(),
            running: true,
        })
    }

    pub async fn stop(&self, container_name: &str, timeout_secs: i32) -> Result<()> {
        self.docker
            .stop_container(
                container_name,
                Some(StopContainerOptionsBuilder::default().t(timeout_secs).build()),
            )
            .await?;
        Ok(())
    }

    pub async fn restart(&self, container_name: &str, timeout_secs: i32) -> Result<()> {
        self.docker
            .restart_container(
                container_name,
                Some(
                    RestartContainerOptionsBuilder::default()
                        .t(timeout_secs)
                        .build(),
                ),
            )
            .await?;
        Ok(())
    }

    pub async fn remove(&self, container_name: &str, force: bool) -> Result<()> {
        if self.docker.stop_container(container_name, None).await.is_err() {
            warn!(container = %container_name, "stop before remove failed, continuing");
        }
        self.docker
            .remove_container(
                container_name,
                Some(RemoveContainerOptionsBuilder::default().force(force).build()),
            )
            .await?;
        Ok(())
    }

    pub async fn status(&self, container_name: &str) -> Result<ContainerState> {
        self.inspect(container_name).await
    }

    /// Env, port bindings, volumes, network mode, and restart policy of a
    /// running container, for a self-upgrade to carry forward into its
    /// replacement.
    pub async fn inspect_config(&self, container_name: &str) -> Result<ContainerConfig> {
        let inspected = self
            .docker
            .inspect_container(container_name, Some(InspectContainerOptionsBuilder::default().build()))
            .await
            .map_err(|_| DockerError::ContainerNotFound(container_name.to_string()))?;

        let env = inspected
            .config
            .and_then(|c| c.env)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|kv| kv.split_once('=').map(|(k, v)| (k.to_string(), v.to_string())))
            .collect();

        let host_config = inspected.host_config.unwrap_or_default();

        let ports = host_config
            .port_bindings
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(container_port, bindings)| {
                let host_port = bindings?.into_iter().next()?.host_port?;
                host_port.parse::<u16>().ok().map(|port| (container_port, port))
            })
            .collect();

        let volumes = host_config.binds.unwrap_or_default();
        let network = host_config.network_mode;
        let restart_policy = match host_config.restart_policy.and_then(|p| p.name) {
            Some(RestartPolicyNameEnum::ALWAYS) => RestartPolicy::Always,
            Some(RestartPolicyNameEnum::UNLESS_STOPPED) => RestartPolicy::UnlessStopped,
            Some(RestartPolicyNameEnum::ON_FAILURE) => RestartPolicy::OnFailure,
            _ => RestartPolicy::No,
        };

        Ok(ContainerConfig {
            env,
            ports,
            volumes,
            network,
            restart_policy,
        })
    }

    pub async fn logs(&self, container_name: &str, tail: u32) -> Result<String> {
        let options = Some(
            LogsOptionsBuilder::default()
                .stdout(true)
                .stderr(true)
                .tail(&tail.to_string())
                .build(),
        );
        let mut stream = self.docker.logs(container_name, options);
        let mut out = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(log) => out.push_str(&log.to_string()),
                Err(bollard::errors::Error::DockerContainerWaitError { .. }) => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(out)
    }

    /// All containers currently known to the local Docker daemon, not just
    /// those this agent deployed.
    pub async fn list(&self) -> Result<Vec<ContainerState>> {
        use bollard::query_parameters::ListContainersOptionsBuilder;
        let options = Some(ListContainersOptionsBuilder::default().all(true).build());
        let containers = self.docker.list_containers(options).await?;
        Ok(containers
            .into_iter()
            .map(|c| ContainerState {
                container_id: c.id.unwrap_or_default(),
                status: c.status.unwrap_or_else(|| "unknown".to_string()),
                running: c.state.as_deref() == Some("running"),
            })
            .collect())
    }

    async fn inspect(&self, container_name: &str) -> Result<ContainerState> {
        let inspected = self
            .docker
            .inspect_container(container_name, Some(InspectContainerOptionsBuilder::default().build()))
            .await
            .map_err(|_| DockerError::ContainerNotFound(container_name.to_string()))?;
        let state = inspected.state.unwrap_or_default();
        let running = state.running.unwrap_or(false);
        let status = state
            .status
            .map(|s| format!("{s:?}").to_lowercase())
            .unwrap_or_else(|| "unknown".to_string());
        Ok(ContainerState {
            container_id: inspected.id.unwrap_or_default(),
            status,
            running,
        })
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        use bollard::query_parameters::CreateImageOptionsBuilder;
        let options = Some(CreateImageOptionsBuilder::default().from_image(image).build());
        let mut stream = self.docker.create_image(options, None, None);
        while let Some(progress) = stream.next().await {
            if let Err(e) = progress {
                return Err(DockerError::ImageNotFound(format!("{image}: {e}")));
            }
        }
        Ok(())
    }
}
