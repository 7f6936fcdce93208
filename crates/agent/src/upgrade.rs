//! Self-upgrade: replace the agent's own container with a new image.
//!
//! Runs detached from the request that triggered it (the caller already got
//! its `202 Accepted`). Inspects the agent's own container to capture its
//! env, port bindings, and bind-mount volumes, tears itself down, then
//! starts a replacement. If the replacement fails to start after teardown,
//! the agent is operationally lost until re-bootstrapped — this is a known,
//! accepted failure mode.

use std::sync::Arc;

use tracing::{error, info};

use crate::docker::DeploySpec;
use crate::server::AgentState;

fn self_container_name() -> String {
    std::env::var("AGENT_CONTAINER_NAME").unwrap_or_else(|_| "fleetd-agent".to_string())
}

pub async fn perform_self_upgrade(state: Arc<AgentState>, image: String) {
    let name = self_container_name();
    info!(container = %name, %image, "starting self-upgrade");

    let docker = &state.runtime;
    let own = match docker.inspect_config(&name).await {
        Ok(c) => c,
        Err(err) => {
            error!(error = %err, "self-upgrade: could not inspect own container, aborting");
            return;
        }
    };

    let spec = DeploySpec {
        container_name: name.clone(),
        image,
        ports: own.ports,
        env: own.env,
        volumes: own.volumes,
        command: None,
        restart_policy: own.restart_policy,
        network: own.network,
    };

    if let Err(err) = docker.remove(&name, true).await {
        error!(error = %err, "self-upgrade: failed to remove previous container, proceeding anyway");
    }

    match docker.deploy(&spec).await {
        Ok(_) => info!(container = %name, "self-upgrade complete"),
        Err(err) => error!(error = %err, "self-upgrade: replacement container failed to start; agent is lost until re-bootstrapped"),
    }
}
