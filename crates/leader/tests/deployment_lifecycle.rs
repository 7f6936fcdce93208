//! Deployment placement, slot-uniqueness, and the stop/restart/remove
//! lifecycle, relayed against a loopback mock agent.

mod common;

use chrono::Utc;
use common::{spawn_leader, spawn_mock_agent, OPERATOR_TOKEN};
use fleet_core::service::{RestartPolicy, ServiceDefinition};
use std::collections::BTreeMap;

fn sample_service(service_id: &str) -> serde_json::Value {
    serde_json::json!({
        "service_id": service_id,
        "name": "web",
        "image": "nginx:latest",
        "restart_policy": "always",
    })
}

#[tokio::test]
async fn deploy_reaches_running_via_the_mock_agent() {
    let worker_secret = "agent-shared-secret";
    let agent_port = spawn_mock_agent(worker_secret).await;
    let (_dir, state, base) = spawn_leader(agent_port).await;
    common::insert_online_worker(&state, "worker-a", worker_secret);

    let client = reqwest::Client::new();
    client
        .post(format!("{base}/services"))
        .bearer_auth(OPERATOR_TOKEN)
        .json(&sample_service("web"))
        .send()
        .await
        .unwrap()
        .error_for_status()
        .unwrap();

    let resp = client
        .post(format!("{base}/deployments"))
        .bearer_auth(OPERATOR_TOKEN)
        .json(&serde_json::json!({"service_id": "web", "worker_hostname": "worker-a"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let deployment: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(deployment["status"], "running");
    assert_eq!(deployment["container_id"], "mock-container-id");
}

#[tokio::test]
async fn a_second_deploy_to_the_same_slot_conflicts() {
    let worker_secret = "agent-shared-secret";
    let agent_port = spawn_mock_agent(worker_secret).await;
    let (_dir, state, base) = spawn_leader(agent_port).await;
    common::insert_online_worker(&state, "worker-a", worker_secret);

    let client = reqwest::Client::new();
    client
        .post(format!("{base}/services"))
        .bearer_auth(OPERATOR_TOKEN)
        .json(&sample_service("web"))
        .send()
        .await
        .unwrap()
        .error_for_status()
        .unwrap();

    let first = client
        .post(format!("{base}/deployments"))
        .bearer_auth(OPERATOR_TOKEN)
        .json(&serde_json::json!({"service_id": "web", "worker_hostname": "worker-a"}))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 200);

    let second = client
        .post(format!("{base}/deployments"))
        .bearer_auth(OPERATOR_TOKEN)
        .json(&serde_json::json!({"service_id": "web", "worker_hostname": "worker-a"}))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 409);
}

#[tokio::test]
async fn deploy_onto_an_offline_worker_fails_preconditions() {
    let agent_port = spawn_mock_agent("unused").await;
    let (_dir, state, base) = spawn_leader(agent_port).await;
    common::insert_online_worker(&state, "worker-offline", "unused");
    state
        .cluster
        .stores
        .nodes
        .update_worker(
            "worker-offline",
            fleet_core::worker::WorkerUpdate {
                status: Some(fleet_core::worker::Status::Offline),
                ..Default::default()
            },
        )
        .unwrap();

    let client = reqwest::Client::new();
    client
        .post(format!("{base}/services"))
        .bearer_auth(OPERATOR_TOKEN)
        .json(&sample_service("web"))
        .send()
        .await
        .unwrap()
        .error_for_status()
        .unwrap();

    let resp = client
        .post(format!("{base}/deployments"))
        .bearer_auth(OPERATOR_TOKEN)
        .json(&serde_json::json!({"service_id": "web", "worker_hostname": "worker-offline"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
}

#[tokio::test]
async fn deploy_against_a_missing_service_is_not_found() {
    let agent_port = spawn_mock_agent("unused").await;
    let (_dir, state, base) = spawn_leader(agent_port).await;
    common::insert_online_worker(&state, "worker-a", "unused");

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base}/deployments"))
        .bearer_auth(OPERATOR_TOKEN)
        .json(&serde_json::json!({"service_id": "does-not-exist", "worker_hostname": "worker-a"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn stop_restart_remove_walk_the_full_lifecycle() {
    let worker_secret = "agent-shared-secret";
    let agent_port = spawn_mock_agent(worker_secret).await;
    let (_dir, state, base) = spawn_leader(agent_port).await;
    common::insert_online_worker(&state, "worker-a", worker_secret);

    let client = reqwest::Client::new();
    client
        .post(format!("{base}/services"))
        .bearer_auth(OPERATOR_TOKEN)
        .json(&sample_service("web"))
        .send()
        .await
        .unwrap()
        .error_for_status()
        .unwrap();

    let deployed: serde_json::Value = client
        .post(format!("{base}/deployments"))
        .bearer_auth(OPERATOR_TOKEN)
        .json(&serde_json::json!({"service_id": "web", "worker_hostname": "worker-a"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = deployed["id"].as_str().unwrap().to_string();

    let stopped: serde_json::Value = client
        .post(format!("{base}/deployments/{id}/stop"))
        .bearer_auth(OPERATOR_TOKEN)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stopped["status"], "stopped");

    let restarted: serde_json::Value = client
        .post(format!("{base}/deployments/{id}/restart"))
        .bearer_auth(OPERATOR_TOKEN)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(restarted["status"], "running");

    let logs: serde_json::Value = client
        .get(format!("{base}/deployments/{id}/logs"))
        .bearer_auth(OPERATOR_TOKEN)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(logs["logs"].as_str().unwrap().contains("mock log output"));

    let remove_resp = client
        .post(format!("{base}/deployments/{id}/remove"))
        .bearer_auth(OPERATOR_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(remove_resp.status(), 204);
    assert!(state.cluster.stores.deployments.get(&id).unwrap().is_none());
}

#[tokio::test]
async fn a_second_deploy_to_a_freed_slot_reuses_the_deployment_id() {
    let worker_secret = "agent-shared-secret";
    let agent_port = spawn_mock_agent(worker_secret).await;
    let (_dir, state, base) = spawn_leader(agent_port).await;
    common::insert_online_worker(&state, "worker-a", worker_secret);

    state
        .cluster
        .stores
        .services
        .create(ServiceDefinition {
            service_id: "web".to_string(),
            name: "web".to_string(),
            description: String::new(),
            image: "nginx:latest".to_string(),
            ports: BTreeMap::new(),
            env: BTreeMap::new(),
            volumes: vec![],
            command: None,
            restart_policy: RestartPolicy::Always,
            network: None,
            health_path: None,
            health_port: None,
            tags: vec![],
            metadata: BTreeMap::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            created_by: "operator".to_string(),
        })
        .unwrap();

    let client = reqwest::Client::new();
    let first: serde_json::Value = client
        .post(format!("{base}/deployments"))
        .bearer_auth(OPERATOR_TOKEN)
        .json(&serde_json::json!({"service_id": "web", "worker_hostname": "worker-a"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let first_id = first["id"].as_str().unwrap().to_string();

    client
        .post(format!("{base}/deployments/{first_id}/stop"))
        .bearer_auth(OPERATOR_TOKEN)
        .send()
        .await
        .unwrap()
        .error_for_status()
        .unwrap();

    let second: serde_json::Value = client
        .post(format!("{base}/deployments"))
        .bearer_auth(OPERATOR_TOKEN)
        .json(&serde_json::json!({"service_id": "web", "worker_hostname": "worker-a"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(second["id"], first_id, "redeploying a freed slot reuses its deployment id");
}
