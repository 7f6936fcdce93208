//! `/services` CRUD and the "in use" deletion guard.

mod common;

use chrono::Utc;
use common::{spawn_leader, OPERATOR_TOKEN};
use fleet_core::deployment::{Deployment, Status};

fn sample_service(service_id: &str) -> serde_json::Value {
    serde_json::json!({
        "service_id": service_id,
        "name": "web",
        "image": "nginx:latest",
        "restart_policy": "always",
    })
}

#[tokio::test]
async fn create_list_get_update_delete_round_trip() {
    let (_dir, _state, base) = spawn_leader(0).await;
    let client = reqwest::Client::new();

    let created = client
        .post(format!("{base}/services"))
        .bearer_auth(OPERATOR_TOKEN)
        .json(&sample_service("web"))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), 200);

    let duplicate = client
        .post(format!("{base}/services"))
        .bearer_auth(OPERATOR_TOKEN)
        .json(&sample_service("web"))
        .send()
        .await
        .unwrap();
    assert_eq!(duplicate.status(), 409);

    let list = client
        .get(format!("{base}/services"))
        .bearer_auth(OPERATOR_TOKEN)
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    assert_eq!(list.as_array().unwrap().len(), 1);

    let updated = client
        .patch(format!("{base}/services/web"))
        .bearer_auth(OPERATOR_TOKEN)
        .json(&serde_json::json!({"image": "nginx:1.27"}))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    assert_eq!(updated["image"], "nginx:1.27");
    assert_eq!(updated["name"], "web", "fields not named in the update keep their old value");

    let deleted = client
        .delete(format!("{base}/services/web"))
        .bearer_auth(OPERATOR_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), 204);

    let missing = client
        .get(format!("{base}/services/web"))
        .bearer_auth(OPERATOR_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn a_service_with_a_live_deployment_cannot_be_deleted() {
    let (_dir, state, base) = spawn_leader(0).await;
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

    let service = state.cluster.stores.services.get("web").unwrap().unwrap();
    state
        .cluster
        .stores
        .deployments
        .put(&Deployment {
            id: "dep-1".to_string(),
            service_id: "web".to_string(),
            worker_hostname: "worker-a".to_string(),
            status: Status::Running,
            container_id: Some("c1".to_string()),
            container_name: fleet_core::deployment::container_name("web", "dep-1"),
            deployed_config: service,
            created_at: Utc::now(),
            deployed_at: Some(Utc::now()),
            stopped_at: None,
            last_health_check: None,
            healthy: None,
            error: None,
            retry_count: 0,
            exposed_port: None,
        })
        .unwrap();

    let blocked = client
        .delete(format!("{base}/services/web"))
        .bearer_auth(OPERATOR_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(blocked.status(), 409);

    state.cluster.stores.deployments.delete("dep-1").unwrap();

    let allowed = client
        .delete(format!("{base}/services/web"))
        .bearer_auth(OPERATOR_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(allowed.status(), 204);
}
