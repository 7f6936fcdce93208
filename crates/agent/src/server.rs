//! The worker's inbound control API. Every route but `health` and `info`
//! requires an `X-Node-Secret` header matching this worker's own shared
//! secret, compared in constant time.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use fleet_core::service::RestartPolicy;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::info;

use crate::docker::{ContainerRuntime, DeploySpec};
use crate::locks::NameLocks;

#[derive(Clone)]
pub struct AgentState {
    pub hostname: String,
    pub vpn_address: String,
    pub worker_secret: String,
    pub runtime: ContainerRuntime,
    pub locks: NameLocks,
}

pub fn router(state: Arc<AgentState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/info", get(info))
        .route("/deploy", post(deploy))
        .route("/stop", post(stop))
        .route("/restart", post(restart))
        .route("/remove", post(remove))
        .route("/logs/{name}", get(logs))
        .route("/status/{name}", get(status))
        .route("/containers", get(containers))
        .route("/upgrade", post(upgrade))
        .with_state(state)
}

fn authorized(state: &AgentState, headers: &HeaderMap) -> bool {
    let Some(presented) = headers.get("X-Node-Secret").and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let expected = state.worker_secret.as_bytes();
    let presented = presented.as_bytes();
    if expected.len() != presented.len() {
        return false;
    }
    expected.ct_eq(presented).into()
}

struct Unauthorized;

impl IntoResponse for Unauthorized {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, Json(serde_json::json!({"error": "unauthorized"}))).into_response()
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    hostname: String,
    agent_version: String,
    docker_available: bool,
}

async fn health(State(state): State<Arc<AgentState>>) -> impl IntoResponse {
    let docker_available = state.runtime.ping().await;
    Json(HealthResponse {
        status: "ok",
        hostname: state.hostname.clone(),
        agent_version: env!("CARGO_PKG_VERSION").to_string(),
        docker_available,
    })
}

#[derive(Serialize)]
struct InfoResponse {
    hostname: String,
    vpn_address: String,
    agent_version: String,
}

async fn info(State(state): State<Arc<AgentState>>) -> impl IntoResponse {
    Json(InfoResponse {
        hostname: state.hostname.clone(),
        vpn_address: state.vpn_address.clone(),
        agent_version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Deserialize)]
struct DeployRequest {
    container_name: String,
    image: String,
    #[serde(default)]
    ports: HashMap<String, u16>,
    #[serde(default)]
    env: HashMap<String, String>,
    #[serde(default)]
    volumes: Vec<String>,
    command: Option<Vec<String>>,
    #[serde(default)]
    restart_policy: RestartPolicy,
    network: Option<String>,
}

#[derive(Serialize)]
struct DeployResponse {
    success: bool,
    container_id: Option<String>,
    container_name: Option<String>,
    status: Option<String>,
    error: Option<String>,
}

async fn deploy(
    State(state): State<Arc<AgentState>>,
    headers: HeaderMap,
    Json(req): Json<DeployRequest>,
) -> Response {
    if !authorized(&state, &headers) {
        return Unauthorized.into_response();
    }
    let _guard = state.locks.acquire(&req.container_name).await;

    let spec = DeploySpec {
        container_name: req.container_name.clone(),
        image: req.image,
        ports: req.ports,
        env: req.env,
        volumes: req.volumes,
        command: req.command,
        restart_policy: req.restart_policy,
        network: req.network,
    };

    match state.runtime.deploy(&spec).await {
        Ok(result) => {
            info!(container = %req.container_name, "deploy succeeded");
            Json(DeployResponse {
                success: true,
                container_id: Some(result.container_id),
                container_name: Some(req.container_name),
                status: Some(result.status),
                error: None,
            })
            .into_response()
        }
        Err(err) => Json(DeployResponse {
            success: false,
            container_id: None,
            container_name: Some(req.container_name),
            status: None,
            error: Some(classify_docker_error(&err)),
        })
        .into_response(),
    }
}

#[derive(Deserialize)]
struct NameRequest {
    name: String,
    #[serde(default = "default_timeout")]
    timeout_secs: i32,
}

fn default_timeout() -> i32 {
    10
}

#[derive(Serialize)]
struct SimpleResponse {
    success: bool,
    error: Option<String>,
}

async fn stop(
    State(state): State<Arc<AgentState>>,
    headers: HeaderMap,
    Json(req): Json<NameRequest>,
) -> Response {
    if !authorized(&state, &headers) {
        return Unauthorized.into_response();
    }
    let _guard = state.locks.acquire(&req.name).await;
    match state.runtime.stop(&req.name, req.timeout_secs).await {
        Ok(()) => Json(SimpleResponse { success: true, error: None }).into_response(),
        Err(err) => Json(SimpleResponse {
            success: false,
            error: Some(err.to_string()),
        })
        .into_response(),
    }
}

async fn restart(
    State(state): State<Arc<AgentState>>,
    headers: HeaderMap,
    Json(req): Json<NameRequest>,
) -> Response {
    if !authorized(&state, &headers) {
        return Unauthorized.into_response();
    }
    let _guard = state.locks.acquire(&req.name).await;
    match state.runtime.restart(&req.name, req.timeout_secs).await {
        Ok(()) => Json(SimpleResponse { success: true, error: None }).into_response(),
        Err(err) => Json(SimpleResponse {
            success: false,
            error: Some(err.to_string()),
        })
        .into_response(),
    }
}

async fn remove(
    State(state): State<Arc<AgentState>>,
    headers: HeaderMap,
    Json(req): Json<NameRequest>,
) -> Response {
    if !authorized(&state, &headers) {
        return Unauthorized.into_response();
    }
    let _guard = state.locks.acquire(&req.name).await;
    match state.runtime.remove(&req.name, true).await {
        Ok(()) => Json(SimpleResponse { success: true, error: None }).into_response(),
        Err(err) => Json(SimpleResponse {
            success: false,
            error: Some(err.to_string()),
        })
        .into_response(),
    }
}

#[derive(Deserialize)]
struct LogsQuery {
    #[serde(default = "default_tail")]
    tail: u32,
}

fn default_tail() -> u32 {
    200
}

async fn logs(
    State(state): State<Arc<AgentState>>,
    headers: HeaderMap,
    Path(name): Path<String>,
    axum::extract::Query(query): axum::extract::Query<LogsQuery>,
) -> Response {
    if !authorized(&state, &headers) {
        return Unauthorized.into_response();
    }
    match state.runtime.logs(&name, query.tail).await {
        Ok(body) => Json(serde_json::json!({ "logs": body })).into_response(),
        Err(_) => Json(serde_json::json!({ "logs": null })).into_response(),
    }
}

async fn status(
    State(state): State<Arc<AgentState>>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Response {
    if !authorized(&state, &headers) {
        return Unauthorized.into_response();
    }
    match state.runtime.status(&name).await {
        Ok(s) => Json(s).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, Json(serde_json::json!({"error": "not_found"}))).into_response(),
    }
}

async fn containers(State(state): State<Arc<AgentState>>, headers: HeaderMap) -> Response {
    if !authorized(&state, &headers) {
        return Unauthorized.into_response();
    }
    match state.runtime.list().await {
        Ok(list) => Json(list).into_response(),
        Err(err) => Json(serde_json::json!({"error": classify_docker_error(&err)})).into_response(),
    }
}

#[derive(Deserialize)]
struct UpgradeRequest {
    image: String,
}

async fn upgrade(
    State(state): State<Arc<AgentState>>,
    headers: HeaderMap,
    Json(req): Json<UpgradeRequest>,
) -> Response {
    if !authorized(&state, &headers) {
        return Unauthorized.into_response();
    }
    tokio::spawn(crate::upgrade::perform_self_upgrade(state, req.image));
    StatusCode::ACCEPTED.into_response()
}

fn classify_docker_error(err: &crate::docker::DockerError) -> String {
    match err {
        crate::docker::DockerError::ImageNotFound(_) => "image_not_found".to_string(),
        crate::docker::DockerError::ContainerNotFound(_) => "not_found".to_string(),
        crate::docker::DockerError::Bollard(_) => "runtime_unavailable".to_string(),
    }
}
