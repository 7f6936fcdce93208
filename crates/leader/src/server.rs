//! The leader's HTTP surface: join/bootstrap script serving, worker
//! registration and heartbeat ingest, and the operator-facing control API.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use fleet_core::service::{RestartPolicy, ServiceDefinition, ServiceUpdate};
use fleet_core::worker::{Role, WorkerFilter, WorkerView};
use fleet_core::Error;
use serde::Deserialize;
use std::collections::BTreeMap;
use subtle::ConstantTimeEq;

use crate::bootstrap;
use crate::cluster_manager::{ClusterManager, HeartbeatRequest, RegisterRequest};
use crate::credentials::CredentialStore;
use crate::deployment_engine::DeploymentEngine;
use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub cluster: ClusterManager,
    pub engine: DeploymentEngine,
    pub metrics: Arc<Metrics>,
    pub credentials: CredentialStore,
}

pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/join/{token}", get(join_sh))
        .route("/join/{token}/ps1", get(join_ps1))
        .route("/bootstrap/{token}", get(bootstrap_sh))
        .route("/bootstrap/{token}/ps1", get(bootstrap_ps1))
        .route("/register", post(register))
        .route("/heartbeat", post(heartbeat))
        .route("/metrics", get(metrics));

    let operator = Router::new()
        .route("/tokens", post(create_token))
        .route("/services", get(list_services).post(create_service))
        .route(
            "/services/{service_id}",
            get(get_service).patch(update_service).delete(delete_service),
        )
        .route("/workers", get(list_workers))
        .route("/workers/{hostname}", get(get_worker).delete(delete_worker))
        .route("/workers/{hostname}/release", post(release_worker))
        .route("/workers/{hostname}/upgrade", post(upgrade_worker))
        .route("/upgrade-all", post(upgrade_all))
        .route("/discover/peers", get(discover_peers))
        .route("/claim", post(claim))
        .route("/deployments", post(create_deployment))
        .route("/deployments/{id}/stop", post(stop_deployment))
        .route("/deployments/{id}/restart", post(restart_deployment))
        .route("/deployments/{id}/remove", post(remove_deployment))
        .route("/deployments/{id}/logs", get(deployment_logs))
        .route("/credentials", get(list_credentials))
        .route(
            "/credentials/{blob_id}",
            get(get_credential).put(put_credential).delete(delete_credential),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_operator));

    public.merge(operator).with_state(state)
}

async fn require_operator(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    let Some(presented) = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    else {
        return Error::Unauthorized.into_response();
    };

    let expected = state.cluster.config.operator_token.as_bytes();
    let presented = presented.as_bytes();
    let authorized = expected.len() == presented.len() && bool::from(expected.ct_eq(presented));
    if !authorized {
        return Error::Unauthorized.into_response();
    }

    next.run(request).await
}

async fn join_sh(State(state): State<AppState>, Path(token): Path<String>) -> Response {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        bootstrap::join_sh(&token, &state.cluster.config.vpn_address, state.cluster.config.public_port),
    )
        .into_response()
}

async fn join_ps1(State(state): State<AppState>, Path(token): Path<String>) -> Response {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        bootstrap::join_ps1(&token, &state.cluster.config.vpn_address, state.cluster.config.public_port),
    )
        .into_response()
}

async fn bootstrap_sh(State(state): State<AppState>, Path(token): Path<String>) -> Response {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        bootstrap::bootstrap_sh(&token, &state.cluster.config.vpn_address, state.cluster.config.public_port),
    )
        .into_response()
}

async fn bootstrap_ps1(State(state): State<AppState>, Path(token): Path<String>) -> Response {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        bootstrap::bootstrap_ps1(&token, &state.cluster.config.vpn_address, state.cluster.config.public_port),
    )
        .into_response()
}

async fn register(State(state): State<AppState>, Json(req): Json<RegisterRequest>) -> Response {
    match state.cluster.register(req) {
        Ok(resp) => Json(resp).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn heartbeat(State(state): State<AppState>, Json(req): Json<HeartbeatRequest>) -> Response {
    match state.cluster.process_heartbeat(req) {
        Ok(true) => StatusCode::OK.into_response(),
        Ok(false) => Error::NotFound("worker not registered".to_string()).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render(&state.cluster.stores) {
        Ok(body) => (StatusCode::OK, [("content-type", "text/plain; version=0.0.4")], body).into_response(),
        Err(err) => Error::Internal(err).into_response(),
    }
}

#[derive(Deserialize)]
struct CreateTokenRequest {
    operator_id: String,
    #[serde(default = "default_role")]
    role_to_grant: Role,
    #[serde(default = "default_max_uses")]
    max_uses: u32,
    #[serde(default = "default_ttl_secs")]
    ttl_secs: i64,
}

fn default_role() -> Role {
    Role::Worker
}
fn default_max_uses() -> u32 {
    1
}
fn default_ttl_secs() -> i64 {
    3600
}

async fn create_token(State(state): State<AppState>, Json(req): Json<CreateTokenRequest>) -> Response {
    match state.cluster.create_join_token(
        &req.operator_id,
        req.role_to_grant,
        req.max_uses,
        chrono::Duration::seconds(req.ttl_secs),
    ) {
        Ok(resp) => Json(resp).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn list_workers(State(state): State<AppState>) -> Response {
    match state.cluster.stores.nodes.list(&WorkerFilter::default()) {
        Ok(workers) => Json(workers.iter().map(WorkerView::from).collect::<Vec<_>>()).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn get_worker(State(state): State<AppState>, Path(hostname): Path<String>) -> Response {
    match state.cluster.stores.nodes.get(&hostname) {
        Ok(Some(worker)) => Json(WorkerView::from(&worker)).into_response(),
        Ok(None) => Error::NotFound(hostname).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn delete_worker(State(state): State<AppState>, Path(hostname): Path<String>) -> Response {
    match state.cluster.delete_worker(&hostname) {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => Error::NotFound(hostname).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn release_worker(State(state): State<AppState>, Path(hostname): Path<String>) -> Response {
    match state.cluster.release_worker(&hostname) {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => Error::NotFound(hostname).into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Deserialize)]
struct UpgradeRequest {
    image: String,
}

async fn upgrade_worker(
    State(state): State<AppState>,
    Path(hostname): Path<String>,
    Json(req): Json<UpgradeRequest>,
) -> Response {
    match state
        .cluster
        .relay(&hostname, "upgrade", Some(serde_json::json!({"image": req.image})), std::time::Duration::from_secs(120))
        .await
    {
        Ok(resp) if resp.status().is_success() || resp.status().as_u16() == 202 => {
            StatusCode::ACCEPTED.into_response()
        }
        Ok(resp) => (StatusCode::BAD_GATEWAY, format!("agent returned {}", resp.status())).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn upgrade_all(State(state): State<AppState>, Json(req): Json<UpgradeRequest>) -> Response {
    match state.cluster.upgrade_all(&req.image).await {
        Ok(report) => Json(report).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn discover_peers(State(state): State<AppState>) -> Response {
    match state.cluster.discover_peers().await {
        Ok(report) => Json(report).into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Deserialize)]
struct ClaimRequest {
    hostname: String,
    vpn_address: String,
}

async fn claim(State(state): State<AppState>, Json(req): Json<ClaimRequest>) -> Response {
    match state.cluster.claim(&req.hostname, &req.vpn_address) {
        Ok(resp) => Json(resp).into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Deserialize)]
struct CreateDeploymentRequest {
    service_id: String,
    worker_hostname: String,
}

async fn create_deployment(State(state): State<AppState>, Json(req): Json<CreateDeploymentRequest>) -> Response {
    match state.engine.deploy(&req.service_id, &req.worker_hostname).await {
        Ok(deployment) => Json(deployment).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn stop_deployment(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.engine.stop(&id).await {
        Ok(deployment) => Json(deployment).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn restart_deployment(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.engine.restart(&id).await {
        Ok(deployment) => Json(deployment).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn remove_deployment(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.engine.remove(&id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Deserialize)]
struct TailQuery {
    #[serde(default = "default_tail")]
    tail: u32,
}

fn default_tail() -> u32 {
    200
}

async fn deployment_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<TailQuery>,
) -> Response {
    match state.engine.logs(&id, query.tail).await {
        Ok(logs) => Json(serde_json::json!({ "logs": logs })).into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Deserialize)]
struct CreateServiceRequest {
    service_id: String,
    name: String,
    #[serde(default)]
    description: String,
    image: String,
    #[serde(default)]
    ports: BTreeMap<String, u16>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default)]
    volumes: Vec<String>,
    command: Option<Vec<String>>,
    #[serde(default)]
    restart_policy: RestartPolicy,
    network: Option<String>,
    health_path: Option<String>,
    health_port: Option<u16>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
    #[serde(default = "default_created_by")]
    created_by: String,
}

fn default_created_by() -> String {
    "operator".to_string()
}

async fn create_service(State(state): State<AppState>, Json(req): Json<CreateServiceRequest>) -> Response {
    let now = chrono::Utc::now();
    let service = ServiceDefinition {
        service_id: req.service_id,
        name: req.name,
        description: req.description,
        image: req.image,
        ports: req.ports,
        env: req.env,
        volumes: req.volumes,
        command: req.command,
        restart_policy: req.restart_policy,
        network: req.network,
        health_path: req.health_path,
        health_port: req.health_port,
        tags: req.tags,
        metadata: req.metadata,
        created_at: now,
        updated_at: now,
        created_by: req.created_by,
    };
    match state.cluster.stores.services.create(service) {
        Ok(created) => Json(created).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn list_services(State(state): State<AppState>) -> Response {
    match state.cluster.stores.services.list() {
        Ok(services) => Json(services).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn get_service(State(state): State<AppState>, Path(service_id): Path<String>) -> Response {
    match state.cluster.stores.services.get(&service_id) {
        Ok(Some(service)) => Json(service).into_response(),
        Ok(None) => Error::NotFound(service_id).into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Deserialize, Default)]
struct UpdateServiceRequest {
    name: Option<String>,
    description: Option<String>,
    image: Option<String>,
    ports: Option<BTreeMap<String, u16>>,
    env: Option<BTreeMap<String, String>>,
    volumes: Option<Vec<String>>,
    command: Option<Option<Vec<String>>>,
    restart_policy: Option<RestartPolicy>,
    network: Option<Option<String>>,
    health_path: Option<Option<String>>,
    health_port: Option<Option<u16>>,
    tags: Option<Vec<String>>,
    metadata: Option<BTreeMap<String, String>>,
}

async fn update_service(
    State(state): State<AppState>,
    Path(service_id): Path<String>,
    Json(req): Json<UpdateServiceRequest>,
) -> Response {
    let update = ServiceUpdate {
        name: req.name,
        description: req.description,
        image: req.image,
        ports: req.ports,
        env: req.env,
        volumes: req.volumes,
        command: req.command,
        restart_policy: req.restart_policy,
        network: req.network,
        health_path: req.health_path,
        health_port: req.health_port,
        tags: req.tags,
        metadata: req.metadata,
    };
    match state
        .cluster
        .stores
        .services
        .update(&service_id, update, chrono::Utc::now())
    {
        Ok(service) => Json(service).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn delete_service(State(state): State<AppState>, Path(service_id): Path<String>) -> Response {
    match state.cluster.stores.deployments.any_active_for_service(&service_id) {
        Ok(true) => {
            return Error::Conflict(format!("service {service_id} has a live deployment")).into_response()
        }
        Ok(false) => {}
        Err(err) => return err.into_response(),
    }
    match state.cluster.stores.services.delete(&service_id) {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => Error::NotFound(service_id).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn list_credentials(State(state): State<AppState>) -> Response {
    match state.credentials.list() {
        Ok(ids) => Json(ids).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn put_credential(State(state): State<AppState>, Path(blob_id): Path<String>, body: Bytes) -> Response {
    match state.credentials.put(&blob_id, &body) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

async fn get_credential(State(state): State<AppState>, Path(blob_id): Path<String>) -> Response {
    match state.credentials.get(&blob_id) {
        Ok(Some(plaintext)) => {
            (StatusCode::OK, [("content-type", "application/octet-stream")], plaintext).into_response()
        }
        Ok(None) => Error::NotFound(blob_id).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn delete_credential(State(state): State<AppState>, Path(blob_id): Path<String>) -> Response {
    match state.credentials.delete(&blob_id) {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => Error::NotFound(blob_id).into_response(),
        Err(err) => err.into_response(),
    }
}
