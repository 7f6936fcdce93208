//! Shared test scaffolding: an in-process leader router plus a tiny mock
//! agent standing in for a real `fleetd-agent` over loopback HTTP.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path as AxPath, State as AxState};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use fleet_core::worker::{Capabilities, Platform, Role, Status, Worker};
use fleet_crypto::CryptoVault;
use fleet_leader::cluster_manager::ClusterManager;
use fleet_leader::config::LeaderConfig;
use fleet_leader::credentials::CredentialStore;
use fleet_leader::deployment_engine::DeploymentEngine;
use fleet_leader::metrics::Metrics;
use fleet_leader::server::{self, AppState};
use fleet_store::{StoreConfig, Stores};
use tokio::net::TcpListener;

pub const MASTER_SECRET: &str = "test-master-secret";
pub const OPERATOR_TOKEN: &str = "test-operator-token";

/// Builds an `AppState` backed by a fresh temp-dir RocksDB instance.
///
/// `agent_port` should point at whatever loopback mock agent the test has
/// already started (or an arbitrary unused port, for tests that never
/// relay).
pub fn build_state(agent_port: u16) -> (tempfile::TempDir, AppState) {
    let dir = tempfile::tempdir().unwrap();
    let stores = Arc::new(Stores::open(dir.path(), &StoreConfig::default()).unwrap());
    let vault = Arc::new(CryptoVault::from_master_secret(MASTER_SECRET));
    let config = Arc::new(LeaderConfig {
        hostname: "leader-0".to_string(),
        vpn_address: "127.0.0.1".to_string(),
        master_secret: MASTER_SECRET.to_string(),
        operator_token: OPERATOR_TOKEN.to_string(),
        agent_port,
        ..LeaderConfig::default()
    });

    let credentials_dir = dir.path().join("credentials");
    std::fs::create_dir_all(&credentials_dir).unwrap();
    let credentials = CredentialStore::new(credentials_dir, (*vault).clone());
    let cluster = ClusterManager::new(Arc::clone(&stores), vault, config);
    cluster.bootstrap_self().unwrap();
    let engine = DeploymentEngine::new(cluster.clone());
    let metrics = Arc::new(Metrics::new().unwrap());

    (dir, AppState { cluster, engine, metrics, credentials })
}

pub fn router(agent_port: u16) -> (tempfile::TempDir, AppState, Router) {
    let (dir, state) = build_state(agent_port);
    let router = server::router(state.clone());
    (dir, state, router)
}

/// Binds the leader router to an ephemeral loopback port and serves it in
/// the background, returning the base URL callers can hit with a plain
/// `reqwest::Client`.
pub async fn spawn_leader(agent_port: u16) -> (tempfile::TempDir, AppState, String) {
    let (dir, state, app) = router(agent_port);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (dir, state, format!("http://127.0.0.1:{port}"))
}

/// Inserts an online worker directly into the store, bypassing the
/// join-token registration flow, with `vpn_address` pointed at loopback so
/// `ClusterManager::relay` can reach a test mock agent.
pub fn insert_online_worker(state: &AppState, hostname: &str, secret: &str) -> Worker {
    let now = Utc::now();
    let worker = Worker {
        id: uuid::Uuid::new_v4().to_string(),
        hostname: hostname.to_string(),
        display_name: None,
        vpn_address: "127.0.0.1".to_string(),
        platform: Platform::Linux,
        role: Role::Worker,
        status: Status::Online,
        capabilities: Capabilities::default(),
        labels: BTreeMap::new(),
        services_running: Default::default(),
        agent_version: "0.1.0".to_string(),
        registered_at: now,
        last_seen: now,
        encrypted_secret: state.cluster.vault.seal(secret.as_bytes()).unwrap(),
        secret_hash: CryptoVault::hash(secret),
    };
    state.cluster.stores.nodes.insert_worker(worker).unwrap()
}

#[derive(Clone)]
struct MockAgentState {
    expected_secret: String,
}

fn mock_authorized(state: &MockAgentState, headers: &HeaderMap) -> bool {
    headers
        .get("X-Node-Secret")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == state.expected_secret)
        .unwrap_or(false)
}

async fn mock_deploy(AxState(state): AxState<Arc<MockAgentState>>, headers: HeaderMap) -> Response {
    if !mock_authorized(&state, &headers) {
        return axum::http::StatusCode::UNAUTHORIZED.into_response();
    }
    Json(serde_json::json!({
        "success": true,
        "container_id": "mock-container-id",
        "status": "running",
    }))
    .into_response()
}

async fn mock_simple_ok(AxState(state): AxState<Arc<MockAgentState>>, headers: HeaderMap) -> Response {
    if !mock_authorized(&state, &headers) {
        return axum::http::StatusCode::UNAUTHORIZED.into_response();
    }
    Json(serde_json::json!({ "success": true, "error": null })).into_response()
}

async fn mock_logs(
    AxState(state): AxState<Arc<MockAgentState>>,
    headers: HeaderMap,
    AxPath(_name): AxPath<String>,
) -> Response {
    if !mock_authorized(&state, &headers) {
        return axum::http::StatusCode::UNAUTHORIZED.into_response();
    }
    Json(serde_json::json!({ "logs": "mock log output\n" })).into_response()
}

/// Spawns a minimal loopback HTTP server answering `/deploy`, `/stop`,
/// `/restart`, `/remove`, and `/logs/{name}` the same shape
/// `fleetd-agent`'s real handlers do, gated on the same `X-Node-Secret`
/// header check. Returns the bound port.
pub async fn spawn_mock_agent(expected_secret: &str) -> u16 {
    let state = Arc::new(MockAgentState {
        expected_secret: expected_secret.to_string(),
    });
    let app = Router::new()
        .route("/deploy", post(mock_deploy))
        .route("/stop", post(mock_simple_ok))
        .route("/restart", post(mock_simple_ok))
        .route("/remove", post(mock_simple_ok))
        .route("/logs/{name}", get(mock_logs))
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    port
}
