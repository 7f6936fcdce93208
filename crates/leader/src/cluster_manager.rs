//! Cluster-wide operator operations: token issuance, worker registration,
//! heartbeat ingestion, command relay, peer discovery, and claiming.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use fleet_core::worker::{Capabilities, Platform, Role, Status, Worker, WorkerUpdate};
use fleet_core::{Error, Result};
use fleet_crypto::CryptoVault;
use fleet_store::Stores;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::LeaderConfig;
use crate::peer_discovery::{self, PeerReport};

#[derive(Clone)]
pub struct ClusterManager {
    pub stores: Arc<Stores>,
    pub vault: Arc<CryptoVault>,
    pub config: Arc<LeaderConfig>,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub token: String,
    pub hostname: String,
    pub vpn_address: String,
    pub platform: Platform,
    #[serde(default)]
    pub agent_version: String,
    #[serde(default)]
    pub capabilities: Capabilities,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub hostname: String,
    pub status: Status,
    /// Present only on first registration of this hostname.
    pub worker_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    pub hostname: String,
    #[serde(default)]
    pub agent_version: String,
    #[serde(default)]
    pub services_running: std::collections::BTreeSet<String>,
    #[serde(default)]
    pub capabilities: Capabilities,
}

#[derive(Debug, Serialize)]
pub struct CreateTokenResponse {
    pub token: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub join_command: String,
    pub join_command_powershell: String,
    pub bootstrap_command: String,
    pub bootstrap_command_powershell: String,
}

impl ClusterManager {
    #[must_use]
    pub fn new(stores: Arc<Stores>, vault: Arc<CryptoVault>, config: Arc<LeaderConfig>) -> Self {
        Self {
            stores,
            vault,
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Idempotent leader self-registration, run once at process start so the
    /// stale reaper never sees the leader itself as overdue.
    pub fn bootstrap_self(&self) -> Result<Worker> {
        let now = Utc::now();
        let worker = Worker {
            id: uuid::Uuid::new_v4().to_string(),
            hostname: self.config.hostname.clone(),
            display_name: None,
            vpn_address: self.config.vpn_address.clone(),
            platform: Platform::Linux,
            role: Role::Leader,
            status: Status::Online,
            capabilities: Capabilities::default(),
            labels: BTreeMap::new(),
            services_running: Default::default(),
            agent_version: env!("CARGO_PKG_VERSION").to_string(),
            registered_at: now,
            last_seen: now,
            encrypted_secret: vec![],
            secret_hash: String::new(),
        };
        let worker = self.stores.nodes.upsert_leader(worker)?;
        info!(hostname = %worker.hostname, "leader self-registration complete");
        Ok(worker)
    }

    pub fn create_join_token(
        &self,
        operator_id: &str,
        role_to_grant: Role,
        max_uses: u32,
        ttl: ChronoDuration,
    ) -> Result<CreateTokenResponse> {
        let token = self
            .stores
            .tokens
            .create(operator_id, role_to_grant, max_uses, ttl)?;

        let leader_host = &self.config.vpn_address;
        let port = self.config.public_port;
        Ok(CreateTokenResponse {
            join_command: format!(
                "curl -fsSL http://{leader_host}:{port}/join/{} | sh",
                token.token
            ),
            join_command_powershell: format!(
                "iex (iwr \"http://{leader_host}:{port}/join/{}/ps1\").Content",
                token.token
            ),
            bootstrap_command: format!(
                "curl -fsSL http://{leader_host}:{port}/bootstrap/{} | sh",
                token.token
            ),
            bootstrap_command_powershell: format!(
                "iex (iwr \"http://{leader_host}:{port}/bootstrap/{}/ps1\").Content",
                token.token
            ),
            token: token.token,
            expires_at: token.expires_at,
        })
    }

    pub fn register(&self, req: RegisterRequest) -> Result<RegisterResponse> {
        self.stores.tokens.validate(&req.token).and_then(|v| {
            if v == fleet_core::token::TokenValidity::Ok {
                Ok(())
            } else {
                Err(match v {
                    fleet_core::token::TokenValidity::Expired => Error::TokenExpired,
                    fleet_core::token::TokenValidity::Exhausted => Error::TokenExhausted,
                    _ => Error::TokenInvalid,
                })
            }
        })?;

        if let Some(existing) = self.stores.nodes.get(&req.hostname)? {
            let _ = existing;
            let now = Utc::now();
            let updated = self.stores.nodes.update_worker(
                &req.hostname,
                WorkerUpdate {
                    vpn_address: Some(req.vpn_address),
                    platform: Some(req.platform),
                    status: Some(Status::Online),
                    capabilities: Some(req.capabilities),
                    last_seen: Some(now),
                    agent_version: if req.agent_version.is_empty() {
                        None
                    } else {
                        Some(req.agent_version)
                    },
                    ..Default::default()
                },
            )?;
            self.stores.tokens.consume(&req.token)?;
            return Ok(RegisterResponse {
                hostname: updated.hostname,
                status: updated.status,
                worker_secret: None,
            });
        }

        let plaintext_secret = CryptoVault::random_token(32);
        let secret_hash = CryptoVault::hash(&plaintext_secret);
        let encrypted_secret = self.vault.seal_str(&plaintext_secret);

        let now = Utc::now();
        let worker = Worker {
            id: uuid::Uuid::new_v4().to_string(),
            hostname: req.hostname.clone(),
            display_name: None,
            vpn_address: req.vpn_address,
            platform: req.platform,
            role: Role::Worker,
            status: Status::Online,
            capabilities: req.capabilities,
            labels: BTreeMap::new(),
            services_running: Default::default(),
            agent_version: req.agent_version,
            registered_at: now,
            last_seen: now,
            encrypted_secret,
            secret_hash,
        };

        let worker = self.stores.nodes.insert_worker(worker)?;
        self.stores.tokens.consume(&req.token)?;

        Ok(RegisterResponse {
            hostname: worker.hostname,
            status: worker.status,
            worker_secret: Some(plaintext_secret),
        })
    }

    /// Returns whether the worker already existed.
    pub fn process_heartbeat(&self, req: HeartbeatRequest) -> Result<bool> {
        let existed = self.stores.nodes.get(&req.hostname)?.is_some();
        if !existed {
            return Ok(false);
        }
        self.stores.nodes.update_worker(
            &req.hostname,
            WorkerUpdate {
                status: Some(Status::Online),
                services_running: Some(req.services_running),
                capabilities: Some(req.capabilities),
                agent_version: if req.agent_version.is_empty() {
                    None
                } else {
                    Some(req.agent_version)
                },
                last_seen: Some(Utc::now()),
                ..Default::default()
            },
        )?;
        Ok(true)
    }

    /// Unseals a worker's secret and issues a POST to its agent's control API.
    pub async fn relay(
        &self,
        hostname: &str,
        op: &str,
        body: Option<serde_json::Value>,
        timeout: Duration,
    ) -> Result<reqwest::Response> {
        self.relay_method(hostname, reqwest::Method::POST, op, body, timeout)
            .await
    }

    /// As [`Self::relay`], but lets the caller pick the HTTP method — the
    /// agent's `/logs/{name}` is a `GET`, everything else is a `POST`.
    pub async fn relay_method(
        &self,
        hostname: &str,
        method: reqwest::Method,
        op: &str,
        body: Option<serde_json::Value>,
        timeout: Duration,
    ) -> Result<reqwest::Response> {
        let worker = self
            .stores
            .nodes
            .get(hostname)?
            .ok_or_else(|| Error::NotFound(hostname.to_string()))?;

        if worker.status != Status::Online && op != "upgrade" {
            return Err(Error::PreconditionFailed(format!(
                "worker {hostname} is not online"
            )));
        }

        let secret = self
            .vault
            .unseal_str(&worker.encrypted_secret)
            .map_err(|_| Error::Internal(anyhow::anyhow!("secret material unreadable")))?;

        let url = format!("http://{}:{}/{op}", worker.vpn_address, self.config.agent_port);
        let mut builder = self.http.request(method, &url).header("X-Node-Secret", secret).timeout(timeout);
        if let Some(b) = body {
            builder = builder.json(&b);
        }

        builder
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(format!("{hostname}/{op}"))
                } else {
                    Error::Unreachable(format!("{hostname}/{op}: {e}"))
                }
            })
    }

    pub async fn discover_peers(&self) -> Result<PeerReport> {
        peer_discovery::discover(&self.stores, self.config.agent_port).await
    }

    pub fn claim(&self, hostname: &str, vpn_address: &str) -> Result<RegisterResponse> {
        if self.stores.nodes.get(hostname)?.is_some() {
            return Err(Error::AlreadyRegistered(hostname.to_string()));
        }

        let plaintext_secret = CryptoVault::random_token(32);
        let secret_hash = CryptoVault::hash(&plaintext_secret);
        let encrypted_secret = self.vault.seal_str(&plaintext_secret);
        let now = Utc::now();

        let worker = Worker {
            id: uuid::Uuid::new_v4().to_string(),
            hostname: hostname.to_string(),
            display_name: None,
            vpn_address: vpn_address.to_string(),
            platform: Platform::Unknown,
            role: Role::Worker,
            status: Status::Online,
            capabilities: Capabilities::default(),
            labels: BTreeMap::new(),
            services_running: Default::default(),
            agent_version: String::new(),
            registered_at: now,
            last_seen: now,
            encrypted_secret,
            secret_hash,
        };
        let worker = self.stores.nodes.insert_worker(worker)?;
        Ok(RegisterResponse {
            hostname: worker.hostname,
            status: worker.status,
            worker_secret: Some(plaintext_secret),
        })
    }

    pub fn delete_worker(&self, hostname: &str) -> Result<bool> {
        if hostname == self.config.hostname {
            return Err(Error::PreconditionFailed(
                "the leader's own worker row cannot be removed".to_string(),
            ));
        }
        self.stores.nodes.delete(hostname)
    }

    /// Drops a worker's registration with this leader so a different leader
    /// may `claim` it. Distinct entry point from `delete_worker` so the two
    /// operator intents (decommission vs. hand off) stay separately logged.
    pub fn release_worker(&self, hostname: &str) -> Result<bool> {
        if hostname == self.config.hostname {
            return Err(Error::PreconditionFailed(
                "the leader's own worker row cannot be released".to_string(),
            ));
        }
        let released = self.stores.nodes.delete(hostname)?;
        if released {
            info!(%hostname, "worker released, available for claim by another leader");
        }
        Ok(released)
    }

    pub async fn upgrade_all(&self, image: &str) -> Result<UpgradeAllReport> {
        let workers = self.stores.nodes.list(&fleet_core::worker::WorkerFilter {
            status: Some(Status::Online),
            role: Some(Role::Worker),
            label: None,
        })?;

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();

        for worker in &workers {
            let body = serde_json::json!({ "image": image });
            match self
                .relay(&worker.hostname, "upgrade", Some(body), Duration::from_secs(120))
                .await
            {
                Ok(resp) if resp.status().is_success() || resp.status().as_u16() == 202 => {
                    succeeded.push(worker.hostname.clone());
                }
                Ok(resp) => {
                    warn!(hostname = %worker.hostname, status = %resp.status(), "upgrade relay rejected");
                    failed.push(UpgradeFailure {
                        hostname: worker.hostname.clone(),
                        error: format!("status {}", resp.status()),
                    });
                }
                Err(err) => failed.push(UpgradeFailure {
                    hostname: worker.hostname.clone(),
                    error: err.to_string(),
                }),
            }
        }

        Ok(UpgradeAllReport {
            total: workers.len(),
            succeeded,
            failed,
            image: image.to_string(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct UpgradeFailure {
    pub hostname: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct UpgradeAllReport {
    pub total: usize,
    pub succeeded: Vec<String>,
    pub failed: Vec<UpgradeFailure>,
    pub image: String,
}
