//! Mesh-VPN peer enumeration, modeled on the Tailscale `status --json` CLI
//! integration: shell out, parse JSON, probe each peer's agent port.

use std::time::Duration;

use fleet_store::Stores;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct TailscaleStatus {
    #[serde(rename = "Peer", default)]
    peer: std::collections::HashMap<String, TailscalePeer>,
}

#[derive(Debug, Deserialize)]
struct TailscalePeer {
    #[serde(rename = "HostName", default)]
    hostname: String,
    #[serde(rename = "TailscaleIPs", default)]
    tailscale_ips: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PeerInfo {
    pub hostname: String,
    pub vpn_address: String,
}

#[derive(Debug, Default, Serialize)]
pub struct PeerReport {
    pub registered: Vec<PeerInfo>,
    pub available: Vec<PeerInfo>,
    pub unknown: Vec<PeerInfo>,
}

/// Enumerate mesh peers via the VPN CLI, then classify each one against
/// the known worker set and a live `/health` probe.
pub async fn discover(stores: &Stores, agent_port: u16) -> fleet_core::Result<PeerReport> {
    let peers = list_tailscale_peers().await;

    let known = stores.nodes.list(&fleet_core::worker::WorkerFilter::default())?;
    let http = reqwest::Client::new();
    let mut report = PeerReport::default();

    for peer in peers {
        let is_known = known
            .iter()
            .any(|w| w.hostname == peer.hostname || w.vpn_address == peer.vpn_address);

        if is_known {
            report.registered.push(peer);
            continue;
        }

        let health_url = format!("http://{}:{agent_port}/health", peer.vpn_address);
        let reachable = http
            .get(&health_url)
            .timeout(Duration::from_secs(2))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false);

        if reachable {
            report.available.push(peer);
        } else {
            report.unknown.push(peer);
        }
    }

    Ok(report)
}

async fn list_tailscale_peers() -> Vec<PeerInfo> {
    let output = match Command::new("tailscale").arg("status").arg("--json").output().await {
        Ok(o) if o.status.success() => o.stdout,
        Ok(o) => {
            warn!(status = %o.status, "tailscale status exited non-zero");
            return Vec::new();
        }
        Err(err) => {
            warn!(error = %err, "failed to invoke tailscale CLI");
            return Vec::new();
        }
    };

    let parsed: TailscaleStatus = match serde_json::from_slice(&output) {
        Ok(p) => p,
        Err(err) => {
            warn!(error = %err, "failed to parse tailscale status JSON");
            return Vec::new();
        }
    };

    parsed
        .peer
        .into_values()
        .filter_map(|p| {
            p.tailscale_ips.first().map(|ip| PeerInfo {
                hostname: p.hostname,
                vpn_address: ip.clone(),
            })
        })
        .collect()
}
