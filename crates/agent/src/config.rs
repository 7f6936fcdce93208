use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use clap::Args;

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fleetd-agent")
}

/// Worker daemon configuration, parsed from CLI flags with environment
/// variable fallbacks.
#[derive(Debug, Clone, Args)]
pub struct AgentConfig {
    /// Address the control API binds to.
    #[arg(long, env = "AGENT_BIND_ADDR", default_value = "0.0.0.0")]
    pub bind_addr: IpAddr,

    /// TCP port the control API listens on.
    #[arg(long, env = "AGENT_PORT", default_value_t = 8444)]
    pub port: u16,

    /// Interval, in seconds, between outbound heartbeats to the leader.
    #[arg(long, env = "AGENT_HEARTBEAT_INTERVAL_SECS", default_value_t = 15)]
    pub heartbeat_interval_secs: u64,

    /// Base URL of the leader's control-plane API, e.g. `http://100.64.0.1:8443`.
    #[arg(long, env = "LEADER_URL")]
    pub leader_url: String,

    /// This worker's own hostname, as registered with the leader.
    #[arg(long, env = "WORKER_HOSTNAME")]
    pub hostname: String,

    /// This worker's mesh-VPN address, returned from `/info`.
    #[arg(long, env = "WORKER_VPN_ADDRESS")]
    pub vpn_address: String,

    /// Shared secret presented by the leader on every authenticated control
    /// request, and echoed back by this agent on outbound heartbeats.
    #[arg(long, env = "WORKER_SECRET")]
    pub worker_secret: String,

    /// Directory for any agent-local state (currently just logs of the last
    /// self-upgrade attempt).
    #[arg(long, env = "AGENT_DATA_DIR", default_value_os_t = default_data_dir())]
    pub data_dir: PathBuf,

    /// Increase log verbosity; can be repeated.
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl AgentConfig {
    #[must_use]
    pub fn socket_addr(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::new(self.bind_addr, self.port)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8444,
            heartbeat_interval_secs: 15,
            leader_url: String::new(),
            hostname: String::new(),
            vpn_address: String::new(),
            worker_secret: String::new(),
            data_dir: default_data_dir(),
            verbose: 0,
        }
    }
}
