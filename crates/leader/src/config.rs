use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use clap::Args;

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fleetd-leader")
}

/// Leader process configuration, parsed from CLI flags with environment
/// variable fallbacks.
#[derive(Debug, Clone, Args)]
pub struct LeaderConfig {
    /// Address the operator + agent-facing API binds to.
    #[arg(long, env = "LEADER_BIND_ADDR", default_value = "0.0.0.0")]
    pub bind_addr: IpAddr,

    /// Public-facing port used when composing `join`/`bootstrap` URLs.
    #[arg(long, env = "LEADER_PUBLIC_PORT", default_value_t = 8443)]
    pub public_port: u16,

    /// This leader's own hostname.
    #[arg(long, env = "LEADER_HOSTNAME")]
    pub hostname: String,

    /// This leader's mesh-VPN address.
    #[arg(long, env = "LEADER_VPN_ADDRESS")]
    pub vpn_address: String,

    /// Master secret CryptoVault derives its key from. Losing this
    /// invalidates every previously sealed blob.
    #[arg(long, env = "MASTER_SECRET")]
    pub master_secret: String,

    /// Bearer token operator requests must present.
    #[arg(long, env = "LEADER_OPERATOR_TOKEN")]
    pub operator_token: String,

    /// RocksDB data directory.
    #[arg(long, env = "DATA_DIR", default_value_os_t = default_data_dir())]
    pub data_dir: PathBuf,

    /// Directory for `.enc` credential blobs (chmod 600).
    #[arg(long, env = "CREDENTIALS_DIR")]
    pub credentials_dir: Option<PathBuf>,

    /// TCP port agents listen on for control-plane relay calls.
    #[arg(long, env = "AGENT_PORT", default_value_t = 8444)]
    pub agent_port: u16,

    /// Stale-reaper tick interval, in seconds.
    #[arg(long, env = "REAPER_INTERVAL_SECS", default_value_t = 15)]
    pub reaper_interval_secs: u64,

    /// A worker is demoted to offline once its last heartbeat is older than
    /// this, in seconds.
    #[arg(long, env = "STALE_THRESHOLD_SECS", default_value_t = 60)]
    pub stale_threshold_secs: i64,

    /// Increase log verbosity; can be repeated.
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl LeaderConfig {
    #[must_use]
    pub fn socket_addr(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::new(self.bind_addr, self.public_port)
    }

    #[must_use]
    pub fn credentials_dir(&self) -> PathBuf {
        self.credentials_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("credentials"))
    }
}

impl Default for LeaderConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            public_port: 8443,
            hostname: String::new(),
            vpn_address: String::new(),
            master_secret: String::new(),
            operator_token: String::new(),
            data_dir: default_data_dir(),
            credentials_dir: None,
            agent_port: 8444,
            reaper_interval_secs: 15,
            stale_threshold_secs: 60,
            verbose: 0,
        }
    }
}
