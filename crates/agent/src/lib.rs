pub mod config;
pub mod docker;
pub mod heartbeat;
pub mod locks;
pub mod server;
pub mod upgrade;

pub use config::AgentConfig;
pub use server::AgentState;
