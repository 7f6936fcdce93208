pub mod db;
pub mod deployment_store;
pub mod node_store;
pub mod service_store;
pub mod token_store;

pub use db::{Db, StoreConfig};
pub use deployment_store::DeploymentStore;
pub use node_store::NodeStore;
pub use service_store::ServiceStore;
pub use token_store::TokenStore;

use std::path::Path;

/// Opens the single RocksDB handle and hands back one store per entity.
///
/// Mirrors the teacher's pattern of a single `RocksDb` shared across several
/// higher-level model modules, each owning its own column family.
#[derive(Debug, Clone)]
pub struct Stores {
    pub nodes: NodeStore,
    pub tokens: TokenStore,
    pub services: ServiceStore,
    pub deployments: DeploymentStore,
}

impl Stores {
    pub fn open<P: AsRef<Path>>(path: P, config: &StoreConfig) -> anyhow::Result<Self> {
        let db = Db::open(path, config)?;
        Ok(Self {
            nodes: NodeStore::new(db.clone()),
            tokens: TokenStore::new(db.clone()),
            services: ServiceStore::new(db.clone()),
            deployments: DeploymentStore::new(db),
        })
    }
}
