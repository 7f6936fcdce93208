//! Shared RocksDB handle and column-family layout.
//!
//! One `OptimisticTransactionDB` backs every store in this crate, each
//! store owning a distinct column family, mirroring the single-database,
//! per-entity-CF layout the teacher's auth crate uses for its token and
//! API-key tables.

use std::path::Path;
use std::sync::Arc;

use rocksdb::ColumnFamilyDescriptor;

pub(crate) type TxnDb = rocksdb::OptimisticTransactionDB<rocksdb::MultiThreaded>;

pub mod cf {
    pub const WORKERS: &str = "workers";
    pub const TOKENS: &str = "join_tokens";
    pub const SERVICES: &str = "services";
    pub const DEPLOYMENTS: &str = "deployments";
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub create_if_missing: bool,
    pub create_missing_column_families: bool,
    pub parallelism: i32,
    pub max_open_files: i32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            create_missing_column_families: true,
            parallelism: std::thread::available_parallelism()
                .map(|n| n.get() as i32)
                .unwrap_or(2),
            max_open_files: 512,
        }
    }
}

/// Cheap to clone: wraps the database in an `Arc` like the teacher's
/// `RocksDb`.
#[derive(Debug, Clone)]
pub struct Db {
    inner: Arc<TxnDb>,
}

impl std::ops::Deref for Db {
    type Target = Arc<TxnDb>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl Db {
    pub fn open<P: AsRef<Path>>(path: P, config: &StoreConfig) -> anyhow::Result<Self> {
        let mut opts = rocksdb::Options::default();
        opts.create_if_missing(config.create_if_missing);
        opts.create_missing_column_families(config.create_missing_column_families);
        opts.increase_parallelism(config.parallelism);
        opts.set_max_open_files(config.max_open_files);

        let db = TxnDb::open_cf_descriptors(
            &opts,
            path,
            [
                ColumnFamilyDescriptor::new(cf::WORKERS, opts.clone()),
                ColumnFamilyDescriptor::new(cf::TOKENS, opts.clone()),
                ColumnFamilyDescriptor::new(cf::SERVICES, opts.clone()),
                ColumnFamilyDescriptor::new(cf::DEPLOYMENTS, opts.clone()),
            ],
        )?;
        Ok(Self { inner: Arc::new(db) })
    }

    pub(crate) fn cf(&self, name: &str) -> anyhow::Result<Arc<rocksdb::BoundColumnFamily<'_>>> {
        self.inner
            .cf_handle(name)
            .ok_or_else(|| anyhow::anyhow!("unknown column family: {name}"))
    }
}
