//! Durable worker registry, one row per hostname.

use fleet_core::worker::{Role, Status, Worker, WorkerFilter, WorkerUpdate};
use fleet_core::{Error, Result};
use tracing::debug;

use crate::db::{cf, Db};

#[derive(Debug, Clone)]
pub struct NodeStore {
    db: Db,
}

impl NodeStore {
    #[must_use]
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Idempotent self-registration of the leader's own worker row.
    ///
    /// Deletes any other `role=leader` row first so there is never more
    /// than one leader on record, then upserts this host as online.
    pub fn upsert_leader(&self, worker: Worker) -> Result<Worker> {
        let cf = self.db.cf(cf::WORKERS).map_err(Error::Internal)?;
        let mut batch = rocksdb::WriteBatch::default();

        let iter = self.db.iterator_cf(&cf, rocksdb::IteratorMode::Start);
        for item in iter {
            let (key, value) = item.map_err(|e| Error::Internal(e.into()))?;
            let existing: Worker =
                serde_json::from_slice(&value).map_err(|e| Error::Internal(e.into()))?;
            if existing.role == Role::Leader && key.as_ref() != worker.hostname.as_bytes() {
                batch.delete_cf(&cf, &key);
                debug!(hostname = %existing.hostname, "evicting stale leader row");
            }
        }

        let bytes = serde_json::to_vec(&worker).map_err(|e| Error::Internal(e.into()))?;
        batch.put_cf(&cf, worker.hostname.as_bytes(), &bytes);
        self.db.write(batch).map_err(|e| Error::Internal(e.into()))?;
        Ok(worker)
    }

    pub fn insert_worker(&self, worker: Worker) -> Result<Worker> {
        let cf = self.db.cf(cf::WORKERS).map_err(Error::Internal)?;
        if self
            .db
            .get_cf(&cf, worker.hostname.as_bytes())
            .map_err(|e| Error::Internal(e.into()))?
            .is_some()
        {
            return Err(Error::AlreadyRegistered(worker.hostname.clone()));
        }
        let bytes = serde_json::to_vec(&worker).map_err(|e| Error::Internal(e.into()))?;
        self.db
            .put_cf(&cf, worker.hostname.as_bytes(), &bytes)
            .map_err(|e| Error::Internal(e.into()))?;
        Ok(worker)
    }

    /// Read-modify-write a worker record inside a RocksDB transaction so a
    /// concurrent heartbeat and an operator edit never clobber each other's
    /// fields.
    pub fn update_worker(&self, hostname: &str, update: WorkerUpdate) -> Result<Worker> {
        let cf = self.db.cf(cf::WORKERS).map_err(Error::Internal)?;
        let txn = self.db.transaction();

        let existing = txn
            .get_cf(&cf, hostname.as_bytes())
            .map_err(|e| Error::Internal(e.into()))?
            .ok_or_else(|| Error::NotFound(hostname.to_string()))?;
        let mut worker: Worker =
            serde_json::from_slice(&existing).map_err(|e| Error::Internal(e.into()))?;
        update.apply(&mut worker);

        let bytes = serde_json::to_vec(&worker).map_err(|e| Error::Internal(e.into()))?;
        txn.put_cf(&cf, hostname.as_bytes(), &bytes)
            .map_err(|e| Error::Internal(e.into()))?;
        txn.commit().map_err(|e| Error::Internal(e.into()))?;
        Ok(worker)
    }

    pub fn get(&self, hostname: &str) -> Result<Option<Worker>> {
        let cf = self.db.cf(cf::WORKERS).map_err(Error::Internal)?;
        let raw = self
            .db
            .get_cf(&cf, hostname.as_bytes())
            .map_err(|e| Error::Internal(e.into()))?;
        raw.map(|bytes| serde_json::from_slice(&bytes).map_err(|e| Error::Internal(e.into())))
            .transpose()
    }

    pub fn list(&self, filter: &WorkerFilter) -> Result<Vec<Worker>> {
        let cf = self.db.cf(cf::WORKERS).map_err(Error::Internal)?;
        let mut out = Vec::new();
        for item in self.db.iterator_cf(&cf, rocksdb::IteratorMode::Start) {
            let (_, value) = item.map_err(|e| Error::Internal(e.into()))?;
            let worker: Worker =
                serde_json::from_slice(&value).map_err(|e| Error::Internal(e.into()))?;
            if filter.matches(&worker) {
                out.push(worker);
            }
        }
        out.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        Ok(out)
    }

    /// Workers that are `online` and have not been seen since `cutoff`,
    /// excluding the leader itself. Used by the stale reaper.
    pub fn stale_since(
        &self,
        cutoff: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<Worker>> {
        let all = self.list(&WorkerFilter {
            status: Some(Status::Online),
            role: None,
            label: None,
        })?;
        Ok(all
            .into_iter()
            .filter(|w| w.role != Role::Leader && w.last_seen < cutoff)
            .collect())
    }

    pub fn delete(&self, hostname: &str) -> Result<bool> {
        let cf = self.db.cf(cf::WORKERS).map_err(Error::Internal)?;
        if self
            .db
            .get_cf(&cf, hostname.as_bytes())
            .map_err(|e| Error::Internal(e.into()))?
            .is_none()
        {
            return Ok(false);
        }
        self.db
            .delete_cf(&cf, hostname.as_bytes())
            .map_err(|e| Error::Internal(e.into()))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StoreConfig;
    use chrono::Utc;
    use fleet_core::worker::{Capabilities, Platform};
    use std::collections::{BTreeMap, BTreeSet};

    fn sample_worker(hostname: &str) -> Worker {
        Worker {
            id: uuid::Uuid::new_v4().to_string(),
            hostname: hostname.to_string(),
            display_name: None,
            vpn_address: "100.64.0.2".to_string(),
            platform: Platform::Linux,
            role: Role::Worker,
            status: Status::Online,
            capabilities: Capabilities::default(),
            labels: BTreeMap::new(),
            services_running: BTreeSet::new(),
            agent_version: "0.1.0".to_string(),
            registered_at: Utc::now(),
            last_seen: Utc::now(),
            encrypted_secret: vec![],
            secret_hash: String::new(),
        }
    }

    fn open_store() -> (tempfile::TempDir, NodeStore) {
        let dir = tempfile::tempdir().unwrap();
        let db = Db::open(dir.path(), &StoreConfig::default()).unwrap();
        (dir, NodeStore::new(db))
    }

    #[test]
    fn insert_then_get_round_trips() {
        let (_dir, store) = open_store();
        store.insert_worker(sample_worker("alpha")).unwrap();
        let found = store.get("alpha").unwrap().unwrap();
        assert_eq!(found.hostname, "alpha");
    }

    #[test]
    fn duplicate_insert_is_already_registered() {
        let (_dir, store) = open_store();
        store.insert_worker(sample_worker("alpha")).unwrap();
        let err = store.insert_worker(sample_worker("alpha")).unwrap_err();
        assert_eq!(err.kind(), "already_registered");
    }

    #[test]
    fn upsert_leader_evicts_prior_leader() {
        let (_dir, store) = open_store();
        let mut first = sample_worker("leader-a");
        first.role = Role::Leader;
        store.upsert_leader(first).unwrap();

        let mut second = sample_worker("leader-b");
        second.role = Role::Leader;
        store.upsert_leader(second).unwrap();

        assert!(store.get("leader-a").unwrap().is_none());
        assert!(store.get("leader-b").unwrap().is_some());
    }

    #[test]
    fn stale_since_excludes_leader() {
        let (_dir, store) = open_store();
        let mut leader = sample_worker("leader-a");
        leader.role = Role::Leader;
        leader.last_seen = Utc::now() - chrono::Duration::hours(1);
        store.upsert_leader(leader).unwrap();

        let mut stale_worker = sample_worker("worker-a");
        stale_worker.last_seen = Utc::now() - chrono::Duration::hours(1);
        store.insert_worker(stale_worker).unwrap();

        let stale = store.stale_since(Utc::now() - chrono::Duration::minutes(1)).unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].hostname, "worker-a");
    }
}
