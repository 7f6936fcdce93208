//! Service catalog: the definitions operators deploy onto workers.

use fleet_core::service::{ServiceDefinition, ServiceUpdate};
use fleet_core::{Error, Result};

use crate::db::{cf, Db};

#[derive(Debug, Clone)]
pub struct ServiceStore {
    db: Db,
}

impl ServiceStore {
    #[must_use]
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub fn create(&self, service: ServiceDefinition) -> Result<ServiceDefinition> {
        let cf = self.db.cf(cf::SERVICES).map_err(Error::Internal)?;
        if self
            .db
            .get_cf(&cf, service.service_id.as_bytes())
            .map_err(|e| Error::Internal(e.into()))?
            .is_some()
        {
            return Err(Error::AlreadyRegistered(service.service_id.clone()));
        }
        let bytes = serde_json::to_vec(&service).map_err(|e| Error::Internal(e.into()))?;
        self.db
            .put_cf(&cf, service.service_id.as_bytes(), &bytes)
            .map_err(|e| Error::Internal(e.into()))?;
        Ok(service)
    }

    pub fn get(&self, service_id: &str) -> Result<Option<ServiceDefinition>> {
        let cf = self.db.cf(cf::SERVICES).map_err(Error::Internal)?;
        let raw = self
            .db
            .get_cf(&cf, service_id.as_bytes())
            .map_err(|e| Error::Internal(e.into()))?;
        raw.map(|bytes| serde_json::from_slice(&bytes).map_err(|e| Error::Internal(e.into())))
            .transpose()
    }

    pub fn update(
        &self,
        service_id: &str,
        update: ServiceUpdate,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<ServiceDefinition> {
        let cf = self.db.cf(cf::SERVICES).map_err(Error::Internal)?;
        let txn = self.db.transaction();
        let raw = txn
            .get_cf(&cf, service_id.as_bytes())
            .map_err(|e| Error::Internal(e.into()))?
            .ok_or_else(|| Error::NotFound(service_id.to_string()))?;
        let mut svc: ServiceDefinition =
            serde_json::from_slice(&raw).map_err(|e| Error::Internal(e.into()))?;
        update.apply(&mut svc, now);

        let bytes = serde_json::to_vec(&svc).map_err(|e| Error::Internal(e.into()))?;
        txn.put_cf(&cf, service_id.as_bytes(), &bytes)
            .map_err(|e| Error::Internal(e.into()))?;
        txn.commit().map_err(|e| Error::Internal(e.into()))?;
        Ok(svc)
    }

    pub fn list(&self) -> Result<Vec<ServiceDefinition>> {
        let cf = self.db.cf(cf::SERVICES).map_err(Error::Internal)?;
        let mut out = Vec::new();
        for item in self.db.iterator_cf(&cf, rocksdb::IteratorMode::Start) {
            let (_, value) = item.map_err(|e| Error::Internal(e.into()))?;
            out.push(serde_json::from_slice(&value).map_err(|e| Error::Internal(e.into()))?);
        }
        out.sort_by(|a: &ServiceDefinition, b: &ServiceDefinition| a.service_id.cmp(&b.service_id));
        Ok(out)
    }

    pub fn delete(&self, service_id: &str) -> Result<bool> {
        let cf = self.db.cf(cf::SERVICES).map_err(Error::Internal)?;
        if self
            .db
            .get_cf(&cf, service_id.as_bytes())
            .map_err(|e| Error::Internal(e.into()))?
            .is_none()
        {
            return Ok(false);
        }
        self.db
            .delete_cf(&cf, service_id.as_bytes())
            .map_err(|e| Error::Internal(e.into()))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StoreConfig;
    use chrono::Utc;
    use fleet_core::service::RestartPolicy;
    use std::collections::BTreeMap;

    fn sample(service_id: &str) -> ServiceDefinition {
        ServiceDefinition {
            service_id: service_id.to_string(),
            name: "web".to_string(),
            description: String::new(),
            image: "nginx:latest".to_string(),
            ports: BTreeMap::new(),
            env: BTreeMap::new(),
            volumes: vec![],
            command: None,
            restart_policy: RestartPolicy::Always,
            network: None,
            health_path: None,
            health_port: None,
            tags: vec![],
            metadata: BTreeMap::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            created_by: "operator".to_string(),
        }
    }

    #[test]
    fn create_get_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let db = Db::open(dir.path(), &StoreConfig::default()).unwrap();
        let store = ServiceStore::new(db);

        store.create(sample("web")).unwrap();
        assert!(store.get("web").unwrap().is_some());
        assert!(store.delete("web").unwrap());
        assert!(store.get("web").unwrap().is_none());
    }

    #[test]
    fn duplicate_create_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let db = Db::open(dir.path(), &StoreConfig::default()).unwrap();
        let store = ServiceStore::new(db);

        store.create(sample("web")).unwrap();
        assert_eq!(store.create(sample("web")).unwrap_err().kind(), "already_registered");
    }
}
