//! Deployment records: one row per (service, worker) placement attempt.

use fleet_core::deployment::{Deployment, Status};
use fleet_core::{Error, Result};

use crate::db::{cf, Db};

#[derive(Debug, Clone)]
pub struct DeploymentStore {
    db: Db,
}

impl DeploymentStore {
    #[must_use]
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub fn put(&self, deployment: &Deployment) -> Result<()> {
        let cf = self.db.cf(cf::DEPLOYMENTS).map_err(Error::Internal)?;
        let bytes = serde_json::to_vec(deployment).map_err(|e| Error::Internal(e.into()))?;
        self.db
            .put_cf(&cf, deployment.id.as_bytes(), &bytes)
            .map_err(|e| Error::Internal(e.into()))?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<Deployment>> {
        let cf = self.db.cf(cf::DEPLOYMENTS).map_err(Error::Internal)?;
        let raw = self
            .db
            .get_cf(&cf, id.as_bytes())
            .map_err(|e| Error::Internal(e.into()))?;
        raw.map(|bytes| serde_json::from_slice(&bytes).map_err(|e| Error::Internal(e.into())))
            .transpose()
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        let cf = self.db.cf(cf::DEPLOYMENTS).map_err(Error::Internal)?;
        if self
            .db
            .get_cf(&cf, id.as_bytes())
            .map_err(|e| Error::Internal(e.into()))?
            .is_none()
        {
            return Ok(false);
        }
        self.db
            .delete_cf(&cf, id.as_bytes())
            .map_err(|e| Error::Internal(e.into()))?;
        Ok(true)
    }

    pub fn list(&self) -> Result<Vec<Deployment>> {
        let cf = self.db.cf(cf::DEPLOYMENTS).map_err(Error::Internal)?;
        let mut out = Vec::new();
        for item in self.db.iterator_cf(&cf, rocksdb::IteratorMode::Start) {
            let (_, value) = item.map_err(|e| Error::Internal(e.into()))?;
            out.push(serde_json::from_slice(&value).map_err(|e| Error::Internal(e.into()))?);
        }
        Ok(out)
    }

    /// The deployment currently occupying a `(service, worker)` slot in
    /// `deploying` or `running`, if any. Used to enforce the "no two
    /// live deployments for the same pair" invariant.
    pub fn active_for_slot(
        &self,
        service_id: &str,
        worker_hostname: &str,
    ) -> Result<Option<Deployment>> {
        Ok(self
            .list()?
            .into_iter()
            .find(|d| {
                d.service_id == service_id
                    && d.worker_hostname == worker_hostname
                    && matches!(d.status, Status::Deploying | Status::Running)
            }))
    }

    /// Any deployment (of any status) already occupying the slot, so a
    /// replacement deploy can reuse its id instead of minting a new one.
    pub fn latest_for_slot(
        &self,
        service_id: &str,
        worker_hostname: &str,
    ) -> Result<Option<Deployment>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|d| d.service_id == service_id && d.worker_hostname == worker_hostname)
            .max_by_key(|d| d.created_at))
    }

    /// Whether any deployment of `service_id` (on any worker) is currently
    /// `deploying` or `running`. Used to block deletion of a catalog entry
    /// that is still live somewhere in the fleet.
    pub fn any_active_for_service(&self, service_id: &str) -> Result<bool> {
        Ok(self.list()?.into_iter().any(|d| {
            d.service_id == service_id && matches!(d.status, Status::Deploying | Status::Running)
        }))
    }

    pub fn list_by_worker(&self, worker_hostname: &str) -> Result<Vec<Deployment>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|d| d.worker_hostname == worker_hostname)
            .collect())
    }
}
