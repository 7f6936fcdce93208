//! Join-token lifecycle: issuance, validation, and atomic consumption.

use chrono::{DateTime, Duration, Utc};
use fleet_core::token::{JoinToken, TokenValidity};
use fleet_core::worker::Role;
use fleet_core::{Error, Result};
use fleet_crypto::CryptoVault;

use crate::db::{cf, Db};

const MAX_TXN_RETRIES: u32 = 10;

#[derive(Debug, Clone)]
pub struct TokenStore {
    db: Db,
}

impl TokenStore {
    #[must_use]
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub fn create(
        &self,
        created_by: &str,
        role_to_grant: Role,
        max_uses: u32,
        ttl: Duration,
    ) -> Result<JoinToken> {
        let cf = self.db.cf(cf::TOKENS).map_err(Error::Internal)?;
        let now = Utc::now();
        let token = JoinToken {
            token: CryptoVault::random_token(32),
            created_at: now,
            expires_at: now + ttl,
            created_by: created_by.to_string(),
            role_to_grant,
            max_uses,
            uses: 0,
            is_active: true,
        };
        let bytes = serde_json::to_vec(&token).map_err(|e| Error::Internal(e.into()))?;
        self.db
            .put_cf(&cf, token.token.as_bytes(), &bytes)
            .map_err(|e| Error::Internal(e.into()))?;
        Ok(token)
    }

    pub fn get(&self, token: &str) -> Result<Option<JoinToken>> {
        let cf = self.db.cf(cf::TOKENS).map_err(Error::Internal)?;
        let raw = self
            .db
            .get_cf(&cf, token.as_bytes())
            .map_err(|e| Error::Internal(e.into()))?;
        raw.map(|bytes| serde_json::from_slice(&bytes).map_err(|e| Error::Internal(e.into())))
            .transpose()
    }

    pub fn validate(&self, token: &str) -> Result<TokenValidity> {
        match self.get(token)? {
            None => Ok(TokenValidity::Invalid),
            Some(t) => Ok(t.check(Utc::now())),
        }
    }

    /// Atomically check-and-increment `uses` on a RocksDB optimistic
    /// transaction, retrying on write conflicts. A plain read-then-write
    /// would let two concurrent registrations both succeed against a
    /// single-use token.
    pub fn consume(&self, token: &str) -> Result<()> {
        let cf = self.db.cf(cf::TOKENS).map_err(Error::Internal)?;

        for _ in 0..MAX_TXN_RETRIES {
            let txn = self.db.transaction();
            let raw = txn
                .get_cf(&cf, token.as_bytes())
                .map_err(|e| Error::Internal(e.into()))?;
            let Some(raw) = raw else {
                return Err(Error::TokenInvalid);
            };
            let mut record: JoinToken =
                serde_json::from_slice(&raw).map_err(|e| Error::Internal(e.into()))?;

            match record.check(Utc::now()) {
                TokenValidity::Ok => {}
                TokenValidity::Invalid | TokenValidity::Revoked => return Err(Error::TokenInvalid),
                TokenValidity::Expired => return Err(Error::TokenExpired),
                TokenValidity::Exhausted => return Err(Error::TokenExhausted),
            }

            record.uses += 1;
            let bytes = serde_json::to_vec(&record).map_err(|e| Error::Internal(e.into()))?;

            match txn.put_cf(&cf, token.as_bytes(), &bytes) {
                Ok(()) => {}
                Err(e) if is_retryable(&e) => continue,
                Err(e) => return Err(Error::Internal(e.into())),
            }

            match txn.commit() {
                Ok(()) => return Ok(()),
                Err(e) if is_retryable(&e) => continue,
                Err(e) => return Err(Error::Internal(e.into())),
            }
        }

        Err(Error::Internal(anyhow::anyhow!(
            "token consume: exceeded {MAX_TXN_RETRIES} retries"
        )))
    }

    pub fn expires_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<JoinToken>> {
        let cf = self.db.cf(cf::TOKENS).map_err(Error::Internal)?;
        let mut out = Vec::new();
        for item in self.db.iterator_cf(&cf, rocksdb::IteratorMode::Start) {
            let (_, value) = item.map_err(|e| Error::Internal(e.into()))?;
            let token: JoinToken =
                serde_json::from_slice(&value).map_err(|e| Error::Internal(e.into()))?;
            if token.expires_at < cutoff {
                out.push(token);
            }
        }
        Ok(out)
    }

    /// Count of tokens that are still usable right now: not expired, not
    /// exhausted, not revoked.
    pub fn active_count(&self, now: DateTime<Utc>) -> Result<usize> {
        let cf = self.db.cf(cf::TOKENS).map_err(Error::Internal)?;
        let mut count = 0;
        for item in self.db.iterator_cf(&cf, rocksdb::IteratorMode::Start) {
            let (_, value) = item.map_err(|e| Error::Internal(e.into()))?;
            let token: JoinToken =
                serde_json::from_slice(&value).map_err(|e| Error::Internal(e.into()))?;
            if token.check(now) == TokenValidity::Ok {
                count += 1;
            }
        }
        Ok(count)
    }
}

fn is_retryable(err: &rocksdb::Error) -> bool {
    matches!(err.kind(), rocksdb::ErrorKind::Busy | rocksdb::ErrorKind::TryAgain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StoreConfig;

    fn open_store() -> (tempfile::TempDir, TokenStore) {
        let dir = tempfile::tempdir().unwrap();
        let db = Db::open(dir.path(), &StoreConfig::default()).unwrap();
        (dir, TokenStore::new(db))
    }

    #[test]
    fn single_use_token_consumed_once() {
        let (_dir, store) = open_store();
        let token = store
            .create("operator", Role::Worker, 1, Duration::hours(1))
            .unwrap();

        store.consume(&token.token).unwrap();
        let err = store.consume(&token.token).unwrap_err();
        assert_eq!(err.kind(), "token_exhausted");
    }

    #[test]
    fn multi_use_token_allows_n_consumptions() {
        let (_dir, store) = open_store();
        let token = store
            .create("operator", Role::Worker, 3, Duration::hours(1))
            .unwrap();

        store.consume(&token.token).unwrap();
        store.consume(&token.token).unwrap();
        store.consume(&token.token).unwrap();
        assert_eq!(
            store.consume(&token.token).unwrap_err().kind(),
            "token_exhausted"
        );
    }

    #[test]
    fn expired_token_rejected() {
        let (_dir, store) = open_store();
        let token = store
            .create("operator", Role::Worker, 5, Duration::seconds(-1))
            .unwrap();
        assert_eq!(store.consume(&token.token).unwrap_err().kind(), "token_expired");
    }

    #[test]
    fn unknown_token_is_invalid() {
        let (_dir, store) = open_store();
        assert_eq!(store.consume("does-not-exist").unwrap_err().kind(), "token_invalid");
    }

    #[test]
    fn concurrent_consumption_never_exceeds_max_uses() {
        use std::sync::Arc;
        use std::thread;

        let dir = tempfile::tempdir().unwrap();
        let db = Db::open(dir.path(), &StoreConfig::default()).unwrap();
        let store = Arc::new(TokenStore::new(db));
        let token = store
            .create("operator", Role::Worker, 4, Duration::hours(1))
            .unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                let token = token.token.clone();
                thread::spawn(move || store.consume(&token).is_ok())
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(successes, 4);
    }
}
