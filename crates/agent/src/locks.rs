//! Per-container-name serialization so two concurrent requests against the
//! same container (e.g. a racing `deploy` and `stop`) never interleave.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Clone, Default)]
pub struct NameLocks {
    inner: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl NameLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `name`, creating it on first use. The returned
    /// guard holds the per-name mutex for its lifetime.
    pub async fn acquire(&self, name: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut map = self.inner.lock().await;
            Arc::clone(map.entry(name.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))))
        };
        entry.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_name_serializes() {
        let locks = NameLocks::new();
        let _guard = locks.acquire("web-1").await;
        let locks2 = locks.clone();
        let handle = tokio::spawn(async move {
            let start = std::time::Instant::now();
            let _g = locks2.acquire("web-1").await;
            start.elapsed()
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        drop(_guard);
        let elapsed = handle.await.unwrap();
        assert!(elapsed >= std::time::Duration::from_millis(40));
    }

    #[tokio::test]
    async fn different_names_do_not_block() {
        let locks = NameLocks::new();
        let _a = locks.acquire("a").await;
        let b = tokio::time::timeout(std::time::Duration::from_millis(100), locks.acquire("b")).await;
        assert!(b.is_ok());
    }
}
