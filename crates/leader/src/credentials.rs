//! File-backed encrypted cluster credential blobs.
//!
//! Each blob is sealed with the cluster's [`CryptoVault`] and written to
//! `<dir>/<blob_id>.enc` at file mode `0600`. A legacy unencrypted file at
//! `<dir>/<blob_id>` (no extension) is sealed and removed the first time
//! it is read, matching the one-shot migration the teacher's secure cloud
//! config performs for its own legacy plaintext file.

use std::path::{Path, PathBuf};

use fleet_core::{Error, Result};
use fleet_crypto::CryptoVault;

const SEALED_EXT: &str = "enc";

#[derive(Clone)]
pub struct CredentialStore {
    dir: PathBuf,
    vault: CryptoVault,
}

impl CredentialStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, vault: CryptoVault) -> Self {
        Self { dir: dir.into(), vault }
    }

    fn sealed_path(&self, blob_id: &str) -> PathBuf {
        self.dir.join(format!("{blob_id}.{SEALED_EXT}"))
    }

    fn legacy_path(&self, blob_id: &str) -> PathBuf {
        self.dir.join(blob_id)
    }

    /// Seal `plaintext` and (re)write `<dir>/<blob_id>.enc`.
    pub fn put(&self, blob_id: &str, plaintext: &[u8]) -> Result<()> {
        let sealed = self.vault.seal(plaintext)?;
        let path = self.sealed_path(blob_id);
        std::fs::write(&path, sealed).map_err(|e| Error::Internal(e.into()))?;
        restrict_to_owner(&path)
    }

    /// Read and unseal `<dir>/<blob_id>.enc`. If only a legacy unencrypted
    /// file exists, seal it in place, remove the plaintext, and return its
    /// contents. Returns `Ok(None)` if no blob exists under either name.
    pub fn get(&self, blob_id: &str) -> Result<Option<Vec<u8>>> {
        let sealed_path = self.sealed_path(blob_id);
        if sealed_path.exists() {
            let sealed = std::fs::read(&sealed_path).map_err(|e| Error::Internal(e.into()))?;
            return self.vault.unseal(&sealed).map(Some);
        }

        let legacy_path = self.legacy_path(blob_id);
        if legacy_path.exists() {
            let plaintext = std::fs::read(&legacy_path).map_err(|e| Error::Internal(e.into()))?;
            self.put(blob_id, &plaintext)?;
            std::fs::remove_file(&legacy_path).map_err(|e| Error::Internal(e.into()))?;
            return Ok(Some(plaintext));
        }

        Ok(None)
    }

    pub fn delete(&self, blob_id: &str) -> Result<bool> {
        let path = self.sealed_path(blob_id);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path).map_err(|e| Error::Internal(e.into()))?;
        Ok(true)
    }

    /// Blob ids currently sealed on disk, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let entries = std::fs::read_dir(&self.dir).map_err(|e| Error::Internal(e.into()))?;
        for entry in entries {
            let entry = entry.map_err(|e| Error::Internal(e.into()))?;
            if let Some(id) = entry.file_name().to_str().and_then(|n| n.strip_suffix(".enc")) {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(unix)]
fn restrict_to_owner(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| Error::Internal(e.into()))
}

#[cfg(not(unix))]
fn restrict_to_owner(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, CredentialStore) {
        let dir = tempfile::tempdir().unwrap();
        let vault = CryptoVault::from_master_secret("test-master-secret");
        let store = CredentialStore::new(dir.path(), vault);
        (dir, store)
    }

    #[test]
    fn round_trips_a_blob() {
        let (_dir, store) = store();
        store.put("kubeconfig-a", b"apiVersion: v1").unwrap();
        assert_eq!(store.get("kubeconfig-a").unwrap().unwrap(), b"apiVersion: v1");
    }

    #[test]
    fn sealed_file_is_mode_0600() {
        use std::os::unix::fs::PermissionsExt;
        let (dir, store) = store();
        store.put("blob", b"secret").unwrap();
        let meta = std::fs::metadata(dir.path().join("blob.enc")).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn missing_blob_is_none() {
        let (_dir, store) = store();
        assert!(store.get("nope").unwrap().is_none());
    }

    #[test]
    fn legacy_plaintext_file_is_migrated_on_read() {
        let (dir, store) = store();
        std::fs::write(dir.path().join("legacy-blob"), b"plaintext-payload").unwrap();

        let read = store.get("legacy-blob").unwrap().unwrap();
        assert_eq!(read, b"plaintext-payload");

        assert!(!dir.path().join("legacy-blob").exists());
        assert!(dir.path().join("legacy-blob.enc").exists());
        assert_eq!(store.get("legacy-blob").unwrap().unwrap(), b"plaintext-payload");
    }

    #[test]
    fn delete_reports_whether_a_blob_existed() {
        let (_dir, store) = store();
        assert!(!store.delete("absent").unwrap());
        store.put("present", b"x").unwrap();
        assert!(store.delete("present").unwrap());
        assert!(store.get("present").unwrap().is_none());
    }

    #[test]
    fn list_returns_sorted_blob_ids() {
        let (_dir, store) = store();
        store.put("zeta", b"1").unwrap();
        store.put("alpha", b"2").unwrap();
        assert_eq!(store.list().unwrap(), vec!["alpha".to_string(), "zeta".to_string()]);
    }
}
