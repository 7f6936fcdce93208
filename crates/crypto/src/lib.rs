//! Symmetric encryption at rest for per-worker secrets and attached cluster
//! credential blobs.
//!
//! A single master secret is SHA-256 hashed once at startup into a 256-bit
//! ChaCha20-Poly1305 key. There is no KMS and no per-blob key: every sealed
//! value uses the same key with a fresh random nonce, so the scheme degrades
//! gracefully to "rotate the master secret and re-register everything" if
//! the master secret is ever compromised.

use chacha20poly1305::aead::{Aead, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use fleet_core::{Error, Result};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const NONCE_LEN: usize = 12;

/// A derived-key AEAD singleton. Cheap to clone (the key is a fixed-size
/// array); intended to be wrapped in an `Arc` and shared read-only after
/// startup.
#[derive(Clone)]
pub struct CryptoVault {
    cipher: ChaCha20Poly1305,
}

impl CryptoVault {
    /// Derive the vault's key from a master secret.
    ///
    /// Rotating the master secret changes the derived key, which makes every
    /// previously sealed blob permanently unrecoverable (`unseal` returns
    /// [`Error::InvalidToken`]). Callers must treat a master secret rotation
    /// as a full re-registration event.
    #[must_use]
    pub fn from_master_secret(master_secret: &str) -> Self {
        let digest = Sha256::digest(master_secret.as_bytes());
        let key = Key::from_slice(&digest);
        Self {
            cipher: ChaCha20Poly1305::new(key),
        }
    }

    /// Seal `plaintext`, returning `nonce || ciphertext || tag`.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| Error::InvalidToken)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Seal a UTF-8 string and base64-url encode the result, for storage in
    /// a JSON document or a RocksDB value.
    #[must_use]
    pub fn seal_str(&self, plaintext: &str) -> Vec<u8> {
        self.seal(plaintext.as_bytes())
            .expect("chacha20poly1305 encryption is infallible for valid keys")
    }

    /// Unseal a `nonce || ciphertext || tag` blob produced by [`Self::seal`].
    ///
    /// Fails with [`Error::InvalidToken`] if the blob is truncated, the
    /// authentication tag does not match, or the key has changed since the
    /// blob was sealed.
    pub fn unseal(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < NONCE_LEN {
            return Err(Error::InvalidToken);
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| Error::InvalidToken)
    }

    /// Unseal into a UTF-8 string.
    pub fn unseal_str(&self, sealed: &[u8]) -> Result<String> {
        let plaintext = self.unseal(sealed)?;
        String::from_utf8(plaintext).map_err(|_| Error::InvalidToken)
    }

    /// One-way SHA-256 digest of a secret, hex-encoded.
    ///
    /// Used only for authentication comparisons via [`verify_hash`]; never
    /// for anything that must be reversed.
    #[must_use]
    pub fn hash(secret: &str) -> String {
        hex::encode(Sha256::digest(secret.as_bytes()))
    }

    /// Generate `n_bytes` of cryptographically strong randomness, encoded as
    /// a URL-safe, unpadded base64 string.
    #[must_use]
    pub fn random_token(n_bytes: usize) -> String {
        let mut buf = vec![0u8; n_bytes];
        OsRng.fill_bytes(&mut buf);
        base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, buf)
    }
}

/// Constant-time comparison of a candidate secret against a stored
/// [`CryptoVault::hash`] digest.
///
/// Hex-decodes both sides before comparing bytes; returns `false` (never a
/// timing-safe "error") if either side fails to decode.
#[must_use]
pub fn verify_hash(candidate: &str, stored_hash: &str) -> bool {
    let candidate_hash = CryptoVault::hash(candidate);
    let (Ok(a), Ok(b)) = (hex::decode(&candidate_hash), hex::decode(stored_hash)) else {
        return false;
    };
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(&b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let vault = CryptoVault::from_master_secret("correct horse battery staple");
        let sealed = vault.seal(b"hunter2").unwrap();
        assert_eq!(vault.unseal(&sealed).unwrap(), b"hunter2");
    }

    #[test]
    fn tampering_fails_authentication() {
        let vault = CryptoVault::from_master_secret("correct horse battery staple");
        let mut sealed = vault.seal(b"hunter2").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;
        assert!(vault.unseal(&sealed).is_err());
    }

    #[test]
    fn truncated_ciphertext_fails() {
        let vault = CryptoVault::from_master_secret("s");
        assert!(vault.unseal(&[0u8; 4]).is_err());
    }

    #[test]
    fn rotated_master_secret_invalidates_blobs() {
        let vault_a = CryptoVault::from_master_secret("secret-a");
        let vault_b = CryptoVault::from_master_secret("secret-b");
        let sealed = vault_a.seal(b"payload").unwrap();
        assert!(vault_b.unseal(&sealed).is_err());
    }

    #[test]
    fn hash_is_deterministic_and_verifiable() {
        let hash = CryptoVault::hash("top-secret");
        assert!(verify_hash("top-secret", &hash));
        assert!(!verify_hash("wrong", &hash));
    }

    #[test]
    fn random_token_has_requested_entropy_and_is_url_safe() {
        let token = CryptoVault::random_token(32);
        assert!(!token.contains('+'));
        assert!(!token.contains('/'));
        assert!(!token.contains('='));
        assert!(token.len() >= 32);
    }
}
