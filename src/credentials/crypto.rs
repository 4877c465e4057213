//! Authenticated encryption for stored secrets
//!
//! AES-256-GCM keyed from the operator master key. Each record carries its
//! own random 96-bit nonce; the key itself is derived once per process and
//! never persisted.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::{CoreError, Result};

/// Nonce length for AES-GCM, in bytes
pub const NONCE_LEN: usize = 12;

/// Domain-separation tag mixed into key derivation
const KEY_CONTEXT: &[u8] = b"remote-exec.credential-key.v1";

/// AEAD cipher for credential records
pub struct Cipher {
    inner: Aes256Gcm,
}

impl Cipher {
    /// Derive the record key from the operator master key and build the cipher
    pub fn new(master_key: &[u8]) -> Result<Self> {
        let mut hasher = Sha256::new();
        hasher.update(KEY_CONTEXT);
        hasher.update(master_key);
        let digest = hasher.finalize();
        let mut derived = Zeroizing::new([0u8; 32]);
        derived.copy_from_slice(&digest);

        let inner = Aes256Gcm::new_from_slice(derived.as_slice())
            .map_err(|_| CoreError::configuration("Failed to derive credential key"))?;
        Ok(Self { inner })
    }

    /// Encrypt a plaintext, returning the fresh nonce and the ciphertext
    pub fn seal(&self, plaintext: &[u8]) -> Result<([u8; NONCE_LEN], Vec<u8>)> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .inner
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CoreError::configuration("Credential encryption failed"))?;
        Ok((nonce, ciphertext))
    }

    /// Decrypt a stored record.
    ///
    /// Fails when the ciphertext was produced under a different master key or
    /// has been tampered with; both cases are malformed records to the caller.
    pub fn open(&self, nonce: &[u8], ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        if nonce.len() != NONCE_LEN {
            return Err(CoreError::configuration(
                "Malformed credential record: bad nonce length",
            ));
        }
        let plaintext = self
            .inner
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| {
                CoreError::configuration("Malformed credential record: decryption failed")
            })?;
        Ok(Zeroizing::new(plaintext))
    }
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher").finish_non_exhaustive()
    }
}
