//! `EncryptedFileStore<K>`: a single-file, AEAD-encrypted key/value store.
//!
//! Two logical stores are generic instantiations of this machinery: the
//! config store (scope-less, one document) and the token store (scoped by
//! `(user_id, broker)`). Writes are atomic (temp file + rename) and
//! serialised by a process-level advisory lock via `fs2`; a corrupt or
//! undecryptable file surfaces `SecretStoreError::Corrupt` rather than a
//! partial parse.

use crate::domain::errors::SecretStoreError;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use fs2::FileExt;
use rand::RngCore;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::hash::Hash;
use std::marker::PhantomData;
use std::path::PathBuf;
use tracing::debug;

const NONCE_LEN: usize = 12;

/// 32-byte AEAD key loaded once at bootstrap from the environment. Never
/// logged, never written back to disk.
#[derive(Clone)]
pub struct EncryptionKey(Key<Aes256Gcm>);

impl EncryptionKey {
    pub fn from_base64(encoded: &str) -> Result<Self, SecretStoreError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| SecretStoreError::Encryption(format!("invalid key encoding: {e}")))?;
        if bytes.len() != 32 {
            return Err(SecretStoreError::Encryption(format!(
                "key must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self(*Key::<Aes256Gcm>::from_slice(&bytes)))
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(&self.0)
    }
}

/// On-disk envelope: a random nonce plus the ciphertext, both base64.
/// `updated_at` is plaintext metadata so a caller can inspect recency
/// without decrypting.
#[derive(serde::Serialize, serde::Deserialize)]
struct Envelope {
    nonce: String,
    ciphertext: String,
    updated_at: chrono::DateTime<chrono::Utc>,
}

/// A file-backed store over `HashMap<K, V>`, encrypted as a single blob.
/// `K` must serialise to a stable map key (tokens are scoped by
/// `(user_id, broker)`, encoded as `"user_id:broker"`; the config store uses
/// a single fixed key and one entry).
pub struct EncryptedFileStore<K, V> {
    path: PathBuf,
    key: EncryptionKey,
    _marker: PhantomData<(K, V)>,
}

impl<K, V> EncryptedFileStore<K, V>
where
    K: Eq + Hash + ToString + Clone,
    V: Serialize + DeserializeOwned + Clone,
{
    pub fn new(path: impl Into<PathBuf>, key: EncryptionKey) -> Self {
        Self {
            path: path.into(),
            key,
            _marker: PhantomData,
        }
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    fn acquire_lock(&self, exclusive: bool) -> Result<File, SecretStoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(self.lock_path())?;
        if exclusive {
            lock_file.lock_exclusive()?;
        } else {
            lock_file.lock_shared()?;
        }
        Ok(lock_file)
    }

    fn load_map(&self) -> Result<HashMap<String, V>, SecretStoreError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        let envelope: Envelope = serde_json::from_str(&raw)
            .map_err(|e| SecretStoreError::Corrupt(format!("envelope parse: {e}")))?;

        let nonce_bytes = base64::engine::general_purpose::STANDARD
            .decode(&envelope.nonce)
            .map_err(|e| SecretStoreError::Corrupt(format!("nonce decode: {e}")))?;
        let ciphertext = base64::engine::general_purpose::STANDARD
            .decode(&envelope.ciphertext)
            .map_err(|e| SecretStoreError::Corrupt(format!("ciphertext decode: {e}")))?;

        let nonce = Nonce::from_slice(&nonce_bytes);
        let plaintext = self
            .key
            .cipher()
            .decrypt(nonce, ciphertext.as_ref())
            .map_err(|_| SecretStoreError::Corrupt("decryption failed".into()))?;

        serde_json::from_slice(&plaintext)
            .map_err(|e| SecretStoreError::Corrupt(format!("payload parse: {e}")))
    }

    fn write_map(&self, map: &HashMap<String, V>) -> Result<(), SecretStoreError> {
        let plaintext = serde_json::to_vec(map)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .key
            .cipher()
            .encrypt(nonce, plaintext.as_ref())
            .map_err(|e| SecretStoreError::Encryption(e.to_string()))?;

        let envelope = Envelope {
            nonce: base64::engine::general_purpose::STANDARD.encode(nonce_bytes),
            ciphertext: base64::engine::general_purpose::STANDARD.encode(ciphertext),
            updated_at: chrono::Utc::now(),
        };
        let serialized = serde_json::to_string(&envelope)?;

        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, serialized)?;
        fs::rename(&temp_path, &self.path)?;
        debug!(path = %self.path.display(), "wrote encrypted store");
        Ok(())
    }

    pub async fn save(&self, key: &K, value: V) -> Result<(), SecretStoreError> {
        let path = self.path.clone();
        let this = self.clone_handle();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            let _lock = this.acquire_lock(true)?;
            let mut map = this.load_map()?;
            map.insert(key, value);
            this.write_map(&map)?;
            Ok::<(), SecretStoreError>(())
        })
        .await
        .map_err(|e| SecretStoreError::Corrupt(format!("task join error: {e}, path {path:?}")))?
    }

    pub async fn get(&self, key: &K) -> Result<V, SecretStoreError> {
        let this = self.clone_handle();
        let target = key.to_string();
        tokio::task::spawn_blocking(move || {
            let _lock = this.acquire_lock(false)?;
            let map = this.load_map()?;
            map.get(&target).cloned().ok_or(SecretStoreError::NotFound)
        })
        .await
        .map_err(|e| SecretStoreError::Corrupt(format!("task join error: {e}")))?
    }

    pub async fn delete(&self, key: &K) -> Result<(), SecretStoreError> {
        let this = self.clone_handle();
        let target = key.to_string();
        tokio::task::spawn_blocking(move || {
            let _lock = this.acquire_lock(true)?;
            let mut map = this.load_map()?;
            map.remove(&target);
            this.write_map(&map)
        })
        .await
        .map_err(|e| SecretStoreError::Corrupt(format!("task join error: {e}")))?
    }

    pub async fn clear_all(&self) -> Result<(), SecretStoreError> {
        let this = self.clone_handle();
        tokio::task::spawn_blocking(move || {
            let _lock = this.acquire_lock(true)?;
            this.write_map(&HashMap::new())
        })
        .await
        .map_err(|e| SecretStoreError::Corrupt(format!("task join error: {e}")))?
    }

    fn clone_handle(&self) -> Self {
        Self {
            path: self.path.clone(),
            key: self.key.clone(),
            _marker: PhantomData,
        }
    }
}

/// Scope key for the token store: one record per `(user_id, broker)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenScope {
    pub user_id: String,
    pub broker: String,
}

impl ToString for TokenScope {
    fn to_string(&self) -> String {
        format!("{}:{}", self.user_id, self.broker)
    }
}
