//! File-backed key store: one JSON record per conversation
//!
//! Records live at `{dir}/{blake3(conversation_id)[..16]}.json`. Hashing the
//! id keeps filenames filesystem-safe regardless of what characters the
//! messaging layer uses in conversation ids; the full id is inside the
//! record. Writes go through a temp file and an atomic rename, and access
//! per conversation id is serialized through an async lock so concurrent
//! first-use calls converge on a single stored key.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use cpost_crypto::ConversationKey;
use tokio::sync::Mutex;

use crate::record::KeyRecord;
use crate::{validate_conversation_id, KeyStore, KeyStoreError};

pub struct FileKeyStore {
    dir: PathBuf,
    /// Per-conversation-id locks, created lazily.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FileKeyStore {
    /// Open a key store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, KeyStoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            KeyStoreError::Unavailable(format!("creating key dir {}: {e}", dir.display()))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            std::fs::set_permissions(&dir, perms).map_err(|e| {
                KeyStoreError::Unavailable(format!(
                    "restricting key dir {}: {e}",
                    dir.display()
                ))
            })?;
        }

        Ok(Self {
            dir,
            locks: Mutex::new(HashMap::new()),
        })
    }

    fn record_path(&self, conversation_id: &str) -> PathBuf {
        let hex = blake3::hash(conversation_id.as_bytes()).to_hex();
        let stem = &hex.as_str()[..16];
        self.dir.join(format!("{stem}.json"))
    }

    async fn id_lock(&self, conversation_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn read_record(
        &self,
        conversation_id: &str,
        path: &Path,
    ) -> Result<Option<ConversationKey>, KeyStoreError> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                let record: KeyRecord =
                    serde_json::from_str(&content).map_err(|e| KeyStoreError::CorruptRecord {
                        conversation_id: conversation_id.to_string(),
                        reason: format!("invalid JSON: {e}"),
                    })?;
                Ok(Some(record.into_key()?))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(KeyStoreError::Unavailable(format!(
                "reading key record {}: {e}",
                path.display()
            ))),
        }
    }

    async fn write_record(&self, key: &ConversationKey, path: &Path) -> Result<(), KeyStoreError> {
        let record = KeyRecord::from_key(key);
        let json = serde_json::to_string_pretty(&record).map_err(|e| {
            KeyStoreError::Unavailable(format!("serializing key record: {e}"))
        })?;

        // Temp file + rename so a crash never leaves a half-written record.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json).await.map_err(|e| {
            KeyStoreError::Unavailable(format!("writing key record {}: {e}", tmp.display()))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&tmp, perms).await.map_err(|e| {
                KeyStoreError::Unavailable(format!(
                    "restricting key record {}: {e}",
                    tmp.display()
                ))
            })?;
        }

        tokio::fs::rename(&tmp, path).await.map_err(|e| {
            KeyStoreError::Unavailable(format!("renaming key record to {}: {e}", path.display()))
        })
    }
}

#[async_trait]
impl KeyStore for FileKeyStore {
    async fn get_or_create_key(
        &self,
        conversation_id: &str,
    ) -> Result<ConversationKey, KeyStoreError> {
        validate_conversation_id(conversation_id)?;

        let lock = self.id_lock(conversation_id).await;
        let _guard = lock.lock().await;

        let path = self.record_path(conversation_id);
        if let Some(key) = self.read_record(conversation_id, &path).await? {
            return Ok(key);
        }

        let key = ConversationKey::generate(conversation_id);
        self.write_record(&key, &path).await?;
        tracing::debug!(conversation_id, "created conversation key");
        Ok(key)
    }

    async fn get_key(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationKey>, KeyStoreError> {
        validate_conversation_id(conversation_id)?;

        let lock = self.id_lock(conversation_id).await;
        let _guard = lock.lock().await;

        let path = self.record_path(conversation_id);
        self.read_record(conversation_id, &path).await
    }

    async fn import_key(&self, key: &ConversationKey) -> Result<(), KeyStoreError> {
        let conversation_id = key.conversation_id();
        validate_conversation_id(conversation_id)?;

        let lock = self.id_lock(conversation_id).await;
        let _guard = lock.lock().await;

        let path = self.record_path(conversation_id);
        if let Some(existing) = self.read_record(conversation_id, &path).await? {
            if existing.as_bytes() != key.as_bytes() {
                return Err(KeyStoreError::KeyMismatch(conversation_id.to_string()));
            }
            return Ok(());
        }

        self.write_record(key, &path).await?;
        tracing::debug!(conversation_id, "imported conversation key");
        Ok(())
    }
}
