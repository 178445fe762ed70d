//! In-memory key store for tests and ephemeral sessions
//!
//! Holds keys in a process-local map with the same idempotence contract as
//! the file-backed store. A `fail_all` switch simulates an unavailable
//! persistence medium for error-path tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use cpost_crypto::ConversationKey;
use tokio::sync::Mutex;

use crate::{validate_conversation_id, KeyStore, KeyStoreError};

#[derive(Default)]
pub struct MemoryKeyStore {
    keys: Mutex<HashMap<String, ConversationKey>>,
    fail_all: AtomicBool,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with `Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.fail_all.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), KeyStoreError> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(KeyStoreError::Unavailable(
                "simulated persistence failure".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn get_or_create_key(
        &self,
        conversation_id: &str,
    ) -> Result<ConversationKey, KeyStoreError> {
        validate_conversation_id(conversation_id)?;
        self.check_available()?;

        let mut keys = self.keys.lock().await;
        if let Some(key) = keys.get(conversation_id) {
            return Ok(key.clone());
        }
        let key = ConversationKey::generate(conversation_id);
        keys.insert(conversation_id.to_string(), key.clone());
        Ok(key)
    }

    async fn get_key(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationKey>, KeyStoreError> {
        validate_conversation_id(conversation_id)?;
        self.check_available()?;
        Ok(self.keys.lock().await.get(conversation_id).cloned())
    }

    async fn import_key(&self, key: &ConversationKey) -> Result<(), KeyStoreError> {
        validate_conversation_id(key.conversation_id())?;
        self.check_available()?;

        let mut keys = self.keys.lock().await;
        if let Some(existing) = keys.get(key.conversation_id()) {
            if existing.as_bytes() != key.as_bytes() {
                return Err(KeyStoreError::KeyMismatch(
                    key.conversation_id().to_string(),
                ));
            }
            return Ok(());
        }
        keys.insert(key.conversation_id().to_string(), key.clone());
        Ok(())
    }
}
