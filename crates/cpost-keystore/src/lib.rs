//! cpost-keystore: one symmetric key per conversation, persisted locally
//!
//! The single-key invariant: a device holds exactly one active key per
//! conversation id, and `get_or_create_key` is idempotent — concurrent
//! first-use calls for the same id converge on one stored key. Both
//! implementations serialize per-id access to guarantee this.
//!
//! Key material never leaves the device through this crate. It is stored
//! in local records only and is redacted from Debug output.

pub mod file;
pub mod memory;
mod record;

pub use file::FileKeyStore;
pub use memory::MemoryKeyStore;
pub use record::KeyRecord;

use async_trait::async_trait;
use cpost_crypto::ConversationKey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyStoreError {
    /// Conversation id is empty or not usable as a stable identifier.
    #[error("invalid conversation id: {0}")]
    InvalidId(String),

    /// The persistence medium cannot be read or written. Fatal to a
    /// transfer: falling back to an ephemeral key would leave the other
    /// party unable to decrypt.
    #[error("key store unavailable: {0}")]
    Unavailable(String),

    /// A stored key record exists but cannot be decoded.
    #[error("corrupt key record for '{conversation_id}': {reason}")]
    CorruptRecord {
        conversation_id: String,
        reason: String,
    },

    /// Import refused: a different key is already stored for this id.
    #[error("key already exists for '{0}' and differs from the imported one")]
    KeyMismatch(String),
}

impl From<KeyStoreError> for cpost_core::TransferError {
    fn from(e: KeyStoreError) -> Self {
        match e {
            KeyStoreError::InvalidId(msg) => cpost_core::TransferError::Validation(msg),
            other => cpost_core::TransferError::KeyStore(other.to_string()),
        }
    }
}

/// Capability interface for per-conversation key persistence.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Return the key for `conversation_id`, creating and persisting a
    /// fresh random one if none exists. Race-safe and idempotent.
    async fn get_or_create_key(
        &self,
        conversation_id: &str,
    ) -> Result<ConversationKey, KeyStoreError>;

    /// Return the stored key, or `None` if this conversation has none yet.
    async fn get_key(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationKey>, KeyStoreError>;

    /// Store a key obtained out-of-band (key import). Idempotent for the
    /// same material; refuses to overwrite a different existing key.
    async fn import_key(&self, key: &ConversationKey) -> Result<(), KeyStoreError>;
}

pub(crate) fn validate_conversation_id(conversation_id: &str) -> Result<(), KeyStoreError> {
    if conversation_id.is_empty() {
        return Err(KeyStoreError::InvalidId(
            "conversation id must not be empty".into(),
        ));
    }
    Ok(())
}
