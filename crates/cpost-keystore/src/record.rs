//! On-disk key record format

use base64::{engine::general_purpose::STANDARD as B64, Engine};
use cpost_crypto::{ConversationKey, KEY_SIZE};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::KeyStoreError;

/// Serialized form of a conversation key: `{conversation_id, key_material,
/// created_at}`, with the material base64-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRecord {
    pub conversation_id: String,
    pub key_material: String,
    pub created_at: u64,
}

impl KeyRecord {
    pub fn from_key(key: &ConversationKey) -> Self {
        Self {
            conversation_id: key.conversation_id().to_string(),
            key_material: B64.encode(key.as_bytes()),
            created_at: key.created_at(),
        }
    }

    pub fn into_key(self) -> Result<ConversationKey, KeyStoreError> {
        let mut decoded =
            B64.decode(&self.key_material)
                .map_err(|e| KeyStoreError::CorruptRecord {
                    conversation_id: self.conversation_id.clone(),
                    reason: format!("key material is not valid base64: {e}"),
                })?;

        if decoded.len() != KEY_SIZE {
            let len = decoded.len();
            decoded.zeroize();
            return Err(KeyStoreError::CorruptRecord {
                conversation_id: self.conversation_id.clone(),
                reason: format!("key material is {len} bytes, expected {KEY_SIZE}"),
            });
        }

        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();

        Ok(ConversationKey::from_bytes(
            &self.conversation_id,
            bytes,
            self.created_at,
        ))
    }
}
