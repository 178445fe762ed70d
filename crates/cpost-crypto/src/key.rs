//! Per-conversation symmetric key material

use rand::RngCore;
use zeroize::Zeroize;

use crate::KEY_SIZE;

/// The 256-bit symmetric secret shared by the two parties of one
/// conversation. Key bytes are zeroized on drop and redacted from Debug.
#[derive(Clone)]
pub struct ConversationKey {
    conversation_id: String,
    bytes: [u8; KEY_SIZE],
    created_at: u64,
}

impl ConversationKey {
    pub fn from_bytes(conversation_id: &str, bytes: [u8; KEY_SIZE], created_at: u64) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            bytes,
            created_at,
        }
    }

    /// Generate a fresh random key for a conversation, stamped with the
    /// current unix time.
    pub fn generate(conversation_id: &str) -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        let created_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Self::from_bytes(conversation_id, bytes, created_at)
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }
}

impl Drop for ConversationKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationKey")
            .field("conversation_id", &self.conversation_id)
            .field("bytes", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .finish()
    }
}
