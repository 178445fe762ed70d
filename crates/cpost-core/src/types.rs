use serde::{Deserialize, Serialize};

/// Phase of a transfer session.
///
/// Upload path: `Idle → Encrypting → Uploading → Complete`.
/// Download path: `Idle → Downloading → Decrypting → Complete`.
/// `Failed` is reachable from any non-terminal stage; `Complete` and
/// `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStage {
    Idle,
    Encrypting,
    Uploading,
    Downloading,
    Decrypting,
    Complete,
    Failed,
}

impl TransferStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStage::Complete | TransferStage::Failed)
    }
}

impl std::fmt::Display for TransferStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransferStage::Idle => "idle",
            TransferStage::Encrypting => "encrypting",
            TransferStage::Uploading => "uploading",
            TransferStage::Downloading => "downloading",
            TransferStage::Decrypting => "decrypting",
            TransferStage::Complete => "complete",
            TransferStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferDirection {
    Upload,
    Download,
}

/// One observation of a transfer session, delivered to every subscriber.
///
/// `percent` is 0..=100 and never decreases within a stage. When
/// `stage == Failed`, `failed_at` names the stage the pipeline was in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub direction: TransferDirection,
    pub stage: TransferStage,
    pub percent: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<TransferStage>,
}

/// Plaintext facts about the original file, stored alongside the ciphertext
/// so the receiver can restore the file faithfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentMeta {
    pub file_name: String,
    pub mime_type: String,
    /// Plaintext size in bytes (advisory; the AEAD tag is the authority).
    pub size: u64,
}

/// The record a chat message carries to reference an encrypted attachment.
///
/// Produced by the upload pipeline, consumed read-only by the download
/// pipeline and by message rendering. The nonce travels here (base64) so
/// the receiver reconstructs the exact encrypt-time inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentDescriptor {
    pub file_id: String,
    pub file_url: String,
    pub encrypted: bool,
    /// Base64-encoded 24-byte XChaCha20-Poly1305 nonce.
    pub nonce: String,
    pub metadata: AttachmentMeta,
    pub sender_conversation_id: String,
}

impl AttachmentDescriptor {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}
