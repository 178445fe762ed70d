//! Download-then-decrypt: ciphertext blob + descriptor → restored file

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as B64, Engine};
use tracing::{info, warn};

use cpost_core::error::{StageFailure, TransferError};
use cpost_core::types::{AttachmentDescriptor, TransferStage};
use cpost_crypto::ConversationKey;
use cpost_storage::StorageClient;

use crate::pipeline::{from_crypto, from_storage, TransferPipeline};
use crate::session::TransferSession;

/// The decrypted attachment, carrying the original name and type so the
/// local-save collaborator can restore it faithfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredFile {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl RestoredFile {
    /// Write the file into `dir` under its original name.
    pub async fn save_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        // Strip any path components a malicious sender put in the name.
        let name = Path::new(&self.file_name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".into());
        let path = dir.join(name);
        tokio::fs::write(&path, &self.bytes).await?;
        Ok(path)
    }
}

impl<S: StorageClient> TransferPipeline<S> {
    /// Fetch an attachment's ciphertext, decrypt and verify it under the
    /// conversation key, driving `session` through `downloading →
    /// decrypting → complete`.
    ///
    /// An integrity failure (wrong key, or tampered/corrupted ciphertext)
    /// is surfaced as `Integrity`, never conflated with a transport error:
    /// the UI messages the two very differently.
    pub async fn download_and_decrypt(
        &self,
        key: &ConversationKey,
        descriptor: &AttachmentDescriptor,
        session: &TransferSession,
    ) -> Result<RestoredFile, StageFailure> {
        match self.download_inner(key, descriptor, session).await {
            Ok(file) => {
                session.complete();
                info!(
                    conversation_id = %descriptor.sender_conversation_id,
                    file_id = %descriptor.file_id,
                    size = file.bytes.len(),
                    "attachment restored"
                );
                Ok(file)
            }
            Err(error) => {
                session.fail();
                let stage = session.failed_at().unwrap_or(TransferStage::Idle);
                Err(StageFailure::new(stage, error))
            }
        }
    }

    async fn download_inner(
        &self,
        key: &ConversationKey,
        descriptor: &AttachmentDescriptor,
        session: &TransferSession,
    ) -> Result<RestoredFile, TransferError> {
        if !descriptor.encrypted {
            return Err(TransferError::Validation(
                "descriptor does not reference an encrypted attachment".into(),
            ));
        }
        if key.conversation_id() != descriptor.sender_conversation_id {
            return Err(TransferError::Validation(format!(
                "key belongs to conversation '{}', not '{}'",
                key.conversation_id(),
                descriptor.sender_conversation_id
            )));
        }

        session.begin_stage(TransferStage::Downloading);
        let on_bytes = |done: u64, total: u64| session.report_bytes(done, total);
        let ciphertext = self
            .storage
            .fetch(&descriptor.file_url, Some(&on_bytes))
            .await
            .map_err(from_storage)?;

        session.begin_stage(TransferStage::Decrypting);
        let nonce = B64.decode(&descriptor.nonce).map_err(|e| {
            TransferError::InvalidParameters(format!("descriptor nonce is not valid base64: {e}"))
        })?;

        let key_bytes = *key.as_bytes();
        let plaintext = tokio::task::spawn_blocking(move || {
            cpost_crypto::decrypt(&key_bytes, &nonce, &ciphertext)
        })
        .await
        .map_err(|e| TransferError::Encryption(format!("decryption task failed: {e}")))?
        .map_err(from_crypto)?;
        session.report_percent(100);

        // The AEAD tag is the authority on integrity; a size mismatch only
        // means the sender's metadata was off.
        if plaintext.len() as u64 != descriptor.metadata.size {
            warn!(
                expected = descriptor.metadata.size,
                actual = plaintext.len(),
                file_id = %descriptor.file_id,
                "decrypted size disagrees with descriptor metadata"
            );
        }

        Ok(RestoredFile {
            file_name: descriptor.metadata.file_name.clone(),
            mime_type: descriptor.metadata.mime_type.clone(),
            bytes: plaintext,
        })
    }
}
