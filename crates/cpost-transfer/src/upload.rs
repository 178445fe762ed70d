//! Encrypt-then-upload: local file → ciphertext blob + descriptor

use std::path::PathBuf;

use base64::{engine::general_purpose::STANDARD as B64, Engine};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use cpost_core::error::{StageFailure, TransferError};
use cpost_core::types::{AttachmentDescriptor, AttachmentMeta, TransferStage};
use cpost_crypto::ConversationKey;
use cpost_storage::StorageClient;

use crate::pipeline::{from_crypto, from_storage, TransferPipeline};
use crate::session::TransferSession;

/// What to send, and into which conversation.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub path: PathBuf,
    /// Name recorded in the descriptor (default: the path's file name).
    pub file_name: Option<String>,
    pub mime_type: String,
    pub conversation_id: String,
    /// Identity of the receiving party. The pipeline only logs it; routing
    /// is the message layer's job.
    pub recipient_id: Option<String>,
}

impl<S: StorageClient> TransferPipeline<S> {
    /// Encrypt a local file under the conversation key and upload the
    /// ciphertext, driving `session` through `encrypting → uploading →
    /// complete`.
    ///
    /// On any failure the session is marked failed at the stage it was in
    /// and the descriptor is never produced, so no message can reference a
    /// partial object. The plaintext never reaches the storage collaborator.
    pub async fn encrypt_and_upload(
        &self,
        key: &ConversationKey,
        request: &UploadRequest,
        session: &TransferSession,
    ) -> Result<AttachmentDescriptor, StageFailure> {
        match self.upload_inner(key, request, session).await {
            Ok(descriptor) => {
                session.complete();
                info!(
                    conversation_id = %request.conversation_id,
                    file_id = %descriptor.file_id,
                    size = descriptor.metadata.size,
                    "attachment uploaded"
                );
                Ok(descriptor)
            }
            Err(error) => {
                session.fail();
                let stage = session.failed_at().unwrap_or(TransferStage::Idle);
                Err(StageFailure::new(stage, error))
            }
        }
    }

    async fn upload_inner(
        &self,
        key: &ConversationKey,
        request: &UploadRequest,
        session: &TransferSession,
    ) -> Result<AttachmentDescriptor, TransferError> {
        // Everything in this block runs before any stage begins: a
        // validation failure performs no work and transmits zero bytes.
        if request.conversation_id.is_empty() {
            return Err(TransferError::Validation(
                "conversation id must not be empty".into(),
            ));
        }
        if key.conversation_id() != request.conversation_id {
            return Err(TransferError::Validation(format!(
                "key belongs to conversation '{}', not '{}'",
                key.conversation_id(),
                request.conversation_id
            )));
        }

        let file_meta = tokio::fs::metadata(&request.path).await.map_err(|e| {
            TransferError::Validation(format!(
                "cannot read file {}: {e}",
                request.path.display()
            ))
        })?;
        let size = file_meta.len();
        if size == 0 {
            return Err(TransferError::Validation(format!(
                "file is empty: {}",
                request.path.display()
            )));
        }
        if size > self.config.max_attachment_bytes {
            return Err(TransferError::Validation(format!(
                "file is {size} bytes, above the {} byte ceiling",
                self.config.max_attachment_bytes
            )));
        }

        let file_name = match &request.file_name {
            Some(name) => name.clone(),
            None => request
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "attachment".into()),
        };

        if let Some(recipient) = &request.recipient_id {
            debug!(conversation_id = %request.conversation_id, recipient, "preparing attachment");
        }

        // The chunked read feeds the encrypting stage's percent; the AEAD
        // pass itself is single-shot and lands the stage at 100.
        session.begin_stage(TransferStage::Encrypting);
        let plaintext = self.read_file(request, size, session).await?;

        let nonce = cpost_crypto::generate_nonce();
        let key_bytes = *key.as_bytes();
        let ciphertext = tokio::task::spawn_blocking(move || {
            cpost_crypto::encrypt(&key_bytes, &nonce, &plaintext)
        })
        .await
        .map_err(|e| TransferError::Encryption(format!("encryption task failed: {e}")))?
        .map_err(from_crypto)?;
        session.report_percent(100);

        let meta = AttachmentMeta {
            file_name,
            mime_type: request.mime_type.clone(),
            size,
        };

        session.begin_stage(TransferStage::Uploading);
        let file_id = uuid::Uuid::new_v4().to_string();
        let on_bytes = |done: u64, total: u64| session.report_bytes(done, total);
        let stored = match self
            .storage
            .put(&file_id, &ciphertext, &meta, Some(&on_bytes))
            .await
        {
            Ok(stored) => stored,
            Err(e) => {
                // A failed put may have landed part of the blob; remove it
                // so no unreferenced ciphertext lingers in the bucket.
                if let Err(del) = self.storage.delete(&file_id).await {
                    warn!(%file_id, "partial object cleanup failed: {del}");
                }
                return Err(from_storage(e));
            }
        };

        Ok(AttachmentDescriptor {
            file_id: stored.file_id,
            file_url: stored.file_url,
            encrypted: true,
            nonce: B64.encode(nonce),
            metadata: meta,
            sender_conversation_id: request.conversation_id.clone(),
        })
    }

    async fn read_file(
        &self,
        request: &UploadRequest,
        size: u64,
        session: &TransferSession,
    ) -> Result<Vec<u8>, TransferError> {
        let mut file = tokio::fs::File::open(&request.path).await?;
        let mut plaintext = Vec::with_capacity(size as usize);
        let mut buf = vec![0u8; self.config.io_chunk_bytes.max(1)];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            plaintext.extend_from_slice(&buf[..n]);
            // Hold back the last percent for the cipher pass.
            session.report_percent((plaintext.len() as u64 * 99 / size).min(99) as u8);
        }
        Ok(plaintext)
    }
}
