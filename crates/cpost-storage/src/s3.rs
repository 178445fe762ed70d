//! S3-compatible `StorageClient` over an OpenDAL Operator
//!
//! Layout in the bucket:
//! ```text
//! {prefix}/{file_id}       — ciphertext blob
//! {prefix}/{file_id}.meta  — JSON metadata sidecar (filename/size/type)
//! ```
//! The blob is written through a chunked writer and read back through
//! ranged reads, so both directions can feed byte-level progress to the
//! transfer session.

use async_trait::async_trait;
use opendal::Operator;

use cpost_core::types::AttachmentMeta;

use crate::client::{ProgressFn, StorageClient, StorageError, StoredObject};

pub struct OpendalStorage {
    op: Operator,
    prefix: String,
    chunk_bytes: usize,
}

impl OpendalStorage {
    pub fn new(op: Operator, prefix: impl Into<String>, chunk_bytes: usize) -> Self {
        Self {
            op,
            prefix: prefix.into().trim_end_matches('/').to_string(),
            chunk_bytes: chunk_bytes.max(1),
        }
    }

    fn blob_key(&self, file_id: &str) -> String {
        format!("{}/{file_id}", self.prefix)
    }

    fn meta_key(file_url: &str) -> String {
        format!("{file_url}.meta")
    }

    fn map_err(context: &str, e: opendal::Error) -> StorageError {
        if e.kind() == opendal::ErrorKind::NotFound {
            StorageError::NotFound(context.to_string())
        } else {
            StorageError::Transport(format!("{context}: {e}"))
        }
    }
}

#[async_trait]
impl StorageClient for OpendalStorage {
    async fn put(
        &self,
        file_id: &str,
        payload: &[u8],
        meta: &AttachmentMeta,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<StoredObject, StorageError> {
        let file_url = self.blob_key(file_id);
        let total = payload.len() as u64;

        let mut writer = self
            .op
            .writer(&file_url)
            .await
            .map_err(|e| Self::map_err("opening writer", e))?;

        let mut written = 0u64;
        for chunk in payload.chunks(self.chunk_bytes) {
            writer
                .write(chunk.to_vec())
                .await
                .map_err(|e| Self::map_err("writing blob chunk", e))?;
            written += chunk.len() as u64;
            if let Some(cb) = progress {
                cb(written, total);
            }
        }
        writer
            .close()
            .await
            .map_err(|e| Self::map_err("closing writer", e))?;

        // Sidecar after the blob: if it fails, remove the orphaned blob so
        // nothing half-stored remains referenced.
        let meta_json = serde_json::to_vec(meta)
            .map_err(|e| StorageError::Transport(format!("serializing metadata: {e}")))?;
        if let Err(e) = self.op.write(&Self::meta_key(&file_url), meta_json).await {
            if let Err(del) = self.op.delete(&file_url).await {
                tracing::warn!(url = %file_url, "orphaned blob cleanup failed: {del}");
            }
            return Err(Self::map_err("writing metadata sidecar", e));
        }

        tracing::debug!(url = %file_url, bytes = total, "stored attachment blob");
        Ok(StoredObject {
            file_id: file_id.to_string(),
            file_url,
        })
    }

    async fn fetch(
        &self,
        file_url: &str,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<Vec<u8>, StorageError> {
        let stat = self
            .op
            .stat(file_url)
            .await
            .map_err(|e| Self::map_err(file_url, e))?;
        let total = stat.content_length();

        let mut assembled = Vec::with_capacity(total as usize);
        let mut offset = 0u64;
        while offset < total {
            let end = (offset + self.chunk_bytes as u64).min(total);
            let buf = self
                .op
                .read_with(file_url)
                .range(offset..end)
                .await
                .map_err(|e| Self::map_err("reading blob range", e))?;
            assembled.extend_from_slice(&buf.to_bytes());
            offset = end;
            if let Some(cb) = progress {
                cb(offset, total);
            }
        }

        tracing::debug!(url = %file_url, bytes = total, "fetched attachment blob");
        Ok(assembled)
    }

    async fn delete(&self, file_id: &str) -> Result<(), StorageError> {
        let file_url = self.blob_key(file_id);
        self.op
            .delete(&file_url)
            .await
            .map_err(|e| Self::map_err("deleting blob", e))?;
        self.op
            .delete(&Self::meta_key(&file_url))
            .await
            .map_err(|e| Self::map_err("deleting metadata sidecar", e))?;
        Ok(())
    }
}
