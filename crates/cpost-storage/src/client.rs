//! The storage capability interface the pipelines are written against

use async_trait::async_trait;
use cpost_core::types::AttachmentMeta;
use thiserror::Error;

/// Byte-level progress callback: `(bytes_done, bytes_total)`.
pub type ProgressFn<'a> = &'a (dyn Fn(u64, u64) + Send + Sync);

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    /// Transport failure talking to the backend; retryable by the caller.
    #[error("storage transport failure: {0}")]
    Transport(String),
}

/// Identity of a stored blob: the caller's `file_id` plus the
/// backend-chosen url it was stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub file_id: String,
    pub file_url: String,
}

/// Capability interface for the ciphertext blob store.
///
/// Implementations must be content-agnostic: the payload is opaque bytes
/// (ciphertext), the metadata is the handful of plaintext fields from the
/// attachment descriptor. No implementation may inspect or transform the
/// payload.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Store a blob plus its metadata under the caller-assigned `file_id`,
    /// returning `{file_id, file_url}`. `progress` receives byte counts as
    /// the transfer advances. A failed put may leave a partial object
    /// behind; callers clean it up with `delete` on the same `file_id`.
    async fn put(
        &self,
        file_id: &str,
        payload: &[u8],
        meta: &AttachmentMeta,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<StoredObject, StorageError>;

    /// Retrieve a blob by the url `put` returned.
    async fn fetch(
        &self,
        file_url: &str,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<Vec<u8>, StorageError>;

    /// Remove whatever was stored under `file_id`, partial or complete,
    /// along with any metadata sidecar.
    async fn delete(&self, file_id: &str) -> Result<(), StorageError>;
}
