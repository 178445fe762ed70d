//! cpost-storage: the storage collaborator boundary
//!
//! The pipeline depends only on the [`StorageClient`] contract: accept an
//! opaque binary blob plus small metadata fields and return `{file_id,
//! file_url}`, and retrieve the same blob by url. The blob is always
//! ciphertext by the time it reaches this crate — storage never sees
//! plaintext.
//!
//! Two implementations: [`OpendalStorage`] for any S3-compatible endpoint,
//! and [`MemoryStorage`] with fault-injection knobs for tests.

pub mod client;
pub mod memory;
pub mod operator;
pub mod s3;

pub use client::{ProgressFn, StorageClient, StorageError, StoredObject};
pub use memory::MemoryStorage;
pub use operator::build_operator;
pub use s3::OpendalStorage;
