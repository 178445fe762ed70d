//! Pipeline wiring: storage collaborator + transfer limits

use cpost_core::config::TransferConfig;
use cpost_core::error::TransferError;
use cpost_crypto::CryptoError;
use cpost_storage::{StorageClient, StorageError};

/// Both attachment pipelines, bound to one storage collaborator.
///
/// Construct once and share: the pipeline itself is stateless between
/// transfers, so one instance serves any number of concurrent sessions.
pub struct TransferPipeline<S> {
    pub(crate) storage: S,
    pub(crate) config: TransferConfig,
}

impl<S: StorageClient> TransferPipeline<S> {
    pub fn new(storage: S, config: TransferConfig) -> Self {
        Self { storage, config }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }
}

pub(crate) fn from_crypto(e: CryptoError) -> TransferError {
    match e {
        CryptoError::InvalidParameters(msg) => TransferError::InvalidParameters(msg),
        CryptoError::Encryption(msg) => TransferError::Encryption(msg),
        CryptoError::Integrity => {
            TransferError::Integrity("wrong conversation key or tampered ciphertext".into())
        }
    }
}

pub(crate) fn from_storage(e: StorageError) -> TransferError {
    TransferError::Network(e.to_string())
}
