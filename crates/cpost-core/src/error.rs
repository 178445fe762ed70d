use thiserror::Error;

use crate::types::TransferStage;

pub type TransferResult<T> = Result<T, TransferError>;

/// Failure taxonomy for the attachment pipeline.
///
/// `Network` and `Integrity` are deliberately separate variants: a network
/// failure is retryable, while an integrity failure means a wrong
/// conversation key or tampered ciphertext and retrying cannot fix it.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Malformed or oversized input; caller-correctable, nothing was sent.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Local key persistence failed. Fatal to the transfer: generating a
    /// throwaway key instead would leave the receiver unable to decrypt.
    #[error("key store unavailable: {0}")]
    KeyStore(String),

    /// Malformed key/nonce length or other misuse of the crypto engine.
    #[error("invalid crypto parameters: {0}")]
    InvalidParameters(String),

    /// The AEAD primitive itself failed during encryption.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Transport failure while talking to the storage backend.
    #[error("network error: {0}")]
    Network(String),

    /// Authenticated decryption failed: wrong key or tampered ciphertext.
    #[error("integrity verification failed: {0}")]
    Integrity(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A pipeline error annotated with the stage it occurred in, so the UI can
/// distinguish "failed while uploading" from "failed while decrypting".
#[derive(Debug, Error)]
#[error("{error} (failed during {stage})")]
pub struct StageFailure {
    pub stage: TransferStage,
    #[source]
    pub error: TransferError,
}

impl StageFailure {
    pub fn new(stage: TransferStage, error: TransferError) -> Self {
        Self { stage, error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_failure_display_names_stage() {
        let f = StageFailure::new(
            TransferStage::Decrypting,
            TransferError::Integrity("tag mismatch".into()),
        );
        let msg = f.to_string();
        assert!(msg.contains("decrypting"), "got: {msg}");
        assert!(msg.contains("integrity"), "got: {msg}");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: TransferError = io.into();
        assert!(matches!(err, TransferError::Io(_)));
    }
}
