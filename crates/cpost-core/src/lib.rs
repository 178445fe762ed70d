//! cpost-core: shared types, error taxonomy, and configuration for CipherPost

pub mod config;
pub mod error;
pub mod types;

pub use error::{StageFailure, TransferError, TransferResult};
pub use types::{
    AttachmentDescriptor, AttachmentMeta, ProgressEvent, TransferDirection, TransferStage,
};
