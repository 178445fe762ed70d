//! cpost-transfer: the per-conversation encrypted attachment pipelines
//!
//! Sending: validate → read → encrypt (fresh random nonce) → upload →
//! [`AttachmentDescriptor`]. Receiving: fetch → decrypt + verify →
//! [`RestoredFile`]. Both directions drive a [`TransferSession`], a
//! forward-only state machine whose `{stage, percent}` events any number
//! of observers can subscribe to.
//!
//! The pipelines hold no state between transfers and touch nothing shared:
//! each call is an independent task, and the conversation key is obtained
//! by the caller (from the key store) before the pipeline starts.
//!
//! [`AttachmentDescriptor`]: cpost_core::types::AttachmentDescriptor

pub mod download;
pub mod pipeline;
pub mod session;
pub mod upload;

pub use download::RestoredFile;
pub use pipeline::TransferPipeline;
pub use session::TransferSession;
pub use upload::UploadRequest;
