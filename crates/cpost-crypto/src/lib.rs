//! cpost-crypto: authenticated encryption for chat attachments
//!
//! One symmetric key per conversation, XChaCha20-Poly1305 over the whole
//! payload:
//!
//! ```text
//! plaintext file → encrypt(key, random 192-bit nonce) → ciphertext + tag → upload
//! ```
//!
//! The nonce is NOT prepended to the ciphertext. It travels separately in
//! the attachment descriptor, so the download side feeds `decrypt` the
//! exact inputs the sender used. The engine is pure with respect to its
//! inputs: no I/O, no hidden state.

pub mod engine;
pub mod key;

pub use engine::{decrypt, encrypt, generate_nonce, CryptoError};
pub use key::ConversationKey;

/// Size of a conversation key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;
