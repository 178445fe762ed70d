//! OpenDAL Operator factory for the attachment bucket

use anyhow::{Context, Result};
use opendal::Operator;

use cpost_core::config::StorageConfig;

/// Build the operator backing `OpendalStorage` from the `[storage]`
/// configuration section.
///
/// Works against any S3-compatible endpoint; addressing is path-style, so
/// self-hosted backends like MinIO need no virtual-host DNS setup. A
/// plaintext `http://` endpoint is rejected outright when `enforce_tls`
/// is on, and logged loudly when it is off.
pub fn build_operator(
    cfg: &StorageConfig,
    access_key_id: &str,
    secret_access_key: &str,
) -> Result<Operator> {
    if cfg.endpoint.starts_with("http://") {
        if cfg.enforce_tls {
            anyhow::bail!(
                "refusing plaintext endpoint {} while storage.enforce_tls is on; \
                 switch to https:// or disable enforce_tls for local testing",
                cfg.endpoint
            );
        }
        tracing::warn!(
            endpoint = %cfg.endpoint,
            "talking to the attachment store over plaintext HTTP; anyone on the \
             path can read credentials and ciphertext metadata"
        );
    }

    let builder = opendal::services::S3::default()
        .endpoint(&cfg.endpoint)
        .region(&cfg.region)
        .bucket(&cfg.bucket)
        .access_key_id(access_key_id)
        .secret_access_key(secret_access_key);

    let op = Operator::new(builder)
        .context("initializing attachment store operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(5)
                .with_jitter(),
        )
        .finish();

    Ok(op)
}
