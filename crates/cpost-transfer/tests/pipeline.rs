//! End-to-end pipeline scenarios against a simulated storage backend.
//!
//! Models the two parties of a conversation on separate key stores (the
//! receiver imports the sender's key, standing in for out-of-band key
//! exchange) sharing one remote blob store.

use rand::RngCore;
use std::path::PathBuf;

use cpost_core::config::TransferConfig;
use cpost_core::error::TransferError;
use cpost_core::types::{AttachmentDescriptor, ProgressEvent, TransferDirection, TransferStage};
use cpost_crypto::ConversationKey;
use cpost_keystore::{KeyStore, MemoryKeyStore};
use cpost_storage::{MemoryStorage, StorageClient};
use cpost_transfer::{TransferPipeline, TransferSession, UploadRequest};

fn small_config() -> TransferConfig {
    TransferConfig {
        max_attachment_bytes: 8 * 1024 * 1024,
        io_chunk_bytes: 64 * 1024,
    }
}

fn write_temp_file(dir: &tempfile::TempDir, name: &str, len: usize) -> (PathBuf, Vec<u8>) {
    let mut content = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut content);
    let path = dir.path().join(name);
    std::fs::write(&path, &content).unwrap();
    (path, content)
}

fn request(path: PathBuf, conversation_id: &str) -> UploadRequest {
    UploadRequest {
        path,
        file_name: None,
        mime_type: "application/octet-stream".into(),
        conversation_id: conversation_id.into(),
        recipient_id: Some("party-b".into()),
    }
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        events.push(ev);
    }
    events
}

async fn upload(
    pipeline: &TransferPipeline<MemoryStorage>,
    key: &ConversationKey,
    req: &UploadRequest,
) -> AttachmentDescriptor {
    let session = TransferSession::new(TransferDirection::Upload);
    pipeline.encrypt_and_upload(key, req, &session).await.unwrap()
}

#[tokio::test]
async fn happy_path_send_and_receive_2mb() {
    let tmp = tempfile::tempdir().unwrap();
    let (path, content) = write_temp_file(&tmp, "holiday.mp4", 2 * 1024 * 1024);

    let pipeline = TransferPipeline::new(MemoryStorage::default(), small_config());

    // Party A creates the conversation key and sends.
    let store_a = MemoryKeyStore::new();
    let key_a = store_a.get_or_create_key("chat-42").await.unwrap();
    let descriptor = upload(&pipeline, &key_a, &request(path, "chat-42")).await;

    assert!(descriptor.encrypted);
    assert_eq!(descriptor.metadata.file_name, "holiday.mp4");
    assert_eq!(descriptor.metadata.size, content.len() as u64);

    // The stored blob must not contain the plaintext.
    let stored = pipeline
        .storage()
        .fetch(&descriptor.file_url, None)
        .await
        .unwrap();
    assert_ne!(stored, content);

    // Party B receives the same key out-of-band, then downloads.
    let store_b = MemoryKeyStore::new();
    store_b.import_key(&key_a).await.unwrap();
    let key_b = store_b.get_or_create_key("chat-42").await.unwrap();

    let session = TransferSession::new(TransferDirection::Download);
    let restored = pipeline
        .download_and_decrypt(&key_b, &descriptor, &session)
        .await
        .unwrap();

    assert_eq!(restored.bytes, content, "byte-for-byte recovery");
    assert_eq!(restored.file_name, "holiday.mp4");
    assert_eq!(session.stage(), TransferStage::Complete);
}

#[tokio::test]
async fn descriptor_survives_message_transport_as_json() {
    let tmp = tempfile::tempdir().unwrap();
    let (path, content) = write_temp_file(&tmp, "note.txt", 512);

    let pipeline = TransferPipeline::new(MemoryStorage::default(), small_config());
    let key = ConversationKey::generate("chat-42");
    let descriptor = upload(&pipeline, &key, &request(path, "chat-42")).await;

    // Round-trip through JSON, as the chat message model would carry it.
    let carried = AttachmentDescriptor::from_json(&descriptor.to_json().unwrap()).unwrap();

    let session = TransferSession::new(TransferDirection::Download);
    let restored = pipeline
        .download_and_decrypt(&key, &carried, &session)
        .await
        .unwrap();
    assert_eq!(restored.bytes, content);
}

#[tokio::test]
async fn corrupted_storage_yields_integrity_error() {
    let tmp = tempfile::tempdir().unwrap();
    let (path, _) = write_temp_file(&tmp, "report.pdf", 100 * 1024);

    let pipeline = TransferPipeline::new(MemoryStorage::default(), small_config());
    let key = ConversationKey::generate("chat-42");
    let descriptor = upload(&pipeline, &key, &request(path, "chat-42")).await;

    pipeline.storage().corrupt_byte(&descriptor.file_url, 1234);

    let session = TransferSession::new(TransferDirection::Download);
    let err = pipeline
        .download_and_decrypt(&key, &descriptor, &session)
        .await
        .unwrap_err();

    assert!(
        matches!(err.error, TransferError::Integrity(_)),
        "corruption must surface as integrity, got: {err}"
    );
    assert_eq!(err.stage, TransferStage::Decrypting);
    assert_eq!(session.failed_at(), Some(TransferStage::Decrypting));
}

#[tokio::test]
async fn wrong_key_yields_integrity_error() {
    let tmp = tempfile::tempdir().unwrap();
    let (path, _) = write_temp_file(&tmp, "secret.png", 64 * 1024);

    let pipeline = TransferPipeline::new(MemoryStorage::default(), small_config());
    let key_a = ConversationKey::generate("chat-42");
    let descriptor = upload(&pipeline, &key_a, &request(path, "chat-42")).await;

    // Party B never got the shared key and generated its own.
    let key_b = ConversationKey::generate("chat-42");

    let session = TransferSession::new(TransferDirection::Download);
    let err = pipeline
        .download_and_decrypt(&key_b, &descriptor, &session)
        .await
        .unwrap_err();

    assert!(matches!(err.error, TransferError::Integrity(_)));
    assert_eq!(err.stage, TransferStage::Decrypting);
}

#[tokio::test]
async fn oversized_file_rejected_before_any_byte_is_sent() {
    let tmp = tempfile::tempdir().unwrap();
    let (path, _) = write_temp_file(&tmp, "huge.iso", 1024 * 1024);

    let storage = MemoryStorage::default();
    let pipeline = TransferPipeline::new(
        storage,
        TransferConfig {
            max_attachment_bytes: 512 * 1024,
            io_chunk_bytes: 64 * 1024,
        },
    );
    let key = ConversationKey::generate("chat-42");

    let session = TransferSession::new(TransferDirection::Upload);
    let mut rx = session.subscribe();
    let err = pipeline
        .encrypt_and_upload(&key, &request(path, "chat-42"), &session)
        .await
        .unwrap_err();

    assert!(matches!(err.error, TransferError::Validation(_)));
    assert_eq!(pipeline.storage().put_count(), 0);
    assert_eq!(pipeline.storage().bytes_written(), 0);

    // No progress UI for validation failures: the only event is the
    // terminal failed one, from idle.
    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].stage, TransferStage::Failed);
    assert_eq!(events[0].failed_at, Some(TransferStage::Idle));
}

#[tokio::test]
async fn empty_file_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("empty.bin");
    std::fs::write(&path, b"").unwrap();

    let pipeline = TransferPipeline::new(MemoryStorage::default(), small_config());
    let key = ConversationKey::generate("chat-42");

    let session = TransferSession::new(TransferDirection::Upload);
    let err = pipeline
        .encrypt_and_upload(&key, &request(path, "chat-42"), &session)
        .await
        .unwrap_err();
    assert!(matches!(err.error, TransferError::Validation(_)));
}

#[tokio::test]
async fn mismatched_key_and_conversation_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let (path, _) = write_temp_file(&tmp, "a.bin", 1024);

    let pipeline = TransferPipeline::new(MemoryStorage::default(), small_config());
    let key = ConversationKey::generate("chat-1");

    let session = TransferSession::new(TransferDirection::Upload);
    let err = pipeline
        .encrypt_and_upload(&key, &request(path, "chat-2"), &session)
        .await
        .unwrap_err();
    assert!(matches!(err.error, TransferError::Validation(_)));
}

#[tokio::test]
async fn upload_transport_failure_is_network_at_uploading() {
    let tmp = tempfile::tempdir().unwrap();
    let (path, _) = write_temp_file(&tmp, "a.bin", 64 * 1024);

    let storage = MemoryStorage::default();
    storage.fail_puts(true);
    let pipeline = TransferPipeline::new(storage, small_config());
    let key = ConversationKey::generate("chat-42");

    let session = TransferSession::new(TransferDirection::Upload);
    let err = pipeline
        .encrypt_and_upload(&key, &request(path, "chat-42"), &session)
        .await
        .unwrap_err();

    assert!(matches!(err.error, TransferError::Network(_)));
    assert_eq!(err.stage, TransferStage::Uploading);
    assert_eq!(session.stage(), TransferStage::Failed);
}

#[tokio::test]
async fn interrupted_upload_cleans_up_partial_object() {
    let tmp = tempfile::tempdir().unwrap();
    let (path, _) = write_temp_file(&tmp, "a.bin", 64 * 1024);

    let storage = MemoryStorage::default();
    storage.fail_puts_midway(true);
    let pipeline = TransferPipeline::new(storage, small_config());
    let key = ConversationKey::generate("chat-42");

    let session = TransferSession::new(TransferDirection::Upload);
    let err = pipeline
        .encrypt_and_upload(&key, &request(path, "chat-42"), &session)
        .await
        .unwrap_err();

    assert!(matches!(err.error, TransferError::Network(_)));
    assert_eq!(err.stage, TransferStage::Uploading);
    // The half-written blob must have been removed, leaving nothing a
    // descriptor could ever point at.
    assert_eq!(pipeline.storage().object_count(), 0);
}

#[tokio::test]
async fn download_transport_failure_is_network_at_downloading() {
    let tmp = tempfile::tempdir().unwrap();
    let (path, _) = write_temp_file(&tmp, "a.bin", 64 * 1024);

    let pipeline = TransferPipeline::new(MemoryStorage::default(), small_config());
    let key = ConversationKey::generate("chat-42");
    let descriptor = upload(&pipeline, &key, &request(path, "chat-42")).await;

    pipeline.storage().fail_fetches(true);

    let session = TransferSession::new(TransferDirection::Download);
    let err = pipeline
        .download_and_decrypt(&key, &descriptor, &session)
        .await
        .unwrap_err();

    assert!(
        matches!(err.error, TransferError::Network(_)),
        "transport failure must not masquerade as integrity"
    );
    assert_eq!(err.stage, TransferStage::Downloading);
}

#[tokio::test]
async fn progress_is_staged_monotonic_and_ends_at_100() {
    let tmp = tempfile::tempdir().unwrap();
    let (path, content) = write_temp_file(&tmp, "big.bin", 2 * 1024 * 1024);

    let pipeline = TransferPipeline::new(MemoryStorage::new(32 * 1024), small_config());
    let key = ConversationKey::generate("chat-42");

    let up_session = TransferSession::new(TransferDirection::Upload);
    let mut up_rx = up_session.subscribe();
    let descriptor = pipeline
        .encrypt_and_upload(&key, &request(path, "chat-42"), &up_session)
        .await
        .unwrap();
    assert_staged_monotonic(
        &drain(&mut up_rx),
        &[
            TransferStage::Encrypting,
            TransferStage::Uploading,
            TransferStage::Complete,
        ],
    );

    let down_session = TransferSession::new(TransferDirection::Download);
    let mut down_rx = down_session.subscribe();
    let restored = pipeline
        .download_and_decrypt(&key, &descriptor, &down_session)
        .await
        .unwrap();
    assert_eq!(restored.bytes, content);
    assert_staged_monotonic(
        &drain(&mut down_rx),
        &[
            TransferStage::Downloading,
            TransferStage::Decrypting,
            TransferStage::Complete,
        ],
    );
}

fn assert_staged_monotonic(events: &[ProgressEvent], expected_order: &[TransferStage]) {
    assert!(!events.is_empty());

    // Stages appear exactly in the expected forward order.
    let mut seen = Vec::new();
    for ev in events {
        if seen.last() != Some(&ev.stage) {
            seen.push(ev.stage);
        }
    }
    assert_eq!(seen, expected_order, "stage order");

    // Percent is non-decreasing within each stage and each working stage
    // reaches a subscriber-visible event; the terminal one is 100.
    let mut last: Option<(TransferStage, u8)> = None;
    for ev in events {
        if let Some((stage, percent)) = last {
            if stage == ev.stage {
                assert!(
                    ev.percent >= percent,
                    "percent regressed within {stage}: {percent} -> {}",
                    ev.percent
                );
            }
        }
        last = Some((ev.stage, ev.percent));
    }
    let final_ev = events.last().unwrap();
    assert_eq!(final_ev.stage, TransferStage::Complete);
    assert_eq!(final_ev.percent, 100);
}

#[tokio::test]
async fn concurrent_transfers_in_different_conversations_are_independent() {
    let tmp = tempfile::tempdir().unwrap();
    let (path_a, content_a) = write_temp_file(&tmp, "a.bin", 256 * 1024);
    let (path_b, content_b) = write_temp_file(&tmp, "b.bin", 256 * 1024);

    let pipeline =
        std::sync::Arc::new(TransferPipeline::new(MemoryStorage::default(), small_config()));
    let key_a = ConversationKey::generate("chat-a");
    let key_b = ConversationKey::generate("chat-b");

    let (desc_a, desc_b) = tokio::join!(
        async {
            let session = TransferSession::new(TransferDirection::Upload);
            pipeline
                .encrypt_and_upload(&key_a, &request(path_a, "chat-a"), &session)
                .await
                .unwrap()
        },
        async {
            let session = TransferSession::new(TransferDirection::Upload);
            pipeline
                .encrypt_and_upload(&key_b, &request(path_b, "chat-b"), &session)
                .await
                .unwrap()
        },
    );

    let session = TransferSession::new(TransferDirection::Download);
    let restored_a = pipeline
        .download_and_decrypt(&key_a, &desc_a, &session)
        .await
        .unwrap();
    let session = TransferSession::new(TransferDirection::Download);
    let restored_b = pipeline
        .download_and_decrypt(&key_b, &desc_b, &session)
        .await
        .unwrap();

    assert_eq!(restored_a.bytes, content_a);
    assert_eq!(restored_b.bytes, content_b);
}
