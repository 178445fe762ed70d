//! In-memory storage fake with fault injection
//!
//! Stands in for the remote blob store in tests: same chunked progress
//! behavior as the real client, plus knobs to fail transfers and corrupt
//! stored bytes so the pipeline's network/integrity error paths can be
//! exercised deterministically.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use cpost_core::types::AttachmentMeta;

use crate::client::{ProgressFn, StorageClient, StorageError, StoredObject};

pub struct MemoryStorage {
    objects: Mutex<HashMap<String, (Vec<u8>, AttachmentMeta)>>,
    chunk_bytes: usize,
    fail_puts: AtomicBool,
    fail_puts_midway: AtomicBool,
    fail_fetches: AtomicBool,
    put_count: AtomicUsize,
    bytes_written: AtomicUsize,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new(64 * 1024)
    }
}

impl MemoryStorage {
    pub fn new(chunk_bytes: usize) -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            chunk_bytes: chunk_bytes.max(1),
            fail_puts: AtomicBool::new(false),
            fail_puts_midway: AtomicBool::new(false),
            fail_fetches: AtomicBool::new(false),
            put_count: AtomicUsize::new(0),
            bytes_written: AtomicUsize::new(0),
        }
    }

    /// Make subsequent `put` calls fail with a transport error.
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `put` calls fail after half the payload has landed,
    /// leaving a partial object for the caller to clean up.
    pub fn fail_puts_midway(&self, fail: bool) {
        self.fail_puts_midway.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `fetch` calls fail with a transport error.
    pub fn fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    /// XOR one stored byte, simulating storage-side corruption.
    pub fn corrupt_byte(&self, file_url: &str, index: usize) {
        let mut objects = self.objects.lock().unwrap();
        if let Some((data, _)) = objects.get_mut(file_url) {
            if let Some(b) = data.get_mut(index) {
                *b ^= 0xFF;
            }
        }
    }

    /// Number of successful `put` calls so far.
    pub fn put_count(&self) -> usize {
        self.put_count.load(Ordering::SeqCst)
    }

    /// Total payload bytes accepted across all `put` calls.
    pub fn bytes_written(&self) -> usize {
        self.bytes_written.load(Ordering::SeqCst)
    }

    /// Number of objects currently held, partial or complete.
    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn stored_meta(&self, file_url: &str) -> Option<AttachmentMeta> {
        self.objects
            .lock()
            .unwrap()
            .get(file_url)
            .map(|(_, m)| m.clone())
    }

    fn url_for(file_id: &str) -> String {
        format!("mem/{file_id}")
    }
}

#[async_trait]
impl StorageClient for MemoryStorage {
    async fn put(
        &self,
        file_id: &str,
        payload: &[u8],
        meta: &AttachmentMeta,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<StoredObject, StorageError> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StorageError::Transport("simulated upload failure".into()));
        }

        let file_url = Self::url_for(file_id);
        let total = payload.len() as u64;

        if self.fail_puts_midway.load(Ordering::SeqCst) {
            let half = payload.len() / 2;
            self.objects
                .lock()
                .unwrap()
                .insert(file_url, (payload[..half].to_vec(), meta.clone()));
            return Err(StorageError::Transport(
                "simulated mid-upload failure".into(),
            ));
        }

        let mut written = 0u64;
        for chunk in payload.chunks(self.chunk_bytes) {
            written += chunk.len() as u64;
            if let Some(cb) = progress {
                cb(written, total);
            }
            tokio::task::yield_now().await;
        }

        self.objects
            .lock()
            .unwrap()
            .insert(file_url.clone(), (payload.to_vec(), meta.clone()));
        self.put_count.fetch_add(1, Ordering::SeqCst);
        self.bytes_written.fetch_add(payload.len(), Ordering::SeqCst);

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
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(StorageError::Transport("simulated download failure".into()));
        }

        let data = {
            let objects = self.objects.lock().unwrap();
            objects
                .get(file_url)
                .map(|(d, _)| d.clone())
                .ok_or_else(|| StorageError::NotFound(file_url.to_string()))?
        };

        let total = data.len() as u64;
        let mut read = 0u64;
        for chunk in data.chunks(self.chunk_bytes) {
            read += chunk.len() as u64;
            if let Some(cb) = progress {
                cb(read, total);
            }
            tokio::task::yield_now().await;
        }

        Ok(data)
    }

    async fn delete(&self, file_id: &str) -> Result<(), StorageError> {
        self.objects.lock().unwrap().remove(&Self::url_for(file_id));
        Ok(())
    }
}
