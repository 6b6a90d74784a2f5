use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tether_core::error::{Result, StorageError};
use tether_core::{PendingDelete, Repository, ShortCode, UrlRecord, UrlStats};
use tether_storage::MemoryRepository;

/// Memory store that records deletion batches and can be made to fail or hang.
#[derive(Debug, Default)]
pub(crate) struct RecordingRepository {
    inner: MemoryRepository,
    deletes: Mutex<Vec<Vec<PendingDelete>>>,
    creates: AtomicUsize,
    fail: AtomicBool,
    stall: AtomicBool,
}

impl RecordingRepository {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_records(records: impl IntoIterator<Item = UrlRecord>) -> Self {
        Self {
            inner: MemoryRepository::with_records(records),
            ..Self::default()
        }
    }

    pub(crate) fn fail_deletes(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn stall_deletes(&self, stall: bool) {
        self.stall.store(stall, Ordering::SeqCst);
    }

    pub(crate) fn delete_calls(&self) -> Vec<Vec<PendingDelete>> {
        self.deletes.lock().clone()
    }

    /// Number of `create` and `create_batch` calls that reached the store.
    pub(crate) fn create_calls(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Repository for RecordingRepository {
    async fn read_all(&self) -> Result<Vec<UrlRecord>> {
        self.inner.read_all().await
    }

    async fn create(&self, record: &UrlRecord) -> Result<()> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.inner.create(record).await
    }

    async fn create_batch(&self, records: &[UrlRecord]) -> Result<()> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.inner.create_batch(records).await
    }

    async fn mark_deleted(&self, items: &[PendingDelete]) -> Result<u64> {
        self.deletes.lock().push(items.to_vec());
        if self.stall.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("injected failure".to_string()));
        }
        self.inner.mark_deleted(items).await
    }

    async fn is_deleted(&self, code: &ShortCode) -> Result<bool> {
        self.inner.is_deleted(code).await
    }

    async fn read_user_urls(&self, owner_id: i64) -> Result<Vec<UrlRecord>> {
        self.inner.read_user_urls(owner_id).await
    }

    async fn stats(&self) -> Result<UrlStats> {
        self.inner.stats().await
    }

    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }
}
