use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tether_core::error::{Result, StorageError};
use tether_core::{PendingDelete, Repository, ShortCode, UrlRecord, UrlStats};
use tracing::warn;

/// Default bound on a single store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);

/// A repository decorator that bounds every call with a timeout.
///
/// A stalled backend surfaces as [`StorageError::Timeout`] instead of
/// blocking the caller, which matters most for the deletion coordinator.
#[derive(Debug, Clone)]
pub struct TimeoutRepository<R> {
    inner: R,
    timeout: Duration,
}

impl<R: Repository> TimeoutRepository<R> {
    pub fn new(inner: R, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn with_default_timeout(inner: R) -> Self {
        Self::new(inner, DEFAULT_STORE_TIMEOUT)
    }

    /// Returns a reference to the inner repository.
    pub fn inner(&self) -> &R {
        &self.inner
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T>> + Send,
    ) -> Result<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, timeout = ?self.timeout, "store call timed out");
                Err(StorageError::Timeout(format!(
                    "{operation} exceeded {:?}",
                    self.timeout
                )))
            }
        }
    }
}

#[async_trait]
impl<R: Repository> Repository for TimeoutRepository<R> {
    async fn read_all(&self) -> Result<Vec<UrlRecord>> {
        self.bounded("read_all", self.inner.read_all()).await
    }

    async fn create(&self, record: &UrlRecord) -> Result<()> {
        self.bounded("create", self.inner.create(record)).await
    }

    async fn create_batch(&self, records: &[UrlRecord]) -> Result<()> {
        self.bounded("create_batch", self.inner.create_batch(records))
            .await
    }

    async fn mark_deleted(&self, items: &[PendingDelete]) -> Result<u64> {
        self.bounded("mark_deleted", self.inner.mark_deleted(items))
            .await
    }

    async fn is_deleted(&self, code: &ShortCode) -> Result<bool> {
        self.bounded("is_deleted", self.inner.is_deleted(code)).await
    }

    async fn read_user_urls(&self, owner_id: i64) -> Result<Vec<UrlRecord>> {
        self.bounded("read_user_urls", self.inner.read_user_urls(owner_id))
            .await
    }

    async fn stats(&self) -> Result<UrlStats> {
        self.bounded("stats", self.inner.stats()).await
    }

    async fn ping(&self) -> Result<()> {
        self.bounded("ping", self.inner.ping()).await
    }
}
