use crate::error::Result;
use crate::shortcode::ShortCode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A stored URL record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRecord {
    /// Legacy row identifier. Monotonic, not necessarily gap-free.
    pub sequence: u64,
    /// The short code minted for the original URL.
    pub code: ShortCode,
    /// The original URL that was shortened.
    pub original_url: String,
    /// The user that created the record.
    pub owner_id: i64,
}

/// A deletion request waiting to be flushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDelete {
    pub code: ShortCode,
    pub owner_id: i64,
}

/// Live record and owner counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlStats {
    pub urls: u64,
    pub owners: u64,
}

/// The durable store contract.
///
/// Implementations persist records and answer ownership and liveness
/// questions. The in-memory registry is always consulted before a write
/// reaches the store.
#[async_trait]
pub trait Repository: Send + Sync + 'static {
    /// Returns every stored record, deleted ones included.
    async fn read_all(&self) -> Result<Vec<UrlRecord>>;

    /// Inserts a single record.
    ///
    /// Returns `Err(Duplicate(code))` with the already stored code when the
    /// original URL exists, and `Err(Conflict)` when the short code is taken.
    async fn create(&self, record: &UrlRecord) -> Result<()>;

    /// Inserts many records. All-or-nothing where the backend supports it.
    async fn create_batch(&self, records: &[UrlRecord]) -> Result<()>;

    /// Marks records as deleted.
    ///
    /// Each item is applied only if the stored owner matches `owner_id`.
    /// Returns the number of records that changed state.
    async fn mark_deleted(&self, items: &[PendingDelete]) -> Result<u64>;

    /// Returns whether the code is marked deleted. Unknown codes are not deleted.
    async fn is_deleted(&self, code: &ShortCode) -> Result<bool>;

    /// Returns the live records created by `owner_id`.
    async fn read_user_urls(&self, owner_id: i64) -> Result<Vec<UrlRecord>>;

    /// Counts live records and the distinct owners of live records.
    async fn stats(&self) -> Result<UrlStats>;

    /// Checks that the backend is reachable.
    async fn ping(&self) -> Result<()>;
}
