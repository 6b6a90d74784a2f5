use crate::repository::{UrlRecord, UrlStats};
use crate::shortcode::ShortCode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

type Result<T> = std::result::Result<T, crate::error::ShortenerError>;

/// Parameters for creating a shortened URL.
#[derive(Debug, Clone)]
pub struct ShortenParams {
    /// The original URL to be shortened.
    pub original_url: String,
    /// The user creating the link.
    pub owner_id: i64,
    /// Optional seed for reproducible code generation.
    pub seed: Option<u64>,
}

/// Whether a create call minted a new code or found an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortenStatus {
    Created,
    /// The original URL already had a code. Transports report this as a conflict.
    Existing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortened {
    pub code: ShortCode,
    pub status: ShortenStatus,
}

impl Shortened {
    pub fn is_conflict(&self) -> bool {
        self.status == ShortenStatus::Existing
    }
}

/// One entry of a batch create request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    pub correlation_id: String,
    pub original_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub correlation_id: String,
    pub code: ShortCode,
}

#[async_trait]
pub trait Shortener: Send + Sync + 'static {
    /// Creates a shortened URL, or returns the code already minted for it.
    async fn shorten(&self, params: ShortenParams) -> Result<Shortened>;

    /// Creates shortened URLs for a batch. Results keep the input order.
    async fn shorten_batch(
        &self,
        items: Vec<BatchItem>,
        owner_id: i64,
        seed: Option<u64>,
    ) -> Result<Vec<BatchResult>>;

    /// Resolves a short code to its original URL.
    ///
    /// Fails with `NotFound` for unknown codes and `AlreadyDeleted` for
    /// codes whose record has been deleted.
    async fn resolve(&self, code: &ShortCode) -> Result<String>;

    /// Schedules deletion of the owner's codes. Fire-and-forget.
    async fn delete_user_urls(&self, codes: Vec<ShortCode>, owner_id: i64);

    /// Lists the live records created by the owner.
    async fn user_urls(&self, owner_id: i64) -> Result<Vec<UrlRecord>>;

    /// Counts live records and their distinct owners.
    async fn stats(&self) -> Result<UrlStats>;
}
