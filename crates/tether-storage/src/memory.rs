use async_trait::async_trait;
use parking_lot::RwLock;
use tether_core::error::Result;
use tether_core::{PendingDelete, Repository, ShortCode, UrlRecord, UrlStats};

use crate::table::Table;

/// In-memory implementation of the durable store contract.
///
/// Used when no durable backend is configured: every operation succeeds
/// against a process-local table and nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    table: RwLock<Table>,
}

impl MemoryRepository {
    /// Creates an empty in-memory repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a repository pre-populated with records.
    pub fn with_records(records: impl IntoIterator<Item = UrlRecord>) -> Self {
        let mut table = Table::default();
        for record in records {
            table.apply_insert(record);
        }
        Self {
            table: RwLock::new(table),
        }
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn read_all(&self) -> Result<Vec<UrlRecord>> {
        Ok(self.table.read().records())
    }

    async fn create(&self, record: &UrlRecord) -> Result<()> {
        let mut table = self.table.write();
        table.check_insert(record)?;
        table.apply_insert(record.clone());
        Ok(())
    }

    async fn create_batch(&self, records: &[UrlRecord]) -> Result<()> {
        let mut table = self.table.write();
        table.check_batch(records)?;
        for record in records {
            table.apply_insert(record.clone());
        }
        Ok(())
    }

    async fn mark_deleted(&self, items: &[PendingDelete]) -> Result<u64> {
        Ok(self.table.write().mark_deleted(items))
    }

    async fn is_deleted(&self, code: &ShortCode) -> Result<bool> {
        Ok(self.table.read().is_deleted(code))
    }

    async fn read_user_urls(&self, owner_id: i64) -> Result<Vec<UrlRecord>> {
        Ok(self.table.read().user_records(owner_id))
    }

    async fn stats(&self) -> Result<UrlStats> {
        Ok(self.table.read().stats())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tether_core::StorageError;

    fn record(sequence: u64, code: &str, url: &str) -> UrlRecord {
        UrlRecord {
            sequence,
            code: ShortCode::new_unchecked(code),
            original_url: url.to_string(),
            owner_id: 1,
        }
    }

    #[tokio::test]
    async fn create_and_read_all() {
        let repo = MemoryRepository::new();

        repo.create(&record(0, "aaaaaaa", "https://a.example"))
            .await
            .unwrap();
        repo.create(&record(1, "bbbbbbb", "https://b.example"))
            .await
            .unwrap();

        let all = repo.read_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].code.as_str(), "aaaaaaa");
    }

    #[tokio::test]
    async fn create_duplicate_original_returns_winner() {
        let repo = MemoryRepository::new();
        repo.create(&record(0, "aaaaaaa", "https://a.example"))
            .await
            .unwrap();

        let err = repo
            .create(&record(1, "bbbbbbb", "https://a.example"))
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Duplicate(code) if code.as_str() == "aaaaaaa"));
        assert_eq!(repo.read_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn create_batch_is_all_or_nothing() {
        let repo = MemoryRepository::new();
        repo.create(&record(0, "aaaaaaa", "https://a.example"))
            .await
            .unwrap();

        let batch = [
            record(1, "bbbbbbb", "https://b.example"),
            record(2, "ccccccc", "https://a.example"),
        ];
        assert!(repo.create_batch(&batch).await.is_err());
        assert_eq!(repo.read_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn mark_deleted_and_is_deleted() {
        let repo = MemoryRepository::with_records([record(0, "aaaaaaa", "https://a.example")]);
        let code = ShortCode::new_unchecked("aaaaaaa");

        assert!(!repo.is_deleted(&code).await.unwrap());
        let changed = repo
            .mark_deleted(&[PendingDelete {
                code: code.clone(),
                owner_id: 1,
            }])
            .await
            .unwrap();

        assert_eq!(changed, 1);
        assert!(repo.is_deleted(&code).await.unwrap());
        assert!(!repo
            .is_deleted(&ShortCode::new_unchecked("unknown"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn concurrent_creates_of_same_original_keep_one_record() {
        let repo = Arc::new(MemoryRepository::new());
        let mut handles = vec![];

        for i in 0..10u8 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                let code = format!("code{}", char::from(b'a' + i));
                repo.create(&record(i as u64, &code, "https://same.example"))
                    .await
            }));
        }

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                created += 1;
            }
        }

        assert_eq!(created, 1);
        assert_eq!(repo.read_all().await.unwrap().len(), 1);
    }
}
