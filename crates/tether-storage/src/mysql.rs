use async_trait::async_trait;
use jiff::Timestamp;
use sqlx::mysql::MySqlRow;
use sqlx::{MySql, MySqlPool, QueryBuilder, Row};
use tether_core::error::{Result, StorageError};
use tether_core::{PendingDelete, Repository, ShortCode, UrlRecord, UrlStats};
use tracing::debug;

/// Schema of the `short_urls` table.
pub const SCHEMA: &str = include_str!("../ddl/mysql/short_urls.sql");

/// MySQL implementation of the durable store contract.
///
/// Soft delete is implemented with `deleted_at`. Short codes and original
/// URLs stay unique across deleted rows, so a deleted code is never reused
/// and a deleted original URL keeps resolving to its old code.
#[derive(Debug, Clone)]
pub struct MySqlRepository {
    pool: MySqlPool,
}

impl MySqlRepository {
    /// Creates a repository from an existing MySQL connection pool.
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Creates a repository by opening a new MySQL connection pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = MySqlPool::connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }

    /// Creates the `short_urls` table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    async fn code_for_original(&self, original_url: &str) -> Result<Option<ShortCode>> {
        let row = sqlx::query(
            r#"
            SELECT short_code
            FROM short_urls
            WHERE original_url = ?
            LIMIT 1
            "#,
        )
        .bind(original_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(|row| {
            row.try_get::<String, _>("short_code")
                .map(ShortCode::new_unchecked)
                .map_err(map_sqlx_error)
        })
        .transpose()
    }

    /// Maps a unique violation on insert to `Duplicate` when the original URL
    /// is taken, and to `Conflict` otherwise.
    async fn unique_violation(&self, record: &UrlRecord) -> StorageError {
        match self.code_for_original(&record.original_url).await {
            Ok(Some(existing)) => StorageError::Duplicate(existing),
            Ok(None) => StorageError::Conflict(record.code.to_string()),
            Err(err) => err,
        }
    }
}

fn now_unix_seconds() -> i64 {
    Timestamp::now().as_second()
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation())
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

fn record_from_row(row: &MySqlRow) -> Result<UrlRecord> {
    let sequence: u64 = row.try_get("sequence").map_err(map_sqlx_error)?;
    let code: String = row.try_get("short_code").map_err(map_sqlx_error)?;
    let original_url: String = row.try_get("original_url").map_err(map_sqlx_error)?;
    let owner_id: i64 = row.try_get("owner_id").map_err(map_sqlx_error)?;

    Ok(UrlRecord {
        sequence,
        code: ShortCode::new_unchecked(code),
        original_url,
        owner_id,
    })
}

#[async_trait]
impl Repository for MySqlRepository {
    async fn read_all(&self) -> Result<Vec<UrlRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT sequence, short_code, original_url, owner_id
            FROM short_urls
            ORDER BY sequence
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(record_from_row).collect()
    }

    async fn create(&self, record: &UrlRecord) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO short_urls (sequence, short_code, original_url, owner_id, deleted_at)
            VALUES (?, ?, ?, ?, NULL)
            "#,
        )
        .bind(record.sequence)
        .bind(record.code.as_str())
        .bind(&record.original_url)
        .bind(record.owner_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(self.unique_violation(record).await),
            Err(err) => Err(map_sqlx_error(err)),
        }
    }

    async fn create_batch(&self, records: &[UrlRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut builder: QueryBuilder<'_, MySql> = QueryBuilder::new(
            "INSERT INTO short_urls (sequence, short_code, original_url, owner_id, deleted_at) ",
        );
        builder.push_values(records, |mut row, record| {
            row.push_bind(record.sequence)
                .push_bind(record.code.as_str())
                .push_bind(record.original_url.as_str())
                .push_bind(record.owner_id)
                .push_bind(None::<i64>);
        });

        // A single multi-row statement is atomic under InnoDB.
        let result = builder.build().execute(&self.pool).await;

        match result {
            Ok(_) => {
                debug!(count = records.len(), "inserted url batch");
                Ok(())
            }
            Err(err) if is_unique_violation(&err) => {
                for record in records {
                    if let Some(existing) = self.code_for_original(&record.original_url).await? {
                        return Err(StorageError::Duplicate(existing));
                    }
                }
                Err(StorageError::Conflict(map_sqlx_error(err).to_string()))
            }
            Err(err) => Err(map_sqlx_error(err)),
        }
    }

    async fn mark_deleted(&self, items: &[PendingDelete]) -> Result<u64> {
        if items.is_empty() {
            return Ok(0);
        }

        let now = now_unix_seconds();
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let mut changed = 0;

        for item in items {
            let result = sqlx::query(
                r#"
                UPDATE short_urls
                SET deleted_at = ?
                WHERE short_code = ?
                  AND owner_id = ?
                  AND deleted_at IS NULL
                "#,
            )
            .bind(now)
            .bind(item.code.as_str())
            .bind(item.owner_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

            changed += result.rows_affected();
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(changed)
    }

    async fn is_deleted(&self, code: &ShortCode) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT deleted_at
            FROM short_urls
            WHERE short_code = ?
            LIMIT 1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Ok(false);
        };

        let deleted_at: Option<i64> = row.try_get("deleted_at").map_err(map_sqlx_error)?;
        Ok(deleted_at.is_some())
    }

    async fn read_user_urls(&self, owner_id: i64) -> Result<Vec<UrlRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT sequence, short_code, original_url, owner_id
            FROM short_urls
            WHERE owner_id = ?
              AND deleted_at IS NULL
            ORDER BY sequence
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(record_from_row).collect()
    }

    async fn stats(&self) -> Result<UrlStats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS urls, COUNT(DISTINCT owner_id) AS owners
            FROM short_urls
            WHERE deleted_at IS NULL
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let urls: i64 = row.try_get("urls").map_err(map_sqlx_error)?;
        let owners: i64 = row.try_get("owners").map_err(map_sqlx_error)?;

        Ok(UrlStats {
            urls: urls as u64,
            owners: owners as u64,
        })
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}
