use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tether_core::error::{Result, StorageError};
use tether_core::{PendingDelete, Repository, ShortCode, UrlRecord, UrlStats};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::table::Table;

/// One line of the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum LogEntry {
    Create(UrlRecord),
    Delete { code: ShortCode, owner_id: i64 },
}

struct FileState {
    table: Table,
    file: File,
}

/// Flat-file implementation of the durable store contract.
///
/// Records live in an append-only JSON-lines log. Deletions are appended
/// as tombstone lines. The log is replayed into memory when the file is
/// opened; writes hit the file before the in-memory view changes.
pub struct FileRepository {
    path: PathBuf,
    state: Mutex<FileState>,
}

impl std::fmt::Debug for FileRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileRepository")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl FileRepository {
    /// Opens (or creates) the log at `path` and replays it.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let (replayed, stored_len) = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => (replay(&contents)?, contents.len()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => (Replay::default(), 0),
            Err(err) => return Err(err.into()),
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        if replayed.intact < stored_len {
            file.set_len(replayed.intact as u64).await?;
        }
        if replayed.unterminated {
            file.write_all(b"\n").await?;
            file.flush().await?;
        }

        debug!(path = %path.display(), "opened url log");

        Ok(Self {
            path,
            state: Mutex::new(FileState {
                table: replayed.table,
                file,
            }),
        })
    }

    /// Returns the path of the log.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Default)]
struct Replay {
    table: Table,
    /// Length of the prefix holding whole entries.
    intact: usize,
    /// The intact prefix does not end with a newline.
    unterminated: bool,
}

/// Rebuilds the table from the log. A final line cut off by a crash is
/// dropped; a malformed line anywhere else is an error. Creates are checked
/// like live writes so the first entry for an original or code wins.
fn replay(contents: &str) -> Result<Replay> {
    let mut replayed = Replay::default();

    for (index, raw) in contents.split_inclusive('\n').enumerate() {
        let line_no = index + 1;
        let torn = !raw.ends_with('\n');
        if raw.trim().is_empty() {
            replayed.intact += raw.len();
            continue;
        }

        let entry: LogEntry = match serde_json::from_str(raw) {
            Ok(entry) => entry,
            Err(e) if torn => {
                warn!(line = line_no, error = %e, "dropping torn final log line");
                break;
            }
            Err(e) => return Err(StorageError::InvalidData(format!("line {line_no}: {e}"))),
        };
        replayed.intact += raw.len();

        match entry {
            LogEntry::Create(record) => match replayed.table.check_insert(&record) {
                Ok(()) => replayed.table.apply_insert(record),
                Err(err) => warn!(
                    line = line_no,
                    code = %record.code,
                    error = %err,
                    "skipping create that clashes with an earlier entry"
                ),
            },
            LogEntry::Delete { code, .. } => replayed.table.apply_delete(&code),
        }
    }

    replayed.unterminated = replayed.intact > 0 && !contents[..replayed.intact].ends_with('\n');
    Ok(replayed)
}

async fn append(file: &mut File, entries: &[LogEntry]) -> Result<()> {
    let mut buf = String::new();
    for entry in entries {
        let line = serde_json::to_string(entry)
            .map_err(|e| StorageError::InvalidData(e.to_string()))?;
        buf.push_str(&line);
        buf.push('\n');
    }
    file.write_all(buf.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

#[async_trait]
impl Repository for FileRepository {
    async fn read_all(&self) -> Result<Vec<UrlRecord>> {
        Ok(self.state.lock().await.table.records())
    }

    async fn create(&self, record: &UrlRecord) -> Result<()> {
        let mut state = self.state.lock().await;
        state.table.check_insert(record)?;

        append(&mut state.file, &[LogEntry::Create(record.clone())]).await?;
        state.table.apply_insert(record.clone());
        Ok(())
    }

    async fn create_batch(&self, records: &[UrlRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut state = self.state.lock().await;
        state.table.check_batch(records)?;

        let entries: Vec<LogEntry> = records.iter().cloned().map(LogEntry::Create).collect();
        append(&mut state.file, &entries).await?;
        for record in records {
            state.table.apply_insert(record.clone());
        }
        Ok(())
    }

    async fn mark_deleted(&self, items: &[PendingDelete]) -> Result<u64> {
        let mut state = self.state.lock().await;
        let applied = state.table.deletable(items);
        if applied.is_empty() {
            return Ok(0);
        }

        let entries: Vec<LogEntry> = applied
            .iter()
            .map(|item| LogEntry::Delete {
                code: item.code.clone(),
                owner_id: item.owner_id,
            })
            .collect();
        append(&mut state.file, &entries).await?;
        for item in &applied {
            state.table.apply_delete(&item.code);
        }
        Ok(applied.len() as u64)
    }

    async fn is_deleted(&self, code: &ShortCode) -> Result<bool> {
        Ok(self.state.lock().await.table.is_deleted(code))
    }

    async fn read_user_urls(&self, owner_id: i64) -> Result<Vec<UrlRecord>> {
        Ok(self.state.lock().await.table.user_records(owner_id))
    }

    async fn stats(&self) -> Result<UrlStats> {
        Ok(self.state.lock().await.table.stats())
    }

    async fn ping(&self) -> Result<()> {
        tokio::fs::metadata(&self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(sequence: u64, code: &str, url: &str, owner_id: i64) -> UrlRecord {
        UrlRecord {
            sequence,
            code: ShortCode::new_unchecked(code),
            original_url: url.to_string(),
            owner_id,
        }
    }

    fn log_path(dir: &TempDir) -> PathBuf {
        dir.path().join("nested").join("urls.jsonl")
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = TempDir::new().unwrap();

        {
            let repo = FileRepository::open(log_path(&dir)).await.unwrap();
            repo.create(&record(0, "aaaaaaa", "https://a.example", 1))
                .await
                .unwrap();
            repo.create_batch(&[
                record(1, "bbbbbbb", "https://b.example", 1),
                record(2, "ccccccc", "https://c.example", 2),
            ])
            .await
            .unwrap();
        }

        let reopened = FileRepository::open(log_path(&dir)).await.unwrap();
        let all = reopened.read_all().await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].original_url, "https://c.example");
    }

    #[tokio::test]
    async fn tombstones_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let code = ShortCode::new_unchecked("aaaaaaa");

        {
            let repo = FileRepository::open(log_path(&dir)).await.unwrap();
            repo.create(&record(0, "aaaaaaa", "https://a.example", 1))
                .await
                .unwrap();
            let changed = repo
                .mark_deleted(&[PendingDelete {
                    code: code.clone(),
                    owner_id: 1,
                }])
                .await
                .unwrap();
            assert_eq!(changed, 1);
        }

        let reopened = FileRepository::open(log_path(&dir)).await.unwrap();
        assert!(reopened.is_deleted(&code).await.unwrap());
        assert_eq!(reopened.stats().await.unwrap(), UrlStats::default());
    }

    #[tokio::test]
    async fn foreign_owner_delete_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let repo = FileRepository::open(log_path(&dir)).await.unwrap();
        repo.create(&record(0, "aaaaaaa", "https://a.example", 1))
            .await
            .unwrap();

        let changed = repo
            .mark_deleted(&[PendingDelete {
                code: ShortCode::new_unchecked("aaaaaaa"),
                owner_id: 2,
            }])
            .await
            .unwrap();

        assert_eq!(changed, 0);
        let contents = tokio::fs::read_to_string(repo.path()).await.unwrap();
        assert_eq!(contents.lines().count(), 1);
    }

    #[tokio::test]
    async fn duplicate_original_is_reported_and_not_written() {
        let dir = TempDir::new().unwrap();
        let repo = FileRepository::open(log_path(&dir)).await.unwrap();
        repo.create(&record(0, "aaaaaaa", "https://a.example", 1))
            .await
            .unwrap();

        let err = repo
            .create(&record(1, "bbbbbbb", "https://a.example", 1))
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Duplicate(code) if code.as_str() == "aaaaaaa"));
        let contents = tokio::fs::read_to_string(repo.path()).await.unwrap();
        assert_eq!(contents.lines().count(), 1);
    }

    #[tokio::test]
    async fn corrupt_line_is_invalid_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("urls.jsonl");
        tokio::fs::write(&path, "{not json}\n").await.unwrap();

        let err = FileRepository::open(&path).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidData(_)));
    }

    #[tokio::test]
    async fn torn_final_line_is_dropped() {
        let dir = TempDir::new().unwrap();

        {
            let repo = FileRepository::open(log_path(&dir)).await.unwrap();
            repo.create(&record(0, "aaaaaaa", "https://a.example", 1))
                .await
                .unwrap();
            let mut file = OpenOptions::new()
                .append(true)
                .open(repo.path())
                .await
                .unwrap();
            file.write_all(br#"{"op":"create","sequ"#).await.unwrap();
            file.flush().await.unwrap();
        }

        {
            let repo = FileRepository::open(log_path(&dir)).await.unwrap();
            assert_eq!(repo.read_all().await.unwrap().len(), 1);
            repo.create(&record(1, "bbbbbbb", "https://b.example", 1))
                .await
                .unwrap();
        }

        let reopened = FileRepository::open(log_path(&dir)).await.unwrap();
        let codes: Vec<String> = reopened
            .read_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.code.to_string())
            .collect();
        assert_eq!(codes, vec!["aaaaaaa", "bbbbbbb"]);
    }

    #[tokio::test]
    async fn unterminated_final_entry_is_kept() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("urls.jsonl");
        let line = serde_json::to_string(&LogEntry::Create(record(
            0,
            "aaaaaaa",
            "https://a.example",
            1,
        )))
        .unwrap();
        tokio::fs::write(&path, line).await.unwrap();

        {
            let repo = FileRepository::open(&path).await.unwrap();
            assert_eq!(repo.read_all().await.unwrap().len(), 1);
            repo.create(&record(1, "bbbbbbb", "https://b.example", 1))
                .await
                .unwrap();
        }

        let reopened = FileRepository::open(&path).await.unwrap();
        assert_eq!(reopened.read_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn later_clashing_create_line_is_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("urls.jsonl");
        let mut contents = String::new();
        for entry in [
            LogEntry::Create(record(0, "aaaaaaa", "https://a.example", 1)),
            LogEntry::Create(record(1, "bbbbbbb", "https://a.example", 2)),
            LogEntry::Create(record(2, "aaaaaaa", "https://c.example", 3)),
        ] {
            contents.push_str(&serde_json::to_string(&entry).unwrap());
            contents.push('\n');
        }
        tokio::fs::write(&path, contents).await.unwrap();

        let repo = FileRepository::open(&path).await.unwrap();
        let all = repo.read_all().await.unwrap();

        assert_eq!(all.len(), 1);
        assert_eq!(all[0].code.as_str(), "aaaaaaa");
        assert_eq!(all[0].owner_id, 1);
    }

    #[tokio::test]
    async fn log_lines_are_tagged() {
        let dir = TempDir::new().unwrap();
        let repo = FileRepository::open(log_path(&dir)).await.unwrap();
        repo.create(&record(0, "aaaaaaa", "https://a.example", 7))
            .await
            .unwrap();

        let contents = tokio::fs::read_to_string(repo.path()).await.unwrap();
        let line: serde_json::Value = serde_json::from_str(contents.trim()).unwrap();
        assert_eq!(line["op"], "create");
        assert_eq!(line["code"], "aaaaaaa");
        assert_eq!(line["owner_id"], 7);
    }
}
