use std::collections::{HashMap, HashSet};

use tether_core::error::{Result, StorageError};
use tether_core::{PendingDelete, ShortCode, UrlRecord, UrlStats};

#[derive(Debug, Clone)]
struct Row {
    record: UrlRecord,
    deleted: bool,
}

/// Process-local table shared by the memory and file stores.
///
/// Enforces the same constraints as the relational schema: unique short
/// codes and unique original URLs, deleted rows included.
#[derive(Debug, Default)]
pub(crate) struct Table {
    rows: HashMap<ShortCode, Row>,
    by_original: HashMap<String, ShortCode>,
}

impl Table {
    pub(crate) fn check_insert(&self, record: &UrlRecord) -> Result<()> {
        if let Some(existing) = self.by_original.get(&record.original_url) {
            return Err(StorageError::Duplicate(existing.clone()));
        }
        if self.rows.contains_key(&record.code) {
            return Err(StorageError::Conflict(record.code.to_string()));
        }
        Ok(())
    }

    pub(crate) fn check_batch(&self, records: &[UrlRecord]) -> Result<()> {
        let mut originals: HashMap<&str, &ShortCode> = HashMap::with_capacity(records.len());
        let mut codes = HashSet::with_capacity(records.len());

        for record in records {
            self.check_insert(record)?;
            if let Some(first) = originals.insert(record.original_url.as_str(), &record.code) {
                return Err(StorageError::Duplicate(first.clone()));
            }
            if !codes.insert(&record.code) {
                return Err(StorageError::Conflict(record.code.to_string()));
            }
        }
        Ok(())
    }

    /// Applies a record without checking constraints.
    pub(crate) fn apply_insert(&mut self, record: UrlRecord) {
        self.by_original
            .insert(record.original_url.clone(), record.code.clone());
        self.rows.insert(
            record.code.clone(),
            Row {
                record,
                deleted: false,
            },
        );
    }

    /// Returns the items that would change state: live rows whose owner matches.
    pub(crate) fn deletable(&self, items: &[PendingDelete]) -> Vec<PendingDelete> {
        let mut seen = HashSet::new();
        items
            .iter()
            .filter(|item| {
                self.rows.get(&item.code).is_some_and(|row| {
                    !row.deleted && row.record.owner_id == item.owner_id
                })
            })
            .filter(|item| seen.insert(&item.code))
            .cloned()
            .collect()
    }

    pub(crate) fn apply_delete(&mut self, code: &ShortCode) {
        if let Some(row) = self.rows.get_mut(code) {
            row.deleted = true;
        }
    }

    pub(crate) fn mark_deleted(&mut self, items: &[PendingDelete]) -> u64 {
        let applied = self.deletable(items);
        for item in &applied {
            self.apply_delete(&item.code);
        }
        applied.len() as u64
    }

    pub(crate) fn is_deleted(&self, code: &ShortCode) -> bool {
        self.rows.get(code).is_some_and(|row| row.deleted)
    }

    pub(crate) fn records(&self) -> Vec<UrlRecord> {
        let mut records: Vec<UrlRecord> = self.rows.values().map(|row| row.record.clone()).collect();
        records.sort_by_key(|record| record.sequence);
        records
    }

    pub(crate) fn user_records(&self, owner_id: i64) -> Vec<UrlRecord> {
        let mut records: Vec<UrlRecord> = self
            .rows
            .values()
            .filter(|row| !row.deleted && row.record.owner_id == owner_id)
            .map(|row| row.record.clone())
            .collect();
        records.sort_by_key(|record| record.sequence);
        records
    }

    pub(crate) fn stats(&self) -> UrlStats {
        let live = self.rows.values().filter(|row| !row.deleted);
        let mut owners = HashSet::new();
        let mut urls = 0;
        for row in live {
            urls += 1;
            owners.insert(row.record.owner_id);
        }
        UrlStats {
            urls,
            owners: owners.len() as u64,
        }
    }
}
