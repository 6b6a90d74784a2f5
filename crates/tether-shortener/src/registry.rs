use std::collections::HashMap;
use std::ops::Range;

use parking_lot::Mutex;
use tether_core::{ShortCode, UrlRecord};
use tracing::{debug, warn};

use crate::error::RegistryError;

type Result<T> = std::result::Result<T, RegistryError>;

/// Outcome of [`Registry::insert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The original URL already had a record; that record wins.
    Existing(UrlRecord),
}

#[derive(Debug, Default)]
struct Entries {
    by_original: HashMap<String, UrlRecord>,
    by_code: HashMap<ShortCode, String>,
    next_sequence: u64,
}

impl Entries {
    fn from_records(records: impl IntoIterator<Item = UrlRecord>) -> Self {
        let mut entries = Self::default();
        for record in records {
            entries.insert(record);
        }
        entries
    }

    fn insert(&mut self, record: UrlRecord) -> InsertOutcome {
        if let Some(existing) = self.by_original.get(&record.original_url) {
            return InsertOutcome::Existing(existing.clone());
        }
        self.next_sequence = self.next_sequence.max(record.sequence + 1);
        self.by_code
            .insert(record.code.clone(), record.original_url.clone());
        self.by_original.insert(record.original_url.clone(), record);
        InsertOutcome::Inserted
    }
}

/// In-memory map from original URL to its record.
///
/// The registry caches existence, not liveness: deleted records stay in
/// it so their codes are never minted again. Every access goes through a
/// single lock, and every access before [`Registry::initialize`] fails
/// with [`RegistryError::Uninitialized`].
#[derive(Debug, Default)]
pub struct Registry {
    entries: Mutex<Option<Entries>>,
}

impl Registry {
    /// Creates a registry that has not been seeded yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry seeded with the given records.
    pub fn from_records(records: impl IntoIterator<Item = UrlRecord>) -> Self {
        Self {
            entries: Mutex::new(Some(Entries::from_records(records))),
        }
    }

    /// Seeds the registry from the startup scan of the durable store.
    ///
    /// Meant to be called once. A second call replaces the contents.
    pub fn initialize(&self, records: impl IntoIterator<Item = UrlRecord>) {
        let entries = Entries::from_records(records);
        let count = entries.by_original.len();

        let mut guard = self.entries.lock();
        if guard.is_some() {
            warn!("url registry initialized more than once; replacing contents");
        }
        *guard = Some(entries);
        debug!(count, "url registry initialized");
    }

    pub fn is_initialized(&self) -> bool {
        self.entries.lock().is_some()
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut Entries) -> T) -> Result<T> {
        let mut guard = self.entries.lock();
        let entries = guard.as_mut().ok_or(RegistryError::Uninitialized)?;
        Ok(f(entries))
    }

    /// Returns the record for an original URL, if one exists.
    pub fn lookup(&self, original_url: &str) -> Result<Option<UrlRecord>> {
        self.with_entries(|entries| entries.by_original.get(original_url).cloned())
    }

    /// Returns the original URL a code was minted for.
    pub fn original_for(&self, code: &ShortCode) -> Result<Option<String>> {
        self.with_entries(|entries| entries.by_code.get(code).cloned())
    }

    pub fn code_exists(&self, code: &ShortCode) -> Result<bool> {
        self.with_entries(|entries| entries.by_code.contains_key(code))
    }

    /// Draws candidates until one is not already taken.
    ///
    /// The check runs under the lock; the code is not reserved, so callers
    /// still have to handle a conflict at write time.
    pub fn mint(&self, mut candidate: impl FnMut() -> ShortCode) -> Result<ShortCode> {
        self.with_entries(|entries| loop {
            let code = candidate();
            if !entries.by_code.contains_key(&code) {
                break code;
            }
            debug!(code = %code, "minted code collides; drawing again");
        })
    }

    /// Reserves one sequence number.
    pub fn next_sequence(&self) -> Result<u64> {
        Ok(self.reserve_sequences(1)?.start)
    }

    /// Reserves `count` consecutive sequence numbers.
    pub fn reserve_sequences(&self, count: u64) -> Result<Range<u64>> {
        self.with_entries(|entries| {
            let start = entries.next_sequence;
            entries.next_sequence += count;
            start..entries.next_sequence
        })
    }

    /// Inserts a record. The first record for an original URL wins.
    pub fn insert(&self, record: UrlRecord) -> Result<InsertOutcome> {
        self.with_entries(|entries| entries.insert(record))
    }

    /// Returns a copy of the map for callers that scan without the lock.
    ///
    /// The copy may be stale by the time it is used.
    pub fn snapshot(&self) -> Result<HashMap<String, UrlRecord>> {
        self.with_entries(|entries| entries.by_original.clone())
    }

    pub fn len(&self) -> Result<usize> {
        self.with_entries(|entries| entries.by_original.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(sequence: u64, code: &str, url: &str) -> UrlRecord {
        UrlRecord {
            sequence,
            code: ShortCode::new_unchecked(code),
            original_url: url.to_string(),
            owner_id: 1,
        }
    }

    #[test]
    fn uninitialized_registry_rejects_access() {
        let registry = Registry::new();

        assert!(!registry.is_initialized());
        assert_eq!(
            registry.lookup("https://a.example"),
            Err(RegistryError::Uninitialized)
        );
        assert_eq!(
            registry.insert(record(0, "aaaaaaa", "https://a.example")),
            Err(RegistryError::Uninitialized)
        );
        assert!(registry.snapshot().is_err());
    }

    #[test]
    fn initialize_seeds_lookups() {
        let registry = Registry::new();
        registry.initialize([
            record(0, "aaaaaaa", "https://a.example"),
            record(1, "bbbbbbb", "https://b.example"),
        ]);

        let found = registry.lookup("https://b.example").unwrap().unwrap();
        assert_eq!(found.code.as_str(), "bbbbbbb");
        assert!(registry
            .code_exists(&ShortCode::new_unchecked("aaaaaaa"))
            .unwrap());
        assert_eq!(
            registry
                .original_for(&ShortCode::new_unchecked("aaaaaaa"))
                .unwrap()
                .as_deref(),
            Some("https://a.example")
        );
    }

    #[test]
    fn first_writer_wins() {
        let registry = Registry::from_records([]);

        assert_eq!(
            registry
                .insert(record(0, "aaaaaaa", "https://a.example"))
                .unwrap(),
            InsertOutcome::Inserted
        );
        let outcome = registry
            .insert(record(1, "bbbbbbb", "https://a.example"))
            .unwrap();

        assert_eq!(
            outcome,
            InsertOutcome::Existing(record(0, "aaaaaaa", "https://a.example"))
        );
        assert!(!registry
            .code_exists(&ShortCode::new_unchecked("bbbbbbb"))
            .unwrap());
    }

    #[test]
    fn mint_skips_taken_codes() {
        let registry = Registry::from_records([record(0, "aaaaaaa", "https://a.example")]);
        let mut candidates = ["aaaaaaa", "aaaaaaa", "ccccccc"].into_iter();

        let code = registry
            .mint(|| ShortCode::new_unchecked(candidates.next().unwrap()))
            .unwrap();

        assert_eq!(code.as_str(), "ccccccc");
        assert_eq!(candidates.next(), None);
    }

    #[test]
    fn sequences_continue_after_seeded_records() {
        let registry = Registry::from_records([
            record(3, "aaaaaaa", "https://a.example"),
            record(9, "bbbbbbb", "https://b.example"),
        ]);

        assert_eq!(registry.next_sequence().unwrap(), 10);
        assert_eq!(registry.reserve_sequences(3).unwrap(), 11..14);
        assert_eq!(registry.next_sequence().unwrap(), 14);
    }

    #[test]
    fn snapshot_is_detached() {
        let registry = Registry::from_records([record(0, "aaaaaaa", "https://a.example")]);
        let snapshot = registry.snapshot().unwrap();

        registry
            .insert(record(1, "bbbbbbb", "https://b.example"))
            .unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.len().unwrap(), 2);
    }
}
