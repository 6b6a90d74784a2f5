use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use tether_core::error::StorageError;
use tether_core::{
    BatchItem, BatchResult, PendingDelete, Repository, ShortCode, ShortenParams, ShortenStatus,
    Shortened, Shortener, ShortenerError, UrlRecord, UrlStats,
};
use tether_generator::{entropy, Generator};
use tracing::{debug, info, warn};

use crate::deletion::{DeletionPipeline, DeletionSettings};
use crate::registry::{InsertOutcome, Registry};

type Result<T> = std::result::Result<T, ShortenerError>;

/// Store writes retried when a freshly minted code turns out to be taken.
const MAX_CREATE_ATTEMPTS: usize = 5;

/// A concrete implementation of the `Shortener` trait.
///
/// The service owns no state of its own. It ties together:
/// - the [`Registry`], consulted before any write reaches the store
/// - a [`Generator`] for minting codes
/// - the [`DeletionPipeline`] that batches deletions
/// - the durable [`Repository`]
pub struct ShortenerService<R, G> {
    repository: Arc<R>,
    generator: Arc<G>,
    registry: Arc<Registry>,
    deletions: Arc<DeletionPipeline<R>>,
}

impl<R, G> Clone for ShortenerService<R, G> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            generator: self.generator.clone(),
            registry: self.registry.clone(),
            deletions: self.deletions.clone(),
        }
    }
}

impl<R: Repository, G: Generator> ShortenerService<R, G> {
    pub fn new(
        repository: R,
        generator: G,
        registry: Arc<Registry>,
        settings: DeletionSettings,
    ) -> Self {
        let repository = Arc::new(repository);
        let deletions = Arc::new(DeletionPipeline::new(repository.clone(), settings));
        Self {
            repository,
            generator: Arc::new(generator),
            registry,
            deletions,
        }
    }

    /// Builds the service and seeds its registry from a full store scan.
    pub async fn bootstrap(repository: R, generator: G, settings: DeletionSettings) -> Result<Self> {
        let records = repository.read_all().await?;
        info!(records = records.len(), "seeding url registry from store");
        let registry = Arc::new(Registry::from_records(records));
        Ok(Self::new(repository, generator, registry, settings))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Deletions accepted but not yet flushed.
    pub fn pending_deletions(&self) -> usize {
        self.deletions.pending()
    }

    pub async fn ping(&self) -> Result<()> {
        Ok(self.repository.ping().await?)
    }

    /// Flushes queued deletions and stops the deletion coordinator.
    ///
    /// Returns `false` if the drain did not finish within `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.deletions.shutdown(timeout).await
    }

    /// Validates that the URL has a valid format (has a scheme and host).
    fn validate_url(url: &str) -> Result<()> {
        if url.is_empty() {
            return Err(ShortenerError::InvalidUrl(
                "URL cannot be empty".to_string(),
            ));
        }

        let Some((scheme, rest)) = url.split_once("://") else {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL must have a valid scheme and host: {}",
                url
            )));
        };
        let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
        if scheme.is_empty() || host.is_empty() {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL must have a valid scheme and host: {}",
                url
            )));
        }

        let scheme = scheme.to_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL scheme must be http or https: {}",
                scheme
            )));
        }

        Ok(())
    }

    fn mint(&self, rng: &mut StdRng) -> Result<ShortCode> {
        Ok(self.registry.mint(|| self.generator.generate(&mut *rng))?)
    }

    /// Folds a durably written record into the registry.
    fn adopt(&self, record: UrlRecord) -> Result<Shortened> {
        let code = record.code.clone();
        match self.registry.insert(record)? {
            InsertOutcome::Inserted => Ok(Shortened {
                code,
                status: ShortenStatus::Created,
            }),
            InsertOutcome::Existing(winner) => {
                debug!(minted = %code, winner = %winner.code, "registry already held a code");
                Ok(Shortened {
                    code: winner.code,
                    status: ShortenStatus::Existing,
                })
            }
        }
    }

    /// Writes one record, re-minting its code while the store reports it taken.
    async fn persist(&self, mut record: UrlRecord, rng: &mut StdRng) -> Result<Shortened> {
        let mut attempt = 1;
        loop {
            match self.repository.create(&record).await {
                Ok(()) => return self.adopt(record),
                Err(StorageError::Duplicate(winner)) => {
                    debug!(
                        original_url = %record.original_url,
                        winner = %winner,
                        "lost create race; adopting stored code"
                    );
                    return Ok(Shortened {
                        code: winner,
                        status: ShortenStatus::Existing,
                    });
                }
                Err(StorageError::Conflict(reason)) if attempt < MAX_CREATE_ATTEMPTS => {
                    warn!(
                        attempt,
                        code = %record.code,
                        reason = %reason,
                        "short code already stored; minting again"
                    );
                    record.code = self.mint(rng)?;
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

#[async_trait]
impl<R: Repository, G: Generator> Shortener for ShortenerService<R, G> {
    async fn shorten(&self, params: ShortenParams) -> Result<Shortened> {
        Self::validate_url(&params.original_url)?;

        if let Some(existing) = self.registry.lookup(&params.original_url)? {
            return Ok(Shortened {
                code: existing.code,
                status: ShortenStatus::Existing,
            });
        }

        let mut rng = entropy(params.seed);
        let record = UrlRecord {
            sequence: self.registry.next_sequence()?,
            code: self.mint(&mut rng)?,
            original_url: params.original_url,
            owner_id: params.owner_id,
        };
        self.persist(record, &mut rng).await
    }

    async fn shorten_batch(
        &self,
        items: Vec<BatchItem>,
        owner_id: i64,
        seed: Option<u64>,
    ) -> Result<Vec<BatchResult>> {
        for item in &items {
            Self::validate_url(&item.original_url)?;
        }

        let snapshot = self.registry.snapshot()?;
        let mut rng = entropy(seed);
        let mut taken: HashSet<ShortCode> = HashSet::new();
        let mut fresh: Vec<(String, ShortCode)> = Vec::new();
        let mut resolved: HashMap<String, ShortCode> = HashMap::new();

        for item in &items {
            let original = &item.original_url;
            if resolved.contains_key(original) {
                continue;
            }
            if let Some(existing) = snapshot.get(original) {
                resolved.insert(original.clone(), existing.code.clone());
                continue;
            }

            let code = self.registry.mint(|| loop {
                let candidate = self.generator.generate(&mut rng);
                if !taken.contains(&candidate) {
                    break candidate;
                }
            })?;
            taken.insert(code.clone());
            resolved.insert(original.clone(), code.clone());
            fresh.push((original.clone(), code));
        }

        if !fresh.is_empty() {
            let sequences = self.registry.reserve_sequences(fresh.len() as u64)?;
            let records: Vec<UrlRecord> = fresh
                .into_iter()
                .zip(sequences)
                .map(|((original_url, code), sequence)| UrlRecord {
                    sequence,
                    code,
                    original_url,
                    owner_id,
                })
                .collect();

            let written = match self.repository.create_batch(&records).await {
                Ok(()) => {
                    debug!(records = records.len(), "batch written");
                    let mut written = Vec::with_capacity(records.len());
                    for record in records {
                        let original = record.original_url.clone();
                        written.push((original, self.adopt(record)?.code));
                    }
                    written
                }
                Err(err @ (StorageError::Duplicate(_) | StorageError::Conflict(_))) => {
                    warn!(
                        error = %err,
                        records = records.len(),
                        "batch raced a concurrent create; writing records one by one"
                    );
                    let mut written = Vec::with_capacity(records.len());
                    for record in records {
                        let original = record.original_url.clone();
                        written.push((original, self.persist(record, &mut rng).await?.code));
                    }
                    written
                }
                Err(err) => return Err(err.into()),
            };
            resolved.extend(written);
        }

        items
            .into_iter()
            .map(|item| {
                let code = resolved
                    .get(&item.original_url)
                    .cloned()
                    .ok_or_else(|| ShortenerError::NotFound(item.original_url.clone()))?;
                Ok(BatchResult {
                    correlation_id: item.correlation_id,
                    code,
                })
            })
            .collect()
    }

    async fn resolve(&self, code: &ShortCode) -> Result<String> {
        let Some(original) = self.registry.original_for(code)? else {
            return Err(ShortenerError::NotFound(code.to_string()));
        };

        match self.repository.is_deleted(code).await {
            Ok(true) => Err(ShortenerError::AlreadyDeleted(code.to_string())),
            Ok(false) => Ok(original),
            Err(err) => {
                warn!(code = %code, error = %err, "could not read deletion state; serving from registry");
                Ok(original)
            }
        }
    }

    async fn delete_user_urls(&self, codes: Vec<ShortCode>, owner_id: i64) {
        debug!(owner_id, count = codes.len(), "queueing deletions");
        for code in codes {
            self.deletions
                .enqueue(PendingDelete { code, owner_id })
                .await;
        }
    }

    async fn user_urls(&self, owner_id: i64) -> Result<Vec<UrlRecord>> {
        Ok(self.repository.read_user_urls(owner_id).await?)
    }

    async fn stats(&self) -> Result<UrlStats> {
        Ok(self.repository.stats().await?)
    }
}
