//! Debounced batch deletion.
//!
//! Callers enqueue single `(code, owner)` pairs. One coordinator task,
//! spawned on the first enqueue, owns the accumulation buffer and flushes
//! it to the store when it reaches `batch_size` items or when `debounce`
//! has elapsed since its oldest item, whichever comes first.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tether_core::{PendingDelete, Repository};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

use crate::inflight::Inflight;

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(450);
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Flush policy of the deletion pipeline.
#[derive(Debug, Clone, TypedBuilder)]
pub struct DeletionSettings {
    /// Flush as soon as this many items are buffered.
    #[builder(default = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,
    /// Longest time an item waits in the buffer.
    #[builder(default = DEFAULT_DEBOUNCE)]
    pub debounce: Duration,
    /// Capacity of the intake channel. A full channel applies backpressure.
    #[builder(default = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,
}

impl Default for DeletionSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug)]
struct Startup {
    receiver: Option<mpsc::Receiver<PendingDelete>>,
    coordinator: Option<JoinHandle<()>>,
}

/// Single-consumer pipeline that coalesces deletions into bounded batches.
#[derive(Debug)]
pub struct DeletionPipeline<R> {
    repository: Arc<R>,
    settings: DeletionSettings,
    sender: RwLock<Option<mpsc::Sender<PendingDelete>>>,
    startup: Mutex<Startup>,
    inflight: Arc<Inflight>,
}

impl<R: Repository> DeletionPipeline<R> {
    pub fn new(repository: Arc<R>, settings: DeletionSettings) -> Self {
        let (sender, receiver) = mpsc::channel(settings.queue_capacity.max(1));
        Self {
            repository,
            settings,
            sender: RwLock::new(Some(sender)),
            startup: Mutex::new(Startup {
                receiver: Some(receiver),
                coordinator: None,
            }),
            inflight: Arc::new(Inflight::default()),
        }
    }

    pub fn settings(&self) -> &DeletionSettings {
        &self.settings
    }

    /// Number of accepted items whose flush has not resolved yet.
    pub fn pending(&self) -> usize {
        self.inflight.pending()
    }

    /// Whether the coordinator task has been spawned.
    pub fn is_started(&self) -> bool {
        self.startup.lock().coordinator.is_some()
    }

    fn ensure_started(&self) {
        let mut startup = self.startup.lock();
        let Some(receiver) = startup.receiver.take() else {
            return;
        };

        info!(
            batch_size = self.settings.batch_size,
            debounce = ?self.settings.debounce,
            "starting deletion coordinator"
        );
        startup.coordinator = Some(tokio::spawn(coordinate(
            self.repository.clone(),
            receiver,
            self.settings.clone(),
            self.inflight.clone(),
        )));
    }

    /// Queues one deletion. Waits only if the intake channel is full.
    ///
    /// Requests arriving after [`DeletionPipeline::shutdown`] are dropped.
    pub async fn enqueue(&self, item: PendingDelete) {
        let sender = self.sender.read().clone();
        let Some(sender) = sender else {
            warn!(code = %item.code, "deletion pipeline is closed; dropping request");
            return;
        };
        self.ensure_started();

        self.inflight.begin();
        if let Err(mpsc::error::SendError(item)) = sender.send(item).await {
            self.inflight.complete(1);
            warn!(code = %item.code, "deletion coordinator is gone; dropping request");
        }
    }

    /// Waits until every accepted item has been part of a flush attempt.
    ///
    /// Returns `false` if `deadline` passes first.
    pub async fn drain(&self, deadline: Instant) -> bool {
        timeout_at(deadline, self.inflight.wait_idle())
            .await
            .is_ok()
    }

    /// Closes the intake, flushes what is buffered and stops the coordinator.
    ///
    /// Best effort: returns `false` if the drain did not finish within
    /// `timeout`, in which case the coordinator is aborted.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;

        self.sender.write().take();
        let coordinator = {
            let mut startup = self.startup.lock();
            startup.receiver.take();
            startup.coordinator.take()
        };

        let drained = self.drain(deadline).await;
        let Some(mut coordinator) = coordinator else {
            return drained;
        };

        match timeout_at(deadline, &mut coordinator).await {
            Ok(Ok(())) => {
                debug!(drained, "deletion coordinator stopped");
                drained
            }
            Ok(Err(err)) => {
                warn!(error = %err, "deletion coordinator failed");
                false
            }
            Err(_) => {
                warn!(
                    pending = self.pending(),
                    "deletion drain timed out; aborting coordinator"
                );
                coordinator.abort();
                false
            }
        }
    }
}

/// Coordinator loop. Owns the buffer exclusively.
async fn coordinate<R: Repository>(
    repository: Arc<R>,
    mut receiver: mpsc::Receiver<PendingDelete>,
    settings: DeletionSettings,
    inflight: Arc<Inflight>,
) {
    let batch_size = settings.batch_size.max(1);
    let mut buffer: Vec<PendingDelete> = Vec::with_capacity(batch_size);
    // Armed when the first item lands in an empty buffer.
    let mut deadline: Option<Instant> = None;

    loop {
        let received = match deadline {
            None => receiver.recv().await,
            Some(at) => match timeout_at(at, receiver.recv()).await {
                Ok(received) => received,
                Err(_) => {
                    flush(repository.as_ref(), &mut buffer, &inflight).await;
                    deadline = None;
                    continue;
                }
            },
        };

        match received {
            Some(item) => {
                if buffer.is_empty() {
                    deadline = Some(Instant::now() + settings.debounce);
                }
                buffer.push(item);
                if buffer.len() >= batch_size {
                    flush(repository.as_ref(), &mut buffer, &inflight).await;
                    deadline = None;
                }
            }
            None => {
                flush(repository.as_ref(), &mut buffer, &inflight).await;
                break;
            }
        }
    }

    debug!("deletion coordinator exiting");
}

async fn flush<R: Repository>(repository: &R, buffer: &mut Vec<PendingDelete>, inflight: &Inflight) {
    if buffer.is_empty() {
        return;
    }
    let batch = std::mem::take(buffer);

    match repository.mark_deleted(&batch).await {
        Ok(changed) => debug!(batch_size = batch.len(), changed, "flushed deletions"),
        Err(err) => warn!(
            batch_size = batch.len(),
            error = %err,
            "failed to flush deletions; dropping batch"
        ),
    }

    inflight.complete(batch.len());
}
