//! Bounded replay of remote change sets.
//!
//! Change sets arriving from other devices go through a single worker task
//! that applies them to a [`ChatObject`] one at a time. Callers either await
//! the outcome of a submission or enqueue and learn about failures from the
//! report channel. Nothing is applied unobserved.

use crate::chat::ChatObject;
use crate::error::{Result, SdkError};
use async_trait::async_trait;
use futures::future::try_join_all;
use std::sync::Arc;
use tessera_core::{ChangeSet, ChangeSetId};
use tessera_store::ChangeSetReceipt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Configuration for the replay queue.
#[derive(Clone, Debug)]
pub struct ReplayConfig {
    /// Maximum number of change sets waiting for the worker.
    pub queue_capacity: usize,
    /// Maximum number of unread failure reports.
    pub report_capacity: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            report_capacity: 64,
        }
    }
}

/// Builder for replay configuration.
pub struct ReplayConfigBuilder {
    config: ReplayConfig,
}

impl ReplayConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ReplayConfig::default(),
        }
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    pub fn report_capacity(mut self, capacity: usize) -> Self {
        self.config.report_capacity = capacity;
        self
    }

    pub fn build(self) -> ReplayConfig {
        self.config
    }
}

impl Default for ReplayConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A change set the worker could not apply.
#[derive(Clone, Debug)]
pub struct ReplayFailure {
    pub change_set_id: ChangeSetId,
    pub error: SdkError,
}

/// Where remote change sets come from.
#[async_trait]
pub trait RemoteSource: Send {
    /// The next change set, or `None` once the source is exhausted.
    async fn next_change_set(&mut self) -> Option<ChangeSet>;
}

/// In-memory source fed through a channel (for testing).
pub struct MemorySource {
    rx: mpsc::Receiver<ChangeSet>,
}

impl MemorySource {
    /// Create a source and the sender feeding it.
    pub fn channel(capacity: usize) -> (mpsc::Sender<ChangeSet>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx })
    }

    /// A source yielding `sets` in order, then ending.
    pub fn from_sets(sets: Vec<ChangeSet>) -> Self {
        let (tx, source) = Self::channel(sets.len());
        for set in sets {
            // Capacity equals the number of sets.
            let _ = tx.try_send(set);
        }
        source
    }
}

#[async_trait]
impl RemoteSource for MemorySource {
    async fn next_change_set(&mut self) -> Option<ChangeSet> {
        self.rx.recv().await
    }
}

enum Job {
    Submit {
        set: ChangeSet,
        reply: oneshot::Sender<Result<ChangeSetReceipt>>,
    },
    Enqueue {
        set: ChangeSet,
    },
}

/// Handle to the replay worker.
pub struct ReplayQueue {
    job_tx: mpsc::Sender<Job>,
    worker: JoinHandle<()>,
}

impl ReplayQueue {
    /// Spawn the worker. Returns the queue and the failure report channel.
    ///
    /// Must be called within a tokio runtime.
    pub fn start(
        chat: Arc<ChatObject>,
        config: ReplayConfig,
    ) -> (Self, mpsc::Receiver<ReplayFailure>) {
        let (job_tx, job_rx) = mpsc::channel(config.queue_capacity.max(1));
        let (report_tx, report_rx) = mpsc::channel(config.report_capacity.max(1));
        let worker = tokio::spawn(run_worker(chat, job_rx, report_tx));
        (Self { job_tx, worker }, report_rx)
    }

    /// Apply a change set and wait for its receipt.
    pub async fn submit(&self, set: ChangeSet) -> Result<ChangeSetReceipt> {
        let (reply, rx) = oneshot::channel();
        self.job_tx
            .send(Job::Submit { set, reply })
            .await
            .map_err(|_| SdkError::ReplayQueueClosed)?;
        rx.await.map_err(|_| SdkError::ReplayQueueClosed)?
    }

    /// Submit several change sets and wait for all receipts, in input order.
    ///
    /// Sets are applied in submission order; the first failure is returned.
    pub async fn submit_all(&self, sets: Vec<ChangeSet>) -> Result<Vec<ChangeSetReceipt>> {
        try_join_all(sets.into_iter().map(|set| self.submit(set))).await
    }

    /// Queue a change set. Waits only for queue capacity; failures are
    /// reported on the failure channel.
    pub async fn enqueue(&self, set: ChangeSet) -> Result<()> {
        self.job_tx
            .send(Job::Enqueue { set })
            .await
            .map_err(|_| SdkError::ReplayQueueClosed)
    }

    /// Enqueue everything `source` yields until it ends. Returns the count.
    pub async fn drain<S: RemoteSource + ?Sized>(&self, source: &mut S) -> Result<usize> {
        let mut count = 0;
        while let Some(set) = source.next_change_set().await {
            self.enqueue(set).await?;
            count += 1;
        }
        debug!(count, "remote source drained");
        Ok(count)
    }

    /// Stop accepting work and wait until everything queued is applied.
    pub async fn shutdown(self) -> Result<()> {
        drop(self.job_tx);
        self.worker.await.map_err(|_| SdkError::ReplayQueueClosed)
    }
}

/// Apply a set off the async runtime; the store's writer lock blocks.
async fn apply_blocking(chat: &Arc<ChatObject>, set: ChangeSet) -> Result<ChangeSetReceipt> {
    let chat = Arc::clone(chat);
    tokio::task::spawn_blocking(move || chat.apply_remote(&set))
        .await
        .map_err(|_| SdkError::ReplayQueueClosed)?
}

async fn run_worker(
    chat: Arc<ChatObject>,
    mut job_rx: mpsc::Receiver<Job>,
    report_tx: mpsc::Sender<ReplayFailure>,
) {
    while let Some(job) = job_rx.recv().await {
        match job {
            Job::Submit { set, reply } => {
                let result = apply_blocking(&chat, set).await;
                // The submitter may have given up waiting.
                let _ = reply.send(result);
            }
            Job::Enqueue { set } => {
                let change_set_id = set.id().clone();
                if let Err(error) = apply_blocking(&chat, set).await {
                    warn!(change_set = %change_set_id, error = %error, "remote change set failed");
                    let failure = ReplayFailure {
                        change_set_id,
                        error,
                    };
                    // Nobody listening for reports is fine.
                    let _ = report_tx.send(failure).await;
                }
            }
        }
    }
    debug!("replay worker stopped");
}
