//! The store: a backend, its handlers and the writer lock.

use crate::backend::{Backend, ChangeSetReceipt, WriteBatch, WriteOp};
use crate::document::{Document, Entry};
use crate::error::Result;
use crate::handler::HandlerRegistry;
use crate::tombstone::{TombstoneCollector, TombstonePolicy, TombstoneReport};
use crate::transaction::Transaction;
use parking_lot::Mutex;
use std::sync::Arc;
use tessera_core::{Change, ChangeSet, ChangeSetId, DocumentId, OrderId};
use tracing::{debug, info};

fn wall_clock_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Transactional document store.
///
/// Writers are serialized store-wide: the order maximum spans every
/// collection, so two transactions must never read the same maximum.
pub struct Store {
    backend: Arc<dyn Backend>,
    registry: HandlerRegistry,
    writer: Mutex<()>,
    clock: fn() -> i64,
}

impl Store {
    /// Open a store and run every handler's `init`.
    pub fn open(backend: Arc<dyn Backend>, registry: HandlerRegistry) -> Result<Self> {
        for handler in registry.handlers() {
            handler.init(backend.as_ref())?;
        }
        info!(collections = registry.len(), "store opened");
        Ok(Self {
            backend,
            registry,
            writer: Mutex::new(()),
            clock: wall_clock_ms,
        })
    }

    /// Replace the local clock (milliseconds) used to stamp tombstones.
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    /// Start a transaction, waiting for any running writer to finish.
    pub fn begin(&self) -> Result<Transaction<'_>> {
        let guard = self.writer.lock();
        Transaction::begin(self.backend.as_ref(), &self.registry, guard, (self.clock)())
    }

    /// Apply an already ordered change set in its own transaction.
    pub fn apply(&self, set: &ChangeSet) -> Result<ChangeSetReceipt> {
        let mut tx = self.begin()?;
        let receipt = tx.apply_change_set(set)?;
        tx.commit()?;
        Ok(receipt)
    }

    /// Author, order and apply local changes in one transaction.
    ///
    /// The set takes the successor of the visible maximum order.
    pub fn push(
        &self,
        id: ChangeSetId,
        creator: &str,
        timestamp: i64,
        changes: Vec<Change>,
    ) -> Result<ChangeSetReceipt> {
        let mut tx = self.begin()?;
        let current = tx.current_max_order()?;
        let order = tx.next_order(&current)?;
        let set = ChangeSet::builder(id, creator)
            .order(order)
            .timestamp(timestamp)
            .changes(changes)
            .build()?;
        let receipt = tx.apply_change_set(&set)?;
        tx.commit()?;
        debug!(change_set = %receipt.change_set_id, order = %order, "local change set pushed");
        Ok(receipt)
    }

    /// Live document lookup.
    pub fn find(&self, collection: &str, id: &DocumentId) -> Result<Option<Document>> {
        Ok(self
            .backend
            .find_entry(collection, id)?
            .and_then(Entry::into_live))
    }

    /// Entry lookup, tombstones included.
    pub fn find_entry(&self, collection: &str, id: &DocumentId) -> Result<Option<Entry>> {
        self.backend.find_entry(collection, id)
    }

    /// Live documents of a collection.
    pub fn scan(&self, collection: &str) -> Result<Vec<Document>> {
        Ok(self
            .backend
            .scan(collection)?
            .into_iter()
            .filter_map(Entry::into_live)
            .collect())
    }

    /// Highest committed order.
    pub fn max_order(&self) -> Result<OrderId> {
        self.backend.max_order()
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Remove tombstones the policy allows, in one atomic batch.
    ///
    /// `stable` is the highest order every replica is known to have applied.
    pub fn collect_tombstones(
        &self,
        policy: &TombstonePolicy,
        now_ms: i64,
        stable: Option<OrderId>,
    ) -> Result<TombstoneReport> {
        let _writer = self.writer.lock();
        let collector = TombstoneCollector::new(policy, now_ms, stable);

        let mut report = TombstoneReport::empty();
        for collection in self.backend.collections()? {
            let entries = self.backend.scan(&collection)?;
            collector.collect(&collection, &entries, &mut report);
            if !report.completed {
                break;
            }
        }

        if !report.removed.is_empty() {
            let batch = WriteBatch {
                ops: report
                    .removed
                    .iter()
                    .map(|(collection, id)| WriteOp::Remove {
                        collection: collection.clone(),
                        id: id.clone(),
                    })
                    .collect(),
                ..Default::default()
            };
            self.backend.commit(batch)?;
        }

        info!(
            removed = report.removed.len(),
            skipped = report.skipped.len(),
            completed = report.completed,
            "tombstone collection finished"
        );
        Ok(report)
    }
}
