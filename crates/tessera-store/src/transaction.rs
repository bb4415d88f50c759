//! Transactions.
//!
//! A [`Transaction`] holds the store's writer lock from `begin` until it is
//! committed, rolled back or dropped, so "read current max, assign next,
//! apply, commit" is atomic with respect to other writers. Mutations are
//! staged in memory and handed to the backend as one batch on commit.

use crate::backend::{Backend, ChangeSetReceipt, ChangeSetRecord, WriteBatch, WriteOp};
use crate::document::{Document, Entry, Tombstone};
use crate::error::{Result, StoreError};
use crate::handler::{ChangeOp, DeleteMode, DocumentView, Handler, HandlerRegistry, ModifyMode};
use crate::modifier::{KeyPathModifier, Modifier};
use parking_lot::MutexGuard;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tessera_core::{
    Change, ChangeKind, ChangeSet, ChangeSetId, DocumentId, KeyModify, Lattice, OrderId,
};
use tracing::{debug, warn};

type StagedKey = (String, DocumentId);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TxState {
    Active,
    Committed,
    RolledBack,
}

/// Transaction-local view: staged writes first, then the backend.
struct TxView<'t> {
    backend: &'t dyn Backend,
    staged: &'t BTreeMap<StagedKey, Option<Entry>>,
}

impl DocumentView for TxView<'_> {
    fn find(&self, collection: &str, id: &DocumentId) -> Result<Option<Entry>> {
        if let Some(staged) = self.staged.get(&(collection.to_string(), id.clone())) {
            return Ok(staged.clone());
        }
        self.backend.find_entry(collection, id)
    }
}

/// An all-or-nothing unit of work bound to a store.
pub struct Transaction<'s> {
    backend: &'s dyn Backend,
    registry: &'s HandlerRegistry,
    staged: BTreeMap<StagedKey, Option<Entry>>,
    change_sets: Vec<ChangeSetRecord>,
    snapshot_max: OrderId,
    max_order: OrderId,
    touched: BTreeSet<String>,
    state: TxState,
    /// Local clock reading at `begin`, milliseconds.
    started_at: i64,
    // Declared last so the lock is released after `Drop::drop` has run.
    _writer: MutexGuard<'s, ()>,
}

impl<'s> Transaction<'s> {
    pub(crate) fn begin(
        backend: &'s dyn Backend,
        registry: &'s HandlerRegistry,
        writer: MutexGuard<'s, ()>,
        now_ms: i64,
    ) -> Result<Self> {
        if !backend.is_available() {
            return Err(StoreError::StoreUnavailable(
                "backend not reachable".to_string(),
            ));
        }
        let snapshot_max = backend.max_order()?;
        Ok(Self {
            backend,
            registry,
            staged: BTreeMap::new(),
            change_sets: Vec::new(),
            snapshot_max,
            max_order: snapshot_max,
            touched: BTreeSet::new(),
            state: TxState::Active,
            started_at: now_ms,
            _writer: writer,
        })
    }

    /// Highest order visible to this transaction, including staged sets.
    pub fn current_max_order(&self) -> Result<OrderId> {
        self.ensure_active()?;
        Ok(self.max_order)
    }

    /// The order a new local change set takes.
    ///
    /// `current_max` is normally the value returned by [`current_max_order`].
    /// A reference below the visible maximum is stale and fails with
    /// `OrderingUnavailable`.
    ///
    /// [`current_max_order`]: Transaction::current_max_order
    pub fn next_order(&self, current_max: &OrderId) -> Result<OrderId> {
        self.ensure_active()?;
        if *current_max < self.max_order {
            return Err(StoreError::OrderingUnavailable(format!(
                "stale reference {} below visible maximum {}",
                current_max, self.max_order
            )));
        }
        Ok(current_max.successor()?)
    }

    /// Validate and apply a change set.
    ///
    /// A set whose id was already applied returns the original receipt
    /// without running hooks. Any error rolls back the whole transaction.
    pub fn apply_change_set(&mut self, set: &ChangeSet) -> Result<ChangeSetReceipt> {
        self.ensure_active()?;
        match self.apply_inner(set) {
            Ok(receipt) => Ok(receipt),
            Err(err) => {
                warn!(
                    change_set = %set.id(),
                    creator = set.creator(),
                    error = %err,
                    "change set rejected"
                );
                self.discard();
                Err(err)
            }
        }
    }

    /// Persist every staged mutation atomically.
    pub fn commit(mut self) -> Result<()> {
        self.ensure_active()?;

        let batch = WriteBatch {
            ops: std::mem::take(&mut self.staged)
                .into_iter()
                .map(|((collection, id), entry)| match entry {
                    Some(entry) => WriteOp::Put { collection, entry },
                    None => WriteOp::Remove { collection, id },
                })
                .collect(),
            change_sets: std::mem::take(&mut self.change_sets),
            max_order: (self.max_order > self.snapshot_max).then_some(self.max_order),
        };
        let writes = batch.ops.len();

        if let Err(err) = self.backend.commit(batch) {
            warn!(error = %err, "commit failed");
            self.discard();
            return Err(err);
        }

        self.state = TxState::Committed;
        debug!(writes, max_order = %self.max_order, "transaction committed");
        for handler in self.touched_handlers() {
            handler.after_commit();
        }
        Ok(())
    }

    /// Discard every staged mutation.
    pub fn rollback(mut self) {
        if self.state == TxState::Active {
            self.discard();
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == TxState::Active
    }

    fn ensure_active(&self) -> Result<()> {
        match self.state {
            TxState::Active => Ok(()),
            _ => Err(StoreError::TransactionClosed),
        }
    }

    fn discard(&mut self) {
        self.staged.clear();
        self.change_sets.clear();
        self.max_order = self.snapshot_max;
        self.state = TxState::RolledBack;
        debug!("transaction rolled back");
        for handler in self.touched_handlers() {
            handler.after_rollback();
        }
    }

    fn touched_handlers(&self) -> Vec<Arc<dyn Handler>> {
        self.touched
            .iter()
            .filter_map(|name| self.registry.get(name).cloned())
            .collect()
    }

    fn find_record(&self, id: &ChangeSetId) -> Result<Option<ChangeSetRecord>> {
        if let Some(record) = self
            .change_sets
            .iter()
            .find(|r| &r.receipt.change_set_id == id)
        {
            return Ok(Some(record.clone()));
        }
        self.backend.change_set(id)
    }

    fn apply_inner(&mut self, set: &ChangeSet) -> Result<ChangeSetReceipt> {
        check_stamps(set)?;
        let digest = set.digest()?;
        if let Some(prior) = self.find_record(set.id())? {
            if prior.digest == digest {
                debug!(change_set = %set.id(), "change set already applied");
                return Ok(prior.receipt);
            }
            return Err(StoreError::Conflict(format!(
                "change set {} was already applied with different content",
                set.id()
            )));
        }
        if set.is_empty() {
            return Err(StoreError::ValidationFailed(format!(
                "change set {} has no changes",
                set.id()
            )));
        }

        debug!(
            change_set = %set.id(),
            order = %set.order(),
            changes = set.changes().len(),
            "applying change set"
        );

        let mut documents = Vec::with_capacity(set.changes().len());
        for change in set.changes() {
            let handler = self.registry.resolve(&change.collection)?.clone();
            self.touched.insert(change.collection.clone());

            match &change.kind {
                ChangeKind::Create { document_id, value } => {
                    self.apply_create(handler.as_ref(), set, change, document_id, value)?
                }
                ChangeKind::Modify { document_id, keys } => {
                    self.apply_modify(handler.as_ref(), set, change, document_id, keys)?
                }
                ChangeKind::Delete { document_id } => {
                    self.apply_delete(handler.as_ref(), set, change, document_id)?
                }
            }
            documents.push(change.document_id().clone());
        }

        let receipt = ChangeSetReceipt {
            change_set_id: set.id().clone(),
            order: set.order_key(),
            documents,
        };
        self.change_sets.push(ChangeSetRecord {
            receipt: receipt.clone(),
            digest,
        });
        self.max_order.join_assign(&set.order());
        Ok(receipt)
    }

    fn apply_create(
        &mut self,
        handler: &dyn Handler,
        set: &ChangeSet,
        change: &Change,
        id: &DocumentId,
        initial: &Value,
    ) -> Result<()> {
        let collection = &change.collection;
        if !initial.is_object() {
            return Err(StoreError::ValidationFailed(format!(
                "initial value of {}/{} is not an object",
                collection, id
            )));
        }

        let mut value = initial.clone();
        {
            let view = TxView {
                backend: self.backend,
                staged: &self.staged,
            };
            match view.find(collection, id)? {
                Some(Entry::Live(_)) => {
                    return Err(StoreError::ValidationFailed(format!(
                        "document {}/{} already exists",
                        collection, id
                    )))
                }
                Some(Entry::Tombstone(_)) => {
                    return Err(StoreError::ValidationFailed(format!(
                        "document {}/{} was deleted",
                        collection, id
                    )))
                }
                None => {}
            }
            let op = ChangeOp {
                change,
                change_set: set,
                view: &view,
            };
            handler.before_create(&op, &mut value)?;
        }

        let document = Document::new(id.clone(), value, set.order_key());
        self.stage(collection, id, Some(Entry::Live(document)));
        Ok(())
    }

    fn apply_modify(
        &mut self,
        handler: &dyn Handler,
        set: &ChangeSet,
        change: &Change,
        id: &DocumentId,
        keys: &[KeyModify],
    ) -> Result<()> {
        let collection = &change.collection;
        if keys.is_empty() {
            return Err(StoreError::ValidationFailed(format!(
                "modify of {}/{} has no key paths",
                collection, id
            )));
        }

        let updated = {
            let view = TxView {
                backend: self.backend,
                staged: &self.staged,
            };
            let current = match view.find(collection, id)? {
                Some(Entry::Tombstone(_)) => {
                    return Err(StoreError::NotFound(format!("{}/{}", collection, id)))
                }
                other => other.and_then(Entry::into_live),
            };
            let op = ChangeOp {
                change,
                change_set: set,
                view: &view,
            };
            let mode = handler.before_modify(&op)?;
            let mut document = match (current, mode) {
                (Some(document), _) => document,
                (None, ModifyMode::Upsert) => Document::new(
                    id.clone(),
                    Value::Object(Map::new()),
                    set.order_key(),
                ),
                (None, ModifyMode::MergeOnly) => {
                    return Err(StoreError::NotFound(format!("{}/{}", collection, id)))
                }
            };

            let mut changed = false;
            for key in keys {
                let raw: Box<dyn Modifier + '_> = Box::new(KeyPathModifier::new(key));
                let modifier = handler.wrap_key_modifier(&op, key, raw);
                let result = modifier.modify(&document.value)?;
                if result.changed {
                    document.value = result.value;
                    changed = true;
                }
            }
            if changed {
                document.modified = set.order_key();
                Some(document)
            } else {
                None
            }
        };

        if let Some(document) = updated {
            self.stage(collection, id, Some(Entry::Live(document)));
        }
        Ok(())
    }

    fn apply_delete(
        &mut self,
        handler: &dyn Handler,
        set: &ChangeSet,
        change: &Change,
        id: &DocumentId,
    ) -> Result<()> {
        let collection = &change.collection;
        let (document, mode) = {
            let view = TxView {
                backend: self.backend,
                staged: &self.staged,
            };
            let document = view.find_live(collection, id)?;
            let op = ChangeOp {
                change,
                change_set: set,
                view: &view,
            };
            (document, handler.before_delete(&op)?)
        };

        let entry = match mode {
            DeleteMode::HardDelete => None,
            DeleteMode::Tombstone => Some(Entry::Tombstone(Tombstone {
                id: id.clone(),
                created: document.created,
                deleted: set.order_key(),
                deleted_at: change.timestamp,
                recorded_at: self.started_at,
            })),
        };
        self.stage(collection, id, entry);
        Ok(())
    }

    fn stage(&mut self, collection: &str, id: &DocumentId, entry: Option<Entry>) {
        self.staged.insert((collection.to_string(), id.clone()), entry);
    }
}

/// Every change must carry its set's creator and timestamp. Sets decoded
/// from the wire skip the builder that guarantees this.
fn check_stamps(set: &ChangeSet) -> Result<()> {
    for change in set.changes() {
        if change.creator != set.creator() || change.timestamp != set.timestamp() {
            return Err(StoreError::ValidationFailed(format!(
                "change set {}: {} of {} stamped by {} at {}, set by {} at {}",
                set.id(),
                change.kind_name(),
                change.document_id(),
                change.creator,
                change.timestamp,
                set.creator(),
                set.timestamp()
            )));
        }
    }
    Ok(())
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.state == TxState::Active {
            self.discard();
        }
    }
}
