//! Persistence contract consumed by the store.
//!
//! A [`Backend`] holds named collections of entries, the change-set ledger
//! and the highest committed order. Writes arrive as one [`WriteBatch`] per
//! transaction and must become visible all at once.

use crate::document::Entry;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use tessera_core::{ChangeSetId, DocumentId, OrderId, OrderKey};

/// Result of applying a change set. Returned again, unchanged, on replay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSetReceipt {
    pub change_set_id: ChangeSetId,
    pub order: OrderKey,
    /// Documents touched by the set, in change order.
    pub documents: Vec<DocumentId>,
}

/// Ledger entry for an applied change set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSetRecord {
    pub receipt: ChangeSetReceipt,
    /// Content digest, used to tell a replay from a conflicting reuse of the id.
    pub digest: String,
}

/// One staged write.
#[derive(Clone, Debug, PartialEq)]
pub enum WriteOp {
    /// Insert or replace the entry under its id.
    Put { collection: String, entry: Entry },
    /// Remove whatever is stored under the id.
    Remove { collection: String, id: DocumentId },
}

impl WriteOp {
    pub fn collection(&self) -> &str {
        match self {
            WriteOp::Put { collection, .. } | WriteOp::Remove { collection, .. } => collection,
        }
    }
}

/// Everything a transaction commits.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WriteBatch {
    pub ops: Vec<WriteOp>,
    pub change_sets: Vec<ChangeSetRecord>,
    /// New visible maximum order, if it moved.
    pub max_order: Option<OrderId>,
}

impl WriteBatch {
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty() && self.change_sets.is_empty() && self.max_order.is_none()
    }
}

/// Collection storage.
pub trait Backend: Send + Sync {
    /// Check whether the backend can currently serve requests.
    fn is_available(&self) -> bool {
        true
    }

    /// Ensure a collection exists. Idempotent.
    fn open_collection(&self, name: &str) -> Result<()>;

    /// Names of existing collections.
    fn collections(&self) -> Result<Vec<String>>;

    /// Point lookup. A missing collection holds nothing.
    fn find_entry(&self, collection: &str, id: &DocumentId) -> Result<Option<Entry>>;

    /// Every entry of a collection, tombstones included, ordered by id.
    fn scan(&self, collection: &str) -> Result<Vec<Entry>>;

    /// Highest committed order.
    fn max_order(&self) -> Result<OrderId>;

    /// Ledger lookup.
    fn change_set(&self, id: &ChangeSetId) -> Result<Option<ChangeSetRecord>>;

    /// Apply a batch atomically: either every write becomes visible or none.
    fn commit(&self, batch: WriteBatch) -> Result<()>;
}
