//! Per-collection handlers.
//!
//! Every collection has exactly one [`Handler`]. The transaction resolves it
//! by collection name for each change and runs the matching hook before the
//! raw mutation. A hook error aborts the whole change set.

use crate::backend::Backend;
use crate::document::{Document, Entry};
use crate::error::{Result, StoreError};
use crate::modifier::Modifier;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tessera_core::{Change, ChangeSet, DocumentId, KeyModify, OrderKey};

/// How a modify change treats a missing target document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModifyMode {
    /// Start from an empty document when the target is absent.
    Upsert,
    /// Fail with `NotFound` when the target is absent.
    MergeOnly,
}

/// What a delete change leaves behind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteMode {
    /// Remove the document.
    HardDelete,
    /// Replace the document with a tombstone.
    Tombstone,
}

/// Read access to the store as seen by the running transaction.
pub trait DocumentView {
    fn find(&self, collection: &str, id: &DocumentId) -> Result<Option<Entry>>;

    /// Look up a live document, failing with `NotFound` when absent or deleted.
    fn find_live(&self, collection: &str, id: &DocumentId) -> Result<Document> {
        self.find(collection, id)?
            .and_then(Entry::into_live)
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", collection, id)))
    }
}

/// A change being applied, as handed to hooks.
pub struct ChangeOp<'a> {
    pub change: &'a Change,
    pub change_set: &'a ChangeSet,
    pub view: &'a dyn DocumentView,
}

impl ChangeOp<'_> {
    /// Identity that authored the change.
    pub fn creator(&self) -> &str {
        &self.change.creator
    }

    pub fn document_id(&self) -> &DocumentId {
        self.change.document_id()
    }

    /// Merge key of the enclosing change set.
    pub fn order_key(&self) -> OrderKey {
        self.change_set.order_key()
    }
}

/// Collection-specific authorization, validation and projection logic.
pub trait Handler: Send + Sync {
    /// The collection this handler is bound to.
    fn collection_name(&self) -> &str;

    /// Called once per store lifetime. Must be idempotent.
    fn init(&self, backend: &dyn Backend) -> Result<()> {
        backend.open_collection(self.collection_name())
    }

    /// Inspect or augment the initial value of a created document.
    fn before_create(&self, op: &ChangeOp<'_>, value: &mut Value) -> Result<()>;

    /// Decide how a modify treats a missing document.
    fn before_modify(&self, op: &ChangeOp<'_>) -> Result<ModifyMode>;

    /// Authorize a delete and choose what it leaves behind.
    fn before_delete(&self, op: &ChangeOp<'_>) -> Result<DeleteMode>;

    /// Compose domain logic around the raw modifier of one key path.
    fn wrap_key_modifier<'a>(
        &'a self,
        op: &ChangeOp<'_>,
        key: &'a KeyModify,
        raw: Box<dyn Modifier + 'a>,
    ) -> Box<dyn Modifier + 'a>;

    /// The transaction that ran this handler's hooks committed.
    fn after_commit(&self) {}

    /// The transaction that ran this handler's hooks was discarded.
    fn after_rollback(&self) {}
}

/// Handlers keyed by collection name.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. A collection can only have one.
    pub fn register(&mut self, handler: Arc<dyn Handler>) -> Result<()> {
        let name = handler.collection_name().to_string();
        if self.handlers.contains_key(&name) {
            return Err(StoreError::ValidationFailed(format!(
                "collection {} already has a handler",
                name
            )));
        }
        self.handlers.insert(name, handler);
        Ok(())
    }

    /// Builder-style registration.
    pub fn with(mut self, handler: Arc<dyn Handler>) -> Result<Self> {
        self.register(handler)?;
        Ok(self)
    }

    pub fn get(&self, collection: &str) -> Option<&Arc<dyn Handler>> {
        self.handlers.get(collection)
    }

    /// Resolve the handler for a change's collection.
    pub fn resolve(&self, collection: &str) -> Result<&Arc<dyn Handler>> {
        self.get(collection).ok_or_else(|| {
            StoreError::ValidationFailed(format!("no handler for collection {}", collection))
        })
    }

    pub fn collection_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.handlers.keys().map(String::as_str)
    }

    pub fn handlers(&self) -> impl Iterator<Item = &Arc<dyn Handler>> + '_ {
        self.handlers.values()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
