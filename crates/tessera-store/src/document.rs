//! Stored documents and tombstones.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tessera_core::{DocumentId, OrderKey};

/// A live document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    /// The value tree.
    pub value: Value,
    /// Merge key of the change set that created the document.
    pub created: OrderKey,
    /// Merge key of the change set that last changed the document.
    pub modified: OrderKey,
}

impl Document {
    pub fn new(id: DocumentId, value: Value, created: OrderKey) -> Self {
        Self {
            id,
            value,
            modified: created.clone(),
            created,
        }
    }

    /// Read a top-level string field.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(Value::as_str)
    }
}

/// Marker left in place of a deleted document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tombstone {
    pub id: DocumentId,
    /// Merge key of the change set that created the document.
    pub created: OrderKey,
    /// Merge key of the change set that deleted it.
    pub deleted: OrderKey,
    /// Author's timestamp of the delete, milliseconds. Untrusted.
    pub deleted_at: i64,
    /// Local time the delete was applied, milliseconds.
    pub recorded_at: i64,
}

/// What a collection holds under an id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Entry {
    Live(Document),
    Tombstone(Tombstone),
}

impl Entry {
    pub fn id(&self) -> &DocumentId {
        match self {
            Entry::Live(doc) => &doc.id,
            Entry::Tombstone(t) => &t.id,
        }
    }

    pub fn as_live(&self) -> Option<&Document> {
        match self {
            Entry::Live(doc) => Some(doc),
            Entry::Tombstone(_) => None,
        }
    }

    pub fn into_live(self) -> Option<Document> {
        match self {
            Entry::Live(doc) => Some(doc),
            Entry::Tombstone(_) => None,
        }
    }

    pub fn as_tombstone(&self) -> Option<&Tombstone> {
        match self {
            Entry::Live(_) => None,
            Entry::Tombstone(t) => Some(t),
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, Entry::Tombstone(_))
    }
}
