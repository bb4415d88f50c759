//! Changes and change sets.
//!
//! A [`Change`] targets one document in one collection. Changes are submitted
//! in a [`ChangeSet`], which is applied all-or-nothing, identified by a
//! [`ChangeSetId`] for idempotent replay and ordered by a single [`OrderId`].

use crate::error::{CoreError, Result};
use crate::order::{OrderId, OrderKey};
use crate::path::KeyModify;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use ulid::Ulid;

/// Unique identifier for a document within a collection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn new() -> Self {
        Self(Ulid::new().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a change set.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChangeSetId(pub String);

impl ChangeSetId {
    pub fn new() -> Self {
        Self(Ulid::new().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ChangeSetId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ChangeSetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a change does to its target document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChangeKind {
    /// Create the document with an initial value.
    #[serde(rename_all = "camelCase")]
    Create { document_id: DocumentId, value: Value },
    /// Modify one or more key paths of the document.
    #[serde(rename_all = "camelCase")]
    Modify {
        document_id: DocumentId,
        keys: Vec<KeyModify>,
    },
    /// Delete the document.
    #[serde(rename_all = "camelCase")]
    Delete { document_id: DocumentId },
}

/// One atomic operation on one document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Change {
    /// Collection the target document lives in.
    pub collection: String,
    /// Identity of the author.
    pub creator: String,
    /// Author's wall-clock claim in milliseconds. Untrusted.
    pub timestamp: i64,
    pub kind: ChangeKind,
}

impl Change {
    /// A create change. Creator and timestamp are stamped by the set builder.
    pub fn create(collection: impl Into<String>, document_id: DocumentId, value: Value) -> Self {
        Self::unstamped(collection, ChangeKind::Create { document_id, value })
    }

    pub fn modify(
        collection: impl Into<String>,
        document_id: DocumentId,
        keys: Vec<KeyModify>,
    ) -> Self {
        Self::unstamped(collection, ChangeKind::Modify { document_id, keys })
    }

    pub fn delete(collection: impl Into<String>, document_id: DocumentId) -> Self {
        Self::unstamped(collection, ChangeKind::Delete { document_id })
    }

    fn unstamped(collection: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            collection: collection.into(),
            creator: String::new(),
            timestamp: 0,
            kind,
        }
    }

    /// The document this change targets.
    pub fn document_id(&self) -> &DocumentId {
        match &self.kind {
            ChangeKind::Create { document_id, .. }
            | ChangeKind::Modify { document_id, .. }
            | ChangeKind::Delete { document_id } => document_id,
        }
    }

    /// Short name of the change kind, for logs.
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            ChangeKind::Create { .. } => "create",
            ChangeKind::Modify { .. } => "modify",
            ChangeKind::Delete { .. } => "delete",
        }
    }
}

/// An ordered, non-empty batch of changes applied atomically.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    id: ChangeSetId,
    order: OrderId,
    creator: String,
    timestamp: i64,
    changes: Vec<Change>,
}

impl ChangeSet {
    /// Start building a change set.
    pub fn builder(id: ChangeSetId, creator: impl Into<String>) -> ChangeSetBuilder {
        ChangeSetBuilder {
            id,
            creator: creator.into(),
            order: None,
            timestamp: 0,
            changes: Vec::new(),
        }
    }

    pub fn id(&self) -> &ChangeSetId {
        &self.id
    }

    pub fn order(&self) -> OrderId {
        self.order
    }

    pub fn creator(&self) -> &str {
        &self.creator
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// The merge-order key of this set.
    pub fn order_key(&self) -> OrderKey {
        OrderKey::new(self.order, self.creator.clone(), self.id.clone())
    }

    /// SHA-256 over the content of the set, hex encoded.
    ///
    /// Two submissions with the same id and digest are the same set; the
    /// same id with a different digest is a conflict.
    pub fn digest(&self) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(self.creator.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.order.to_string().as_bytes());
        hasher.update([0u8]);
        hasher.update(serde_json::to_vec(&self.changes)?);
        Ok(hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect())
    }
}

/// Builder for [`ChangeSet`].
pub struct ChangeSetBuilder {
    id: ChangeSetId,
    creator: String,
    order: Option<OrderId>,
    timestamp: i64,
    changes: Vec<Change>,
}

impl ChangeSetBuilder {
    pub fn order(mut self, order: OrderId) -> Self {
        self.order = Some(order);
        self
    }

    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn change(mut self, change: Change) -> Self {
        self.changes.push(change);
        self
    }

    pub fn changes(mut self, changes: impl IntoIterator<Item = Change>) -> Self {
        self.changes.extend(changes);
        self
    }

    /// Stamp every change with the set's creator and timestamp and build.
    pub fn build(self) -> Result<ChangeSet> {
        let order = self.order.ok_or_else(|| {
            CoreError::OrderingUnavailable(format!("change set {} has no order", self.id))
        })?;
        if self.changes.is_empty() {
            return Err(CoreError::InvalidChangeSet(format!(
                "change set {} has no changes",
                self.id
            )));
        }
        let creator = self.creator;
        let timestamp = self.timestamp;
        let changes = self
            .changes
            .into_iter()
            .map(|mut change| {
                change.creator = creator.clone();
                change.timestamp = timestamp;
                change
            })
            .collect();

        Ok(ChangeSet {
            id: self.id,
            order,
            creator,
            timestamp,
            changes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::{KeyPath, ModifyOp};
    use serde_json::json;

    fn sample(id: &str, text: &str) -> ChangeSet {
        ChangeSet::builder(ChangeSetId::from_string(id), "u1")
            .order(OrderId::from_position(1))
            .timestamp(1_000)
            .change(Change::create(
                "notes",
                DocumentId::from_string("d1"),
                json!({"text": text}),
            ))
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_stamps_changes() {
        let set = sample("cs1", "hi");
        assert_eq!(set.changes().len(), 1);
        assert_eq!(set.changes()[0].creator, "u1");
        assert_eq!(set.changes()[0].timestamp, 1_000);
        assert_eq!(set.changes()[0].kind_name(), "create");
        assert_eq!(set.changes()[0].document_id().as_str(), "d1");
    }

    #[test]
    fn test_builder_rejects_empty_and_unordered() {
        let empty = ChangeSet::builder(ChangeSetId::new(), "u1")
            .order(OrderId::from_position(1))
            .build();
        assert!(matches!(empty, Err(CoreError::InvalidChangeSet(_))));

        let unordered = ChangeSet::builder(ChangeSetId::new(), "u1")
            .change(Change::delete("notes", DocumentId::new()))
            .build();
        assert!(matches!(unordered, Err(CoreError::OrderingUnavailable(_))));
    }

    #[test]
    fn test_digest_tracks_content() {
        let a = sample("cs1", "hi");
        let b = sample("cs1", "hi");
        let c = sample("cs1", "bye");

        assert_eq!(a.digest().unwrap(), b.digest().unwrap());
        assert_ne!(a.digest().unwrap(), c.digest().unwrap());
        assert_eq!(a.digest().unwrap().len(), 64);
    }

    #[test]
    fn test_change_set_serde() {
        let set = ChangeSet::builder(ChangeSetId::from_string("cs2"), "u2")
            .order(OrderId::from_position(7))
            .change(Change::modify(
                "notes",
                DocumentId::from_string("d1"),
                vec![KeyModify::new(
                    KeyPath::parse("tags").unwrap(),
                    ModifyOp::AddToSet(json!("x")),
                )],
            ))
            .build()
            .unwrap();

        let wire = serde_json::to_string(&set).unwrap();
        let back: ChangeSet = serde_json::from_str(&wire).unwrap();
        assert_eq!(back, set);
        assert_eq!(back.digest().unwrap(), set.digest().unwrap());
    }
}
