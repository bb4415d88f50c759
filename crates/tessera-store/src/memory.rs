//! In-memory backend.

use crate::backend::{Backend, ChangeSetRecord, WriteBatch, WriteOp};
use crate::document::Entry;
use crate::error::{Result, StoreError};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tessera_core::{ChangeSetId, DocumentId, Lattice, OrderId};

#[derive(Debug, Default)]
struct MemoryState {
    collections: BTreeMap<String, BTreeMap<DocumentId, Entry>>,
    ledger: HashMap<ChangeSetId, ChangeSetRecord>,
    max_order: OrderId,
}

/// Backend keeping everything in process memory.
///
/// Failure injection (`set_available`, `fail_next_commit`) lets tests
/// exercise the unavailable-store paths.
#[derive(Debug)]
pub struct MemoryBackend {
    state: RwLock<MemoryState>,
    available: AtomicBool,
    failing_commits: AtomicUsize,
}

impl MemoryBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        MemoryBackend {
            state: RwLock::new(MemoryState::default()),
            available: AtomicBool::new(true),
            failing_commits: AtomicUsize::new(0),
        }
    }

    /// Make every call fail with `StoreUnavailable` until re-enabled.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Make the next commit fail with `StoreUnavailable`, leaving state untouched.
    pub fn fail_next_commit(&self) {
        self.failing_commits.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of change sets in the ledger.
    pub fn ledger_len(&self) -> usize {
        self.state.read().ledger.len()
    }

    fn check(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::StoreUnavailable(
                "memory backend offline".to_string(),
            ))
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for MemoryBackend {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn open_collection(&self, name: &str) -> Result<()> {
        self.check()?;
        self.state
            .write()
            .collections
            .entry(name.to_string())
            .or_default();
        Ok(())
    }

    fn collections(&self) -> Result<Vec<String>> {
        self.check()?;
        Ok(self.state.read().collections.keys().cloned().collect())
    }

    fn find_entry(&self, collection: &str, id: &DocumentId) -> Result<Option<Entry>> {
        self.check()?;
        Ok(self
            .state
            .read()
            .collections
            .get(collection)
            .and_then(|c| c.get(id))
            .cloned())
    }

    fn scan(&self, collection: &str) -> Result<Vec<Entry>> {
        self.check()?;
        Ok(self
            .state
            .read()
            .collections
            .get(collection)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default())
    }

    fn max_order(&self) -> Result<OrderId> {
        self.check()?;
        Ok(self.state.read().max_order)
    }

    fn change_set(&self, id: &ChangeSetId) -> Result<Option<ChangeSetRecord>> {
        self.check()?;
        Ok(self.state.read().ledger.get(id).cloned())
    }

    fn commit(&self, batch: WriteBatch) -> Result<()> {
        self.check()?;
        let fail = self
            .failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(StoreError::StoreUnavailable(
                "injected commit failure".to_string(),
            ));
        }

        let mut state = self.state.write();
        for op in batch.ops {
            match op {
                WriteOp::Put { collection, entry } => {
                    state
                        .collections
                        .entry(collection)
                        .or_default()
                        .insert(entry.id().clone(), entry);
                }
                WriteOp::Remove { collection, id } => {
                    if let Some(c) = state.collections.get_mut(&collection) {
                        c.remove(&id);
                    }
                }
            }
        }
        for record in batch.change_sets {
            state
                .ledger
                .insert(record.receipt.change_set_id.clone(), record);
        }
        if let Some(order) = batch.max_order {
            state.max_order.join_assign(&order);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use serde_json::json;
    use tessera_core::OrderKey;

    fn doc(id: &str) -> Entry {
        Entry::Live(Document::new(
            DocumentId::from_string(id),
            json!({"n": 1}),
            OrderKey::new(OrderId::from_position(1), "u1", ChangeSetId::from_string("cs")),
        ))
    }

    #[test]
    fn test_commit_and_read() {
        let backend = MemoryBackend::new();
        backend.open_collection("notes").unwrap();

        let batch = WriteBatch {
            ops: vec![WriteOp::Put {
                collection: "notes".to_string(),
                entry: doc("a"),
            }],
            change_sets: Vec::new(),
            max_order: Some(OrderId::from_position(4)),
        };
        backend.commit(batch).unwrap();

        let found = backend
            .find_entry("notes", &DocumentId::from_string("a"))
            .unwrap();
        assert!(found.is_some());
        assert_eq!(backend.scan("notes").unwrap().len(), 1);
        assert_eq!(backend.max_order().unwrap(), OrderId::from_position(4));
    }

    #[test]
    fn test_max_order_never_moves_back() {
        let backend = MemoryBackend::new();
        for position in [5, 2, 9, 1] {
            backend
                .commit(WriteBatch {
                    max_order: Some(OrderId::from_position(position)),
                    ..Default::default()
                })
                .unwrap();
        }
        assert_eq!(backend.max_order().unwrap(), OrderId::from_position(9));
    }

    #[test]
    fn test_missing_collection_is_empty() {
        let backend = MemoryBackend::new();
        assert!(backend.scan("nothing").unwrap().is_empty());
        assert!(backend
            .find_entry("nothing", &DocumentId::from_string("x"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_failure_injection() {
        let backend = MemoryBackend::new();
        backend.fail_next_commit();

        let batch = WriteBatch {
            ops: vec![WriteOp::Put {
                collection: "notes".to_string(),
                entry: doc("a"),
            }],
            ..Default::default()
        };
        assert!(matches!(
            backend.commit(batch.clone()),
            Err(StoreError::StoreUnavailable(_))
        ));
        assert!(backend.scan("notes").unwrap().is_empty());

        backend.commit(batch).unwrap();
        assert_eq!(backend.scan("notes").unwrap().len(), 1);

        backend.set_available(false);
        assert!(!backend.is_available());
        assert!(matches!(
            backend.max_order(),
            Err(StoreError::StoreUnavailable(_))
        ));
    }
}
