//! Tombstone collection for bounded storage growth.
//!
//! Tombstones keep deleted ids from being recreated and let late replicas
//! observe the delete. Once a tombstone is older than the retention window
//! and (optionally) below the stable order every replica has seen, it can
//! be removed. The change-set ledger is never collected.

use crate::document::{Entry, Tombstone};
use serde::{Deserialize, Serialize};
use tessera_core::{DocumentId, OrderId};

/// Seven days in milliseconds.
pub const DEFAULT_RETENTION_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// Policy for tombstone collection decisions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TombstonePolicy {
    /// Minimum age, in milliseconds since the delete, before removal.
    pub retention_ms: i64,

    /// Maximum number of tombstones removed in one pass.
    pub max_per_pass: usize,

    /// Only remove tombstones whose delete order is at or below the stable order.
    pub require_stable: bool,
}

impl Default for TombstonePolicy {
    fn default() -> Self {
        TombstonePolicy {
            retention_ms: DEFAULT_RETENTION_MS,
            max_per_pass: 1000,
            require_stable: true,
        }
    }
}

/// Result of a collection pass.
#[derive(Clone, Debug, Default)]
pub struct TombstoneReport {
    /// Removed tombstones as `(collection, id)`.
    pub removed: Vec<(String, DocumentId)>,

    /// Tombstones that were kept (and why).
    pub skipped: Vec<(DocumentId, String)>,

    /// False when `max_per_pass` cut the pass short.
    pub completed: bool,
}

impl TombstoneReport {
    /// Create an empty result (nothing removed).
    pub fn empty() -> Self {
        TombstoneReport {
            completed: true,
            ..Default::default()
        }
    }

    pub fn removed_count(&self) -> usize {
        self.removed.len()
    }
}

/// Decides which tombstones a pass removes.
pub struct TombstoneCollector<'p> {
    policy: &'p TombstonePolicy,
    now_ms: i64,
    stable: Option<OrderId>,
}

impl<'p> TombstoneCollector<'p> {
    pub fn new(policy: &'p TombstonePolicy, now_ms: i64, stable: Option<OrderId>) -> Self {
        Self {
            policy,
            now_ms,
            stable,
        }
    }

    /// Why a tombstone must be kept, if it must.
    ///
    /// Age counts from the author's delete time, capped at the local time
    /// the delete was applied, so a future-dated delete cannot stay forever.
    pub fn keep_reason(&self, tombstone: &Tombstone) -> Option<String> {
        let deleted_at = tombstone.deleted_at.min(tombstone.recorded_at);
        let age = self.now_ms.saturating_sub(deleted_at);
        if age < self.policy.retention_ms {
            return Some(format!(
                "retained for another {}ms",
                self.policy.retention_ms.saturating_sub(age)
            ));
        }
        if self.policy.require_stable {
            match &self.stable {
                None => return Some("no stable order known".to_string()),
                Some(stable) if tombstone.deleted.order > *stable => {
                    return Some(format!(
                        "delete order {} above stable order {}",
                        tombstone.deleted.order, stable
                    ))
                }
                Some(_) => {}
            }
        }
        None
    }

    /// Walk one collection's entries, adding decisions to `report`.
    pub fn collect(&self, collection: &str, entries: &[Entry], report: &mut TombstoneReport) {
        for tombstone in entries.iter().filter_map(Entry::as_tombstone) {
            if let Some(reason) = self.keep_reason(tombstone) {
                report.skipped.push((tombstone.id.clone(), reason));
                continue;
            }
            if report.removed.len() >= self.policy.max_per_pass {
                report.completed = false;
                return;
            }
            report
                .removed
                .push((collection.to_string(), tombstone.id.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use serde_json::json;
    use tessera_core::{ChangeSetId, OrderKey};

    fn key(position: u64) -> OrderKey {
        OrderKey::new(
            OrderId::from_position(position),
            "u1",
            ChangeSetId::from_string(format!("cs{}", position)),
        )
    }

    fn tombstone(id: &str, deleted_at: i64, position: u64) -> Entry {
        Entry::Tombstone(Tombstone {
            id: DocumentId::from_string(id),
            created: key(1),
            deleted: key(position),
            deleted_at,
            recorded_at: deleted_at,
        })
    }

    #[test]
    fn test_retention_window() {
        let policy = TombstonePolicy {
            retention_ms: 1000,
            require_stable: false,
            ..Default::default()
        };
        let entries = vec![tombstone("old", 0, 2), tombstone("new", 900, 3)];

        let mut report = TombstoneReport::empty();
        TombstoneCollector::new(&policy, 1500, None).collect("notes", &entries, &mut report);

        assert_eq!(report.removed_count(), 1);
        assert_eq!(report.removed[0].1, DocumentId::from_string("old"));
        assert_eq!(report.skipped.len(), 1);
        assert!(report.completed);
    }

    #[test]
    fn test_future_dated_delete_ages_from_local_time() {
        let policy = TombstonePolicy {
            retention_ms: 1000,
            require_stable: false,
            ..Default::default()
        };
        let entries = vec![Entry::Tombstone(Tombstone {
            id: DocumentId::from_string("future"),
            created: key(1),
            deleted: key(2),
            deleted_at: i64::MAX,
            recorded_at: 500,
        })];

        let mut report = TombstoneReport::empty();
        TombstoneCollector::new(&policy, 2000, None).collect("notes", &entries, &mut report);
        assert_eq!(report.removed_count(), 1);
    }

    #[test]
    fn test_extreme_times_do_not_overflow() {
        let policy = TombstonePolicy {
            retention_ms: i64::MAX,
            require_stable: false,
            ..Default::default()
        };
        let entries = vec![tombstone("late", i64::MAX, 2)];

        let mut report = TombstoneReport::empty();
        TombstoneCollector::new(&policy, i64::MIN, None).collect("notes", &entries, &mut report);
        assert_eq!(report.removed_count(), 0);
        assert_eq!(report.skipped.len(), 1);
    }

    #[test]
    fn test_stable_order_required() {
        let policy = TombstonePolicy {
            retention_ms: 0,
            ..Default::default()
        };
        let entries = vec![tombstone("a", 0, 2), tombstone("b", 0, 8)];

        let mut report = TombstoneReport::empty();
        TombstoneCollector::new(&policy, 10, None).collect("notes", &entries, &mut report);
        assert_eq!(report.removed_count(), 0);

        let mut report = TombstoneReport::empty();
        TombstoneCollector::new(&policy, 10, Some(OrderId::from_position(5)))
            .collect("notes", &entries, &mut report);
        assert_eq!(report.removed_count(), 1);
        assert_eq!(report.removed[0].1, DocumentId::from_string("a"));
    }

    #[test]
    fn test_live_documents_ignored_and_limit() {
        let policy = TombstonePolicy {
            retention_ms: 0,
            max_per_pass: 1,
            require_stable: false,
        };
        let entries = vec![
            Entry::Live(Document::new(
                DocumentId::from_string("live"),
                json!({}),
                key(1),
            )),
            tombstone("a", 0, 2),
            tombstone("b", 0, 3),
        ];

        let mut report = TombstoneReport::empty();
        TombstoneCollector::new(&policy, 10, None).collect("notes", &entries, &mut report);
        assert_eq!(report.removed_count(), 1);
        assert!(!report.completed);
    }
}
