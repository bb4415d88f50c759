//! Live projections of a collection.
//!
//! Handler hooks queue [`ProjectionEvent`]s while a transaction runs. The
//! events reach the projection and the broadcast channel only when the
//! transaction commits, and are dropped when it rolls back, so readers
//! never see state the store does not hold.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use tessera_core::OrderKey;
use tokio::sync::broadcast;
use tracing::debug;

/// A model that can live in a projection.
pub trait Projected: Clone + Send + Sync + 'static {
    fn id(&self) -> &str;

    /// Position of the model in the projection.
    fn order_key(&self) -> OrderKey;

    /// Full list position: the order key, then the id for models created
    /// by the same change set.
    fn list_position(&self) -> (OrderKey, String) {
        (self.order_key(), self.id().to_string())
    }
}

/// Events emitted when the projection changes.
#[derive(Clone, Debug, PartialEq)]
pub enum ProjectionEvent<M> {
    /// A model was created.
    Added(M),
    /// Only secondary fields (such as reactions) changed.
    UpdatedPartial(M),
    /// The model's main content changed.
    UpdatedFull(M),
    /// A model was deleted.
    Deleted { id: String },
}

impl<M: Projected> ProjectionEvent<M> {
    pub fn id(&self) -> &str {
        match self {
            ProjectionEvent::Added(m)
            | ProjectionEvent::UpdatedPartial(m)
            | ProjectionEvent::UpdatedFull(m) => m.id(),
            ProjectionEvent::Deleted { id } => id,
        }
    }
}

/// Pending-event buffer plus the committed projection.
pub struct Subscription<M: Projected> {
    pending: Mutex<Vec<ProjectionEvent<M>>>,
    view: RwLock<HashMap<String, M>>,
    event_tx: broadcast::Sender<ProjectionEvent<M>>,
}

impl<M: Projected> Subscription<M> {
    pub fn new(capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            pending: Mutex::new(Vec::new()),
            view: RwLock::new(HashMap::new()),
            event_tx,
        }
    }

    pub fn add(&self, model: M) {
        self.pending.lock().push(ProjectionEvent::Added(model));
    }

    pub fn update_partial(&self, model: M) {
        self.pending.lock().push(ProjectionEvent::UpdatedPartial(model));
    }

    pub fn update_full(&self, model: M) {
        self.pending.lock().push(ProjectionEvent::UpdatedFull(model));
    }

    pub fn delete(&self, id: impl Into<String>) {
        self.pending
            .lock()
            .push(ProjectionEvent::Deleted { id: id.into() });
    }

    /// Number of queued, unpublished events.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Publish queued events. Called once the transaction has committed.
    pub fn flush(&self) {
        let events = std::mem::take(&mut *self.pending.lock());
        if events.is_empty() {
            return;
        }

        {
            let mut view = self.view.write();
            for event in &events {
                match event {
                    ProjectionEvent::Added(m)
                    | ProjectionEvent::UpdatedPartial(m)
                    | ProjectionEvent::UpdatedFull(m) => {
                        view.insert(m.id().to_string(), m.clone());
                    }
                    ProjectionEvent::Deleted { id } => {
                        view.remove(id);
                    }
                }
            }
        }

        debug!(events = events.len(), "projection flushed");
        for event in events {
            // No receivers is fine.
            let _ = self.event_tx.send(event);
        }
    }

    /// Drop queued events. Called when the transaction rolled back.
    pub fn discard(&self) {
        let dropped = std::mem::take(&mut *self.pending.lock()).len();
        if dropped > 0 {
            debug!(events = dropped, "projection events discarded");
        }
    }

    /// Replace the projection wholesale, without emitting events.
    pub fn rebuild(&self, models: impl IntoIterator<Item = M>) {
        let mut view = self.view.write();
        view.clear();
        view.extend(models.into_iter().map(|m| (m.id().to_string(), m)));
    }

    /// Snapshot of the projection in merge order.
    pub fn list(&self) -> Vec<M> {
        let mut models: Vec<M> = self.view.read().values().cloned().collect();
        models.sort_by_cached_key(|m| m.list_position());
        models
    }

    pub fn get(&self, id: &str) -> Option<M> {
        self.view.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.view.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.view.read().is_empty()
    }

    /// Subscribe to committed projection events.
    pub fn subscribe(&self) -> broadcast::Receiver<ProjectionEvent<M>> {
        self.event_tx.subscribe()
    }
}
