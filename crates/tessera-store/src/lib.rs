//! # tessera-store
//!
//! Transactional change application for the tessera object store.
//!
//! This crate provides:
//! - A [`Backend`] contract with an in-memory implementation
//! - Per-collection [`Handler`]s with authorization and modifier wrapping hooks
//! - [`Transaction`]s that order, apply and commit change sets atomically
//! - Idempotent replay keyed by change-set id
//! - Tombstone collection
//!
//! ## Example
//!
//! ```rust,ignore
//! use tessera_store::{HandlerRegistry, MemoryBackend, Store};
//!
//! let registry = HandlerRegistry::new().with(Arc::new(NotesHandler))?;
//! let store = Store::open(Arc::new(MemoryBackend::new()), registry)?;
//!
//! let mut tx = store.begin()?;
//! let current = tx.current_max_order()?;
//! let set = ChangeSet::builder(ChangeSetId::new(), "alice")
//!     .order(tx.next_order(&current)?)
//!     .change(Change::create("notes", DocumentId::new(), json!({"title": "hi"})))
//!     .build()?;
//! tx.apply_change_set(&set)?;
//! tx.commit()?;
//! ```

pub mod backend;
pub mod document;
pub mod error;
pub mod handler;
pub mod memory;
pub mod modifier;
pub mod store;
pub mod tombstone;
pub mod transaction;

pub use backend::{Backend, ChangeSetReceipt, ChangeSetRecord, WriteBatch, WriteOp};
pub use document::{Document, Entry, Tombstone};
pub use error::{Result, StoreError};
pub use handler::{ChangeOp, DeleteMode, DocumentView, Handler, HandlerRegistry, ModifyMode};
pub use memory::MemoryBackend;
pub use modifier::{KeyPathModifier, ModifyFn, Modifier};
pub use store::Store;
pub use tombstone::{TombstoneCollector, TombstonePolicy, TombstoneReport};
pub use transaction::Transaction;
