// File: `crates/tessera-core/src/lib.rs`
//! # tessera-core
//!
//! The change model of the tessera object store.
//!
//! Documents are never written field by field. Every mutation is a
//! [`Change`] (create, modify key path, delete), grouped into a [`ChangeSet`]
//! that carries one [`OrderId`]. This crate holds those types plus the
//! path-addressed patch machinery used to modify document value trees.

pub mod change;
pub mod error;
pub mod lattice;
pub mod order;
pub mod path;

pub use change::{Change, ChangeKind, ChangeSet, ChangeSetBuilder, ChangeSetId, DocumentId};
pub use error::{CoreError, Result};
pub use lattice::Lattice;
pub use order::{OrderId, OrderKey};
pub use path::{KeyModify, KeyPath, ModifyOp, Modified};
