//! Tessera SDK - chat objects on top of the tessera store
//!
//! This SDK wires the transactional store to a concrete domain: a chat whose
//! messages are documents of the `chats` collection, kept in a live,
//! ordered projection.
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use tessera_sdk::{ChatConfigBuilder, ChatObject, MemoryBackend, MessageDraft};
//!
//! let config = ChatConfigBuilder::new()
//!     .chat_id("team-chat")
//!     .identity("alice")
//!     .build();
//! let chat = ChatObject::open(Arc::new(MemoryBackend::new()), config).unwrap();
//!
//! let id = chat.add_message(MessageDraft::text("Hello, world!")).unwrap();
//! assert_eq!(chat.get_message(&id).unwrap().creator, "alice");
//! ```
//!
//! # Architecture
//!
//! - [`chat`] - Chat model, handler and the [`ChatObject`] facade
//! - [`subscription`] - Live projections fed by committed transactions
//! - [`replay`] - Bounded worker applying remote change sets
//! - [`error`] - Error types

pub mod chat;
pub mod error;
pub mod replay;
pub mod subscription;

// Re-exports for convenience
pub use chat::{
    Attachment, AttachmentKind, ChatConfig, ChatConfigBuilder, ChatHandler, ChatMessage,
    ChatObject, Mark, MarkKind, MessageContent, MessageDraft, MessageStyle, Reactions,
};
pub use error::{Result, SdkError};
pub use replay::{
    MemorySource, RemoteSource, ReplayConfig, ReplayConfigBuilder, ReplayFailure, ReplayQueue,
};
pub use subscription::{Projected, ProjectionEvent, Subscription};
pub use tessera_store::{MemoryBackend, StoreError, TombstonePolicy};
