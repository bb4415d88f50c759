//! Chat objects: messages with authorship rules, reactions and a live list.

pub mod handler;
pub mod model;
pub mod object;

pub use handler::{ChatHandler, COLLECTION};
pub use model::{
    Attachment, AttachmentKind, ChatMessage, Mark, MarkKind, MessageContent, MessageDraft,
    MessageStyle, Reactions, StoredContent,
};
pub use object::{ChatConfig, ChatConfigBuilder, ChatObject};
