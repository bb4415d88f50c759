//! Chat message model.
//!
//! A message is stored as one document of the `chats` collection:
//!
//! ```json
//! {
//!   "creator": "identity1",
//!   "createdAt": 1700000000000,
//!   "modifiedAt": 1700000005000,
//!   "replyToMessageId": "01H...",
//!   "content": {
//!     "message": { "text": "hi", "style": "paragraph", "marks": [] },
//!     "attachments": [{ "target": "obj1", "type": "image" }]
//!   },
//!   "reactions": { "👍": ["identity2"] }
//! }
//! ```
//!
//! `content` and `reactions` are the only top-level keys that can be
//! modified after creation.

use crate::subscription::Projected;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tessera_core::{DocumentId, OrderKey};
use tessera_store::{Document, StoreError};

/// Top-level key holding message text and attachments.
pub const CONTENT_KEY: &str = "content";
/// Top-level key holding reactions.
pub const REACTIONS_KEY: &str = "reactions";

/// Emoji to the identities that reacted with it.
pub type Reactions = BTreeMap<String, Vec<String>>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageStyle {
    #[default]
    Paragraph,
    Header1,
    Header2,
    Header3,
    Quote,
    Code,
    Callout,
    Checkbox,
    Marked,
    Numbered,
    Toggle,
    Description,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MarkKind {
    Strikethrough,
    Keyboard,
    Italic,
    Bold,
    Underscored,
    Link,
    TextColor,
    BackgroundColor,
    Mention,
    Emoji,
}

/// Inline formatting over a character range.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mark {
    pub from: u32,
    pub to: u32,
    #[serde(rename = "type")]
    pub kind: MarkKind,
    /// Link target, color name, mentioned object...
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub param: String,
}

impl Mark {
    pub fn new(from: u32, to: u32, kind: MarkKind) -> Self {
        Self {
            from,
            to,
            kind,
            param: String::new(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent {
    pub text: String,
    #[serde(default)]
    pub style: MessageStyle,
    #[serde(default)]
    pub marks: Vec<Mark>,
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttachmentKind {
    File,
    Image,
    Link,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub target: String,
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
}

/// The editable part of a message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredContent {
    pub message: MessageContent,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// Stored document layout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageDocument {
    creator: String,
    created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    modified_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reply_to_message_id: Option<String>,
    content: StoredContent,
    #[serde(default)]
    reactions: Reactions,
}

/// A message as authored locally, before the store stamps it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageDraft {
    pub reply_to_message_id: Option<String>,
    pub message: MessageContent,
    pub attachments: Vec<Attachment>,
}

impl MessageDraft {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            message: MessageContent::text(text),
            ..Default::default()
        }
    }

    pub fn reply_to(mut self, message_id: impl Into<String>) -> Self {
        self.reply_to_message_id = Some(message_id.into());
        self
    }

    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Initial document value. Creator and timestamps are stamped by the handler.
    pub fn to_value(&self) -> Result<Value, StoreError> {
        let content = StoredContent {
            message: self.message.clone(),
            attachments: self.attachments.clone(),
        };
        let mut doc = Map::new();
        doc.insert(CONTENT_KEY.to_string(), serde_json::to_value(content)?);
        if let Some(reply) = &self.reply_to_message_id {
            doc.insert(
                "replyToMessageId".to_string(),
                Value::String(reply.clone()),
            );
        }
        Ok(Value::Object(doc))
    }
}

/// A chat message as exposed to readers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    /// Order position of the creating change set.
    pub order_id: String,
    /// Merge key of the creating change set.
    pub created: OrderKey,
    pub creator: String,
    pub created_at: i64,
    pub modified_at: Option<i64>,
    pub reply_to_message_id: Option<String>,
    pub message: MessageContent,
    pub attachments: Vec<Attachment>,
    pub reactions: Reactions,
}

impl ChatMessage {
    /// Decode a stored value. Malformed values fail validation.
    pub fn from_value(
        id: &DocumentId,
        created: &OrderKey,
        value: &Value,
    ) -> Result<Self, StoreError> {
        let doc: MessageDocument = serde_json::from_value(value.clone()).map_err(|e| {
            StoreError::ValidationFailed(format!("malformed chat message {}: {}", id, e))
        })?;

        let mut reactions = doc.reactions;
        reactions.retain(|_, ids| !ids.is_empty());

        Ok(Self {
            id: id.to_string(),
            order_id: created.order.to_string(),
            created: created.clone(),
            creator: doc.creator,
            created_at: doc.created_at,
            modified_at: doc.modified_at,
            reply_to_message_id: doc.reply_to_message_id,
            message: doc.content.message,
            attachments: doc.content.attachments,
            reactions,
        })
    }

    pub fn from_document(doc: &Document) -> Result<Self, StoreError> {
        Self::from_value(&doc.id, &doc.created, &doc.value)
    }

    pub fn text(&self) -> &str {
        &self.message.text
    }

    /// Whether `identity` reacted with `emoji`.
    pub fn has_reaction(&self, emoji: &str, identity: &str) -> bool {
        self.reactions
            .get(emoji)
            .is_some_and(|ids| ids.iter().any(|id| id == identity))
    }
}

impl Projected for ChatMessage {
    fn id(&self) -> &str {
        &self.id
    }

    /// The store's merge key of the creating change set.
    fn order_key(&self) -> OrderKey {
        self.created.clone()
    }
}
