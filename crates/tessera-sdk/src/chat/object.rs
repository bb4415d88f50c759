//! The chat object facade.

use crate::chat::handler::{ChatHandler, COLLECTION};
use crate::chat::model::{ChatMessage, MessageContent, MessageDraft, CONTENT_KEY, REACTIONS_KEY};
use crate::error::Result;
use crate::subscription::{Projected, ProjectionEvent, Subscription};
use serde_json::Value;
use std::sync::Arc;
use tessera_core::{
    Change, ChangeSet, ChangeSetId, DocumentId, KeyModify, KeyPath, ModifyOp, OrderId,
};
use tessera_store::{
    Backend, ChangeSetReceipt, HandlerRegistry, Store, StoreError, TombstonePolicy,
    TombstoneReport,
};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Configuration for a chat object.
#[derive(Clone, Debug)]
pub struct ChatConfig {
    /// Id of the chat this object holds.
    pub chat_id: String,
    /// Identity authoring local changes.
    pub identity: String,
    /// Capacity of the projection event channel.
    pub event_capacity: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            chat_id: "chat".to_string(),
            identity: "anonymous".to_string(),
            event_capacity: 100,
        }
    }
}

/// Builder for chat configuration.
pub struct ChatConfigBuilder {
    config: ChatConfig,
}

impl ChatConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ChatConfig::default(),
        }
    }

    pub fn chat_id(mut self, id: impl Into<String>) -> Self {
        self.config.chat_id = id.into();
        self
    }

    pub fn identity(mut self, identity: impl Into<String>) -> Self {
        self.config.identity = identity.into();
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    pub fn build(self) -> ChatConfig {
        self.config
    }
}

impl Default for ChatConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A chat: its message store, handler and live message list.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use tessera_sdk::{ChatConfigBuilder, ChatObject, MemoryBackend, MessageDraft};
///
/// let config = ChatConfigBuilder::new().chat_id("chat1").identity("alice").build();
/// let chat = ChatObject::open(Arc::new(MemoryBackend::new()), config).unwrap();
///
/// let id = chat.add_message(MessageDraft::text("hi")).unwrap();
/// chat.toggle_reaction(&id, "👍").unwrap();
///
/// let messages = chat.get_messages();
/// assert_eq!(messages[0].text(), "hi");
/// ```
pub struct ChatObject {
    config: ChatConfig,
    store: Store,
    subscription: Arc<Subscription<ChatMessage>>,
}

impl ChatObject {
    /// Open the chat over a backend and rebuild the message list from it.
    pub fn open(backend: Arc<dyn Backend>, config: ChatConfig) -> Result<Self> {
        let subscription = Arc::new(Subscription::new(config.event_capacity));
        let handler = ChatHandler::new(config.chat_id.clone(), subscription.clone());
        let registry = HandlerRegistry::new().with(Arc::new(handler))?;
        let store = Store::open(backend, registry)?;

        let messages = store
            .scan(COLLECTION)?
            .iter()
            .map(ChatMessage::from_document)
            .collect::<std::result::Result<Vec<_>, StoreError>>()?;
        info!(chat = %config.chat_id, messages = messages.len(), "chat opened");
        subscription.rebuild(messages);

        Ok(Self {
            config,
            store,
            subscription,
        })
    }

    pub fn chat_id(&self) -> &str {
        &self.config.chat_id
    }

    pub fn identity(&self) -> &str {
        &self.config.identity
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    fn push(&self, changes: Vec<Change>) -> Result<ChangeSetReceipt> {
        Ok(self
            .store
            .push(ChangeSetId::new(), &self.config.identity, now_ms(), changes)?)
    }

    fn modify(&self, message_id: &str, keys: Vec<KeyModify>) -> Result<()> {
        let change = Change::modify(COLLECTION, DocumentId::from_string(message_id), keys);
        self.push(vec![change])?;
        Ok(())
    }

    /// Add a message authored by this identity. Returns the message id.
    pub fn add_message(&self, draft: MessageDraft) -> Result<String> {
        let set_id = ChangeSetId::new();
        // The message takes the id of the change set that creates it.
        let message_id = DocumentId::from_string(set_id.as_str());
        let change = Change::create(COLLECTION, message_id, draft.to_value()?);

        let receipt = self
            .store
            .push(set_id, &self.config.identity, now_ms(), vec![change])?;
        debug!(
            chat = %self.config.chat_id,
            message = %receipt.change_set_id,
            order = %receipt.order.order,
            "message added"
        );
        Ok(receipt.change_set_id.to_string())
    }

    /// Replace the text of an own message.
    pub fn edit_message(&self, message_id: &str, message: MessageContent) -> Result<()> {
        let path = KeyPath::new([CONTENT_KEY, "message"])?;
        self.modify(
            message_id,
            vec![KeyModify::set(path, serde_json::to_value(message)?)],
        )
    }

    /// Add this identity's reaction, or remove it when present.
    ///
    /// Returns whether the reaction is now set.
    pub fn toggle_reaction(&self, message_id: &str, emoji: &str) -> Result<bool> {
        let id = DocumentId::from_string(message_id);
        let doc = self
            .store
            .find(COLLECTION, &id)?
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", COLLECTION, id)))?;
        let message = ChatMessage::from_document(&doc)?;

        let identity = Value::String(self.config.identity.clone());
        let adding = !message.has_reaction(emoji, &self.config.identity);
        let op = if adding {
            ModifyOp::AddToSet(identity)
        } else {
            ModifyOp::Pull(identity)
        };
        let path = KeyPath::new([REACTIONS_KEY, emoji])?;
        self.modify(message_id, vec![KeyModify::new(path, op)])?;
        Ok(adding)
    }

    /// Apply a raw key-path operation to a message, subject to the chat rules.
    pub fn update_field(&self, message_id: &str, key_path: KeyPath, op: ModifyOp) -> Result<()> {
        self.modify(message_id, vec![KeyModify::new(key_path, op)])
    }

    /// Delete an own message.
    pub fn delete_message(&self, message_id: &str) -> Result<()> {
        let change = Change::delete(COLLECTION, DocumentId::from_string(message_id));
        self.push(vec![change])?;
        Ok(())
    }

    /// Every live message in merge order.
    pub fn get_messages(&self) -> Vec<ChatMessage> {
        self.subscription.list()
    }

    /// Up to `limit` messages ordered before the message `before`, or the
    /// latest `limit` messages when `before` is `None`. Oldest first.
    ///
    /// An unknown cursor message fails with `NotFound`.
    pub fn get_messages_page(
        &self,
        before: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ChatMessage>> {
        let cursor = match before {
            Some(id) => Some(
                self.subscription
                    .get(id)
                    .map(|m| m.list_position())
                    .ok_or_else(|| StoreError::NotFound(format!("{}/{}", COLLECTION, id)))?,
            ),
            None => None,
        };
        let mut messages: Vec<ChatMessage> = self
            .subscription
            .list()
            .into_iter()
            .filter(|m| cursor.as_ref().map_or(true, |c| m.list_position() < *c))
            .collect();
        let skip = messages.len().saturating_sub(limit);
        Ok(messages.split_off(skip))
    }

    /// Messages with the given ids, in merge order. Unknown ids are skipped.
    pub fn get_messages_by_ids(&self, ids: &[&str]) -> Vec<ChatMessage> {
        let mut messages: Vec<ChatMessage> = ids
            .iter()
            .filter_map(|id| self.subscription.get(id))
            .collect();
        messages.sort_by_cached_key(|m| m.list_position());
        messages.dedup_by(|a, b| a.id == b.id);
        messages
    }

    pub fn get_message(&self, message_id: &str) -> Option<ChatMessage> {
        self.subscription.get(message_id)
    }

    /// Apply a change set received from another device.
    pub fn apply_remote(&self, set: &ChangeSet) -> Result<ChangeSetReceipt> {
        Ok(self.store.apply(set)?)
    }

    /// Subscribe to committed message events.
    pub fn subscribe(&self) -> broadcast::Receiver<ProjectionEvent<ChatMessage>> {
        self.subscription.subscribe()
    }

    /// Remove tombstones of deleted messages that `policy` allows.
    pub fn collect_tombstones(
        &self,
        policy: &TombstonePolicy,
        stable: Option<OrderId>,
    ) -> Result<TombstoneReport> {
        Ok(self.store.collect_tombstones(policy, now_ms(), stable)?)
    }
}
