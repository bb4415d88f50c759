//! Handler for the `chats` collection.
//!
//! Rules:
//! - creates are stamped with the author and the change timestamp
//! - only the author can edit `content` or delete a message
//! - anyone can react, but only add or remove their own identity
//! - no other top-level key can be modified

use crate::chat::model::{ChatMessage, CONTENT_KEY, REACTIONS_KEY};
use crate::subscription::Subscription;
use serde_json::{json, Value};
use std::sync::Arc;
use tessera_core::{KeyModify, Modified, ModifyOp};
use tessera_store::{
    ChangeOp, DeleteMode, Handler, ModifyFn, ModifyMode, Modifier, Result, StoreError,
};
use tracing::debug;

/// Collection holding chat messages.
pub const COLLECTION: &str = "chats";

pub struct ChatHandler {
    chat_id: String,
    subscription: Arc<Subscription<ChatMessage>>,
}

impl ChatHandler {
    pub fn new(chat_id: impl Into<String>, subscription: Arc<Subscription<ChatMessage>>) -> Self {
        Self {
            chat_id: chat_id.into(),
            subscription,
        }
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }
}

/// A modifier that always fails.
fn reject<'a>(err: StoreError) -> Box<dyn Modifier + 'a> {
    Box::new(ModifyFn(move |_: &Value| -> Result<Modified> { Err(err.clone()) }))
}

fn stored_creator(value: &Value) -> &str {
    value.get("creator").and_then(Value::as_str).unwrap_or_default()
}

/// A reaction change must add or pull exactly the author's identity under one emoji.
fn check_reaction(key: &KeyModify, identity: &str) -> Result<()> {
    if key.key_path.segments().len() != 2 {
        return Err(StoreError::ValidationFailed(format!(
            "reaction path must be {}.<emoji>, got {}",
            REACTIONS_KEY, key.key_path
        )));
    }
    match &key.op {
        ModifyOp::AddToSet(Value::String(id)) | ModifyOp::Pull(Value::String(id)) => {
            if id == identity {
                Ok(())
            } else {
                Err(StoreError::Unauthorized(format!(
                    "{} cannot change the reaction of {}",
                    identity, id
                )))
            }
        }
        ModifyOp::AddToSet(_) | ModifyOp::Pull(_) => Err(StoreError::ValidationFailed(
            "reaction value must be an identity".to_string(),
        )),
        _ => Err(StoreError::ValidationFailed(format!(
            "unsupported reaction operation on {}",
            key.key_path
        ))),
    }
}

impl Handler for ChatHandler {
    fn collection_name(&self) -> &str {
        COLLECTION
    }

    fn before_create(&self, op: &ChangeOp<'_>, value: &mut Value) -> Result<()> {
        let doc = value.as_object_mut().ok_or_else(|| {
            StoreError::ValidationFailed("chat message must be an object".to_string())
        })?;
        doc.insert("creator".to_string(), json!(op.creator()));
        doc.insert("createdAt".to_string(), json!(op.change.timestamp));
        doc.remove("modifiedAt");

        let model = ChatMessage::from_value(op.document_id(), &op.order_key(), value)?;
        debug!(chat = %self.chat_id, message = %model.id, "message created");
        self.subscription.add(model);
        Ok(())
    }

    fn before_modify(&self, _op: &ChangeOp<'_>) -> Result<ModifyMode> {
        // Upserting would let a late edit resurrect a hard-deleted message.
        Ok(ModifyMode::MergeOnly)
    }

    fn before_delete(&self, op: &ChangeOp<'_>) -> Result<DeleteMode> {
        let doc = op.view.find_live(COLLECTION, op.document_id())?;
        if doc.get_str("creator") != Some(op.creator()) {
            return Err(StoreError::Unauthorized(format!(
                "{} cannot delete message {} of another author",
                op.creator(),
                doc.id
            )));
        }
        debug!(chat = %self.chat_id, message = %doc.id, "message deleted");
        self.subscription.delete(doc.id.to_string());
        Ok(DeleteMode::Tombstone)
    }

    fn wrap_key_modifier<'a>(
        &'a self,
        op: &ChangeOp<'_>,
        key: &'a KeyModify,
        raw: Box<dyn Modifier + 'a>,
    ) -> Box<dyn Modifier + 'a> {
        let identity = op.creator().to_string();
        let timestamp = op.change.timestamp;
        let created = match op.view.find_live(COLLECTION, op.document_id()) {
            Ok(doc) => doc.created,
            Err(err) => return reject(err),
        };
        let id = op.document_id().clone();

        match key.key_path.first() {
            CONTENT_KEY => Box::new(ModifyFn(move |current: &Value| -> Result<Modified> {
                if stored_creator(current) != identity {
                    return Err(StoreError::Unauthorized(format!(
                        "{} cannot edit message {} of another author",
                        identity, id
                    )));
                }
                let mut result = raw.modify(current)?;
                if !result.changed {
                    return Ok(result);
                }
                if let Some(doc) = result.value.as_object_mut() {
                    doc.insert("modifiedAt".to_string(), json!(timestamp));
                }
                let model = ChatMessage::from_value(&id, &created, &result.value)?;
                self.subscription.update_full(model);
                Ok(result)
            })),
            REACTIONS_KEY => {
                if let Err(err) = check_reaction(key, &identity) {
                    return reject(err);
                }
                Box::new(ModifyFn(move |current: &Value| -> Result<Modified> {
                    let result = raw.modify(current)?;
                    if result.changed {
                        let model = ChatMessage::from_value(&id, &created, &result.value)?;
                        self.subscription.update_partial(model);
                    }
                    Ok(result)
                }))
            }
            _ => reject(StoreError::ValidationFailed(format!(
                "key path {} cannot be modified",
                key.key_path
            ))),
        }
    }

    fn after_commit(&self) {
        self.subscription.flush();
    }

    fn after_rollback(&self) {
        self.subscription.discard();
    }
}
