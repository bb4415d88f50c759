//! Key-path modifiers.
//!
//! The transaction builds a raw [`KeyPathModifier`] for every key of a
//! modify change and hands it to the collection's handler, which may wrap it
//! with domain logic (see [`crate::handler::Handler::wrap_key_modifier`]).

use crate::error::Result;
use serde_json::Value;
use tessera_core::{KeyModify, Modified};

/// A partial update of a document value tree.
pub trait Modifier {
    /// Produce the patched value. Must not touch `current`.
    fn modify(&self, current: &Value) -> Result<Modified>;
}

/// Applies one [`KeyModify`] as-is.
pub struct KeyPathModifier<'a> {
    key: &'a KeyModify,
}

impl<'a> KeyPathModifier<'a> {
    pub fn new(key: &'a KeyModify) -> Self {
        Self { key }
    }
}

impl Modifier for KeyPathModifier<'_> {
    fn modify(&self, current: &Value) -> Result<Modified> {
        Ok(self.key.apply(current)?)
    }
}

/// Adapter turning a closure into a [`Modifier`].
pub struct ModifyFn<F>(pub F);

impl<F> Modifier for ModifyFn<F>
where
    F: Fn(&Value) -> Result<Modified>,
{
    fn modify(&self, current: &Value) -> Result<Modified> {
        (self.0)(current)
    }
}

impl<M: Modifier + ?Sized> Modifier for Box<M> {
    fn modify(&self, current: &Value) -> Result<Modified> {
        (**self).modify(current)
    }
}
