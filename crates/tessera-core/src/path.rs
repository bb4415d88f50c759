//! Key paths and path-addressed patches on document value trees.
//!
//! A [`KeyModify`] never mutates a document in place. It takes the current
//! value tree and produces a patched copy, so a rejected modification leaves
//! the stored document untouched.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A path of object keys into a document.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyPath(Vec<String>);

impl KeyPath {
    /// Create a path from segments.
    pub fn new<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(CoreError::InvalidKeyPath("no key path".to_string()));
        }
        if segments.iter().any(|s| s.is_empty()) {
            return Err(CoreError::InvalidKeyPath(format!(
                "empty segment in {:?}",
                segments
            )));
        }
        Ok(Self(segments))
    }

    /// Parse a path from dot notation (e.g., "content.text").
    pub fn parse(path: &str) -> Result<Self> {
        if path.is_empty() {
            return Err(CoreError::InvalidKeyPath("no key path".to_string()));
        }
        Self::new(path.split('.'))
    }

    /// Get the segments.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// The top-level key this path addresses.
    pub fn first(&self) -> &str {
        // Construction guarantees at least one segment.
        self.0.first().map(String::as_str).unwrap_or_default()
    }

    /// Create a child path.
    pub fn child(&self, key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(CoreError::InvalidKeyPath("empty segment".to_string()));
        }
        let mut segments = self.0.clone();
        segments.push(key);
        Ok(Self(segments))
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// Operation applied at the end of a key path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "camelCase")]
pub enum ModifyOp {
    /// Replace the value.
    Set(Value),
    /// Remove the key.
    Unset,
    /// Add to a numeric value (missing counts as zero).
    Inc(i64),
    /// Append to an array unless already present.
    AddToSet(Value),
    /// Remove every equal element from an array.
    Pull(Value),
}

impl ModifyOp {
    fn creates_path(&self) -> bool {
        matches!(
            self,
            ModifyOp::Set(_) | ModifyOp::Inc(_) | ModifyOp::AddToSet(_)
        )
    }
}

/// Result of a modification.
#[derive(Clone, Debug, PartialEq)]
pub struct Modified {
    /// The patched value tree (equal to the input when nothing changed).
    pub value: Value,
    /// Whether the patch changed anything.
    pub changed: bool,
}

impl Modified {
    pub fn unchanged(value: Value) -> Self {
        Self {
            value,
            changed: false,
        }
    }
}

/// A modification of one key path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyModify {
    pub key_path: KeyPath,
    pub op: ModifyOp,
}

impl KeyModify {
    pub fn new(key_path: KeyPath, op: ModifyOp) -> Self {
        Self { key_path, op }
    }

    pub fn set(key_path: KeyPath, value: Value) -> Self {
        Self::new(key_path, ModifyOp::Set(value))
    }

    /// Apply this modification to a copy of `root`.
    pub fn apply(&self, root: &Value) -> Result<Modified> {
        let mut value = root.clone();
        let changed = apply_at(&mut value, self.key_path.segments(), &self.op, &self.key_path)?;
        Ok(Modified { value, changed })
    }
}

fn apply_at(node: &mut Value, segments: &[String], op: &ModifyOp, path: &KeyPath) -> Result<bool> {
    if node.is_null() && op.creates_path() {
        *node = Value::Object(Map::new());
    }
    let map = match node {
        Value::Object(map) => map,
        Value::Null => return Ok(false),
        _ => {
            return Err(CoreError::TypeMismatch {
                path: path.to_string(),
                expected: "object".to_string(),
            })
        }
    };

    let (head, rest) = match segments.split_first() {
        Some(split) => split,
        None => return Err(CoreError::InvalidKeyPath("no key path".to_string())),
    };

    if !rest.is_empty() {
        if !map.contains_key(head) && !op.creates_path() {
            return Ok(false);
        }
        let child = map
            .entry(head.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        return apply_at(child, rest, op, path);
    }

    match op {
        ModifyOp::Set(value) => {
            if map.get(head) == Some(value) {
                return Ok(false);
            }
            map.insert(head.clone(), value.clone());
            Ok(true)
        }
        ModifyOp::Unset => Ok(map.remove(head).is_some()),
        ModifyOp::Inc(delta) => {
            let next = match map.get(head) {
                None | Some(Value::Null) => Value::from(*delta),
                Some(Value::Number(n)) => match n.as_i64() {
                    Some(i) => Value::from(i.saturating_add(*delta)),
                    None => Value::from(n.as_f64().unwrap_or_default() + *delta as f64),
                },
                Some(_) => {
                    return Err(CoreError::TypeMismatch {
                        path: path.to_string(),
                        expected: "number".to_string(),
                    })
                }
            };
            let changed = *delta != 0 || !map.contains_key(head);
            map.insert(head.clone(), next);
            Ok(changed)
        }
        ModifyOp::AddToSet(element) => {
            if matches!(map.get(head), None | Some(Value::Null)) {
                map.insert(head.clone(), Value::Array(vec![element.clone()]));
                return Ok(true);
            }
            match map.get_mut(head) {
                Some(Value::Array(items)) if items.contains(element) => Ok(false),
                Some(Value::Array(items)) => {
                    items.push(element.clone());
                    Ok(true)
                }
                _ => Err(CoreError::TypeMismatch {
                    path: path.to_string(),
                    expected: "array".to_string(),
                }),
            }
        }
        ModifyOp::Pull(element) => match map.get_mut(head) {
            None | Some(Value::Null) => Ok(false),
            Some(Value::Array(items)) => {
                let before = items.len();
                items.retain(|item| item != element);
                Ok(items.len() != before)
            }
            Some(_) => Err(CoreError::TypeMismatch {
                path: path.to_string(),
                expected: "array".to_string(),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(p: &str) -> KeyPath {
        KeyPath::parse(p).unwrap()
    }

    #[test]
    fn test_parse() {
        let p = path("content.text");
        assert_eq!(p.segments(), &["content".to_string(), "text".to_string()]);
        assert_eq!(p.first(), "content");
        assert_eq!(p.to_string(), "content.text");

        assert!(matches!(KeyPath::parse(""), Err(CoreError::InvalidKeyPath(_))));
        assert!(matches!(KeyPath::parse("a..b"), Err(CoreError::InvalidKeyPath(_))));
    }

    #[test]
    fn test_set_is_copy_on_write() {
        let root = json!({"content": {"text": "hi"}});
        let m = KeyModify::set(path("content.text"), json!("hello"))
            .apply(&root)
            .unwrap();

        assert!(m.changed);
        assert_eq!(m.value["content"]["text"], "hello");
        assert_eq!(root["content"]["text"], "hi");
    }

    #[test]
    fn test_set_same_value_is_unchanged() {
        let root = json!({"a": 1});
        let m = KeyModify::set(path("a"), json!(1)).apply(&root).unwrap();
        assert!(!m.changed);
    }

    #[test]
    fn test_set_creates_intermediate_objects() {
        let m = KeyModify::set(path("a.b.c"), json!(true))
            .apply(&Value::Null)
            .unwrap();
        assert_eq!(m.value, json!({"a": {"b": {"c": true}}}));
    }

    #[test]
    fn test_unset() {
        let root = json!({"a": 1, "b": 2});
        let m = KeyModify::new(path("a"), ModifyOp::Unset).apply(&root).unwrap();
        assert!(m.changed);
        assert_eq!(m.value, json!({"b": 2}));

        let m = KeyModify::new(path("x.y"), ModifyOp::Unset).apply(&root).unwrap();
        assert!(!m.changed);
    }

    #[test]
    fn test_inc() {
        let root = json!({"n": 2});
        let m = KeyModify::new(path("n"), ModifyOp::Inc(3)).apply(&root).unwrap();
        assert_eq!(m.value["n"], 5);

        let m = KeyModify::new(path("missing"), ModifyOp::Inc(1)).apply(&root).unwrap();
        assert_eq!(m.value["missing"], 1);

        let bad = json!({"n": "two"});
        assert!(matches!(
            KeyModify::new(path("n"), ModifyOp::Inc(1)).apply(&bad),
            Err(CoreError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_add_to_set_and_pull() {
        let root = json!({});
        let add = KeyModify::new(path("reactions.👍"), ModifyOp::AddToSet(json!("u1")));
        let m = add.apply(&root).unwrap();
        assert!(m.changed);
        assert_eq!(m.value, json!({"reactions": {"👍": ["u1"]}}));

        let again = add.apply(&m.value).unwrap();
        assert!(!again.changed);

        let pull = KeyModify::new(path("reactions.👍"), ModifyOp::Pull(json!("u1")));
        let m = pull.apply(&m.value).unwrap();
        assert!(m.changed);
        assert_eq!(m.value, json!({"reactions": {"👍": []}}));

        let m = pull.apply(&m.value).unwrap();
        assert!(!m.changed);
    }

    #[test]
    fn test_traversing_scalar_fails() {
        let root = json!({"content": "flat"});
        let result = KeyModify::set(path("content.text"), json!("x")).apply(&root);
        assert!(matches!(result, Err(CoreError::TypeMismatch { .. })));
    }

    #[test]
    fn test_key_modify_serde_shape() {
        let km = KeyModify::new(path("reactions.🔥"), ModifyOp::AddToSet(json!("u1")));
        let json = serde_json::to_value(&km).unwrap();
        assert_eq!(
            json,
            json!({"keyPath": ["reactions", "🔥"], "op": {"op": "addToSet", "value": "u1"}})
        );
        let back: KeyModify = serde_json::from_value(json).unwrap();
        assert_eq!(back, km);
    }
}
