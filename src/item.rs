//! Items and the identifiers extracted from them.
//!
//! An [`Item`] is an untyped record, a JSON object. Items handed to a
//! [`TreeIndex`](crate::tree::TreeIndex) are [`SharedItem`]s: the index keeps a handle to
//! the caller's record instead of a copy, so a field written through either handle is
//! visible through the other.

use std::{cell::RefCell, fmt, rc::Rc};

use derive_more::From;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A client record: field name to JSON value.
pub type Item = Map<String, Value>;

/// An item shared between the caller and the index.
///
/// Only one side may write at a time; holding a `borrow_mut` across an index call panics.
pub type SharedItem = Rc<RefCell<Item>>;

/// Wraps a plain item so it can be handed to the index.
pub fn share(item: Item) -> SharedItem {
    Rc::new(RefCell::new(item))
}

/// A hashable identifier, read from an item's id (or parent id) field.
///
/// Only integers and strings are identifiers. Any other JSON value, or a missing field,
/// means "no identifier".
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, From)]
#[serde(untagged)]
pub enum TreeKey {
    Int(i64),
    Str(String),
}

impl TreeKey {
    /// Reads an identifier out of a JSON value.
    ///
    /// Floats are accepted when they hold an integral value, so `1.0` and `1` name the
    /// same node.
    pub fn from_value(value: &Value) -> Option<TreeKey> {
        match value {
            Value::String(s) => Some(TreeKey::Str(s.clone())),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    return Some(TreeKey::Int(i));
                }
                if let Some(u) = n.as_u64() {
                    return Some(TreeKey::Str(u.to_string()));
                }
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
                    .map(|f| TreeKey::Int(f as i64))
            }
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            TreeKey::Int(i) => Value::from(*i),
            TreeKey::Str(s) => Value::from(s.as_str()),
        }
    }
}

impl From<i32> for TreeKey {
    fn from(i: i32) -> Self {
        TreeKey::Int(i.into())
    }
}

impl From<&str> for TreeKey {
    fn from(s: &str) -> Self {
        TreeKey::Str(s.to_owned())
    }
}

impl From<&TreeKey> for Value {
    fn from(key: &TreeKey) -> Self {
        key.to_value()
    }
}

impl fmt::Display for TreeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeKey::Int(i) => write!(f, "{i}"),
            TreeKey::Str(s) => write!(f, "{s}"),
        }
    }
}

/// Whether two id values name the same node. Key-like values compare as [`TreeKey`]s, so
/// `1` and `1.0` match; anything else falls back to plain JSON equality.
pub fn same_id(a: &Value, b: &Value) -> bool {
    match (TreeKey::from_value(a), TreeKey::from_value(b)) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

/// JavaScript-style truthiness of a JSON value.
///
/// `null`, `false`, `0` and `""` are falsy, everything else is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Uniform access to an item stored either directly or as a JSON value inside a
/// children array.
pub(crate) trait AsItem {
    fn as_item(&self) -> Option<&Item>;
    fn as_item_mut(&mut self) -> Option<&mut Item>;
}

impl AsItem for Item {
    fn as_item(&self) -> Option<&Item> {
        Some(self)
    }

    fn as_item_mut(&mut self) -> Option<&mut Item> {
        Some(self)
    }
}

impl AsItem for Value {
    fn as_item(&self) -> Option<&Item> {
        self.as_object()
    }

    fn as_item_mut(&mut self) -> Option<&mut Item> {
        self.as_object_mut()
    }
}
