//! Configuration: which item fields carry the id, the parent id, the children and the
//! label, plus the leaf predicate.
//!
//! [`TreeOptions`] is what callers build or deserialize; [`Keys`] is the resolved form the
//! index works with, where every empty field name has been replaced by its default.

use std::{fmt, rc::Rc};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::item::{Item, TreeKey};

pub const DEFAULT_ID_KEY: &str = "id";
pub const DEFAULT_PARENT_ID_KEY: &str = "parentId";
pub const DEFAULT_CHILDREN_KEY: &str = "children";
pub const DEFAULT_LABEL_KEY: &str = "name";

/// Ideographic space, used to indent labels in the selection list.
pub const INVISIBLE_CHAR: char = '\u{3000}';

/// Decides whether an item is a leaf.
pub type LeafPredicate = Rc<dyn Fn(&Item) -> bool>;

/// Field names and leaf predicate used by a [`TreeIndex`](crate::tree::TreeIndex).
///
/// Every field is optional when deserializing; missing or empty names fall back to
/// `id`, `parentId`, `children` and `name`.
///
/// ```
/// use treeindex::options::TreeOptions;
///
/// let options: TreeOptions = serde_json::from_str(r#"{ "idKey": "key", "labelKey": "" }"#).unwrap();
/// let keys = options.keys();
/// assert_eq!(keys.id, "key");
/// assert_eq!(keys.label, "name");
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TreeOptions {
    pub id_key: String,
    pub parent_id_key: String,
    pub children_key: String,
    pub label_key: String,
    #[serde(skip)]
    pub is_leaf_item: Option<LeafPredicate>,
}

impl Default for TreeOptions {
    fn default() -> Self {
        TreeOptions {
            id_key: DEFAULT_ID_KEY.to_owned(),
            parent_id_key: DEFAULT_PARENT_ID_KEY.to_owned(),
            children_key: DEFAULT_CHILDREN_KEY.to_owned(),
            label_key: DEFAULT_LABEL_KEY.to_owned(),
            is_leaf_item: None,
        }
    }
}

impl fmt::Debug for TreeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeOptions")
            .field("id_key", &self.id_key)
            .field("parent_id_key", &self.parent_id_key)
            .field("children_key", &self.children_key)
            .field("label_key", &self.label_key)
            .field("is_leaf_item", &self.is_leaf_item.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl TreeOptions {
    pub fn with_id_key(mut self, key: impl Into<String>) -> Self {
        self.id_key = key.into();
        self
    }

    pub fn with_parent_id_key(mut self, key: impl Into<String>) -> Self {
        self.parent_id_key = key.into();
        self
    }

    pub fn with_children_key(mut self, key: impl Into<String>) -> Self {
        self.children_key = key.into();
        self
    }

    pub fn with_label_key(mut self, key: impl Into<String>) -> Self {
        self.label_key = key.into();
        self
    }

    pub fn with_leaf_predicate(mut self, predicate: impl Fn(&Item) -> bool + 'static) -> Self {
        self.is_leaf_item = Some(Rc::new(predicate));
        self
    }

    /// Resolves the field names, substituting defaults for empty ones.
    pub fn keys(&self) -> Keys {
        Keys {
            id: fallback(&self.id_key, DEFAULT_ID_KEY),
            parent_id: fallback(&self.parent_id_key, DEFAULT_PARENT_ID_KEY),
            children: fallback(&self.children_key, DEFAULT_CHILDREN_KEY),
            label: fallback(&self.label_key, DEFAULT_LABEL_KEY),
        }
    }
}

pub(crate) fn fallback(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_owned()
    } else {
        value.to_owned()
    }
}

/// Resolved field names, with typed accessors over [`Item`]s.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Keys {
    pub id: String,
    pub parent_id: String,
    pub children: String,
    pub label: String,
}

impl Default for Keys {
    fn default() -> Self {
        TreeOptions::default().keys()
    }
}

impl Keys {
    pub fn id_of(&self, item: &Item) -> Option<TreeKey> {
        item.get(&self.id).and_then(TreeKey::from_value)
    }

    pub fn parent_id_of(&self, item: &Item) -> Option<TreeKey> {
        item.get(&self.parent_id).and_then(TreeKey::from_value)
    }

    /// Writes the parent id field; `None` is stored as `null`.
    pub fn set_parent_id(&self, item: &mut Item, parent: Option<&TreeKey>) {
        item.insert(
            self.parent_id.clone(),
            parent.map_or(Value::Null, TreeKey::to_value),
        );
    }

    /// The nested child items, skipping anything in the children array that is not an
    /// object.
    pub fn children_of<'a>(&self, item: &'a Item) -> impl Iterator<Item = &'a Item> + 'a {
        item.get(&self.children)
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_object)
    }

    pub fn children_mut<'a>(&self, item: &'a mut Item) -> Option<&'a mut Vec<Value>> {
        item.get_mut(&self.children).and_then(Value::as_array_mut)
    }

    pub fn set_children(&self, item: &mut Item, children: Vec<Value>) {
        item.insert(self.children.clone(), Value::Array(children));
    }

    pub fn has_children(&self, item: &Item) -> bool {
        item.get(&self.children)
            .and_then(Value::as_array)
            .is_some_and(|c| !c.is_empty())
    }

    /// The label field rendered as text. Strings are used verbatim, a missing or `null`
    /// label is empty, anything else is printed as JSON.
    pub fn label_of(&self, item: &Item) -> String {
        match item.get(&self.label) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    /// Whether `field` is one of the structural fields the index owns.
    pub fn is_structural(&self, field: &str) -> bool {
        field == self.id || field == self.parent_id || field == self.children
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn empty_names_fall_back() {
        let keys = TreeOptions::default()
            .with_id_key("")
            .with_parent_id_key("pid")
            .with_children_key("")
            .keys();
        assert_eq!(
            keys,
            Keys {
                id: "id".into(),
                parent_id: "pid".into(),
                children: "children".into(),
                label: "name".into(),
            }
        );
    }

    #[test]
    fn deserializes_partial_options() {
        let options: TreeOptions =
            serde_json::from_value(json!({ "parentIdKey": "up", "childrenKey": "kids" }))
                .unwrap();
        let keys = options.keys();
        assert_eq!(keys.id, "id");
        assert_eq!(keys.parent_id, "up");
        assert_eq!(keys.children, "kids");
        assert!(options.is_leaf_item.is_none());
    }

    #[test]
    fn accessors() {
        let keys = Keys::default();
        let mut item = json!({ "id": 1, "parentId": "p", "name": 5, "children": [{ "id": 2 }, 3] })
            .as_object()
            .cloned()
            .unwrap();

        assert_eq!(keys.id_of(&item), Some(TreeKey::from(1)));
        assert_eq!(keys.parent_id_of(&item), Some(TreeKey::from("p")));
        assert_eq!(keys.label_of(&item), "5");
        assert_eq!(keys.children_of(&item).count(), 1);
        assert!(keys.has_children(&item));

        keys.set_parent_id(&mut item, None);
        assert_eq!(item["parentId"], Value::Null);
        keys.set_children(&mut item, vec![]);
        assert!(!keys.has_children(&item));
        assert!(keys.is_structural("children"));
        assert!(!keys.is_structural("name"));
    }
}
