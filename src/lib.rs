//! # treeindex
//!
//! An in-memory tree index built from flat items that reference their parent by id.
//!
//! Give [`TreeIndex`] a flat list of records (JSON objects) and it links them into a forest
//! through their parent id fields. From then on it answers lookups by id, hands back nested
//! snapshots of the forest, and keeps its registry and links consistent through adds,
//! updates, removals and moves. The field names it reads are configurable through
//! [`TreeOptions`].
//!
//! The crate is meant to sit behind list and tree widgets: besides the core index it
//! offers subtree filtering, ancestor walks, a flattened selection list and the set of
//! legal drop targets for a move (see [`tree::projection`]).
//!
//! ```
//! use serde_json::json;
//! use treeindex::{TreeIndex, TreeKey, TreeOptions};
//!
//! let items = serde_json::from_value(json!([
//!     { "id": 1, "parentId": null, "name": "root" },
//!     { "id": 2, "parentId": 1, "name": "child" },
//! ]))
//! .unwrap();
//! let mut index = TreeIndex::from_items(items, TreeOptions::default()).unwrap();
//!
//! index.move_node(&TreeKey::from(2), None);
//! assert_eq!(index.root_nodes().count(), 2);
//! ```

pub mod item;
pub mod options;
pub mod tree;

pub use item::{share, Item, SharedItem, TreeKey};
pub use options::{Keys, TreeOptions, INVISIBLE_CHAR};
pub use tree::{
    iterato::{find_tree_node_by_id, visit_tree},
    TreeError, TreeIndex, TreeNode,
};
