//! The tree index: a registry of nodes built from flat, parent-referencing items.
//!
//! Items are linked purely by their parent id field. Each item becomes a [`TreeNode`]
//! holding a shared handle to the item, a non-owning parent link and an ordered list of
//! child ids. The [`TreeIndex`] owns every node through its registry and keeps registry,
//! parent links and child lists consistent after every public call:
//!
//! 1.  every id is registered at most once;
//! 2.  a node sits either in the root list or in exactly one parent's children;
//! 3.  `node.parent == Some(p)` iff `p.children` lists the node, and `node.parent == None`
//!     iff the root list does;
//! 4.  the children field of an input item is never trusted, links come from parent ids.
//!
//! [`TreeIndex::validate`] checks these.
//!
//! Derived views live in [`projection`]: subtree filtering, ancestor visits, the flattened
//! selection list and the legal drop targets for a move.

use ahash::{AHashMap, AHashSet, RandomState};
use indexmap::IndexMap;
use itertools::Itertools;
use log::{debug, trace, warn};
use serde_json::Value;
use thiserror::Error;

use crate::{
    item::{share, Item, SharedItem, TreeKey},
    options::{Keys, LeafPredicate, TreeOptions},
};

pub mod debug_draw;
pub mod iterato;
pub mod projection;


use iterato::{find_tree_node_by_id, AncestorsIter, PreorderIter, StackOrderIter};

/// One indexed item.
#[derive(Clone, Debug)]
pub struct TreeNode {
    pub(crate) id: TreeKey,
    pub(crate) data: SharedItem,
    /// Non-owning link into the registry.
    pub(crate) parent: Option<TreeKey>,
    pub(crate) children: Vec<TreeKey>,
}

impl TreeNode {
    fn new(id: TreeKey, data: SharedItem) -> Self {
        TreeNode {
            id,
            data,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn id(&self) -> &TreeKey {
        &self.id
    }

    /// The caller's item. This is the handle that was indexed, not a copy.
    pub fn data(&self) -> &SharedItem {
        &self.data
    }

    pub fn parent(&self) -> Option<&TreeKey> {
        self.parent.as_ref()
    }

    pub fn children(&self) -> &[TreeKey] {
        &self.children
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Errors that can occur during tree index operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TreeError {
    #[error("Cannot find node for item {0}")]
    NodeNotFound(Value),
    #[error("Please select items to move")]
    NothingToMove,
    #[error("Item has no usable id: {0}")]
    MissingId(Value),
    #[error("Duplicate id: {0}")]
    DuplicateId(TreeKey),
    #[error("Invalid TreeKey: {0} is referenced but not registered")]
    InvalidNodeId(TreeKey),
    #[error("Wrong parent link on {0}")]
    WrongParent(TreeKey),
    #[error("Node {0} is listed more than once, or in the wrong place")]
    Misplaced(TreeKey),
    #[error("Node {0} is registered but not reachable from the roots")]
    Unreachable(TreeKey),
    #[error("Item of node {0} is borrowed elsewhere")]
    ItemBorrowed(TreeKey),
}

/// An in-memory tree index over flat items.
///
/// ```
/// use serde_json::json;
/// use treeindex::{options::TreeOptions, tree::TreeIndex, TreeKey};
///
/// let items = serde_json::from_value(json!([
///     { "id": 1, "parentId": null },
///     { "id": 2, "parentId": 1 },
/// ]))
/// .unwrap();
/// let index = TreeIndex::from_items(items, TreeOptions::default()).unwrap();
/// let child = index.get_node_by_id(&TreeKey::from(2)).unwrap();
/// assert_eq!(child.parent(), Some(&TreeKey::from(1)));
/// ```
#[derive(Clone)]
pub struct TreeIndex {
    node_by_id: IndexMap<TreeKey, TreeNode, RandomState>,
    root_nodes: Vec<TreeKey>,
    keys: Keys,
    is_leaf_item: Option<LeafPredicate>,
}

impl std::fmt::Debug for TreeIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeIndex")
            .field("node_by_id", &self.node_by_id)
            .field("root_nodes", &self.root_nodes)
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}

impl Default for TreeIndex {
    fn default() -> Self {
        Self::empty(TreeOptions::default())
    }
}

// --- Construction ---

impl TreeIndex {
    /// An index with no items.
    pub fn empty(options: TreeOptions) -> Self {
        TreeIndex {
            node_by_id: IndexMap::default(),
            root_nodes: Vec::new(),
            keys: options.keys(),
            is_leaf_item: options.is_leaf_item,
        }
    }

    /// Builds the index from shared items.
    ///
    /// Every item is registered first and linked afterwards, so children may come before
    /// their parents in `items`. An item whose parent id is missing or unknown becomes a
    /// root; roots and siblings keep their relative input order. A parent link that would
    /// close a cycle is dropped and the item becomes a root.
    pub fn new(
        items: impl IntoIterator<Item = SharedItem>,
        options: TreeOptions,
    ) -> Result<Self, TreeError> {
        let mut index = Self::empty(options);
        let mut order = vec![];

        for item in items {
            let id = index.keys.id_of(&item.borrow());
            let Some(id) = id else {
                return Err(TreeError::MissingId(Value::Object(item.borrow().clone())));
            };
            if index.node_by_id.contains_key(&id) {
                return Err(TreeError::DuplicateId(id));
            }
            index
                .node_by_id
                .insert(id.clone(), TreeNode::new(id.clone(), item));
            order.push(id);
        }

        for id in order {
            index.attach(&id);
        }

        debug!(
            "Built tree index with {} nodes and {} roots",
            index.len(),
            index.root_nodes.len()
        );
        Ok(index)
    }

    /// Builds the index from plain items, wrapping each one into a [`SharedItem`].
    pub fn from_items(items: Vec<Item>, options: TreeOptions) -> Result<Self, TreeError> {
        Self::new(items.into_iter().map(share), options)
    }
}

// --- Queries ---

impl TreeIndex {
    pub fn keys(&self) -> &Keys {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.node_by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_by_id.is_empty()
    }

    pub fn contains(&self, id: &TreeKey) -> bool {
        self.node_by_id.contains_key(id)
    }

    pub fn get_node_by_id(&self, id: &TreeKey) -> Option<&TreeNode> {
        self.node_by_id.get(id)
    }

    /// Root nodes in order.
    pub fn root_nodes(&self) -> impl Iterator<Item = &TreeNode> + '_ {
        self.root_nodes.iter().filter_map(move |id| self.node_by_id.get(id))
    }

    /// Direct children of `id`, in order. Empty for unknown ids.
    pub fn children_of(&self, id: &TreeKey) -> impl Iterator<Item = &TreeNode> + '_ {
        self.node_by_id
            .get(id)
            .into_iter()
            .flat_map(|node| node.children.iter())
            .filter_map(move |child| self.node_by_id.get(child))
    }

    /// All registered nodes, in registry order.
    pub fn iter_nodes(&self) -> impl Iterator<Item = &TreeNode> + '_ {
        self.node_by_id.values()
    }

    /// Whether `item` is a leaf, by the configured predicate or, by default, by having no
    /// non-empty children array.
    pub fn is_leaf_item(&self, item: &Item) -> bool {
        match &self.is_leaf_item {
            Some(predicate) => predicate(item),
            None => !self.keys.has_children(item),
        }
    }

    /// Nodes in raw stack order (see [`StackOrderIter`]), from `start` or from all roots.
    ///
    /// An unknown `start` yields nothing.
    pub fn iter_stack_order<'a>(
        &'a self,
        start: Option<&TreeKey>,
    ) -> impl Iterator<Item = &'a TreeNode> + 'a {
        let roots: Vec<&TreeNode> = match start {
            Some(id) => self.node_by_id.get(id).into_iter().collect(),
            None => self.root_nodes().collect(),
        };
        StackOrderIter::new(roots, move |node: &'a TreeNode| {
            node.children
                .iter()
                .filter_map(move |child| self.node_by_id.get(child))
        })
    }

    /// Calls `callback` on every node in raw stack order, from `start` or from all roots.
    pub fn visit(&self, start: Option<&TreeKey>, callback: impl FnMut(&TreeNode)) {
        self.iter_stack_order(start).for_each(callback);
    }

    /// Nodes below and including `start` in true pre-order, with their depth.
    pub fn iter_preorder<'a>(
        &'a self,
        start: &TreeKey,
    ) -> impl Iterator<Item = (usize, &'a TreeNode)> + 'a {
        self.node_by_id.get(start).into_iter().flat_map(move |node| {
            PreorderIter::new(node, move |node: &'a TreeNode| {
                node.children
                    .iter()
                    .filter_map(move |child| self.node_by_id.get(child))
                    .collect::<Vec<_>>()
            })
        })
    }

    /// From `start` up to its root along the stored parent links, `start` first.
    pub fn iter_ancestors(&self, start: &TreeKey) -> AncestorsIter<'_> {
        AncestorsIter::new(self, start)
    }

    /// Searches a forest of plain nested items (not the index) with the configured keys.
    pub fn get_item_by_id_from_items<'a>(&self, items: &'a [Item], id: &Value) -> Option<&'a Item> {
        find_tree_node_by_id(items, id, &self.keys.id, &self.keys.children)
    }
}

// --- Snapshots ---

impl TreeIndex {
    /// A fresh nested copy of the forest.
    ///
    /// Every item is shallow-cloned and given a new children array; the indexed items are
    /// left untouched. Nodes are emitted in raw stack order, so roots and siblings come
    /// out in reverse order. A node whose parent clone does not exist yet when it is
    /// reached lands in the top-level list.
    pub fn get_root_items(&self) -> Vec<Item> {
        self.collect_root_items(|_| None)
    }

    /// Like [`get_root_items`](Self::get_root_items), with each item replaced by
    /// `transform(original)`. The children field of the result is always overwritten, so
    /// `transform` never has to recurse.
    pub fn get_root_items_with(&self, mut transform: impl FnMut(&Item) -> Item) -> Vec<Item> {
        self.collect_root_items(|item| Some(transform(item)))
    }

    fn collect_root_items(&self, mut transform: impl FnMut(&Item) -> Option<Item>) -> Vec<Item> {
        let mut slot_by_id: AHashMap<TreeKey, usize> = AHashMap::new();
        // (output item, slot of the parent's output)
        let mut slots: Vec<(Item, Option<usize>)> = Vec::with_capacity(self.len());

        for node in self.iter_stack_order(None) {
            let data = node.data.borrow();
            let parent_slot = self
                .keys
                .parent_id_of(&data)
                .and_then(|parent| slot_by_id.get(&parent).copied());
            let item = transform(&data).unwrap_or_else(|| data.clone());
            slot_by_id.insert(node.id.clone(), slots.len());
            slots.push((item, parent_slot));
        }

        // A parent's slot always precedes its children's, so walking backwards finishes
        // every child list before its owner is placed.
        let mut children: Vec<Vec<Value>> = vec![Vec::new(); slots.len()];
        let mut roots = vec![];
        for (i, (mut item, parent)) in slots.into_iter().enumerate().rev() {
            let mut own = std::mem::take(&mut children[i]);
            own.reverse();
            self.keys.set_children(&mut item, own);
            match parent {
                Some(p) => children[p].push(Value::Object(item)),
                None => roots.push(item),
            }
        }
        roots.reverse();
        roots
    }
}

// --- Mutations ---

impl TreeIndex {
    /// Indexes a new item as the last child of its parent, or as the last root.
    ///
    /// The item's children field is reset to an empty array. The node shares `item` with
    /// the caller.
    pub fn add_item(&mut self, item: SharedItem) -> Result<&TreeNode, TreeError> {
        let id = self.keys.id_of(&item.borrow());
        let Some(id) = id else {
            return Err(TreeError::MissingId(Value::Object(item.borrow().clone())));
        };
        if self.node_by_id.contains_key(&id) {
            return Err(TreeError::DuplicateId(id));
        }
        self.keys.set_children(&mut item.borrow_mut(), Vec::new());

        self.add_node(TreeNode::new(id.clone(), item));
        debug!("Added node {id}");
        Ok(&self.node_by_id[&id])
    }

    /// Merges `item` into the indexed item with the same id, field by field.
    ///
    /// The id, parent id and children fields are never copied, so this cannot reparent;
    /// use [`move_node`](Self::move_node) for that. Fields absent from `item` are kept.
    /// An unknown id is added as a new item, indexing a copy of `item`; use
    /// [`set_shared_item`](Self::set_shared_item) to index the caller's own handle instead.
    pub fn set_item(&mut self, item: &Item) -> Result<&TreeNode, TreeError> {
        match self.known_id(item) {
            Some(id) => self.merge_into(&id, item),
            None => self.add_item(share(item.clone())),
        }
    }

    /// Like [`set_item`](Self::set_item), but an unknown id indexes `item` itself.
    pub fn set_shared_item(&mut self, item: SharedItem) -> Result<&TreeNode, TreeError> {
        let id = self.known_id(&item.borrow());
        match id {
            Some(id) => {
                let data = item.borrow();
                self.merge_into(&id, &data)
            }
            None => self.add_item(item),
        }
    }

    fn known_id(&self, item: &Item) -> Option<TreeKey> {
        self.keys
            .id_of(item)
            .filter(|id| self.node_by_id.contains_key(id))
    }

    fn merge_into(&self, id: &TreeKey, item: &Item) -> Result<&TreeNode, TreeError> {
        let node = self
            .node_by_id
            .get(id)
            .ok_or_else(|| TreeError::InvalidNodeId(id.clone()))?;
        // Merging an item into itself changes nothing.
        if std::ptr::eq(node.data.as_ptr(), item) {
            trace!("Node {id} updated with its own item");
            return Ok(node);
        }

        let mut data = node
            .data
            .try_borrow_mut()
            .map_err(|_| TreeError::ItemBorrowed(id.clone()))?;
        for (field, value) in item {
            if !self.keys.is_structural(field) {
                data.insert(field.clone(), value.clone());
            }
        }
        drop(data);
        debug!("Updated node {id}");
        Ok(node)
    }

    /// Removes the node for `item` together with its whole subtree.
    ///
    /// Descendant items stay alive through whatever handles the caller holds, but are no
    /// longer indexed.
    pub fn remove_item(&mut self, item: &Item) -> Result<TreeNode, TreeError> {
        match self.keys.id_of(item) {
            Some(id) if self.node_by_id.contains_key(&id) => self.remove_node(&id),
            _ => Err(TreeError::NodeNotFound(Value::Object(item.clone()))),
        }
    }

    /// Removes the node `id` together with its whole subtree.
    pub fn remove_node(&mut self, id: &TreeKey) -> Result<TreeNode, TreeError> {
        if !self.node_by_id.contains_key(id) {
            return Err(TreeError::NodeNotFound(id.to_value()));
        }
        self.detach(id);

        let subtree: Vec<TreeKey> = self
            .iter_stack_order(Some(id))
            .map(|node| node.id.clone())
            .collect();
        let mut removed = None;
        for key in &subtree {
            trace!("Unregistering node {key}");
            let node = self.node_by_id.swap_remove(key);
            if key == id {
                removed = node;
            }
        }
        debug!("Removed node {id} and {} descendants", subtree.len() - 1);

        removed.ok_or_else(|| TreeError::NodeNotFound(id.to_value()))
    }

    /// Relocates the subtree rooted at `id` under `parent_id`, as its last child.
    ///
    /// The item's parent id field is always rewritten. An unknown `parent_id`, or `None`,
    /// makes the node the last root, and so does a move under the node itself or one of
    /// its descendants. An unknown `id` is ignored.
    pub fn move_node(&mut self, id: &TreeKey, parent_id: Option<&TreeKey>) {
        if !self.node_by_id.contains_key(id) {
            debug!("Ignoring move of unknown node {id}");
            return;
        }
        if let Some(parent_id) = parent_id {
            if self.iter_ancestors(parent_id).any(|a| &a.id == id) {
                warn!("Node {id} cannot sit under its own subtree at {parent_id}, making it a root");
            }
        }

        self.detach(id);
        let node = &self.node_by_id[id];
        self.keys.set_parent_id(&mut node.data.borrow_mut(), parent_id);
        self.attach(id);
        debug!(
            "Moved node {id} under {}",
            parent_id.map_or_else(|| "the roots".to_owned(), |p| p.to_string())
        );
    }

    /// Registers a node (with whatever subtree it already links to) and links it.
    fn add_node(&mut self, node: TreeNode) {
        let id = node.id.clone();
        if !self.node_by_id.contains_key(&id) {
            self.node_by_id.insert(id.clone(), node);
        }
        self.attach(&id);
    }

    /// Links a registered, detached node to the parent named by its parent id field, as the
    /// last child, or appends it to the roots.
    fn attach(&mut self, id: &TreeKey) {
        let Some(node) = self.node_by_id.get(id) else {
            return;
        };
        let parent = self
            .keys
            .parent_id_of(&node.data.borrow())
            .filter(|parent| self.node_by_id.contains_key(parent))
            .filter(|parent| !self.iter_ancestors(parent).any(|a| &a.id == id));

        match parent {
            Some(parent) => {
                trace!("Linking node {id} under {parent}");
                if let Some(parent_node) = self.node_by_id.get_mut(&parent) {
                    parent_node.children.push(id.clone());
                }
                if let Some(node) = self.node_by_id.get_mut(id) {
                    node.parent = Some(parent);
                }
            }
            None => {
                trace!("Linking node {id} as a root");
                self.root_nodes.push(id.clone());
                if let Some(node) = self.node_by_id.get_mut(id) {
                    node.parent = None;
                }
            }
        }
    }

    /// Unlinks a node from its parent or from the roots. The registry is left alone.
    fn detach(&mut self, id: &TreeKey) {
        let parent = self.node_by_id.get_mut(id).and_then(|node| node.parent.take());
        let siblings = match parent {
            Some(parent) => match self.node_by_id.get_mut(&parent) {
                Some(parent) => &mut parent.children,
                None => return,
            },
            None => &mut self.root_nodes,
        };
        if let Some((pos, _)) = siblings.iter().find_position(|c| *c == id) {
            siblings.remove(pos);
        }
    }
}

// --- Consistency ---

impl TreeIndex {
    /// Checks the structural invariants, returning the first violation found.
    pub fn validate(&self) -> Result<(), TreeError> {
        for id in &self.root_nodes {
            let node = self
                .node_by_id
                .get(id)
                .ok_or_else(|| TreeError::InvalidNodeId(id.clone()))?;
            if node.parent.is_some() {
                return Err(TreeError::WrongParent(id.clone()));
            }
        }

        for (id, node) in &self.node_by_id {
            if &node.id != id {
                return Err(TreeError::Misplaced(id.clone()));
            }
            let siblings = match &node.parent {
                Some(parent) => {
                    &self
                        .node_by_id
                        .get(parent)
                        .ok_or_else(|| TreeError::InvalidNodeId(parent.clone()))?
                        .children
                }
                None => &self.root_nodes,
            };
            if siblings.iter().filter(|s| *s == id).count() != 1 {
                return Err(TreeError::Misplaced(id.clone()));
            }
            for child in &node.children {
                let child_node = self
                    .node_by_id
                    .get(child)
                    .ok_or_else(|| TreeError::InvalidNodeId(child.clone()))?;
                if child_node.parent.as_ref() != Some(id) {
                    return Err(TreeError::WrongParent(child.clone()));
                }
            }
        }

        // With the links consistent, a node missed from the roots sits on a parent cycle.
        let seen: AHashSet<&TreeKey> = self.iter_stack_order(None).map(|n| &n.id).collect();
        if let Some(lost) = self.node_by_id.keys().find(|id| !seen.contains(id)) {
            return Err(TreeError::Unreachable(lost.clone()));
        }
        Ok(())
    }
}
