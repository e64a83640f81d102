//! Stack-driven traversal helpers, used both by [`TreeIndex`] and over plain nested items.
//!
//! None of these recurse, so arbitrarily deep trees are fine.

use serde_json::Value;

use super::{TreeIndex, TreeNode};
use crate::{
    item::{is_truthy, same_id, Item, TreeKey},
    options::{fallback, DEFAULT_CHILDREN_KEY, DEFAULT_ID_KEY},
};

// --- Stack order ---

/// Depth-first iterator in raw stack order.
///
/// The stack is seeded with the roots in input order. Each step pops the top entry, yields
/// it and pushes its children in their original order. The last root therefore comes out
/// first, and among siblings the last one is visited first: a right-to-left depth-first
/// walk, not a pre-order. Snapshot building relies on this exact order.
#[derive(Clone)]
pub struct StackOrderIter<'a, T: ?Sized, F> {
    stack: Vec<&'a T>,
    children: F,
}

impl<'a, T: ?Sized, F, I> StackOrderIter<'a, T, F>
where
    F: FnMut(&'a T) -> I,
    I: IntoIterator<Item = &'a T>,
{
    pub fn new(roots: impl IntoIterator<Item = &'a T>, children: F) -> Self {
        StackOrderIter {
            stack: roots.into_iter().collect(),
            children,
        }
    }
}

impl<'a, T: ?Sized, F, I> Iterator for StackOrderIter<'a, T, F>
where
    F: FnMut(&'a T) -> I,
    I: IntoIterator<Item = &'a T>,
{
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.stack.pop()?;
        self.stack.extend((self.children)(current));
        Some(current)
    }
}

/// Visits every entity reachable from `roots` once, in [`StackOrderIter`] order.
///
/// An empty root list is a no-op.
pub fn visit_tree<'a, T, F, I>(
    roots: impl IntoIterator<Item = &'a T>,
    children: F,
    callback: impl FnMut(&'a T),
) where
    T: ?Sized + 'a,
    F: FnMut(&'a T) -> I,
    I: IntoIterator<Item = &'a T>,
{
    StackOrderIter::new(roots, children).for_each(callback);
}

/// Searches a forest of plain nested items for the first item whose `id_key` field equals
/// `id`, in [`StackOrderIter`] order.
///
/// A falsy `id` (`null`, `false`, `0`, `""`) never matches, even if an item carries it.
/// Empty field names fall back to `id` and `children`.
pub fn find_tree_node_by_id<'a>(
    roots: &'a [Item],
    id: &Value,
    id_key: &str,
    children_key: &str,
) -> Option<&'a Item> {
    if roots.is_empty() || !is_truthy(id) {
        return None;
    }
    let id_key = fallback(id_key, DEFAULT_ID_KEY);
    let children_key = fallback(children_key, DEFAULT_CHILDREN_KEY);

    StackOrderIter::new(roots, |item: &'a Item| {
        item.get(&children_key)
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_object)
    })
    .find(|item| item.get(&id_key).is_some_and(|found| same_id(found, id)))
}

// --- Preorder ---

/// True pre-order iterator: a parent, then each of its subtrees in child order.
///
/// Yields `(depth, entity)` with the starting entity at depth 0.
pub struct PreorderIter<'a, T: ?Sized, F> {
    stack: Vec<(usize, &'a T)>,
    children: F,
}

impl<'a, T: ?Sized, F, I> PreorderIter<'a, T, F>
where
    F: FnMut(&'a T) -> I,
    I: IntoIterator<Item = &'a T>,
    I::IntoIter: DoubleEndedIterator,
{
    pub fn new(start: &'a T, children: F) -> Self {
        PreorderIter {
            stack: vec![(0, start)],
            children,
        }
    }
}

impl<'a, T: ?Sized, F, I> Iterator for PreorderIter<'a, T, F>
where
    F: FnMut(&'a T) -> I,
    I: IntoIterator<Item = &'a T>,
    I::IntoIter: DoubleEndedIterator,
{
    type Item = (usize, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let (depth, node) = self.stack.pop()?;
        // Reversed so the first child is popped next.
        self.stack.extend(
            (self.children)(node)
                .into_iter()
                .rev()
                .map(|child| (depth + 1, child)),
        );
        Some((depth, node))
    }
}

// --- Ancestors ---

/// Walks the stored parent links from a node up to its root, yielding the starting node
/// first.
#[derive(Clone)]
pub struct AncestorsIter<'a> {
    index: &'a TreeIndex,
    current: Option<&'a TreeNode>,
}

impl<'a> AncestorsIter<'a> {
    pub fn new(index: &'a TreeIndex, start: &TreeKey) -> Self {
        AncestorsIter {
            index,
            current: index.get_node_by_id(start),
        }
    }
}

impl<'a> Iterator for AncestorsIter<'a> {
    type Item = &'a TreeNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.current?;
        self.current = node
            .parent()
            .and_then(|parent| self.index.get_node_by_id(parent));
        Some(node)
    }
}
