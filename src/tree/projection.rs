//! Views derived from the index: subtree filtering, ancestor visits, the flattened
//! selection list and the legal drop targets for a move.

use std::{fmt, rc::Rc};

use ahash::AHashSet;
use serde_json::Value;

use super::{iterato::PreorderIter, TreeError, TreeIndex, TreeNode};
use crate::{
    item::{same_id, AsItem, Item, SharedItem, TreeKey},
    options::INVISIBLE_CHAR,
};

static NULL: Value = Value::Null;

/// How [`TreeIndex::tree_shape_select_items`] decides that an entry is disabled.
#[derive(Clone, Default)]
pub enum DisableRule {
    /// Nothing is disabled.
    #[default]
    Never,
    /// Read a boolean field of the item; anything but `true` means enabled.
    Field(String),
    Predicate(Rc<dyn Fn(&Item) -> bool>),
}

impl DisableRule {
    pub fn predicate(predicate: impl Fn(&Item) -> bool + 'static) -> Self {
        DisableRule::Predicate(Rc::new(predicate))
    }

    fn is_disabled(&self, item: &Item) -> bool {
        match self {
            DisableRule::Never => false,
            DisableRule::Field(field) if field.is_empty() => false,
            DisableRule::Field(field) => item.get(field).and_then(Value::as_bool).unwrap_or(false),
            DisableRule::Predicate(predicate) => predicate(item),
        }
    }
}

impl fmt::Debug for DisableRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisableRule::Never => write!(f, "Never"),
            DisableRule::Field(field) => f.debug_tuple("Field").field(field).finish(),
            DisableRule::Predicate(_) => write!(f, "Predicate(<fn>)"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ShapeOptions {
    /// Keep the entry for the root itself.
    pub with_root: bool,
    pub disable: DisableRule,
}

impl Default for ShapeOptions {
    fn default() -> Self {
        ShapeOptions {
            with_root: true,
            disable: DisableRule::Never,
        }
    }
}

/// One entry of the flattened selection list.
#[derive(Clone, Debug)]
pub struct ShapeItem {
    pub label: String,
    pub id: TreeKey,
    /// The indexed item itself.
    pub value: SharedItem,
    /// Depth below the root, which is level 0.
    pub level: usize,
    pub disabled: bool,
    /// `label` indented by one [`INVISIBLE_CHAR`] per level.
    pub label_with_level: String,
}

pub fn label_with_level(label: &str, level: usize) -> String {
    let mut out = String::with_capacity(label.len() + level * INVISIBLE_CHAR.len_utf8());
    out.extend(std::iter::repeat(INVISIBLE_CHAR).take(level));
    out.push_str(label);
    out
}

impl TreeIndex {
    /// Prunes a nested item forest in place, dropping every item for which `predicate` is
    /// false.
    ///
    /// Children are filtered before their parent is tested, and each collection is walked
    /// from the back so removals do not shift the entries still to visit. This works on
    /// plain nested items, such as the output of [`get_root_items`](Self::get_root_items);
    /// the index itself is not touched.
    pub fn filter(&self, mut predicate: impl FnMut(&Item) -> bool, items: &mut Vec<Item>) {
        self.filter_slots(&mut predicate, items);
    }

    /// Filters a fresh [`get_root_items`](Self::get_root_items) snapshot.
    pub fn filter_roots(&self, predicate: impl FnMut(&Item) -> bool) -> Vec<Item> {
        let mut items = self.get_root_items();
        self.filter(predicate, &mut items);
        items
    }

    fn filter_slots<T: AsItem>(&self, predicate: &mut dyn FnMut(&Item) -> bool, slots: &mut Vec<T>) {
        let mut index = slots.len();
        while index > 0 {
            index -= 1;
            let Some(item) = slots[index].as_item_mut() else {
                continue;
            };
            if let Some(children) = self.keys.children_mut(item) {
                if !children.is_empty() {
                    self.filter_slots(predicate, children);
                }
            }
            let keep = match slots[index].as_item() {
                Some(item) => predicate(item),
                None => true,
            };
            if !keep {
                slots.remove(index);
            }
        }
    }

    /// Calls `callback` on each ancestor of `item`, nearest first.
    ///
    /// The walk starts from the node named by `item`'s own parent id field and continues
    /// through each ancestor's parent id field, so it follows the items, not the stored
    /// links. It stops at the first id that does not resolve, or if an ancestor repeats.
    pub fn visit_parent(&self, item: &Item, mut callback: impl FnMut(&TreeNode)) {
        let mut seen = AHashSet::new();
        let mut next = self.keys.parent_id_of(item);
        while let Some(parent) = next.as_ref().and_then(|id| self.node_by_id.get(id)) {
            if !seen.insert(&parent.id) {
                break;
            }
            callback(parent);
            next = self.keys.parent_id_of(&parent.data.borrow());
        }
    }

    /// Flattens the first tree of [`get_root_items`](Self::get_root_items) into a
    /// pre-order list for list-style pickers.
    ///
    /// Only the first root of the snapshot is used (which, in stack order, is the last
    /// root node). Children keep their snapshot order.
    pub fn tree_shape_select_items(&self, options: &ShapeOptions) -> Vec<ShapeItem> {
        let roots = self.get_root_items();
        let Some(first) = roots.first() else {
            return vec![];
        };

        let mut shape = vec![];
        for (level, item) in PreorderIter::new(first, |item| {
            self.keys.children_of(item).collect::<Vec<_>>()
        }) {
            let Some(node) = self.keys.id_of(item).and_then(|id| self.node_by_id.get(&id)) else {
                continue;
            };
            let label = self.keys.label_of(item);
            shape.push(ShapeItem {
                label_with_level: label_with_level(&label, level),
                label,
                id: node.id.clone(),
                value: node.data.clone(),
                level,
                disabled: options.disable.is_disabled(item),
            });
        }

        if !options.with_root && !shape.is_empty() {
            shape.remove(0);
        }
        shape
    }

    /// The forest of places the `moving_items` could be dropped into.
    ///
    /// Starting from `root_items` (a nested forest, usually from
    /// [`get_root_items`](Self::get_root_items)), this copies every container except the
    /// moving items and their subtrees. Leaves are never targets. A container whose id is
    /// the moving items' current parent is kept only if something else remains under it.
    /// The copies drop the parent id field and carry freshly built children arrays.
    pub fn movable_to_parent_items(
        &self,
        root_items: &[Item],
        moving_items: &[Item],
    ) -> Result<Vec<Item>, TreeError> {
        let Some(first) = moving_items.first() else {
            return Err(TreeError::NothingToMove);
        };
        let parent_id = first.get(&self.keys.parent_id).unwrap_or(&NULL);
        let moving_ids: Vec<&Value> = moving_items
            .iter()
            .map(|item| item.get(&self.keys.id).unwrap_or(&NULL))
            .collect();

        Ok(self.move_targets(root_items.iter(), parent_id, &moving_ids))
    }

    fn move_targets<'a>(
        &self,
        children: impl Iterator<Item = &'a Item>,
        parent_id: &Value,
        moving_ids: &[&Value],
    ) -> Vec<Item> {
        let mut targets = vec![];
        for child in children {
            let id = child.get(&self.keys.id).unwrap_or(&NULL);
            if moving_ids.iter().any(|moving| same_id(moving, id)) || self.is_leaf_item(child) {
                continue;
            }

            let mut target: Item = child
                .iter()
                .filter(|(field, _)| **field != self.keys.children && **field != self.keys.parent_id)
                .map(|(field, value)| (field.clone(), value.clone()))
                .collect();
            let below =
                self.move_targets(self.keys.children_of(child), parent_id, moving_ids);

            if !below.is_empty() || !same_id(id, parent_id) {
                self.keys
                    .set_children(&mut target, below.into_iter().map(Value::Object).collect());
                targets.push(target);
            }
        }
        targets
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;
    use similar_asserts::assert_eq;

    use super::*;
    use crate::{item::share, options::TreeOptions};

    fn item(value: Value) -> Item {
        serde_json::from_value(value).unwrap()
    }

    fn items(value: Value) -> Vec<Item> {
        serde_json::from_value(value).unwrap()
    }

    fn ids(items: &[Item]) -> Vec<Value> {
        items.iter().map(|i| i["id"].clone()).collect()
    }

    /// 1 ─┬─ 2 ─── 4
    ///    └─ 3
    /// 5
    fn sample() -> TreeIndex {
        TreeIndex::from_items(
            items(json!([
                { "id": 1, "parentId": null, "name": "one" },
                { "id": 2, "parentId": 1, "name": "two", "locked": true },
                { "id": 3, "parentId": 1, "name": "three" },
                { "id": 4, "parentId": 2, "name": "four" },
                { "id": 5, "name": "five" },
            ])),
            TreeOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn filter_prunes_children_before_parents() {
        let index = sample();
        let mut roots = index.get_root_items();
        let mut tested = vec![];
        index.filter(
            |item| {
                tested.push(item["id"].clone());
                item["id"] != json!(2)
            },
            &mut roots,
        );

        // 4 is tested before its parent 2, and both go away with 2
        let pos = |id: i64| tested.iter().position(|v| *v == json!(id)).unwrap();
        assert!(pos(4) < pos(2));
        assert!(pos(3) < pos(1));

        assert_eq!(ids(&roots), vec![json!(5), json!(1)]);
        let one_children: Vec<_> = index.keys().children_of(&roots[1]).cloned().collect();
        assert_eq!(ids(&one_children), vec![json!(3)]);
        // the index keeps everything
        assert_eq!(index.len(), 5);
    }

    #[test]
    fn filter_roots_keeps_matching_items() {
        let index = sample();
        let roots = index.filter_roots(|item| item["id"] != json!(5));
        assert_eq!(ids(&roots), vec![json!(1)]);
    }

    #[test]
    fn visit_parent_walks_up() {
        let index = sample();
        let mut seen = vec![];
        index.visit_parent(&item(json!({ "id": 4, "parentId": 2 })), |node| {
            seen.push(node.id().clone())
        });
        assert_eq!(seen, vec![TreeKey::from(2), TreeKey::from(1)]);
    }

    #[test]
    fn visit_parent_uses_the_given_parent_id() {
        let index = sample();
        let mut seen = vec![];
        // not indexed at all, but its parent id names node 3
        index.visit_parent(&item(json!({ "id": 99, "parentId": 3 })), |node| {
            seen.push(node.id().clone())
        });
        assert_eq!(seen, vec![TreeKey::from(3), TreeKey::from(1)]);

        seen.clear();
        index.visit_parent(&item(json!({ "id": 1 })), |node| seen.push(node.id().clone()));
        assert!(seen.is_empty());
    }

    #[test]
    fn visit_parent_stops_on_repeat() {
        let a = share(item(json!({ "id": "a", "parentId": null })));
        let b = share(item(json!({ "id": "b", "parentId": "a" })));
        let index = TreeIndex::new([a.clone(), b], TreeOptions::default()).unwrap();
        // close a loop behind the index's back
        a.borrow_mut().insert("parentId".into(), json!("b"));

        let mut count = 0;
        index.visit_parent(&item(json!({ "parentId": "a" })), |_| count += 1);
        assert_eq!(count, 2);
    }

    #[test]
    fn shape_items_flatten_the_first_root() {
        let mut index = TreeIndex::from_items(
            items(json!([
                { "id": 1, "name": "root" },
                { "id": 2, "parentId": 1, "name": "a", "locked": true },
                { "id": 3, "parentId": 2, "name": "b" },
                { "id": 4, "parentId": 1, "name": "c" },
                { "id": 5, "name": "other root" },
            ])),
            TreeOptions::default(),
        )
        .unwrap();

        // The snapshot starts with the last root.
        let shape = index.tree_shape_select_items(&ShapeOptions::default());
        assert_eq!(shape.len(), 1);
        assert_eq!(shape[0].label, "other root");

        index.remove_node(&TreeKey::from(5)).unwrap();
        let shape = index.tree_shape_select_items(&ShapeOptions {
            with_root: true,
            disable: DisableRule::Field("locked".into()),
        });
        let flat: Vec<_> = shape
            .iter()
            .map(|s| (s.label.as_str(), s.level, s.disabled))
            .collect();
        // children in snapshot (stack) order: 4 before 2
        assert_eq!(
            flat,
            vec![
                ("root", 0, false),
                ("c", 1, false),
                ("a", 1, true),
                ("b", 2, false),
            ]
        );
        assert_eq!(shape[3].label_with_level, "\u{3000}\u{3000}b");
        assert!(Rc::ptr_eq(
            &shape[2].value,
            index.get_node_by_id(&TreeKey::from(2)).unwrap().data()
        ));
    }

    #[test]
    fn shape_items_without_root_and_with_predicate() {
        let mut index = sample();
        index.remove_node(&TreeKey::from(5)).unwrap();

        let shape = index.tree_shape_select_items(&ShapeOptions {
            with_root: false,
            disable: DisableRule::predicate(|item| item["name"] == json!("four")),
        });
        let labels: Vec<_> = shape.iter().map(|s| (s.label.as_str(), s.disabled)).collect();
        assert_eq!(
            labels,
            vec![("three", false), ("two", false), ("four", true)]
        );
    }

    #[test]
    fn shape_items_of_empty_index() {
        assert!(TreeIndex::default()
            .tree_shape_select_items(&ShapeOptions::default())
            .is_empty());
    }

    #[test]
    fn label_indentation() {
        assert_eq!(label_with_level("x", 0), "x");
        assert_eq!(label_with_level("x", 1), "\u{3000}x");
    }

    /// 1 ─┬─ 2 ─┬─ 4 ─── 6
    ///    │     └─ 5
    ///    └─ 3 ─── 7
    fn containers() -> TreeIndex {
        TreeIndex::from_items(
            items(json!([
                { "id": 1, "parentId": null },
                { "id": 2, "parentId": 1 },
                { "id": 3, "parentId": 1 },
                { "id": 4, "parentId": 2 },
                { "id": 5, "parentId": 2 },
                { "id": 6, "parentId": 4 },
                { "id": 7, "parentId": 3 },
            ])),
            TreeOptions::default(),
        )
        .unwrap()
    }

    fn target_ids(index: &TreeIndex, forest: &[Item]) -> Vec<Value> {
        let mut out = vec![];
        let mut stack: Vec<&Item> = forest.iter().collect();
        while let Some(item) = stack.pop() {
            out.push(item["id"].clone());
            stack.extend(index.keys().children_of(item));
        }
        out.sort_by_key(|v| v.as_i64());
        out
    }

    #[test]
    fn move_targets_need_moving_items() {
        let index = containers();
        assert_eq!(
            index.movable_to_parent_items(&index.get_root_items(), &[]),
            Err(TreeError::NothingToMove)
        );
    }

    #[test]
    fn move_targets_exclude_moving_subtrees_and_leaves() {
        let index = containers();
        let roots = index.get_root_items();
        let moving = [item(json!({ "id": 4, "parentId": 2 }))];

        let targets = index.movable_to_parent_items(&roots, &moving).unwrap();
        // 4 and 6 move, 5 and 7 are leaves, and 2 is the current parent with no
        // container left under it
        assert_eq!(target_ids(&index, &targets), vec![json!(1), json!(3)]);
        for target in &targets {
            assert!(!target.contains_key("parentId"));
        }
    }

    #[test]
    fn current_parent_kept_when_it_has_other_containers() {
        let index = containers();
        let roots = index.get_root_items();
        // moving 5 out of 2; 2 still holds container 4
        let moving = [item(json!({ "id": 5, "parentId": 2 }))];

        let targets = index.movable_to_parent_items(&roots, &moving).unwrap();
        assert_eq!(
            target_ids(&index, &targets),
            vec![json!(1), json!(2), json!(3), json!(4)]
        );
    }

    #[test]
    fn move_targets_match_integral_float_ids() {
        let index = containers();
        let roots = index.get_root_items();
        let moving = [item(json!({ "id": 4.0, "parentId": 2.0 }))];

        let targets = index.movable_to_parent_items(&roots, &moving).unwrap();
        assert_eq!(target_ids(&index, &targets), vec![json!(1), json!(3)]);
    }

    #[test]
    fn custom_leaf_predicate_decides_targets() {
        let index = TreeIndex::from_items(
            items(json!([
                { "id": 1, "kind": "folder" },
                { "id": 2, "parentId": 1, "kind": "folder" },
                { "id": 3, "parentId": 1, "kind": "file" },
            ])),
            TreeOptions::default().with_leaf_predicate(|item| item["kind"] != json!("folder")),
        )
        .unwrap();
        let roots = index.get_root_items();
        let moving = [item(json!({ "id": 3, "parentId": 1 }))];

        let targets = index.movable_to_parent_items(&roots, &moving).unwrap();
        // the empty folder 2 is a target now
        assert_eq!(target_ids(&index, &targets), vec![json!(1), json!(2)]);
    }
}
