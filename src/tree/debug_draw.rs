//! Box-drawing rendering of the indexed forest, for debugging and snapshot tests.

use std::{
    fmt::{self, Write},
    rc::Rc,
};

use super::{TreeIndex, TreeNode};
use crate::item::Item;

impl TreeIndex {
    /// Draws every tree, roots in root order and children in child order.
    ///
    /// Each line shows the node id, followed by `: ` and whatever `format_node` returns
    /// for the node's item, if anything. Drawing keeps its own stack, so depth is only
    /// bounded by memory.
    pub fn debug_draw(&self, mut format_node: impl FnMut(&Item) -> Option<String>) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "Number of nodes:{}", self.len());

        fn draw_line<W: Write>(
            f: &mut W,
            node: &TreeNode,
            prefix: &str,
            format_node: &mut impl FnMut(&Item) -> Option<String>,
        ) -> fmt::Result {
            write!(f, "{prefix}{}", node.id)?;
            if let Some(text) = format_node(&node.data.borrow()) {
                write!(f, ": {text}")?;
            }
            writeln!(f)
        }

        fn push_children<'a>(
            index: &'a TreeIndex,
            stack: &mut Vec<(&'a TreeNode, Rc<str>, bool)>,
            node: &TreeNode,
            prefix: Rc<str>,
        ) {
            let children: Vec<_> = index.children_of(&node.id).collect();
            let num_children = children.len();
            for (i, child) in children.into_iter().enumerate().rev() {
                stack.push((child, prefix.clone(), i == num_children - 1));
            }
        }

        // (node, prefix shared by its siblings, is last child)
        let mut stack = vec![];
        let node_line_prefix: Rc<str> = Rc::from("  ");
        for root in self.root_nodes() {
            let _ = draw_line(&mut output, root, &node_line_prefix, &mut format_node);
            push_children(self, &mut stack, root, node_line_prefix.clone());

            while let Some((node, prefix, is_last_child)) = stack.pop() {
                let connector = if is_last_child {
                    "└── "
                } else {
                    "├── "
                };
                let _ = draw_line(
                    &mut output,
                    node,
                    &format!("{prefix}{connector}"),
                    &mut format_node,
                );
                let child_prefix = format!("{}{}", prefix, if is_last_child { "    " } else { "│   " });
                push_children(self, &mut stack, node, Rc::from(child_prefix));
            }
        }

        output
    }
}

impl fmt::Display for TreeIndex {
    /// Draws the forest with each node's label.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let drawing = self.debug_draw(|item| {
            let label = self.keys.label_of(item);
            (!label.is_empty()).then_some(label)
        });
        f.write_str(&drawing)
    }
}
