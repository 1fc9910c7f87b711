//! Display modes for list and search views
//!
//! A closed set of renderings, chosen by configuration. Each variant has its
//! own render function.

use super::entities::{Node, NodeView};
use serde::{Deserialize, Serialize};

/// Separator used by the breadcrumb rendering.
pub const BREADCRUMB_SEPARATOR: &str = " / ";

/// How a node is turned into the `text` of a [`NodeView`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayMode {
    /// The node name.
    #[default]
    Name,
    /// One attribute (see [`Node::display`]).
    Attribute(String),
    /// The name prefixed with two spaces per level.
    Indented,
    /// Names from the root down to the node.
    Breadcrumb,
}

impl DisplayMode {
    /// Render `node`. `path` is the root-first ancestor chain, only read by
    /// the breadcrumb mode.
    pub fn render(&self, node: &Node, path: &[Node]) -> String {
        match self {
            DisplayMode::Name => render_name(node),
            DisplayMode::Attribute(attr) => node.display(attr),
            DisplayMode::Indented => render_indented(node),
            DisplayMode::Breadcrumb => render_breadcrumb(node, path),
        }
    }

    /// Whether rendering needs the ancestor chain.
    pub fn needs_path(&self) -> bool {
        matches!(self, DisplayMode::Breadcrumb)
    }

    /// Build a view row.
    pub fn view(&self, node: &Node, path: &[Node], is_leaf: bool) -> NodeView {
        NodeView {
            id: node.id,
            text: self.render(node, path),
            level: node.depth,
            is_leaf,
        }
    }
}

fn render_name(node: &Node) -> String {
    node.name.clone()
}

fn render_indented(node: &Node) -> String {
    format!("{}{}", "  ".repeat(node.depth as usize), node.name)
}

fn render_breadcrumb(node: &Node, path: &[Node]) -> String {
    path.iter()
        .map(|n| n.name.as_str())
        .chain(std::iter::once(node.name.as_str()))
        .collect::<Vec<_>>()
        .join(BREADCRUMB_SEPARATOR)
}
