//! Parsed content tree
//!
//! A [`Node`] is built once by the parser and never mutated afterwards. Trees
//! are shared through `Rc`, so a resolve pass can hand out the same subtree
//! many times. Each node keeps a weak back-reference to the node that owns it,
//! assigned exactly once when the owner is finished.

pub mod builder;
mod path;

pub use path::{append_in, get_in, set_in, PathSegment};

use std::cell::OnceCell;
use std::fmt;
use std::rc::{Rc, Weak};

use serde_json::Value;

/// Tag of a parsed node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Asset,
    View,
    Applicability,
    Template,
    Value,
    MultiNode,
    Switch,
    Async,
    Unknown,
    Empty,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Asset => "asset",
            NodeType::View => "view",
            NodeType::Applicability => "applicability",
            NodeType::Template => "template",
            NodeType::Value => "value",
            NodeType::MultiNode => "multi-node",
            NodeType::Switch => "switch",
            NodeType::Async => "async",
            NodeType::Unknown => "unknown",
            NodeType::Empty => "empty",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A special node extracted from inside its owner's raw value
#[derive(Debug, Clone)]
pub struct Child {
    /// Where the resolved child is written into the owner's output
    pub path: Vec<PathSegment>,
    pub value: Rc<Node>,
}

/// Payload shared by value, asset and view nodes
#[derive(Debug, Clone, Default)]
pub struct ValueNode {
    /// Static part of the content. `None` when the object only held special children.
    pub value: Option<Value>,
    pub children: Vec<Child>,
    /// Properties string interpolation leaves untouched (assets and views only)
    pub properties_to_skip: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct SwitchCase {
    /// Expression tested for truthiness; `"*"` always matches
    pub case: Value,
    pub value: Rc<Node>,
}

#[derive(Debug)]
pub enum NodeKind {
    Value(ValueNode),
    Asset(ValueNode),
    View(ValueNode),
    MultiNode {
        values: Vec<Rc<Node>>,
        /// Replace the destination path instead of appending to it
        overrides: bool,
    },
    Switch {
        cases: Vec<SwitchCase>,
        dynamic: bool,
    },
    Template {
        /// Binding of the source array
        data: String,
        /// Unparsed fragment stamped out once per element
        template: Value,
        depth: usize,
        dynamic: bool,
    },
    Applicability {
        expression: Value,
        value: Rc<Node>,
    },
    Async {
        id: String,
        flatten: bool,
        /// Placeholder content the id was read from
        value: Rc<Node>,
        /// Applied to each answer before it replaces the placeholder
        on_value: Option<ValueHook>,
    },
    Unknown,
    Empty,
}

/// Rewrites content delivered to an async placeholder
#[derive(Clone)]
pub struct ValueHook(Rc<dyn Fn(Rc<Node>) -> Rc<Node>>);

impl ValueHook {
    pub fn new(hook: impl Fn(Rc<Node>) -> Rc<Node> + 'static) -> Self {
        Self(Rc::new(hook))
    }

    pub fn apply(&self, node: Rc<Node>) -> Rc<Node> {
        (self.0)(node)
    }
}

impl fmt::Debug for ValueHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ValueHook")
    }
}

/// A node in the parsed content tree
#[derive(Debug)]
pub struct Node {
    kind: NodeKind,
    parent: OnceCell<Weak<Node>>,
}

impl Node {
    pub fn new(kind: NodeKind) -> Rc<Node> {
        Rc::new(Node {
            kind,
            parent: OnceCell::new(),
        })
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn node_type(&self) -> NodeType {
        match &self.kind {
            NodeKind::Value(_) => NodeType::Value,
            NodeKind::Asset(_) => NodeType::Asset,
            NodeKind::View(_) => NodeType::View,
            NodeKind::MultiNode { .. } => NodeType::MultiNode,
            NodeKind::Switch { .. } => NodeType::Switch,
            NodeKind::Template { .. } => NodeType::Template,
            NodeKind::Applicability { .. } => NodeType::Applicability,
            NodeKind::Async { .. } => NodeType::Async,
            NodeKind::Unknown => NodeType::Unknown,
            NodeKind::Empty => NodeType::Empty,
        }
    }

    /// The value payload of value, asset and view nodes
    pub fn value_node(&self) -> Option<&ValueNode> {
        match &self.kind {
            NodeKind::Value(v) | NodeKind::Asset(v) | NodeKind::View(v) => Some(v),
            _ => None,
        }
    }

    /// Identity of an asset or view, read from its `id` property
    pub fn node_id(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Asset(v) | NodeKind::View(v) => v.value.as_ref()?.get("id")?.as_str(),
            _ => None,
        }
    }

    pub fn parent(&self) -> Option<Rc<Node>> {
        self.parent.get().and_then(Weak::upgrade)
    }

    /// Owners from the direct parent up to the root
    pub fn ancestors(&self) -> Ancestors {
        Ancestors {
            next: self.parent(),
        }
    }

    /// Nodes owned directly by this one
    pub fn direct_children(&self) -> Vec<&Rc<Node>> {
        match &self.kind {
            NodeKind::Value(v) | NodeKind::Asset(v) | NodeKind::View(v) => {
                v.children.iter().map(|child| &child.value).collect()
            }
            NodeKind::MultiNode { values, .. } => values.iter().collect(),
            NodeKind::Switch { cases, .. } => cases.iter().map(|case| &case.value).collect(),
            NodeKind::Applicability { value, .. } | NodeKind::Async { value, .. } => vec![value],
            NodeKind::Template { .. } | NodeKind::Unknown | NodeKind::Empty => Vec::new(),
        }
    }

    /// Point every direct child's parent link at this node. Children that
    /// already have an owner keep it.
    pub fn attach_children(self: &Rc<Self>) {
        for child in self.direct_children() {
            Node::adopt(self, child);
        }
    }

    /// Give `child` an owner if it has none yet
    pub fn adopt(parent: &Rc<Node>, child: &Rc<Node>) {
        if Rc::ptr_eq(parent, child) {
            return;
        }
        let _ = child.parent.set(Rc::downgrade(parent));
    }

    /// Copy of this asset or view carrying a new skip list. Other kinds are
    /// returned unchanged.
    pub fn with_properties_to_skip(self: &Rc<Self>, skip: Vec<String>) -> Rc<Node> {
        let rebuilt = match &self.kind {
            NodeKind::Asset(v) => NodeKind::Asset(ValueNode {
                properties_to_skip: Some(skip),
                ..v.clone()
            }),
            NodeKind::View(v) => NodeKind::View(ValueNode {
                properties_to_skip: Some(skip),
                ..v.clone()
            }),
            _ => return Rc::clone(self),
        };
        Node::new(rebuilt)
    }

    /// Path of `child` inside this node's output, if it is one of its children
    pub fn path_of(&self, child: &Rc<Node>) -> Option<&[PathSegment]> {
        self.value_node()?
            .children
            .iter()
            .find(|c| Rc::ptr_eq(&c.value, child))
            .map(|c| c.path.as_slice())
    }
}

pub struct Ancestors {
    next: Option<Rc<Node>>,
}

impl Iterator for Ancestors {
    type Item = Rc<Node>;

    fn next(&mut self) -> Option<Rc<Node>> {
        let current = self.next.take()?;
        self.next = current.parent();
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn leaf(value: Value) -> Rc<Node> {
        Node::new(NodeKind::Value(ValueNode {
            value: Some(value),
            ..Default::default()
        }))
    }

    #[test]
    fn test_attach_children_sets_parent_once() {
        let child = leaf(json!("a"));
        let first = Node::new(NodeKind::MultiNode {
            values: vec![Rc::clone(&child)],
            overrides: true,
        });
        first.attach_children();

        let second = Node::new(NodeKind::MultiNode {
            values: vec![Rc::clone(&child)],
            overrides: true,
        });
        second.attach_children();

        let parent = child.parent().expect("Should have a parent");
        assert!(Rc::ptr_eq(&parent, &first));
    }

    #[test]
    fn test_ancestors_walk_to_root() {
        let inner = leaf(json!(1));
        let middle = Node::new(NodeKind::Applicability {
            expression: json!(true),
            value: Rc::clone(&inner),
        });
        middle.attach_children();
        let root = Node::new(NodeKind::View(ValueNode {
            value: Some(json!({"id": "root"})),
            children: vec![Child {
                path: vec!["slot".into()],
                value: Rc::clone(&middle),
            }],
            properties_to_skip: None,
        }));
        root.attach_children();

        let types: Vec<NodeType> = inner.ancestors().map(|n| n.node_type()).collect();
        assert_eq!(types, vec![NodeType::Applicability, NodeType::View]);
        assert_eq!(root.path_of(&middle), Some(&["slot".into()][..]));
    }

    #[test]
    fn test_node_id_only_for_assets_and_views() {
        let asset = Node::new(NodeKind::Asset(ValueNode {
            value: Some(json!({"id": "a1", "type": "text"})),
            ..Default::default()
        }));
        assert_eq!(asset.node_id(), Some("a1"));
        assert_eq!(leaf(json!({"id": "nope"})).node_id(), None);
    }

    #[test]
    fn test_with_properties_to_skip() {
        let asset = Node::new(NodeKind::Asset(ValueNode {
            value: Some(json!({"id": "a1"})),
            ..Default::default()
        }));
        let updated = asset.with_properties_to_skip(vec!["label".to_string()]);
        let skip = updated
            .value_node()
            .and_then(|v| v.properties_to_skip.clone());
        assert_eq!(skip, Some(vec!["label".to_string()]));
        assert_eq!(updated.node_id(), Some("a1"));
    }
}
