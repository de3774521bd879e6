//! Constructors for hand-built nodes
//!
//! Transforms use these to rewrite an asset before it is resolved. Nodes are
//! never mutated, so every helper that changes a node returns a new one and
//! leaves the input as it was.

use std::rc::Rc;

use serde_json::{json, Value};

use super::{Child, Node, NodeKind, PathSegment, ValueHook, ValueNode};

pub fn asset(value: Value) -> Rc<Node> {
    Node::new(NodeKind::Asset(ValueNode {
        value: Some(value),
        ..Default::default()
    }))
}

pub fn value(value: Option<Value>) -> Rc<Node> {
    Node::new(NodeKind::Value(ValueNode {
        value,
        ..Default::default()
    }))
}

/// A value node holding `node` under its `asset` key
pub fn asset_wrapper(node: Rc<Node>) -> Rc<Node> {
    add_child(&value(None), vec!["asset".into()], node)
}

/// An array of `values` that replaces whatever sits at its destination
pub fn multi_node(values: Vec<Rc<Node>>) -> Rc<Node> {
    let multi = Node::new(NodeKind::MultiNode {
        values,
        overrides: true,
    });
    multi.attach_children();
    multi
}

/// A placeholder for content the async handler supplies later. Answers pass
/// through `on_value` before they replace the placeholder.
pub fn async_node(id: &str, flatten: bool, on_value: Option<ValueHook>) -> Rc<Node> {
    let placeholder = value(Some(json!({ "id": id })));
    let node = Node::new(NodeKind::Async {
        id: id.to_string(),
        flatten,
        value: placeholder,
        on_value,
    });
    node.attach_children();
    node
}

/// Copy of `node` with `child` added at `path`. Nodes without children are
/// returned unchanged.
pub fn add_child(node: &Rc<Node>, path: Vec<PathSegment>, child: Rc<Node>) -> Rc<Node> {
    rebuild(node, |children| children.push(Child { path, value: child }))
}

/// Copy of `node` where every child at exactly `path` is replaced by
/// `update(child)`. Child order is kept.
pub fn update_children_by_path(
    node: &Rc<Node>,
    path: &[PathSegment],
    update: impl Fn(&Child) -> Rc<Node>,
) -> Rc<Node> {
    rebuild(node, |children| {
        for child in children.iter_mut().filter(|child| child.path == path) {
            child.value = update(child);
        }
    })
}

fn rebuild(node: &Rc<Node>, edit: impl FnOnce(&mut Vec<Child>)) -> Rc<Node> {
    let Some(payload) = node.value_node() else {
        return Rc::clone(node);
    };
    let mut payload = payload.clone();
    edit(&mut payload.children);

    let kind = match node.kind() {
        NodeKind::Asset(_) => NodeKind::Asset(payload),
        NodeKind::View(_) => NodeKind::View(payload),
        _ => NodeKind::Value(payload),
    };
    let rebuilt = Node::new(kind);
    rebuilt.attach_children();
    rebuilt
}
