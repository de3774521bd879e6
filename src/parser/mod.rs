//! Parser from raw JSON content to a node tree
//!
//! The parser only knows about plain objects, leaves and the `asset` key.
//! Everything else (switches, templates, arrays, async placeholders,
//! applicability guards) is recognized and built by plugins.

use std::rc::Rc;

use serde_json::{Map, Value};

use crate::config::EngineConfig;
use crate::error::ContentError;
use crate::node::{set_in, Child, Node, NodeKind, NodeType, PathSegment, ValueNode};
use crate::plugin::{ChildOptions, Outcome, ParseOptions, Parsed, Plugins};

/// Turns raw content into [`Node`] trees
pub struct Parser {
    plugins: Plugins,
    config: Rc<EngineConfig>,
}

/// Static value and extracted children collected while walking one object
#[derive(Default)]
struct LocalObject {
    value: Option<Value>,
    children: Vec<Child>,
    /// Children from key markers, attached after the static siblings
    deferred: Vec<Child>,
}

impl Parser {
    pub fn new(plugins: Plugins, config: Rc<EngineConfig>) -> Self {
        Self { plugins, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Parse the root of a piece of content as a view
    pub fn parse(&self, raw: &Value) -> Result<Rc<Node>, ContentError> {
        if !raw.is_object() {
            return Err(ContentError::NotAView);
        }
        self.parse_object(raw, NodeType::View, &ParseOptions::default())?
            .ok_or(ContentError::NotAView)
    }

    /// Parse any value. Objects become nodes of the `context` type unless a
    /// plugin claims them; other leaves become plain value nodes.
    pub fn parse_object(
        &self,
        raw: &Value,
        context: NodeType,
        options: &ParseOptions,
    ) -> Result<Option<Rc<Node>>, ContentError> {
        if let Some(determined) = self.determine_type(raw) {
            match self.parse_node(raw, context, options, determined, None)? {
                Parsed::Node(node) => return Ok(Some(node)),
                Parsed::Nothing => return Ok(None),
                Parsed::Children(children) => return self.finish(context, None, children, raw),
                Parsed::Pass => {}
            }
        }

        let map = match raw {
            Value::Object(map) => map,
            Value::Array(items) if items.is_empty() => return Ok(None),
            leaf => return self.finish(context, Some(leaf.clone()), Vec::new(), raw),
        };

        let mut local = LocalObject::default();
        self.parse_local(map, options, &[], &mut local)?;

        let LocalObject {
            value,
            mut children,
            deferred,
        } = local;
        children.extend(deferred);
        self.finish(context, value, children, raw)
    }

    /// Run the on-create pipeline over a new node and link its children.
    /// Returns `None` when a plugin drops the node or it collapses to empty.
    pub fn create_node(
        &self,
        kind: NodeKind,
        raw: &Value,
    ) -> Result<Option<Rc<Node>>, ContentError> {
        let mut node = Node::new(kind);
        for plugin in self.plugins.iter() {
            match plugin.on_create(self, &node, raw)? {
                Outcome::Pass => {}
                Outcome::Replace(next) => node = next,
                Outcome::Drop => return Ok(None),
            }
        }

        if node.node_type() == NodeType::Empty {
            return Ok(None);
        }
        node.attach_children();
        Ok(Some(node))
    }

    pub fn determine_type(&self, raw: &Value) -> Option<NodeType> {
        if !(raw.is_object() || raw.is_array()) {
            return None;
        }
        self.plugins.iter().find_map(|p| p.determine_type(raw))
    }

    pub fn determine_key_type(&self, key: &str) -> Option<NodeType> {
        self.plugins.iter().find_map(|p| p.determine_key_type(key))
    }

    fn parse_node(
        &self,
        raw: &Value,
        context: NodeType,
        options: &ParseOptions,
        determined: NodeType,
        child: Option<&ChildOptions<'_>>,
    ) -> Result<Parsed, ContentError> {
        for plugin in self.plugins.iter() {
            match plugin.parse_node(self, raw, context, options, determined, child)? {
                Parsed::Pass => continue,
                parsed => return Ok(parsed),
            }
        }
        Ok(Parsed::Pass)
    }

    fn parse_local(
        &self,
        map: &Map<String, Value>,
        options: &ParseOptions,
        path: &[PathSegment],
        local: &mut LocalObject,
    ) -> Result<(), ContentError> {
        for (key, value) in map {
            let child = ChildOptions {
                parent: map,
                key,
                path,
            };
            let key_path = child.key_path();

            if key == "asset" && value.is_object() {
                if let Some(asset) = self.parse_object(value, NodeType::Asset, options)? {
                    local.children.push(Child {
                        path: key_path,
                        value: asset,
                    });
                }
                continue;
            }

            if let Some(marker) = self.determine_key_type(key) {
                match self.parse_node(value, NodeType::Value, options, marker, Some(&child))? {
                    Parsed::Node(node) => {
                        local.deferred.push(Child {
                            path: key_path,
                            value: node,
                        });
                        continue;
                    }
                    Parsed::Children(children) => {
                        local.deferred.extend(children);
                        continue;
                    }
                    Parsed::Nothing => continue,
                    Parsed::Pass => {}
                }
            }

            if let Some(determined) = self.determine_type(value) {
                match self.parse_node(value, NodeType::Value, options, determined, Some(&child))? {
                    Parsed::Node(node) => {
                        local.children.push(Child {
                            path: key_path,
                            value: node,
                        });
                        continue;
                    }
                    Parsed::Children(children) => {
                        local.children.extend(children);
                        continue;
                    }
                    Parsed::Nothing => continue,
                    Parsed::Pass => {}
                }
            }

            match value {
                Value::Object(inner) => {
                    self.parse_local(inner, options, &key_path, local)?;
                }
                Value::Array(items) if items.is_empty() => {}
                leaf => {
                    let target = local.value.get_or_insert_with(|| Value::Object(Map::new()));
                    set_in(target, &key_path, leaf.clone());
                }
            }
        }
        Ok(())
    }

    fn finish(
        &self,
        context: NodeType,
        value: Option<Value>,
        children: Vec<Child>,
        raw: &Value,
    ) -> Result<Option<Rc<Node>>, ContentError> {
        if value.is_none() && children.is_empty() {
            return Ok(None);
        }

        let payload = ValueNode {
            value,
            children,
            properties_to_skip: None,
        };
        let kind = match context {
            NodeType::Asset => NodeKind::Asset(payload),
            NodeType::View => NodeKind::View(payload),
            _ => NodeKind::Value(payload),
        };
        self.create_node(kind, raw)
    }
}
