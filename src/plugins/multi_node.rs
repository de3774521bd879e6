//! Arrays of content
//!
//! Each element is parsed on its own. Arrays left with no elements produce
//! nothing. An array whose key is also a template output appends to what the
//! template produces instead of replacing it.

use serde_json::Value;

use super::template::has_template_values;
use crate::error::ContentError;
use crate::node::{NodeKind, NodeType};
use crate::parser::Parser;
use crate::plugin::{ChildOptions, NodePlugin, ParseOptions, Parsed};

#[derive(Debug, Default, Clone, Copy)]
pub struct MultiNodePlugin;

impl NodePlugin for MultiNodePlugin {
    fn name(&self) -> &str {
        "multi-node"
    }

    fn determine_type(&self, raw: &Value) -> Option<NodeType> {
        raw.as_array()
            .filter(|items| !items.is_empty())
            .map(|_| NodeType::MultiNode)
    }

    fn parse_node(
        &self,
        parser: &Parser,
        raw: &Value,
        _context: NodeType,
        options: &ParseOptions,
        determined: NodeType,
        child: Option<&ChildOptions<'_>>,
    ) -> Result<Parsed, ContentError> {
        if determined != NodeType::MultiNode {
            return Ok(Parsed::Pass);
        }
        let Some(items) = raw.as_array() else {
            return Ok(Parsed::Pass);
        };

        let mut values = Vec::with_capacity(items.len());
        for item in items {
            if let Some(node) = parser.parse_object(item, NodeType::Value, options)? {
                values.push(node);
            }
        }
        if values.is_empty() {
            return Ok(Parsed::Nothing);
        }

        let overrides = child.map_or(true, |c| !has_template_values(c.parent, c.key));
        let node = parser.create_node(NodeKind::MultiNode { values, overrides }, raw)?;
        Ok(node.map_or(Parsed::Nothing, Parsed::Node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::plugin::Plugins;
    use serde_json::json;
    use std::rc::Rc;

    fn parser() -> Parser {
        let plugins: Vec<Rc<dyn NodePlugin>> = vec![Rc::new(MultiNodePlugin)];
        let plugins: Plugins = plugins.into();
        Parser::new(plugins, Rc::new(EngineConfig::default()))
    }

    #[test]
    fn test_items_parse_independently() {
        let node = parser()
            .parse_object(
                &json!([{"asset": {"id": "a", "type": "text"}}, 2, [3, 4]]),
                NodeType::Value,
                &ParseOptions::default(),
            )
            .expect("Should parse")
            .expect("Should produce a node");

        let NodeKind::MultiNode { values, overrides } = node.kind() else {
            panic!("expected multi-node, got {:?}", node.kind());
        };
        assert!(*overrides);
        let types: Vec<NodeType> = values.iter().map(|v| v.node_type()).collect();
        assert_eq!(
            types,
            vec![NodeType::Value, NodeType::Value, NodeType::MultiNode]
        );
        for value in values {
            let parent = value.parent().expect("Should have parent");
            assert!(Rc::ptr_eq(&parent, &node));
        }
    }

    #[test]
    fn test_empty_array_is_not_claimed() {
        assert_eq!(MultiNodePlugin.determine_type(&json!([])), None);
        assert_eq!(MultiNodePlugin.determine_type(&json!({})), None);
    }
}
