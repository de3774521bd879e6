//! `applicability` guards
//!
//! An object carrying an `applicability` expression is only part of the
//! output while the expression does not evaluate to `false`.

use std::rc::Rc;

use serde_json::Value;

use crate::error::{ContentError, ResolveError};
use crate::node::{Node, NodeKind, NodeType};
use crate::parser::Parser;
use crate::plugin::{ChildOptions, NodePlugin, Outcome, ParseOptions, Parsed};
use crate::resolver::ResolveContext;

const KEY: &str = "applicability";

#[derive(Debug, Default, Clone, Copy)]
pub struct ApplicabilityPlugin;

impl NodePlugin for ApplicabilityPlugin {
    fn name(&self) -> &str {
        "applicability"
    }

    fn determine_type(&self, raw: &Value) -> Option<NodeType> {
        raw.as_object()
            .filter(|map| map.contains_key(KEY))
            .map(|_| NodeType::Applicability)
    }

    fn parse_node(
        &self,
        parser: &Parser,
        raw: &Value,
        context: NodeType,
        options: &ParseOptions,
        determined: NodeType,
        _child: Option<&ChildOptions<'_>>,
    ) -> Result<Parsed, ContentError> {
        if determined != NodeType::Applicability {
            return Ok(Parsed::Pass);
        }
        let Some(map) = raw.as_object() else {
            return Ok(Parsed::Pass);
        };

        let mut rest = map.clone();
        let expression = rest.remove(KEY).unwrap_or(Value::Null);
        let Some(guarded) = parser.parse_object(&Value::Object(rest), context, options)? else {
            return Ok(Parsed::Nothing);
        };

        let node = parser.create_node(
            NodeKind::Applicability {
                expression,
                value: guarded,
            },
            raw,
        )?;
        Ok(node.map_or(Parsed::Nothing, Parsed::Node))
    }

    fn before_resolve(
        &self,
        node: &Rc<Node>,
        ctx: &ResolveContext<'_>,
    ) -> Result<Outcome<Rc<Node>>, ResolveError> {
        let NodeKind::Applicability { expression, value } = node.kind() else {
            return Ok(Outcome::Pass);
        };

        if ctx.evaluate(expression) == Value::Bool(false) {
            Ok(Outcome::Drop)
        } else {
            Ok(Outcome::Replace(Rc::clone(value)))
        }
    }
}
