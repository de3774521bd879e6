//! `staticSwitch` and `dynamicSwitch`
//!
//! Both hold an ordered list of cases. The first case whose `case`
//! expression is truthy wins; a literal `"*"` always matches. Static switches
//! are decided once while parsing, dynamic ones on every resolve.

use std::rc::Rc;

use serde_json::{Map, Value};

use crate::error::{ContentError, ResolveError};
use crate::node::{Node, NodeKind, NodeType, SwitchCase};
use crate::parser::Parser;
use crate::plugin::{ChildOptions, NodePlugin, Outcome, ParseOptions, Parsed};
use crate::resolver::ResolveContext;
use crate::services::{is_truthy, DataModel, Services};

const STATIC_KEY: &str = "staticSwitch";
const DYNAMIC_KEY: &str = "dynamicSwitch";
const CASE_KEY: &str = "case";
const WILDCARD: &str = "*";

pub struct SwitchPlugin {
    services: Services,
}

impl SwitchPlugin {
    /// `services` decide static switches at parse time
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    fn select<'n>(
        cases: &'n [SwitchCase],
        mut evaluate: impl FnMut(&Value) -> Value,
    ) -> Option<&'n Rc<Node>> {
        cases
            .iter()
            .find(|switch_case| {
                switch_case.case.as_str() == Some(WILDCARD) || is_truthy(&evaluate(&switch_case.case))
            })
            .map(|switch_case| &switch_case.value)
    }
}

impl NodePlugin for SwitchPlugin {
    fn name(&self) -> &str {
        "switch"
    }

    fn determine_type(&self, raw: &Value) -> Option<NodeType> {
        let map = raw.as_object()?;
        (map.contains_key(STATIC_KEY) || map.contains_key(DYNAMIC_KEY)).then_some(NodeType::Switch)
    }

    fn parse_node(
        &self,
        parser: &Parser,
        raw: &Value,
        _context: NodeType,
        options: &ParseOptions,
        determined: NodeType,
        _child: Option<&ChildOptions<'_>>,
    ) -> Result<Parsed, ContentError> {
        if determined != NodeType::Switch {
            return Ok(Parsed::Pass);
        }
        let Some(map) = raw.as_object() else {
            return Ok(Parsed::Pass);
        };

        let (marker, dynamic) = if map.contains_key(DYNAMIC_KEY) {
            (DYNAMIC_KEY, true)
        } else {
            (STATIC_KEY, false)
        };
        let Some(Value::Array(entries)) = map.get(marker) else {
            return Err(ContentError::invalid_shape(marker, "expected an array of cases"));
        };

        let mut cases = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(body) = entry.as_object() else {
                return Err(ContentError::invalid_shape(marker, "each case must be an object"));
            };
            let case = body.get(CASE_KEY).cloned().unwrap_or(Value::Null);
            let content: Map<String, Value> = body
                .iter()
                .filter(|(key, _)| key.as_str() != CASE_KEY)
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            if let Some(value) = parser.parse_object(&Value::Object(content), NodeType::Value, options)? {
                cases.push(SwitchCase { case, value });
            }
        }

        let node = parser.create_node(NodeKind::Switch { cases, dynamic }, raw)?;
        Ok(node.map_or(Parsed::Nothing, Parsed::Node))
    }

    fn on_create(
        &self,
        _parser: &Parser,
        node: &Rc<Node>,
        _raw: &Value,
    ) -> Result<Outcome<Rc<Node>>, ContentError> {
        let NodeKind::Switch {
            cases,
            dynamic: false,
        } = node.kind()
        else {
            return Ok(Outcome::Pass);
        };

        let model: &dyn DataModel = self.services.model.as_ref();
        let winner = Self::select(cases, |case| self.services.evaluator.evaluate(case, model));
        Ok(match winner {
            Some(value) => Outcome::Replace(Rc::clone(value)),
            None => Outcome::Drop,
        })
    }

    fn before_resolve(
        &self,
        node: &Rc<Node>,
        ctx: &ResolveContext<'_>,
    ) -> Result<Outcome<Rc<Node>>, ResolveError> {
        let NodeKind::Switch {
            cases,
            dynamic: true,
        } = node.kind()
        else {
            return Ok(Outcome::Pass);
        };

        Ok(match Self::select(cases, |case| ctx.evaluate(case)) {
            Some(value) => Outcome::Replace(Rc::clone(value)),
            None => Outcome::Drop,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::plugin::Plugins;
    use crate::services::JsonModel;
    use serde_json::json;

    fn parser(data: Value) -> Parser {
        let services = Services::with_model(Rc::new(JsonModel::new(data)));
        let plugins: Vec<Rc<dyn NodePlugin>> = vec![Rc::new(SwitchPlugin::new(services))];
        let plugins: Plugins = plugins.into();
        Parser::new(plugins, Rc::new(EngineConfig::default()))
    }

    fn slot(view: &Node) -> Rc<Node> {
        Rc::clone(&view.value_node().expect("Should be a value node").children[0].value)
    }

    #[test]
    fn test_static_switch_collapses_at_parse_time() {
        let view = parser(json!({"lang": "fr"}))
            .parse(&json!({
                "id": "v",
                "title": {"staticSwitch": [
                    {"case": "{{lang}} == 'en'", "value": "Hello"},
                    {"case": "{{lang}} == 'fr'", "value": "Bonjour"}
                ]}
            }))
            .expect("Should parse");

        let chosen = slot(&view);
        assert_eq!(chosen.node_type(), NodeType::Value);
        assert_eq!(
            chosen.value_node().and_then(|v| v.value.clone()),
            Some(json!({"value": "Bonjour"}))
        );
    }

    #[test]
    fn test_static_switch_without_winner_is_dropped() {
        let view = parser(json!({}))
            .parse(&json!({
                "id": "v",
                "title": {"staticSwitch": [{"case": false, "value": "never"}]}
            }))
            .expect("Should parse");
        assert!(view
            .value_node()
            .expect("Should be a value node")
            .children
            .is_empty());
    }

    #[test]
    fn test_dynamic_switch_is_kept() {
        let view = parser(json!({}))
            .parse(&json!({
                "id": "v",
                "title": {"dynamicSwitch": [
                    {"case": false, "value": "a"},
                    {"case": "*", "value": "b"}
                ]}
            }))
            .expect("Should parse");
        match slot(&view).kind() {
            NodeKind::Switch { cases, dynamic } => {
                assert!(*dynamic);
                assert_eq!(cases.len(), 2);
            }
            other => panic!("expected switch, got {:?}", other),
        }
    }

    #[test]
    fn test_cases_must_be_an_array() {
        let result = parser(json!({})).parse(&json!({"id": "v", "title": {"staticSwitch": {}}}));
        assert!(matches!(
            result,
            Err(ContentError::InvalidShape {
                marker: "staticSwitch",
                ..
            })
        ));
    }
}
