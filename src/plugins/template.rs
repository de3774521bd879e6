//! `template` entries
//!
//! A template stamps out one copy of its `value` per element of the array at
//! `data`, replacing the index placeholder with the element's index, and
//! writes the copies to `output`. Nested templates use a depth suffix
//! (`_index1_`, `_index2_`, ...) so inner and outer indices do not collide.

use std::rc::Rc;

use log::debug;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{ContentError, ResolveError};
use crate::node::{Child, Node, NodeKind, NodeType};
use crate::parser::Parser;
use crate::plugin::{ChildOptions, NodePlugin, Outcome, ParseOptions, Parsed};
use crate::resolver::ResolveContext;
use crate::services::{is_truthy, Services};

const KEY: &str = "template";

/// One text replacement applied to a serialized template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSubstitution {
    pub pattern: String,
    pub value: String,
}

/// The element a template copy is being made for
#[derive(Debug, Clone, Copy)]
pub struct TemplateItemInfo<'a> {
    pub index: usize,
    pub data: &'a Value,
    pub depth: usize,
}

type SubstitutionHook =
    Box<dyn Fn(Vec<TemplateSubstitution>, &TemplateItemInfo<'_>) -> Vec<TemplateSubstitution>>;

#[derive(Deserialize)]
struct TemplateEntry {
    data: String,
    output: String,
    value: Value,
    #[serde(default)]
    dynamic: bool,
}

pub struct TemplatePlugin {
    services: Services,
    substitutions: Vec<SubstitutionHook>,
}

impl TemplatePlugin {
    /// `services` supply the data for static templates at parse time
    pub fn new(services: Services) -> Self {
        Self {
            services,
            substitutions: Vec::new(),
        }
    }

    /// Adjust the substitutions made for each element. Hooks run in order,
    /// each receiving the previous hook's list.
    pub fn with_substitutions<F>(mut self, hook: F) -> Self
    where
        F: Fn(Vec<TemplateSubstitution>, &TemplateItemInfo<'_>) -> Vec<TemplateSubstitution> + 'static,
    {
        self.substitutions.push(Box::new(hook));
        self
    }

    /// Build the multi-node for a template. `None` when the data is missing.
    fn expand(
        &self,
        binding: &str,
        template: &Value,
        depth: usize,
        placeholder: &str,
        data: Value,
        mut parse: impl FnMut(&Value, &ParseOptions) -> Result<Option<Rc<Node>>, ContentError>,
    ) -> Result<Option<Rc<Node>>, ContentError> {
        if !is_truthy(&data) {
            return Ok(None);
        }
        let Value::Array(items) = data else {
            return Err(ContentError::TemplateNotArray {
                binding: binding.to_string(),
            });
        };

        let serialized = serde_json::to_string(template)?;
        let options = ParseOptions {
            template_depth: depth,
        }
        .nested();
        let mut values = Vec::with_capacity(items.len());

        for (index, item) in items.iter().enumerate() {
            let info = TemplateItemInfo {
                index,
                data: item,
                depth,
            };
            let base = vec![TemplateSubstitution {
                pattern: placeholder.to_string(),
                value: index.to_string(),
            }];
            let substitutions = self
                .substitutions
                .iter()
                .fold(base, |current, hook| hook(current, &info));

            let text = substitutions
                .iter()
                .fold(serialized.clone(), |text, s| text.replace(&s.pattern, &s.value));
            let stamped: Value = serde_json::from_str(&text)?;

            if let Some(node) = parse(&stamped, &options)? {
                values.push(node);
            }
        }

        debug!("template '{}' expanded to {} items", binding, values.len());
        let multi = Node::new(NodeKind::MultiNode {
            values,
            overrides: false,
        });
        multi.attach_children();
        Ok(Some(multi))
    }
}

impl NodePlugin for TemplatePlugin {
    fn name(&self) -> &str {
        "template"
    }

    fn determine_key_type(&self, key: &str) -> Option<NodeType> {
        (key == KEY).then_some(NodeType::Template)
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
        if determined != NodeType::Template {
            return Ok(Parsed::Pass);
        }
        let (Some(child), Value::Array(entries)) = (child, raw) else {
            return Ok(Parsed::Pass);
        };

        let mut children = Vec::with_capacity(entries.len());
        for entry in entries {
            let parsed: TemplateEntry = serde_json::from_value(entry.clone())
                .map_err(|err| ContentError::invalid_shape(KEY, err.to_string()))?;

            let mut path = child.path.to_vec();
            path.push(parsed.output.as_str().into());

            let kind = NodeKind::Template {
                data: parsed.data,
                template: parsed.value,
                depth: options.template_depth,
                dynamic: parsed.dynamic,
            };
            if let Some(node) = parser.create_node(kind, entry)? {
                children.push(Child { path, value: node });
            }
        }

        Ok(Parsed::Children(children))
    }

    fn on_create(
        &self,
        parser: &Parser,
        node: &Rc<Node>,
        _raw: &Value,
    ) -> Result<Outcome<Rc<Node>>, ContentError> {
        let NodeKind::Template {
            data,
            template,
            depth,
            dynamic: false,
        } = node.kind()
        else {
            return Ok(Outcome::Pass);
        };

        let binding = self.services.bindings.parse(data);
        let items = self.services.model.get(&binding);
        let placeholder = parser.config().index_placeholder_at(*depth);
        let expanded = self.expand(data, template, *depth, &placeholder, items, |raw, options| {
            parser.parse_object(raw, NodeType::Value, options)
        })?;

        Ok(expanded.map_or(Outcome::Drop, Outcome::Replace))
    }

    fn before_resolve(
        &self,
        node: &Rc<Node>,
        ctx: &ResolveContext<'_>,
    ) -> Result<Outcome<Rc<Node>>, ResolveError> {
        let NodeKind::Template {
            data,
            template,
            depth,
            dynamic: true,
        } = node.kind()
        else {
            return Ok(Outcome::Pass);
        };

        let items = ctx.get(data);
        let placeholder = ctx.config().index_placeholder_at(*depth);
        let expanded = self.expand(data, template, *depth, &placeholder, items, |raw, options| {
            ctx.parse(raw, options)
        })?;

        Ok(expanded.map_or(Outcome::Drop, Outcome::Replace))
    }
}

/// Whether `parent` has a template writing to `key`
pub(crate) fn has_template_values(parent: &Map<String, Value>, key: &str) -> bool {
    parent
        .get(KEY)
        .and_then(Value::as_array)
        .is_some_and(|entries| {
            entries
                .iter()
                .any(|entry| entry.get("output").and_then(Value::as_str) == Some(key))
        })
}
