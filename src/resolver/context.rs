use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use serde_json::Value;

use super::cache::Dependencies;
use super::ResolveOptions;
use crate::config::EngineConfig;
use crate::error::ContentError;
use crate::interpolate::Scope;
use crate::node::Node;
use crate::plugin::{ParseFn, ParseOptions};
use crate::runtime::{Runtime, SignalKey};
use crate::services::{Binding, DataModel};

/// Everything a plugin can reach while one node is being resolved
///
/// Data reads made through the context, including those an expression makes
/// through it, are recorded as dependencies of the node.
pub struct ResolveContext<'a> {
    options: &'a ResolveOptions,
    node: Rc<Node>,
    deps: RefCell<Dependencies>,
    visited: RefCell<HashSet<String>>,
}

impl<'a> ResolveContext<'a> {
    pub(crate) fn new(options: &'a ResolveOptions, node: &Rc<Node>) -> Self {
        Self {
            options,
            node: Rc::clone(node),
            deps: RefCell::new(Dependencies::default()),
            visited: RefCell::new(HashSet::new()),
        }
    }

    /// The node as it appeared in the tree, before any before-resolve replacement
    pub fn node(&self) -> &Rc<Node> {
        &self.node
    }

    pub fn parse_binding(&self, raw: &str) -> Binding {
        self.options.services.bindings.parse(raw)
    }

    /// Read a binding from the data model
    pub fn get(&self, raw: &str) -> Value {
        DataModel::get(self, &self.parse_binding(raw))
    }

    pub fn evaluate(&self, expression: &Value) -> Value {
        self.options.services.evaluator.evaluate(expression, self)
    }

    /// Parse content in value context
    pub fn parse(
        &self,
        raw: &Value,
        options: &ParseOptions,
    ) -> Result<Option<Rc<Node>>, ContentError> {
        (self.options.parse)(raw, options)
    }

    pub fn parse_fn(&self) -> &ParseFn {
        &self.options.parse
    }

    /// Make the node depend on the current version of `key`
    pub fn track_signal(&self, key: SignalKey) {
        let version = self.options.runtime.signals().version(&key);
        self.deps.borrow_mut().record_signal(key, version);
    }

    pub fn runtime(&self) -> &Rc<Runtime> {
        &self.options.runtime
    }

    pub fn config(&self) -> &EngineConfig {
        &self.options.config
    }

    /// True the first time it is called with `marker` for this node
    pub fn first_visit(&self, marker: &str) -> bool {
        self.visited.borrow_mut().insert(marker.to_string())
    }

    /// Interpolation scope whose reads are tracked by this context
    pub fn scope(&self) -> Scope<'_> {
        Scope {
            model: self,
            evaluator: self.options.services.evaluator.as_ref(),
            bindings: self.options.services.bindings.as_ref(),
        }
    }

    pub(crate) fn into_dependencies(self) -> Dependencies {
        self.deps.into_inner()
    }
}

impl DataModel for ResolveContext<'_> {
    fn get(&self, binding: &Binding) -> Value {
        let value = self.options.services.model.get(binding);
        self.deps.borrow_mut().record_binding(binding, &value);
        value
    }
}
