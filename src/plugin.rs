//! The extension surface shared by the parser and the resolver
//!
//! Every built-in node behavior is a [`NodePlugin`]. Plugins run in
//! registration order. Hooks that classify or parse stop at the first plugin
//! that answers; hooks that transform feed each plugin's output into the next.

use std::collections::HashSet;
use std::rc::Rc;

use serde_json::{Map, Value};

use crate::error::{ContentError, ResolveError};
use crate::node::{Child, Node, NodeType, PathSegment};
use crate::parser::Parser;
use crate::resolver::ResolveContext;
use crate::runtime::Runtime;

/// Ordered list of plugins one view runs with
pub type Plugins = Rc<[Rc<dyn NodePlugin>]>;

/// Re-entry into the parser from resolve-time code
pub type ParseFn = Rc<dyn Fn(&Value, &ParseOptions) -> Result<Option<Rc<Node>>, ContentError>>;

/// Result of a waterfall hook
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// Keep the current value
    Pass,
    /// Continue with this value instead
    Replace(T),
    /// Produce nothing
    Drop,
}

/// Result of the parse-node hook
#[derive(Debug)]
pub enum Parsed {
    /// Not handled by this plugin
    Pass,
    Node(Rc<Node>),
    /// Children to attach to the enclosing object
    Children(Vec<Child>),
    /// Handled, and produces nothing
    Nothing,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// How many templates enclose the content being parsed
    pub template_depth: usize,
}

impl ParseOptions {
    pub fn nested(&self) -> Self {
        Self {
            template_depth: self.template_depth + 1,
        }
    }
}

/// Where a property being parsed sits inside its object
#[derive(Debug, Clone, Copy)]
pub struct ChildOptions<'a> {
    pub parent: &'a Map<String, Value>,
    pub key: &'a str,
    /// Path of the enclosing object within the node being built
    pub path: &'a [PathSegment],
}

impl ChildOptions<'_> {
    /// Path of the property itself
    pub fn key_path(&self) -> Vec<PathSegment> {
        let mut path = self.path.to_vec();
        path.push(PathSegment::Key(self.key.to_string()));
        path
    }
}

#[allow(unused_variables)]
pub trait NodePlugin {
    fn name(&self) -> &str;

    /// Classify an object or array
    fn determine_type(&self, raw: &Value) -> Option<NodeType> {
        None
    }

    /// Classify a property by its key alone
    fn determine_key_type(&self, key: &str) -> Option<NodeType> {
        None
    }

    /// Build a node for content classified as `determined`
    fn parse_node(
        &self,
        parser: &Parser,
        raw: &Value,
        context: NodeType,
        options: &ParseOptions,
        determined: NodeType,
        child: Option<&ChildOptions<'_>>,
    ) -> Result<Parsed, ContentError> {
        Ok(Parsed::Pass)
    }

    /// Inspect or replace a freshly built node
    fn on_create(
        &self,
        parser: &Parser,
        node: &Rc<Node>,
        raw: &Value,
    ) -> Result<Outcome<Rc<Node>>, ContentError> {
        Ok(Outcome::Pass)
    }

    /// Swap a node for another before it is resolved. Replacing the node
    /// restarts the pipeline with the replacement.
    fn before_resolve(
        &self,
        node: &Rc<Node>,
        ctx: &ResolveContext<'_>,
    ) -> Result<Outcome<Rc<Node>>, ResolveError> {
        Ok(Outcome::Pass)
    }

    /// Rewrite a node's own raw value, before its children are spliced in
    fn resolve(
        &self,
        value: &Value,
        node: &Rc<Node>,
        ctx: &ResolveContext<'_>,
    ) -> Result<Outcome<Value>, ResolveError> {
        Ok(Outcome::Pass)
    }

    /// Rewrite a node's fully resolved value
    fn after_resolve(
        &self,
        value: &Value,
        node: &Rc<Node>,
        ctx: &ResolveContext<'_>,
    ) -> Result<Outcome<Value>, ResolveError> {
        Ok(Outcome::Pass)
    }

    /// Called after every resolve pass with the ids of all assets and views
    /// present in the output
    fn after_update(&self, live_ids: &HashSet<String>, runtime: &Runtime) {}
}
