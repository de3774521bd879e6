//! Marker substitution in resolved strings
//!
//! Runs on the own value of every value, asset and view node. Properties in
//! the enclosing asset's skip set are left as written, including whole value
//! nodes that sit below a skipped property. An asset or view placed below one
//! of its own skipped properties is left as written too.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use serde_json::Value;

use crate::error::ResolveError;
use crate::interpolate::resolve_all;
use crate::node::{Node, NodeType, PathSegment};
use crate::plugin::{NodePlugin, Outcome};
use crate::resolver::ResolveContext;

/// Skip sets of the assets and views seen so far, by id
#[derive(Debug, Default)]
pub struct SkipSets {
    by_id: RefCell<HashMap<String, Rc<HashSet<String>>>>,
}

impl SkipSets {
    pub fn get(&self, id: &str) -> Option<Rc<HashSet<String>>> {
        self.by_id.borrow().get(id).cloned()
    }

    fn insert(&self, id: &str, skip: Rc<HashSet<String>>) {
        self.by_id.borrow_mut().insert(id.to_string(), skip);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StringResolverPlugin;

impl StringResolverPlugin {
    /// The node's own skip list, or the configured default
    fn own_skip_set(node: &Node, ctx: &ResolveContext<'_>) -> Rc<HashSet<String>> {
        let listed = node
            .value_node()
            .and_then(|v| v.properties_to_skip.as_ref())
            .unwrap_or(&ctx.config().properties_to_skip);
        Rc::new(listed.iter().cloned().collect())
    }

    /// Nearest enclosing asset or view, with the path from it down to `node`
    fn enclosing_asset(node: &Rc<Node>) -> Option<(Rc<Node>, Vec<PathSegment>)> {
        let mut segments: Vec<PathSegment> = Vec::new();
        let mut current = Rc::clone(node);

        for parent in node.ancestors() {
            match parent.path_of(&current) {
                Some(path) => {
                    let mut prefixed = path.to_vec();
                    prefixed.append(&mut segments);
                    segments = prefixed;
                }
                // `current` replaced `parent` before resolving and stands in its place
                None if parent.value_node().is_some() => {
                    current = parent;
                    continue;
                }
                None => {}
            }
            if matches!(parent.node_type(), NodeType::Asset | NodeType::View) {
                return Some((parent, segments));
            }
            current = parent;
        }
        None
    }

    fn is_skipped(path: &[PathSegment], skip: &HashSet<String>) -> bool {
        path.iter()
            .filter_map(PathSegment::as_key)
            .any(|key| skip.contains(key))
    }
}

impl NodePlugin for StringResolverPlugin {
    fn name(&self) -> &str {
        "string-resolver"
    }

    fn resolve(
        &self,
        value: &Value,
        node: &Rc<Node>,
        ctx: &ResolveContext<'_>,
    ) -> Result<Outcome<Value>, ResolveError> {
        let skip = match node.node_type() {
            NodeType::Asset | NodeType::View => {
                let skip = Self::own_skip_set(node, ctx);
                if let Some(id) = node.node_id() {
                    ctx.runtime().skip_sets().insert(id, Rc::clone(&skip));
                }
                if let Some((_, path)) = Self::enclosing_asset(node) {
                    if Self::is_skipped(&path, &skip) {
                        return Ok(Outcome::Pass);
                    }
                }
                skip
            }
            NodeType::Value => match Self::enclosing_asset(node) {
                Some((asset, path)) => {
                    let skip = asset
                        .node_id()
                        .and_then(|id| ctx.runtime().skip_sets().get(id))
                        .unwrap_or_else(|| Self::own_skip_set(&asset, ctx));
                    if Self::is_skipped(&path, &skip) {
                        return Ok(Outcome::Pass);
                    }
                    skip
                }
                None => Rc::new(ctx.config().properties_to_skip.iter().cloned().collect()),
            },
            _ => return Ok(Outcome::Pass),
        };

        Ok(Outcome::Replace(resolve_all(value, &skip, &ctx.scope())))
    }
}
