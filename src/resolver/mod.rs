//! Resolver from a node tree to plain output
//!
//! A pass walks the tree depth-first. Each node goes through the
//! before-resolve pipeline (which may swap it for another node, restarting
//! the pipeline), then its own value goes through the resolve pipeline, its
//! children are resolved and spliced in at their paths, and the result goes
//! through the after-resolve pipeline.
//!
//! Results are cached per node together with the data bindings and signals
//! they were computed from. A node whose dependencies are unchanged is not
//! recomputed and hands back the same `Rc` as the previous pass.

mod cache;
mod context;

pub use cache::Dependencies;
pub use context::ResolveContext;

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use log::{debug, trace};
use serde_json::Value;

use crate::config::EngineConfig;
use crate::error::ResolveError;
use crate::node::{append_in, set_in, Node, NodeKind, NodeType};
use crate::plugin::{Outcome, ParseFn, Plugins};
use crate::runtime::Runtime;
use crate::services::Services;
use cache::{key_of, CacheEntry, NodeKey};

/// What a resolver needs besides the tree itself
#[derive(Clone)]
pub struct ResolveOptions {
    pub plugins: Plugins,
    pub services: Services,
    pub runtime: Rc<Runtime>,
    /// Parser re-entry for content produced mid-resolve
    pub parse: ParseFn,
    pub config: Rc<EngineConfig>,
}

/// One node's resolution within a pass
#[derive(Clone)]
struct Computed {
    resolved: Rc<Node>,
    value: Option<Rc<Value>>,
    deps: Rc<Dependencies>,
}

impl CacheEntry {
    fn computed(&self) -> Computed {
        Computed {
            resolved: Rc::clone(&self.resolved),
            value: self.value.clone(),
            deps: Rc::clone(&self.deps),
        }
    }
}

/// Cache state for one pass: entries from the previous pass are moved into
/// `next` as they are reused or recomputed. Whatever is left in `prev` at the
/// end was not reached and is dropped.
struct Pass {
    prev: HashMap<NodeKey, CacheEntry>,
    next: HashMap<NodeKey, CacheEntry>,
    live_ids: HashSet<String>,
    reused: usize,
    computed: usize,
}

pub struct Resolver {
    root: Rc<Node>,
    options: ResolveOptions,
    cache: HashMap<NodeKey, CacheEntry>,
}

impl Resolver {
    pub fn new(root: Rc<Node>, options: ResolveOptions) -> Self {
        Self {
            root,
            options,
            cache: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Rc<Node> {
        &self.root
    }

    pub fn options(&self) -> &ResolveOptions {
        &self.options
    }

    /// Resolve the whole tree against the current data
    pub fn update(&mut self) -> Result<Option<Rc<Value>>, ResolveError> {
        let mut pass = Pass {
            prev: std::mem::take(&mut self.cache),
            next: HashMap::new(),
            live_ids: HashSet::new(),
            reused: 0,
            computed: 0,
        };

        let root = Rc::clone(&self.root);
        let computed = self.compute(&mut pass, &root)?;

        debug!(
            "resolve pass: {} nodes computed, {} reused, {} dropped",
            pass.computed,
            pass.reused,
            pass.prev.len()
        );
        self.cache = pass.next;

        for plugin in self.options.plugins.iter() {
            plugin.after_update(&pass.live_ids, &self.options.runtime);
        }

        Ok(computed.value)
    }

    fn compute(&self, pass: &mut Pass, node: &Rc<Node>) -> Result<Computed, ResolveError> {
        let key = key_of(node);
        if let Some(entry) = pass.next.get(&key) {
            return Ok(entry.computed());
        }

        let mut previous_value = None;
        if let Some(entry) = pass.prev.remove(&key) {
            let current = entry.deps.is_current(
                self.options.services.model.as_ref(),
                self.options.runtime.signals(),
            );
            if current {
                trace!("reusing cached {} node", entry.resolved.node_type());
                let computed = entry.computed();
                self.carry_over(pass, entry);
                return Ok(computed);
            }
            previous_value = entry.value.clone();
        }

        pass.computed += 1;
        let ctx = ResolveContext::new(&self.options, node);
        let resolved = self.before_resolve(node, &ctx)?;

        let mut children = Vec::new();
        let mut child_deps = Vec::new();
        let value = self.resolve_node(pass, &resolved, &ctx, &mut children, &mut child_deps)?;

        let mut deps = ctx.into_dependencies();
        for child in &child_deps {
            deps.extend(child);
        }

        if let Some(id) = resolved.node_id() {
            pass.live_ids.insert(id.to_string());
        }

        let value = value.map(|value| match previous_value {
            Some(previous) if *previous == value => previous,
            _ => Rc::new(value),
        });

        let entry = CacheEntry {
            node: Rc::clone(node),
            resolved,
            value,
            deps: Rc::new(deps),
            children,
        };
        let computed = entry.computed();
        pass.next.insert(key, entry);
        Ok(computed)
    }

    /// Move a reused entry and everything below it into the next cache
    fn carry_over(&self, pass: &mut Pass, entry: CacheEntry) {
        pass.reused += 1;
        for child in &entry.children {
            if let Some(child_entry) = pass.prev.remove(child) {
                self.carry_over(pass, child_entry);
            }
        }
        if let Some(id) = entry.resolved.node_id() {
            pass.live_ids.insert(id.to_string());
        }
        pass.next.insert(key_of(&entry.node), entry);
    }

    fn before_resolve(
        &self,
        node: &Rc<Node>,
        ctx: &ResolveContext<'_>,
    ) -> Result<Rc<Node>, ResolveError> {
        let limit = self.options.config.max_before_resolve_rounds;
        let mut current = Rc::clone(node);
        let mut rounds = 0;

        'restart: loop {
            for plugin in self.options.plugins.iter() {
                match plugin.before_resolve(&current, ctx)? {
                    Outcome::Pass => {}
                    Outcome::Drop => return Ok(Node::new(NodeKind::Empty)),
                    Outcome::Replace(next) => {
                        if Rc::ptr_eq(&next, &current) {
                            continue;
                        }
                        Node::adopt(&current, &next);
                        current = next;
                        rounds += 1;
                        if rounds > limit {
                            return Err(ResolveError::Unsettled {
                                node_type: current.node_type(),
                                rounds,
                            });
                        }
                        continue 'restart;
                    }
                }
            }
            return Ok(current);
        }
    }

    fn resolve_node(
        &self,
        pass: &mut Pass,
        node: &Rc<Node>,
        ctx: &ResolveContext<'_>,
        children: &mut Vec<NodeKey>,
        child_deps: &mut Vec<Rc<Dependencies>>,
    ) -> Result<Option<Value>, ResolveError> {
        let resolved = match node.kind() {
            NodeKind::MultiNode { values, .. } => {
                let mut items = Vec::with_capacity(values.len());
                for value in values {
                    let computed = self.compute(pass, value)?;
                    children.push(key_of(value));
                    child_deps.push(computed.deps);
                    if let Some(item) = computed.value.filter(|v| !v.is_null()) {
                        items.push((*item).clone());
                    }
                }
                Value::Array(items)
            }
            NodeKind::Value(payload) | NodeKind::Asset(payload) | NodeKind::View(payload) => {
                let mut output = match &payload.value {
                    Some(raw) => match self.run_resolve(raw, node, ctx)? {
                        Some(value) => value,
                        None => return Ok(None),
                    },
                    None => Value::Null,
                };

                for child in &payload.children {
                    let computed = self.compute(pass, &child.value)?;
                    children.push(key_of(&child.value));
                    child_deps.push(computed.deps);

                    let Some(value) = computed.value.filter(|v| !v.is_null()) else {
                        continue;
                    };
                    match (computed.resolved.kind(), value.as_ref()) {
                        (NodeKind::MultiNode { overrides: false, .. }, Value::Array(items)) => {
                            append_in(&mut output, &child.path, items.clone());
                        }
                        _ => set_in(&mut output, &child.path, (*value).clone()),
                    }
                }

                if payload.value.is_none() && output.is_null() {
                    return Ok(None);
                }
                output
            }
            NodeKind::Switch { .. }
            | NodeKind::Template { .. }
            | NodeKind::Applicability { .. }
            | NodeKind::Async { .. } => {
                if node.node_type() != NodeType::Async {
                    debug!("no plugin resolved {} node", node.node_type());
                }
                return Ok(None);
            }
            NodeKind::Unknown | NodeKind::Empty => return Ok(None),
        };

        self.run_after_resolve(resolved, node, ctx)
    }

    fn run_resolve(
        &self,
        raw: &Value,
        node: &Rc<Node>,
        ctx: &ResolveContext<'_>,
    ) -> Result<Option<Value>, ResolveError> {
        let mut current = raw.clone();
        for plugin in self.options.plugins.iter() {
            match plugin.resolve(&current, node, ctx)? {
                Outcome::Pass => {}
                Outcome::Replace(next) => current = next,
                Outcome::Drop => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    fn run_after_resolve(
        &self,
        value: Value,
        node: &Rc<Node>,
        ctx: &ResolveContext<'_>,
    ) -> Result<Option<Value>, ResolveError> {
        let mut current = value;
        for plugin in self.options.plugins.iter() {
            match plugin.after_resolve(&current, node, ctx)? {
                Outcome::Pass => {}
                Outcome::Replace(next) => current = next,
                Outcome::Drop => return Ok(None),
            }
        }
        Ok(Some(current))
    }
}
