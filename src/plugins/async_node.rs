//! Deferred content
//!
//! An object marked `"async": true` is a placeholder identified by its `id`.
//! The first time the resolver reaches it, the slot resolves to nothing and
//! the host's [`AsyncHandler`] is called from a deferred task. The handler
//! answers through an [`AsyncUpdater`], now or later. Each answer is parsed,
//! cached under the id, and triggers a new resolve pass that shows it.
//!
//! A list answer for a placeholder marked `"flatten": true` inside an array is
//! spliced into that array instead of being nested in it.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::{Rc, Weak};

use log::{debug, warn};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::{ContentError, ResolveError};
use crate::node::{Node, NodeKind, NodeType, ValueHook};
use crate::parser::Parser;
use crate::plugin::{ChildOptions, NodePlugin, Outcome, ParseFn, ParseOptions, Parsed};
use crate::resolver::ResolveContext;
use crate::runtime::{Runtime, SignalKey};

const ASYNC_KEY: &str = "async";
const FLATTEN_KEY: &str = "flatten";

/// Failure reported by an [`AsyncHandler`]
#[derive(Debug, Error)]
pub enum AsyncError {
    #[error("async content for '{id}' failed: {reason}")]
    Failed { id: String, reason: String },

    #[error("async content is invalid: {0}")]
    Content(#[from] ContentError),
}

impl AsyncError {
    pub fn failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        AsyncError::Failed {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

/// A placeholder waiting for content
#[derive(Debug, Clone)]
pub struct AsyncNode {
    pub id: String,
    pub flatten: bool,
    /// The parsed placeholder
    pub node: Rc<Node>,
}

/// Host side of async content
pub trait AsyncHandler {
    /// Provide content for `node`, now or later, through `updater`
    fn on_async_node(&self, node: &AsyncNode, updater: AsyncUpdater) -> Result<(), AsyncError>;

    /// Fallback content after `on_async_node` failed. `None` leaves the slot
    /// as it was.
    fn on_error(&self, node: &AsyncNode, error: &AsyncError) -> Option<Value> {
        let _ = (node, error);
        None
    }
}

impl<F> AsyncHandler for F
where
    F: Fn(&AsyncNode, AsyncUpdater) -> Result<(), AsyncError>,
{
    fn on_async_node(&self, node: &AsyncNode, updater: AsyncUpdater) -> Result<(), AsyncError> {
        self(node, updater)
    }
}

/// Replacement content per async id, kept for the life of one content load
#[derive(Debug, Default)]
pub struct AsyncCache {
    resolved: RefCell<HashMap<String, Option<Rc<Node>>>>,
    in_progress: RefCell<HashSet<String>>,
}

impl AsyncCache {
    /// `None` when no answer arrived yet, `Some(None)` when it was cleared
    pub fn get(&self, id: &str) -> Option<Option<Rc<Node>>> {
        self.resolved.borrow().get(id).cloned()
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.in_progress.borrow().contains(id)
    }

    fn start(&self, id: &str) -> bool {
        self.in_progress.borrow_mut().insert(id.to_string())
    }

    fn store(&self, id: &str, node: Option<Rc<Node>>) {
        self.in_progress.borrow_mut().remove(id);
        self.resolved.borrow_mut().insert(id.to_string(), node);
    }
}

/// Delivers content for one async id
///
/// Updaters only hold weak references, so one outliving its content load does
/// nothing.
#[derive(Clone)]
pub struct AsyncUpdater {
    id: String,
    placeholder: Weak<Node>,
    on_value: Option<ValueHook>,
    runtime: Weak<Runtime>,
    parse: Weak<dyn Fn(&Value, &ParseOptions) -> Result<Option<Rc<Node>>, ContentError>>,
}

impl AsyncUpdater {
    fn new(id: &str, placeholder: &Rc<Node>, runtime: &Rc<Runtime>, parse: &ParseFn) -> Self {
        let on_value = match placeholder.kind() {
            NodeKind::Async { on_value, .. } => on_value.clone(),
            _ => None,
        };
        Self {
            id: id.to_string(),
            placeholder: Rc::downgrade(placeholder),
            on_value,
            runtime: Rc::downgrade(runtime),
            parse: Rc::downgrade(parse),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Replace the slot's content. `None`, `null` and content that parses to
    /// nothing (such as `[]` or `{}`) settle it empty.
    pub fn update(&self, content: Option<Value>) -> Result<(), ContentError> {
        let (Some(runtime), Some(parse)) = (self.runtime.upgrade(), self.parse.upgrade()) else {
            debug!("ignoring async update for '{}' from a previous load", self.id);
            return Ok(());
        };

        let node = match content {
            None | Some(Value::Null) => None,
            Some(raw) => parse(&raw, &ParseOptions::default())?,
        };
        let node = match (node, &self.on_value) {
            (Some(node), Some(hook)) => Some(hook.apply(node)),
            (node, _) => node,
        };
        if let (Some(node), Some(placeholder)) = (&node, self.placeholder.upgrade()) {
            Node::adopt(&placeholder, node);
        }

        runtime.async_nodes().store(&self.id, node);
        runtime.signals().bump(SignalKey::Async(self.id.clone()));
        runtime.scheduler().request_update();
        Ok(())
    }
}

impl fmt::Debug for AsyncUpdater {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncUpdater")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

pub struct AsyncNodePlugin {
    handler: Rc<dyn AsyncHandler>,
}

impl AsyncNodePlugin {
    pub fn new(handler: impl AsyncHandler + 'static) -> Self {
        Self {
            handler: Rc::new(handler),
        }
    }

    fn request(&self, node: &Rc<Node>, id: &str, flatten: bool, ctx: &ResolveContext<'_>) {
        let runtime = ctx.runtime();
        if !runtime.async_nodes().start(id) {
            return;
        }

        let request = AsyncNode {
            id: id.to_string(),
            flatten,
            node: Rc::clone(node),
        };
        let updater = AsyncUpdater::new(id, node, runtime, ctx.parse_fn());
        let handler = Rc::clone(&self.handler);

        debug!("requesting async content for '{}'", id);
        runtime.scheduler().defer(move || {
            let Err(err) = handler.on_async_node(&request, updater.clone()) else {
                return;
            };
            warn!("{}", err);
            if let Some(fallback) = handler.on_error(&request, &err) {
                if let Err(err) = updater.update(Some(fallback)) {
                    warn!("fallback content for '{}' is invalid: {}", request.id, err);
                }
            }
        });
    }

    /// Splice cached list answers of flattening placeholders into `values`.
    /// `None` when nothing changed.
    fn splice(values: &[Rc<Node>], ctx: &ResolveContext<'_>) -> Option<Vec<Rc<Node>>> {
        let cache = ctx.runtime().async_nodes();
        let mut changed = false;
        let mut spliced = Vec::with_capacity(values.len());

        for value in values {
            if let NodeKind::Async {
                id, flatten: true, ..
            } = value.kind()
            {
                ctx.track_signal(SignalKey::Async(id.clone()));
                match cache.get(id) {
                    Some(Some(replacement)) => {
                        changed = true;
                        match replacement.kind() {
                            NodeKind::MultiNode { values: inner, .. } => {
                                spliced.extend(inner.iter().cloned())
                            }
                            _ => spliced.push(replacement),
                        }
                        continue;
                    }
                    Some(None) => {
                        changed = true;
                        continue;
                    }
                    None => {}
                }
            }
            spliced.push(Rc::clone(value));
        }

        changed.then_some(spliced)
    }
}

impl NodePlugin for AsyncNodePlugin {
    fn name(&self) -> &str {
        "async-node"
    }

    fn determine_type(&self, raw: &Value) -> Option<NodeType> {
        (raw.get(ASYNC_KEY) == Some(&Value::Bool(true))).then_some(NodeType::Async)
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
        if determined != NodeType::Async {
            return Ok(Parsed::Pass);
        }
        let Some(map) = raw.as_object() else {
            return Ok(Parsed::Pass);
        };

        let flatten = map.get(FLATTEN_KEY) == Some(&Value::Bool(true));
        let rest: Map<String, Value> = map
            .iter()
            .filter(|(key, _)| !matches!(key.as_str(), ASYNC_KEY | FLATTEN_KEY))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let Some(placeholder) = parser.parse_object(&Value::Object(rest), context, options)? else {
            return Ok(Parsed::Nothing);
        };
        let id = placeholder
            .value_node()
            .and_then(|v| v.value.as_ref())
            .and_then(|v| v.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let Some(id) = id else {
            warn!("async content without an id is ignored");
            return Ok(Parsed::Nothing);
        };

        let node = parser.create_node(
            NodeKind::Async {
                id,
                flatten,
                value: placeholder,
                on_value: None,
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
        match node.kind() {
            NodeKind::Async { id, flatten, .. } => {
                ctx.track_signal(SignalKey::Async(id.clone()));
                match ctx.runtime().async_nodes().get(id) {
                    Some(Some(replacement)) => Ok(Outcome::Replace(replacement)),
                    Some(None) => Ok(Outcome::Drop),
                    None => {
                        self.request(node, id, *flatten, ctx);
                        Ok(Outcome::Pass)
                    }
                }
            }
            NodeKind::MultiNode { values, overrides } => {
                Ok(match Self::splice(values, ctx) {
                    Some(values) => Outcome::Replace(Node::new(NodeKind::MultiNode {
                        values,
                        overrides: *overrides,
                    })),
                    None => Outcome::Pass,
                })
            }
            _ => Ok(Outcome::Pass),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::node::{builder, PathSegment};
    use crate::plugin::Plugins;
    use serde_json::json;

    fn parser() -> Rc<Parser> {
        let handler = |_: &AsyncNode, _: AsyncUpdater| -> Result<(), AsyncError> { Ok(()) };
        let plugins: Vec<Rc<dyn NodePlugin>> = vec![Rc::new(AsyncNodePlugin::new(handler))];
        let plugins: Plugins = plugins.into();
        Rc::new(Parser::new(plugins, Rc::new(EngineConfig::default())))
    }

    #[test]
    fn test_placeholder_takes_id_from_content() {
        let view = parser()
            .parse(&json!({
                "id": "v",
                "slot": {"async": true, "flatten": true, "id": "later", "type": "chat"}
            }))
            .expect("Should parse");

        let slot = &view.value_node().expect("Should be a value node").children[0];
        match slot.value.kind() {
            NodeKind::Async {
                id, flatten, value, ..
            } => {
                assert_eq!(id, "later");
                assert!(*flatten);
                assert_eq!(
                    value.value_node().and_then(|v| v.value.clone()),
                    Some(json!({"id": "later", "type": "chat"}))
                );
            }
            other => panic!("expected async, got {:?}", other),
        }
    }

    #[test]
    fn test_placeholder_without_id_is_dropped() {
        let view = parser()
            .parse(&json!({"id": "v", "slot": {"async": true, "type": "chat"}}))
            .expect("Should parse");
        assert!(view
            .value_node()
            .expect("Should be a value node")
            .children
            .is_empty());
    }

    #[test]
    fn test_updater_from_previous_load_is_ignored() {
        let parser = parser();
        let placeholder = Node::new(NodeKind::Empty);
        let runtime = Runtime::new();
        let parse_parser = Rc::clone(&parser);
        let parse: ParseFn = Rc::new(move |raw: &Value, options: &ParseOptions| {
            parse_parser.parse_object(raw, NodeType::Value, options)
        });

        let updater = AsyncUpdater::new("later", &placeholder, &runtime, &parse);
        updater
            .update(Some(json!({"text": "hi"})))
            .expect("Should accept content");
        assert!(matches!(runtime.async_nodes().get("later"), Some(Some(_))));
        assert!(runtime.scheduler().take_update_request());

        drop(parse);
        updater
            .update(Some(json!({"text": "again"})))
            .expect("Should ignore stale update");
        assert!(!runtime.scheduler().take_update_request());
    }

    #[test]
    fn test_answers_pass_through_value_hook() {
        let parser = parser();
        let runtime = Runtime::new();
        let parse_parser = Rc::clone(&parser);
        let parse: ParseFn = Rc::new(move |raw: &Value, options: &ParseOptions| {
            parse_parser.parse_object(raw, NodeType::Value, options)
        });
        let placeholder = builder::async_node(
            "wrapped",
            false,
            Some(ValueHook::new(builder::asset_wrapper)),
        );

        let updater = AsyncUpdater::new("wrapped", &placeholder, &runtime, &parse);
        updater
            .update(Some(json!({"id": "a", "type": "text"})))
            .expect("Should accept content");

        let Some(Some(answer)) = runtime.async_nodes().get("wrapped") else {
            panic!("expected a stored answer");
        };
        let payload = answer.value_node().expect("Should be a value node");
        assert_eq!(payload.children[0].path, vec![PathSegment::from("asset")]);

        updater.update(Some(json!([]))).expect("Should clear content");
        assert!(matches!(runtime.async_nodes().get("wrapped"), Some(None)));
    }

    #[test]
    fn test_cache_states() {
        let cache = AsyncCache::default();
        assert!(cache.get("a").is_none());
        assert!(cache.start("a"));
        assert!(!cache.start("a"));
        assert!(cache.is_pending("a"));

        cache.store("a", None);
        assert!(!cache.is_pending("a"));
        assert!(matches!(cache.get("a"), Some(None)));
    }
}
