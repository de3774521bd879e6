//! Asset transforms
//!
//! A transform enriches assets of a given shape. Its `before_resolve` step
//! may rewrite the asset node before generic resolution (for instance to set
//! which properties string interpolation skips), and its `resolve` step
//! augments the fully resolved value. Transforms can keep state per asset,
//! share state across assets, and bind callbacks that the host dispatches
//! through [`crate::View::dispatch`].
//!
//! A failing transform is logged and skipped; the asset keeps its
//! untransformed value.

mod registry;
mod store;

pub use registry::TransformRegistry;
pub use store::{ActionRegistry, Step, TransformStore};

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use log::warn;
use serde_json::Value;
use thiserror::Error;

use crate::error::ResolveError;
use crate::node::{Node, NodeType};
use crate::plugin::{NodePlugin, Outcome};
use crate::resolver::ResolveContext;
use crate::runtime::{Runtime, SignalKey};
use store::Slot;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl TransformError {
    pub fn failed(reason: impl Into<String>) -> Self {
        TransformError::Failed(reason.into())
    }
}

type BeforeResolveFn = Box<dyn Fn(&Rc<Node>, &TransformState<'_>) -> Result<Rc<Node>, TransformError>>;
type ResolveFn = Box<dyn Fn(Value, &TransformState<'_>) -> Result<Value, TransformError>>;

/// The hooks registered for one asset shape
#[derive(Default)]
pub struct Transform {
    name: Option<String>,
    before_resolve: Option<BeforeResolveFn>,
    resolve: Option<ResolveFn>,
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name used when reporting failures
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_before_resolve<F>(mut self, step: F) -> Self
    where
        F: Fn(&Rc<Node>, &TransformState<'_>) -> Result<Rc<Node>, TransformError> + 'static,
    {
        self.before_resolve = Some(Box::new(step));
        self
    }

    pub fn with_resolve<F>(mut self, step: F) -> Self
    where
        F: Fn(Value, &TransformState<'_>) -> Result<Value, TransformError> + 'static,
    {
        self.resolve = Some(Box::new(step));
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl<F> From<F> for Transform
where
    F: Fn(Value, &TransformState<'_>) -> Result<Value, TransformError> + 'static,
{
    fn from(step: F) -> Self {
        Transform::new().with_resolve(step)
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transform")
            .field("name", &self.name)
            .field("before_resolve", &self.before_resolve.is_some())
            .field("resolve", &self.resolve.is_some())
            .finish()
    }
}

/// What a transform step can reach for the asset it runs on
pub struct TransformState<'a> {
    id: String,
    step: Step,
    ctx: &'a ResolveContext<'a>,
    next_slot: Cell<usize>,
}

impl<'a> TransformState<'a> {
    fn new(id: &str, step: Step, ctx: &'a ResolveContext<'a>) -> Self {
        Self {
            id: id.to_string(),
            step,
            ctx,
            next_slot: Cell::new(0),
        }
    }

    /// Id of the asset being transformed
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Read a binding, making the asset depend on it
    pub fn get(&self, binding: &str) -> Value {
        self.ctx.get(binding)
    }

    pub fn evaluate(&self, expression: &Value) -> Value {
        self.ctx.evaluate(expression)
    }

    /// State local to this asset and step. Calls are matched to slots by
    /// order, so a transform must make them in the same order every time.
    pub fn use_local<T: Clone + 'static>(&self, init: impl FnOnce() -> T) -> (T, StateSetter<T>) {
        let index = self.next_slot.get();
        self.next_slot.set(index + 1);

        let slot = self
            .ctx
            .runtime()
            .transforms()
            .local(&self.id, self.step, index);
        self.read_slot(slot, SignalKey::State(self.id.clone()), init)
    }

    /// State shared by every transform under `key`
    pub fn use_shared<T: Clone + 'static>(
        &self,
        key: &str,
        init: impl FnOnce() -> T,
    ) -> (T, StateSetter<T>) {
        let slot = self.ctx.runtime().transforms().shared(key);
        self.read_slot(slot, SignalKey::Shared(key.to_string()), init)
    }

    /// Register `callback` for this asset and return the reference to put in
    /// its output
    pub fn bind_action(&self, name: &str, callback: impl Fn(&Value) + 'static) -> String {
        self.ctx
            .runtime()
            .actions()
            .register(&self.id, name, Rc::new(callback))
    }

    fn read_slot<T: Clone + 'static>(
        &self,
        slot: Slot,
        signal: SignalKey,
        init: impl FnOnce() -> T,
    ) -> (T, StateSetter<T>) {
        self.ctx.track_signal(signal.clone());

        let existing = slot.borrow().downcast_ref::<T>().cloned();
        let value = match existing {
            Some(value) => value,
            None => {
                let value = init();
                *slot.borrow_mut() = Box::new(value.clone());
                value
            }
        };

        let setter = StateSetter {
            slot: Rc::downgrade(&slot),
            signal,
            runtime: Rc::downgrade(self.ctx.runtime()),
            _marker: PhantomData,
        };
        (value, setter)
    }
}

/// Writes one piece of transform state and schedules a new resolve pass
pub struct StateSetter<T> {
    slot: Weak<RefCell<Box<dyn Any>>>,
    signal: SignalKey,
    runtime: Weak<Runtime>,
    _marker: PhantomData<fn(T)>,
}

impl<T: 'static> StateSetter<T> {
    pub fn set(&self, value: T) {
        let (Some(slot), Some(runtime)) = (self.slot.upgrade(), self.runtime.upgrade()) else {
            return;
        };
        *slot.borrow_mut() = Box::new(value);
        runtime.signals().bump(self.signal.clone());
        runtime.scheduler().request_update();
    }
}

impl<T> Clone for StateSetter<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Weak::clone(&self.slot),
            signal: self.signal.clone(),
            runtime: Weak::clone(&self.runtime),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for StateSetter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSetter")
            .field("signal", &self.signal)
            .finish_non_exhaustive()
    }
}

/// Runs a [`TransformRegistry`] over every asset and view with an id
pub struct AssetTransformPlugin {
    registry: TransformRegistry,
}

impl AssetTransformPlugin {
    pub fn new(registry: TransformRegistry) -> Self {
        Self { registry }
    }

    fn label(transform: &Transform, id: &str) -> String {
        match transform.name() {
            Some(name) => format!("transform '{}' on '{}'", name, id),
            None => format!("transform on '{}'", id),
        }
    }
}

impl NodePlugin for AssetTransformPlugin {
    fn name(&self) -> &str {
        "asset-transform"
    }

    fn before_resolve(
        &self,
        node: &Rc<Node>,
        ctx: &ResolveContext<'_>,
    ) -> Result<Outcome<Rc<Node>>, ResolveError> {
        if !matches!(node.node_type(), NodeType::Asset | NodeType::View) {
            return Ok(Outcome::Pass);
        }
        let raw = node.value_node().and_then(|v| v.value.as_ref());
        let (Some(id), Some(raw)) = (node.node_id(), raw) else {
            return Ok(Outcome::Pass);
        };
        let Some(transform) = self.registry.get(raw) else {
            return Ok(Outcome::Pass);
        };
        let Some(step) = &transform.before_resolve else {
            return Ok(Outcome::Pass);
        };
        if !ctx.first_visit(self.name()) {
            return Ok(Outcome::Pass);
        }

        let state = TransformState::new(id, Step::BeforeResolve, ctx);
        match step(node, &state) {
            Ok(next) if Rc::ptr_eq(&next, node) => Ok(Outcome::Pass),
            Ok(next) => Ok(Outcome::Replace(next)),
            Err(err) => {
                warn!("{} failed: {}", Self::label(&transform, id), err);
                Ok(Outcome::Pass)
            }
        }
    }

    fn after_resolve(
        &self,
        value: &Value,
        node: &Rc<Node>,
        ctx: &ResolveContext<'_>,
    ) -> Result<Outcome<Value>, ResolveError> {
        if !matches!(node.node_type(), NodeType::Asset | NodeType::View) {
            return Ok(Outcome::Pass);
        }
        let Some(id) = node.node_id() else {
            return Ok(Outcome::Pass);
        };
        let Some(transform) = self.registry.get(value) else {
            return Ok(Outcome::Pass);
        };
        let Some(step) = &transform.resolve else {
            return Ok(Outcome::Pass);
        };

        let state = TransformState::new(id, Step::Resolve, ctx);
        match step(value.clone(), &state) {
            Ok(next) => Ok(Outcome::Replace(next)),
            Err(err) => {
                warn!("{} failed: {}", Self::label(&transform, id), err);
                Ok(Outcome::Pass)
            }
        }
    }

    fn after_update(&self, live_ids: &HashSet<String>, runtime: &Runtime) {
        runtime.transforms().retain(live_ids);
        runtime.actions().retain(live_ids);
    }
}
