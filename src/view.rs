//! One loaded piece of content and its live output
//!
//! A [`View`] owns the parsed tree, the resolver and the runtime for the
//! content it was last loaded with. Hosts call [`View::update`] when data
//! changes, and [`View::process_pending`] when the update waker fires.

use std::fmt;
use std::rc::Rc;

use log::{debug, warn};
use serde_json::Value;

use crate::config::EngineConfig;
use crate::error::{ContentError, ResolveError};
use crate::node::{Node, NodeType};
use crate::parser::Parser;
use crate::plugin::{NodePlugin, ParseFn, ParseOptions, Plugins};
use crate::plugins::{default_plugins, AsyncHandler, AsyncNodePlugin};
use crate::resolver::{ResolveOptions, Resolver};
use crate::runtime::Runtime;
use crate::services::Services;
use crate::transform::{AssetTransformPlugin, TransformRegistry};

type Listener = Box<dyn Fn(Option<&Rc<Value>>)>;

/// Assembles the plugins and settings a [`View`] runs with
pub struct ViewBuilder {
    services: Services,
    plugins: Vec<Rc<dyn NodePlugin>>,
    transforms: TransformRegistry,
    config: EngineConfig,
    waker: Option<Rc<dyn Fn()>>,
}

impl ViewBuilder {
    /// Start from the built-in plugins
    pub fn new(services: Services) -> Self {
        let plugins = default_plugins(&services);
        Self {
            services,
            plugins,
            transforms: TransformRegistry::new(),
            config: EngineConfig::default(),
            waker: None,
        }
    }

    /// Drop the built-in plugins added so far
    pub fn bare(mut self) -> Self {
        self.plugins.clear();
        self
    }

    /// Add a plugin. Plugins run in the order they were added, after the
    /// built-in ones.
    pub fn with_plugin(mut self, plugin: impl NodePlugin + 'static) -> Self {
        self.plugins.push(Rc::new(plugin));
        self
    }

    /// Enable async placeholders, answered by `handler`
    pub fn with_async_handler(self, handler: impl AsyncHandler + 'static) -> Self {
        self.with_plugin(AsyncNodePlugin::new(handler))
    }

    /// Add transforms. Later registrations win over earlier ones for the same
    /// shape.
    pub fn with_transforms(mut self, registry: TransformRegistry) -> Self {
        self.transforms.extend(registry);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Called whenever the view has deferred work or wants another pass
    pub fn with_update_waker(mut self, waker: impl Fn() + 'static) -> Self {
        self.waker = Some(Rc::new(waker));
        self
    }

    pub fn build(self, content: &Value) -> Result<View, ContentError> {
        let ViewBuilder {
            services,
            mut plugins,
            transforms,
            config,
            waker,
        } = self;

        if !transforms.is_empty() {
            plugins.push(Rc::new(AssetTransformPlugin::new(transforms)));
        }
        let plugins: Plugins = plugins.into();
        let config = Rc::new(config);
        let parser = Rc::new(Parser::new(Rc::clone(&plugins), Rc::clone(&config)));
        let root = parser.parse(content)?;
        let runtime = new_runtime(waker.as_ref());

        let resolver = Resolver::new(
            root,
            ResolveOptions {
                plugins: Rc::clone(&plugins),
                services: services.clone(),
                runtime: Rc::clone(&runtime),
                parse: parse_fn(&parser),
                config: Rc::clone(&config),
            },
        );

        Ok(View {
            services,
            plugins,
            config,
            parser,
            waker,
            runtime,
            resolver,
            last: None,
            listeners: Vec::new(),
        })
    }
}

fn new_runtime(waker: Option<&Rc<dyn Fn()>>) -> Rc<Runtime> {
    let runtime = Runtime::new();
    if let Some(waker) = waker {
        runtime.scheduler().set_waker(Rc::clone(waker));
    }
    runtime
}

fn parse_fn(parser: &Rc<Parser>) -> ParseFn {
    let parser = Rc::clone(parser);
    Rc::new(move |raw: &Value, options: &ParseOptions| {
        parser.parse_object(raw, NodeType::Value, options)
    })
}

/// A loaded view and its latest output
pub struct View {
    services: Services,
    plugins: Plugins,
    config: Rc<EngineConfig>,
    parser: Rc<Parser>,
    waker: Option<Rc<dyn Fn()>>,
    runtime: Rc<Runtime>,
    resolver: Resolver,
    last: Option<Rc<Value>>,
    listeners: Vec<Listener>,
}

impl View {
    /// Replace the content. Async answers and transform state of the previous
    /// content are discarded; the next [`View::update`] resolves from scratch.
    pub fn load(&mut self, content: &Value) -> Result<(), ContentError> {
        let root = self.parser.parse(content)?;
        self.runtime = new_runtime(self.waker.as_ref());
        self.resolver = Resolver::new(
            root,
            ResolveOptions {
                plugins: Rc::clone(&self.plugins),
                services: self.services.clone(),
                runtime: Rc::clone(&self.runtime),
                parse: parse_fn(&self.parser),
                config: Rc::clone(&self.config),
            },
        );
        self.last = None;
        debug!("loaded new content");
        Ok(())
    }

    /// Resolve against the current data. Listeners hear about it when the
    /// output is a different object than last time.
    pub fn update(&mut self) -> Result<Option<Rc<Value>>, ResolveError> {
        let value = self.resolver.update()?;
        let changed = match (&self.last, &value) {
            (Some(previous), Some(next)) => !Rc::ptr_eq(previous, next),
            (None, None) => false,
            _ => true,
        };

        self.last = value.clone();
        if changed {
            for listener in &self.listeners {
                listener(value.as_ref());
            }
        }
        Ok(value)
    }

    /// Run deferred work, then resolve again if anything asked for it.
    /// Returns whether a pass ran.
    pub fn process_pending(&mut self) -> Result<bool, ResolveError> {
        let runtime = Rc::clone(&self.runtime);
        let ran = runtime.scheduler().run_pending();
        if ran > 0 {
            debug!("ran {} deferred tasks", ran);
        }
        if !runtime.scheduler().take_update_request() {
            return Ok(false);
        }
        self.update()?;
        Ok(true)
    }

    /// Resolve, then keep processing deferred work until nothing is left or
    /// the configured number of rounds is used up
    pub fn run_until_idle(&mut self) -> Result<Option<Rc<Value>>, ResolveError> {
        self.update()?;
        for _ in 0..self.config.max_async_rounds {
            if self.is_idle() {
                return Ok(self.last.clone());
            }
            self.process_pending()?;
        }
        if !self.is_idle() {
            warn!(
                "work still pending after {} async rounds",
                self.config.max_async_rounds
            );
        }
        Ok(self.last.clone())
    }

    fn is_idle(&self) -> bool {
        let scheduler = self.runtime.scheduler();
        !scheduler.has_pending() && !scheduler.is_update_requested()
    }

    /// Invoke an action a transform bound into the output, then process the
    /// work it caused. Returns false when `reference` is unknown.
    pub fn dispatch(&mut self, reference: &str, payload: &Value) -> Result<bool, ResolveError> {
        let runtime = Rc::clone(&self.runtime);
        if !runtime.actions().dispatch(reference, payload) {
            warn!("no action bound under '{}'", reference);
            return Ok(false);
        }
        self.process_pending()?;
        Ok(true)
    }

    pub fn on_update(&mut self, listener: impl Fn(Option<&Rc<Value>>) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Output of the latest pass
    pub fn last_update(&self) -> Option<&Rc<Value>> {
        self.last.as_ref()
    }

    pub fn root(&self) -> &Rc<Node> {
        self.resolver.root()
    }

    pub fn runtime(&self) -> &Rc<Runtime> {
        &self.runtime
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn services(&self) -> &Services {
        &self.services
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.plugins.iter().map(|p| p.name()).collect();
        f.debug_struct("View")
            .field("plugins", &names)
            .field("config", &self.config)
            .field("runtime", &self.runtime)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::{AsyncError, AsyncNode, AsyncUpdater};
    use crate::services::JsonModel;
    use serde_json::json;
    use std::cell::{Cell, RefCell};

    fn services(data: Value) -> (Rc<JsonModel>, Services) {
        let model = Rc::new(JsonModel::new(data));
        let services = Services::with_model(model.clone());
        (model, services)
    }

    fn answer_late(_node: &AsyncNode, updater: AsyncUpdater) -> Result<(), AsyncError> {
        updater.update(Some(json!({"id": "late", "type": "text"})))?;
        Ok(())
    }

    #[test]
    fn test_listeners_hear_changed_output_only() {
        let (model, services) = services(json!({"name": "Ada"}));
        let mut view = ViewBuilder::new(services)
            .build(&json!({"id": "v", "type": "info", "title": "Hi {{name}}"}))
            .expect("Should build view");

        let heard = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&heard);
        view.on_update(move |value| {
            let title = value.and_then(|v| v["title"].as_str()).unwrap_or_default();
            sink.borrow_mut().push(title.to_string());
        });

        view.update().expect("Should resolve");
        view.update().expect("Should resolve");
        model.set_path("name", json!("Grace"));
        view.update().expect("Should resolve");

        assert_eq!(*heard.borrow(), vec!["Hi Ada", "Hi Grace"]);
    }

    #[test]
    fn test_waker_fires_for_deferred_work() {
        let (_, services) = services(json!({}));
        let wakes = Rc::new(Cell::new(0));
        let counter = Rc::clone(&wakes);
        let mut view = ViewBuilder::new(services)
            .with_async_handler(answer_late)
            .with_update_waker(move || counter.set(counter.get() + 1))
            .build(&json!({"id": "v", "slot": {"async": true, "id": "late"}}))
            .expect("Should build view");

        let first = view.update().expect("Should resolve").expect("Should produce output");
        assert!(first.get("slot").is_none());
        assert_eq!(wakes.get(), 1);

        assert!(view.process_pending().expect("Should process"));
        let second = view.last_update().expect("Should have output");
        assert_eq!(second["slot"], json!({"id": "late", "type": "text"}));
        assert!(!view.process_pending().expect("Should process"));
    }

    #[test]
    fn test_dispatch_unknown_action() {
        let (_, services) = services(json!({}));
        let mut view = ViewBuilder::new(services)
            .build(&json!({"id": "v"}))
            .expect("Should build view");
        view.update().expect("Should resolve");
        assert!(!view.dispatch("v#missing", &Value::Null).expect("Should dispatch"));
    }

    #[test]
    fn test_non_object_content_is_rejected() {
        let (_, services) = services(json!({}));
        let result = ViewBuilder::new(services).build(&json!(["not", "a", "view"]));
        assert!(matches!(result, Err(ContentError::NotAView)));
    }
}
