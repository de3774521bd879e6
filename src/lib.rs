//! flowview - Resolution engine for declarative, data-bound content
//!
//! Content is JSON describing a view: assets, switches, templates,
//! applicability guards and async placeholders. The [`Parser`] turns it into a
//! node tree, and the [`Resolver`] turns the tree plus live data into plain
//! JSON output, reusing unchanged subtrees between passes. Node behaviors are
//! plugins sharing one [`NodePlugin`] trait, so hosts can add their own.
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//!
//! use flowview::{JsonModel, Services, ViewBuilder};
//! use serde_json::json;
//!
//! let model = Rc::new(JsonModel::new(json!({"user": {"name": "Ada"}})));
//! let mut view = ViewBuilder::new(Services::with_model(model))
//!     .build(&json!({
//!         "id": "welcome",
//!         "type": "info",
//!         "title": {"asset": {"id": "title", "type": "text", "value": "Hello {{user.name}}"}}
//!     }))
//!     .unwrap();
//!
//! let output = view.update().unwrap().unwrap();
//! assert_eq!(output["title"]["asset"]["value"], "Hello Ada");
//! ```

pub mod config;
pub mod error;
pub mod interpolate;
pub mod node;
pub mod parser;
pub mod plugin;
pub mod plugins;
pub mod resolver;
pub mod runtime;
pub mod services;
pub mod transform;
pub mod view;

pub use config::{ConfigError, EngineConfig};
pub use error::{ContentError, ResolveError};
pub use node::{Node, NodeKind, NodeType, PathSegment, ValueHook};
pub use parser::Parser;
pub use plugin::{NodePlugin, Outcome, ParseOptions, Parsed};
pub use plugins::{AsyncError, AsyncHandler, AsyncNode, AsyncUpdater};
pub use resolver::{ResolveContext, ResolveOptions, Resolver};
pub use runtime::Runtime;
pub use services::{
    Binding, BindingParser, DataModel, DotPathParser, ExpressionEvaluator, JsonModel,
    LookupEvaluator, Services,
};
pub use transform::{Transform, TransformError, TransformRegistry, TransformState};
pub use view::{View, ViewBuilder};
