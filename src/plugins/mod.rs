//! Built-in node behaviors

pub mod applicability;
pub mod async_node;
pub mod multi_node;
pub mod string_resolver;
pub mod switch;
pub mod template;

use std::rc::Rc;

pub use applicability::ApplicabilityPlugin;
pub use async_node::{AsyncError, AsyncHandler, AsyncNode, AsyncNodePlugin, AsyncUpdater};
pub use multi_node::MultiNodePlugin;
pub use string_resolver::StringResolverPlugin;
pub use switch::SwitchPlugin;
pub use template::{TemplateItemInfo, TemplatePlugin, TemplateSubstitution};

use crate::plugin::NodePlugin;
use crate::services::Services;

/// The plugins every view runs with, in order
pub fn default_plugins(services: &Services) -> Vec<Rc<dyn NodePlugin>> {
    vec![
        Rc::new(ApplicabilityPlugin),
        Rc::new(SwitchPlugin::new(services.clone())),
        Rc::new(TemplatePlugin::new(services.clone())),
        Rc::new(MultiNodePlugin),
        Rc::new(StringResolverPlugin),
    ]
}
