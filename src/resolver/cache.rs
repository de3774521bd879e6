//! What a resolved value was computed from

use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

use crate::node::Node;
use crate::runtime::{SignalKey, Signals};
use crate::services::{Binding, DataModel};

/// Data reads and signal versions observed while resolving a subtree
#[derive(Debug, Clone, Default)]
pub struct Dependencies {
    bindings: HashMap<String, (Binding, Value)>,
    signals: HashMap<SignalKey, u64>,
}

impl Dependencies {
    /// Remember the first value read for `binding`
    pub fn record_binding(&mut self, binding: &Binding, value: &Value) {
        self.bindings
            .entry(binding.as_str().to_string())
            .or_insert_with(|| (binding.clone(), value.clone()));
    }

    pub fn record_signal(&mut self, key: SignalKey, version: u64) {
        self.signals.entry(key).or_insert(version);
    }

    pub fn extend(&mut self, other: &Dependencies) {
        for (raw, entry) in &other.bindings {
            self.bindings
                .entry(raw.clone())
                .or_insert_with(|| entry.clone());
        }
        for (key, version) in &other.signals {
            self.signals.entry(key.clone()).or_insert(*version);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty() && self.signals.is_empty()
    }

    pub fn depends_on(&self, binding: &str) -> bool {
        self.bindings.contains_key(binding)
    }

    /// Whether every recorded read would still produce the same result
    pub fn is_current(&self, model: &dyn DataModel, signals: &Signals) -> bool {
        self.signals
            .iter()
            .all(|(key, version)| signals.version(key) == *version)
            && self
                .bindings
                .values()
                .all(|(binding, value)| model.get(binding) == *value)
    }
}

pub(crate) type NodeKey = usize;

pub(crate) fn key_of(node: &Rc<Node>) -> NodeKey {
    Rc::as_ptr(node) as usize
}

/// A node's last resolution
pub(crate) struct CacheEntry {
    /// Keeps the keyed node alive so its address is not reused
    pub node: Rc<Node>,
    pub resolved: Rc<Node>,
    pub value: Option<Rc<Value>>,
    pub deps: Rc<Dependencies>,
    pub children: Vec<NodeKey>,
}
