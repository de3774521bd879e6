//! State and callbacks owned by transforms

use std::any::Any;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

/// Which transform hook a piece of local state belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    BeforeResolve,
    Resolve,
}

pub(crate) type Slot = Rc<RefCell<Box<dyn Any>>>;

/// Transform state for one content load
///
/// Local slots are keyed by asset id and step and addressed by call order, so
/// the n-th `use_local` of a transform always sees the n-th slot.
#[derive(Debug, Default)]
pub struct TransformStore {
    local: RefCell<HashMap<(String, Step), Vec<Slot>>>,
    shared: RefCell<HashMap<String, Slot>>,
}

impl TransformStore {
    /// The `index`-th local slot, created empty when missing
    pub(crate) fn local(&self, id: &str, step: Step, index: usize) -> Slot {
        let mut local = self.local.borrow_mut();
        let slots = local.entry((id.to_string(), step)).or_default();
        while slots.len() <= index {
            slots.push(empty_slot());
        }
        Rc::clone(&slots[index])
    }

    pub(crate) fn shared(&self, key: &str) -> Slot {
        Rc::clone(
            self.shared
                .borrow_mut()
                .entry(key.to_string())
                .or_insert_with(empty_slot),
        )
    }

    /// Drop local state of assets no longer in the output
    pub fn retain(&self, live_ids: &HashSet<String>) {
        self.local
            .borrow_mut()
            .retain(|(id, _), _| live_ids.contains(id));
    }

    pub fn has_local(&self, id: &str) -> bool {
        self.local.borrow().keys().any(|(owner, _)| owner == id)
    }
}

fn empty_slot() -> Slot {
    let empty: Box<dyn Any> = Box::new(());
    Rc::new(RefCell::new(empty))
}

type Action = Rc<dyn Fn(&Value)>;

/// Callbacks transforms bind into their output, by reference string
#[derive(Default)]
pub struct ActionRegistry {
    actions: RefCell<HashMap<String, (String, Action)>>,
}

impl ActionRegistry {
    /// Register `callback` for asset `owner`. Returns the reference to place
    /// in the output.
    pub fn register(&self, owner: &str, name: &str, callback: Action) -> String {
        let reference = format!("{}#{}", owner, name);
        self.actions
            .borrow_mut()
            .insert(reference.clone(), (owner.to_string(), callback));
        reference
    }

    /// Invoke the callback behind `reference`. Returns false when there is none.
    pub fn dispatch(&self, reference: &str, payload: &Value) -> bool {
        let action = self
            .actions
            .borrow()
            .get(reference)
            .map(|(_, action)| Rc::clone(action));
        match action {
            Some(action) => {
                action(payload);
                true
            }
            None => false,
        }
    }

    pub fn retain(&self, live_ids: &HashSet<String>) {
        self.actions
            .borrow_mut()
            .retain(|_, (owner, _)| live_ids.contains(owner));
    }
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut references: Vec<String> = self.actions.borrow().keys().cloned().collect();
        references.sort();
        f.debug_struct("ActionRegistry")
            .field("references", &references)
            .finish()
    }
}
