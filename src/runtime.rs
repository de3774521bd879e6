//! Per-view runtime state
//!
//! Everything that outlives a single resolve pass but not a content load
//! lives here: deferred tasks, the pending-update flag, versioned signals and
//! the state owned by the built-in plugins. Loading new content creates a new
//! runtime, which is how stale async callbacks and transform state are cut off.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;

use crate::plugins::async_node::AsyncCache;
use crate::plugins::string_resolver::SkipSets;
use crate::transform::{ActionRegistry, TransformStore};

type Task = Box<dyn FnOnce()>;

/// Queue of work deferred past the current resolve pass
#[derive(Default)]
pub struct Scheduler {
    tasks: RefCell<VecDeque<Task>>,
    update_requested: Cell<bool>,
    waker: RefCell<Option<Rc<dyn Fn()>>>,
}

impl Scheduler {
    /// Queue `task`. It runs on the next [`Scheduler::run_pending`], never
    /// inside the pass that queued it.
    pub fn defer(&self, task: impl FnOnce() + 'static) {
        self.tasks.borrow_mut().push_back(Box::new(task));
        self.wake();
    }

    /// Ask for another resolve pass
    pub fn request_update(&self) {
        self.update_requested.set(true);
        self.wake();
    }

    /// Whether an update was requested since the last call, clearing the flag
    pub fn take_update_request(&self) -> bool {
        self.update_requested.replace(false)
    }

    pub fn is_update_requested(&self) -> bool {
        self.update_requested.get()
    }

    pub fn has_pending(&self) -> bool {
        !self.tasks.borrow().is_empty()
    }

    /// Run queued tasks, including any they queue, until the queue is empty.
    /// Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.tasks.borrow_mut().pop_front();
            match next {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    /// Called whenever a task is queued or an update is requested
    pub fn set_waker(&self, waker: Rc<dyn Fn()>) {
        *self.waker.borrow_mut() = Some(waker);
    }

    fn wake(&self) {
        let waker = self.waker.borrow().clone();
        if let Some(waker) = waker {
            waker();
        }
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.tasks.borrow().len())
            .field("update_requested", &self.update_requested.get())
            .finish()
    }
}

/// Something a resolved value can depend on besides the data model
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SignalKey {
    /// Replacement content for an async id
    Async(String),
    /// Transform state local to an asset id
    State(String),
    /// Transform state shared under a key
    Shared(String),
}

/// Version counters for [`SignalKey`]s
#[derive(Debug, Default)]
pub struct Signals {
    versions: RefCell<HashMap<SignalKey, u64>>,
}

impl Signals {
    pub fn version(&self, key: &SignalKey) -> u64 {
        self.versions.borrow().get(key).copied().unwrap_or(0)
    }

    /// Mark everything depending on `key` as stale
    pub fn bump(&self, key: SignalKey) {
        *self.versions.borrow_mut().entry(key).or_insert(0) += 1;
    }
}

/// Runtime for one loaded piece of content
#[derive(Debug, Default)]
pub struct Runtime {
    scheduler: Scheduler,
    signals: Signals,
    async_nodes: AsyncCache,
    transforms: TransformStore,
    actions: ActionRegistry,
    skip_sets: SkipSets,
}

impl Runtime {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn signals(&self) -> &Signals {
        &self.signals
    }

    pub fn async_nodes(&self) -> &AsyncCache {
        &self.async_nodes
    }

    pub fn transforms(&self) -> &TransformStore {
        &self.transforms
    }

    pub fn actions(&self) -> &ActionRegistry {
        &self.actions
    }

    pub fn skip_sets(&self) -> &SkipSets {
        &self.skip_sets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deferred_tasks_run_in_order() {
        let scheduler = Rc::new(Scheduler::default());
        let log = Rc::new(RefCell::new(Vec::new()));

        for i in 0..3 {
            let log = Rc::clone(&log);
            scheduler.defer(move || log.borrow_mut().push(i));
        }
        assert!(log.borrow().is_empty());
        assert!(scheduler.has_pending());

        assert_eq!(scheduler.run_pending(), 3);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert!(!scheduler.has_pending());
    }

    #[test]
    fn test_tasks_can_defer_more_tasks() {
        let scheduler = Rc::new(Scheduler::default());
        let hits = Rc::new(Cell::new(0));

        let inner_scheduler = Rc::clone(&scheduler);
        let inner_hits = Rc::clone(&hits);
        scheduler.defer(move || {
            inner_hits.set(inner_hits.get() + 1);
            let again = Rc::clone(&inner_hits);
            inner_scheduler.defer(move || again.set(again.get() + 1));
        });

        assert_eq!(scheduler.run_pending(), 2);
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn test_update_request_and_waker() {
        let scheduler = Scheduler::default();
        let woken = Rc::new(Cell::new(0));
        let counter = Rc::clone(&woken);
        scheduler.set_waker(Rc::new(move || counter.set(counter.get() + 1)));

        assert!(!scheduler.take_update_request());
        scheduler.request_update();
        assert!(scheduler.take_update_request());
        assert!(!scheduler.take_update_request());
        assert_eq!(woken.get(), 1);
    }

    #[test]
    fn test_signal_versions() {
        let signals = Signals::default();
        let key = SignalKey::Async("a".into());
        assert_eq!(signals.version(&key), 0);
        signals.bump(key.clone());
        signals.bump(key.clone());
        assert_eq!(signals.version(&key), 2);
        assert_eq!(signals.version(&SignalKey::State("a".into())), 0);
    }
}
