//! `TaskContext` — the typed, main-thread-confined state shared by every
//! task in a pipeline run (spec §3 `TaskContext`, §9 "typed context struct").

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde_json::Value;
use sitelink_comm_adapter::EdgeCommAdapter;
use sitelink_core::EdgeEvent;
use sitelink_edge_store::EdgeEventStore;

use crate::engines::{DispatchEngine, FormatStrategy, IngestionEngine, RuleEngine, TrackingEngine};

/// Named, typed resources seeded once at startup and shared by read across
/// every tick (spec §3 TaskContext, §9 "typed context struct"). Every
/// built-in task reaches its engine through here rather than carrying its
/// own handle, so swapping a plugin never touches the task's own code.
pub struct Resources {
    pub edge_event_store: Arc<EdgeEventStore>,
    pub edge_comm_adapter: Arc<dyn EdgeCommAdapter>,
    pub ingestion_engine: Arc<dyn IngestionEngine>,
    pub tracking_engine: Arc<dyn TrackingEngine>,
    pub format_strategy: Arc<dyn FormatStrategy>,
    pub rule_engine: Arc<dyn RuleEngine>,
    pub dispatch_engine: Arc<dyn DispatchEngine>,
}

/// Per-tick tracking scratch space. Reset at the start of every pipeline
/// run; never retained across ticks.
#[derive(Clone)]
pub struct Scratch {
    pub events: Vec<EdgeEvent>,
    pub raw_count: usize,
    pub global_objects: Value,
    pub local_objects: Value,
    pub rules_payload: Value,
}

impl Default for Scratch {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            raw_count: 0,
            global_objects: Value::Array(Vec::new()),
            local_objects: Value::Array(Vec::new()),
            rules_payload: Value::Null,
        }
    }
}

/// One item appended to `event_queue` by a task/engine, drained by
/// `EventDispatchTask` (spec §3 `DispatchEvent`).
#[derive(Debug, Clone)]
pub struct DispatchEvent {
    pub handlers: HashSet<String>,
    pub data: Value,
    pub origin: String,
    pub created_at: DateTime<Utc>,
}

/// Exclusively owned by `WorkflowRunner`; tasks borrow it for the duration
/// of one `run()` and never retain references (spec §3 Ownership).
/// `event_queue` is appended from main-thread tasks only — no cross-thread
/// append is allowed (spec §5).
pub struct TaskContext {
    pub resources: Resources,
    event_queue: Mutex<Vec<DispatchEvent>>,
    scratch: Mutex<Scratch>,
}

impl TaskContext {
    pub fn new(resources: Resources) -> Self {
        Self {
            resources,
            event_queue: Mutex::new(Vec::new()),
            scratch: Mutex::new(Scratch::default()),
        }
    }

    pub fn reset_scratch(&self) {
        *self.scratch.lock().expect("scratch lock poisoned") = Scratch::default();
    }

    pub fn with_scratch<T>(&self, f: impl FnOnce(&Scratch) -> T) -> T {
        f(&self.scratch.lock().expect("scratch lock poisoned"))
    }

    pub fn update_scratch(&self, f: impl FnOnce(&mut Scratch)) {
        f(&mut self.scratch.lock().expect("scratch lock poisoned"));
    }

    pub fn enqueue_event(&self, event: DispatchEvent) {
        self.event_queue
            .lock()
            .expect("event queue lock poisoned")
            .push(event);
    }

    /// Atomically swaps the queue out for an empty one and returns what was
    /// there, leaving `event_queue` empty (spec §4.5 EventDispatchTask,
    /// §8 invariant: `len(event_queue) == 0` after every tick).
    pub fn drain_events(&self) -> Vec<DispatchEvent> {
        std::mem::take(&mut *self.event_queue.lock().expect("event queue lock poisoned"))
    }

    pub fn event_queue_len(&self) -> usize {
        self.event_queue.lock().expect("event queue lock poisoned").len()
    }
}
