//! `BaseTask` contract and the composite `PipelineTask` (spec §4.5).

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::error;

use crate::context::TaskContext;

/// Outcome of one task's `run()`. `payload` is shallow-merged into the
/// pipeline's combined result; a `"sleep"` key overrides the registry's
/// default sleep for this tick.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub ok: bool,
    pub payload: Value,
}

impl TaskResult {
    pub fn ok(payload: Value) -> Self {
        Self { ok: true, payload }
    }

    pub fn ok_empty() -> Self {
        Self {
            ok: true,
            payload: Value::Object(Map::new()),
        }
    }

    pub fn fail(payload: Value) -> Self {
        Self { ok: false, payload }
    }

    pub fn sleep_override(&self) -> Option<f64> {
        self.payload.get("sleep").and_then(Value::as_f64)
    }
}

/// One operation in a pipeline. Tasks compose sequentially; a task may
/// short-circuit the pipeline by returning `ok=false`, in which case
/// downstream tasks in the same pipeline are skipped but the outer
/// workflow continues to the next tick (spec §4.5 BaseTask contract).
#[async_trait]
pub trait BaseTask: Send + Sync {
    async fn run(&self, ctx: &TaskContext) -> TaskResult;
    fn name(&self) -> &str;
}

/// A named, ordered sequence of tasks run once per tick. Resets
/// `ctx.scratch` at the start of its own run, merges each task's payload
/// shallowly (later keys win), and stops at the first `ok=false`.
pub struct PipelineTask {
    name: String,
    tasks: Vec<Box<dyn BaseTask>>,
}

impl PipelineTask {
    pub fn new(name: impl Into<String>, tasks: Vec<Box<dyn BaseTask>>) -> Self {
        Self {
            name: name.into(),
            tasks,
        }
    }
}

#[async_trait]
impl BaseTask for PipelineTask {
    async fn run(&self, ctx: &TaskContext) -> TaskResult {
        ctx.reset_scratch();
        let mut merged = Map::new();

        for task in &self.tasks {
            let result = task.run(ctx).await;
            if let Value::Object(map) = &result.payload {
                merged.extend(map.clone());
            }
            if !result.ok {
                error!(
                    pipeline = %self.name,
                    task = task.name(),
                    "task failed, short-circuiting pipeline for this tick"
                );
                return TaskResult::fail(Value::Object(merged));
            }
        }

        TaskResult::ok(Value::Object(merged))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
