//! Built-in working-pipeline tasks (spec §4.5): Ingestion, MCMOT, Format
//! (optional), Rule, EventDispatch. Every task reaches its engine through
//! `ctx.resources`; none carries its own handle, so a pipeline is always
//! just an ordered `Vec<Box<dyn BaseTask>>` built from shared resources.

use async_trait::async_trait;
use serde_json::json;

use crate::context::TaskContext;
use crate::task::{BaseTask, PipelineTask, TaskResult};

/// Reads `resources.edge_event_store` through the configured
/// `IngestionEngine`, writes `scratch.events` and `scratch.raw_count`
/// (spec §4.5 IngestionTask).
pub struct IngestionTask;

#[async_trait]
impl BaseTask for IngestionTask {
    async fn run(&self, ctx: &TaskContext) -> TaskResult {
        let events = ctx
            .resources
            .ingestion_engine
            .ingest(&ctx.resources.edge_event_store)
            .await;
        let raw_count = events.len();
        ctx.update_scratch(|s| {
            s.raw_count = raw_count;
            s.events = events;
        });
        TaskResult::ok(json!({"raw_count": raw_count}))
    }

    fn name(&self) -> &str {
        "ingestion"
    }
}

/// Invokes the MC-MOT tracking engine over `scratch.events`, writes
/// `scratch.global_objects` / `scratch.local_objects` (spec §4.5 MCMOTTask).
pub struct MCMOTTask;

#[async_trait]
impl BaseTask for MCMOTTask {
    async fn run(&self, ctx: &TaskContext) -> TaskResult {
        let events = ctx.with_scratch(|s| s.events.clone());
        let (global_objects, local_objects) = ctx.resources.tracking_engine.track(&events).await;
        ctx.update_scratch(|s| {
            s.global_objects = global_objects;
            s.local_objects = local_objects;
        });
        TaskResult::ok_empty()
    }

    fn name(&self) -> &str {
        "mcmot"
    }
}

/// Produces `scratch.rules_payload` from tracking output. Optional: the
/// standard pipeline omits this task entirely when `FORMAT_TASK_ENABLED=0`
/// rather than running it as a no-op (spec §4.5 "optional; FORMAT_TASK_
/// ENABLED=0 to skip").
pub struct FormatConversionTask;

#[async_trait]
impl BaseTask for FormatConversionTask {
    async fn run(&self, ctx: &TaskContext) -> TaskResult {
        let (global_objects, local_objects) =
            ctx.with_scratch(|s| (s.global_objects.clone(), s.local_objects.clone()));
        let rules_payload = ctx
            .resources
            .format_strategy
            .format(&global_objects, &local_objects)
            .await;
        ctx.update_scratch(|s| s.rules_payload = rules_payload);
        TaskResult::ok_empty()
    }

    fn name(&self) -> &str {
        "format"
    }
}

/// Runs the configured rule engine over `scratch.rules_payload`, appending
/// any resulting dispatch events to `ctx.event_queue` (spec §4.5
/// RuleEvaluationTask).
pub struct RuleEvaluationTask;

#[async_trait]
impl BaseTask for RuleEvaluationTask {
    async fn run(&self, ctx: &TaskContext) -> TaskResult {
        let rules_payload = ctx.with_scratch(|s| s.rules_payload.clone());
        let events = ctx.resources.rule_engine.evaluate(&rules_payload).await;
        let count = events.len();
        for event in events {
            ctx.enqueue_event(event);
        }
        TaskResult::ok(json!({"rule_events": count}))
    }

    fn name(&self) -> &str {
        "rule"
    }
}

/// Last in every pipeline. Atomically drains `ctx.event_queue` and routes
/// it through the configured dispatch engine (spec §4.5 EventDispatchTask,
/// §8 invariant: `event_queue` is empty after every tick).
pub struct EventDispatchTask;

#[async_trait]
impl BaseTask for EventDispatchTask {
    async fn run(&self, ctx: &TaskContext) -> TaskResult {
        let events = ctx.drain_events();
        let dispatched = events.len();
        ctx.resources.dispatch_engine.dispatch(events).await;
        TaskResult::ok(json!({"dispatched": dispatched}))
    }

    fn name(&self) -> &str {
        "event_dispatch"
    }
}

/// Assembles the standard working pipeline: Ingestion -> MCMOT -> Format
/// (if `format_enabled`) -> Rule -> EventDispatch, matching the task order
/// spec §5 and §8 require.
pub fn standard_pipeline(name: impl Into<String>, format_enabled: bool) -> PipelineTask {
    let mut tasks: Vec<Box<dyn BaseTask>> = vec![Box::new(IngestionTask), Box::new(MCMOTTask)];
    if format_enabled {
        tasks.push(Box::new(FormatConversionTask));
    }
    tasks.push(Box::new(RuleEvaluationTask));
    tasks.push(Box::new(EventDispatchTask));
    PipelineTask::new(name, tasks)
}

/// A pipeline that only drains and dispatches the event queue, skipping
/// ingestion/tracking/rules entirely. Matches the "demo:Noop" pipeline
/// class used by spec §8's end-to-end scenarios and minimal test schedules.
pub fn noop_pipeline(name: impl Into<String>) -> PipelineTask {
    PipelineTask::new(name, vec![Box::new(EventDispatchTask)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Resources;
    use crate::engines::{
        DefaultIngestionEngine, HandlerDispatchEngine, NoopRuleEngine, NoopTrackingEngine,
        PassthroughFormatStrategy,
    };
    use sitelink_comm_adapter::HttpEdgeCommAdapter;
    use sitelink_edge_store::EdgeEventStore;
    use sitelink_core::RawEdgePayload;
    use std::sync::Arc;
    use std::time::Duration;

    fn test_context() -> TaskContext {
        let store = Arc::new(EdgeEventStore::new());
        store.add_event(
            RawEdgePayload {
                camera_id: "cam01".into(),
                timestamp: 100.0,
                detections: vec![],
            }
            .into_event(100.0),
            100.0,
            300.0,
        );
        TaskContext::new(Resources {
            edge_event_store: store,
            edge_comm_adapter: Arc::new(HttpEdgeCommAdapter::new("127.0.0.1", 0, None)),
            ingestion_engine: Arc::new(DefaultIngestionEngine),
            tracking_engine: Arc::new(NoopTrackingEngine),
            format_strategy: Arc::new(PassthroughFormatStrategy),
            rule_engine: Arc::new(NoopRuleEngine),
            dispatch_engine: Arc::new(HandlerDispatchEngine::with_monitor_only(Duration::from_secs(1))),
        })
    }

    #[tokio::test]
    async fn standard_pipeline_runs_in_spec_order_and_drains_queue() {
        let ctx = test_context();
        let pipeline = standard_pipeline("working", true);
        let result = pipeline.run(&ctx).await;
        assert!(result.ok);
        assert_eq!(result.payload["raw_count"], 1);
        assert_eq!(ctx.event_queue_len(), 0);
    }

    #[tokio::test]
    async fn format_task_is_omitted_when_disabled() {
        let ctx = test_context();
        let pipeline = standard_pipeline("working", false);
        let result = pipeline.run(&ctx).await;
        assert!(result.ok);
        // rules_payload should remain the Scratch default (Null) since
        // FormatConversionTask never ran.
        ctx.with_scratch(|s| assert_eq!(s.rules_payload, serde_json::Value::Null));
    }

    #[tokio::test]
    async fn noop_pipeline_still_drains_an_enqueued_event() {
        let ctx = test_context();
        ctx.enqueue_event(crate::context::DispatchEvent {
            handlers: ["monitor".to_string()].into_iter().collect(),
            data: serde_json::json!({}),
            origin: "test".to_string(),
            created_at: chrono::Utc::now(),
        });
        let pipeline = noop_pipeline("working");
        pipeline.run(&ctx).await;
        assert_eq!(ctx.event_queue_len(), 0);
    }
}
