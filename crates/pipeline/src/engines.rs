//! Swappable engine traits behind the built-in pipeline tasks (spec §4.5,
//! §9 "dynamic class-path plugins -> explicit registry"). Each trait is the
//! ABI boundary the host exposes; concrete implementations are resolved by
//! `sitelink-workflow`'s `PluginRegistry` from the `*_ENGINE_CLASS` /
//! `*_STRATEGY_CLASS` env vars. The defaults here are the pass-through/noop
//! implementations used when a plugin is left unconfigured.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use sitelink_core::EdgeEvent;
use sitelink_edge_store::EdgeEventStore;
use tracing::{error, warn};

use crate::context::DispatchEvent;
use crate::error::DispatchError;

/// Reads the current per-camera snapshot from the store. The default
/// implementation of `INGESTION_ENGINE_CLASS` (spec §4.5 IngestionTask).
#[async_trait]
pub trait IngestionEngine: Send + Sync {
    async fn ingest(&self, store: &EdgeEventStore) -> Vec<EdgeEvent>;
}

pub struct DefaultIngestionEngine;

#[async_trait]
impl IngestionEngine for DefaultIngestionEngine {
    async fn ingest(&self, store: &EdgeEventStore) -> Vec<EdgeEvent> {
        store.snapshot()
    }
}

/// MC-MOT multi-camera tracking engine boundary (spec §1: out of scope,
/// internals unspecified). Consumes the tick's latest-per-camera events,
/// produces global (cross-camera) and local (per-camera) tracked objects.
#[async_trait]
pub trait TrackingEngine: Send + Sync {
    async fn track(&self, events: &[EdgeEvent]) -> (Value, Value);
}

/// Used when `TRACKING_ENGINE_CLASS` is unset or MC-MOT is disabled: passes
/// the tick through with empty tracking output (spec §4.5 "If disabled,
/// passes through").
pub struct NoopTrackingEngine;

#[async_trait]
impl TrackingEngine for NoopTrackingEngine {
    async fn track(&self, _events: &[EdgeEvent]) -> (Value, Value) {
        (Value::Array(Vec::new()), Value::Array(Vec::new()))
    }
}

/// `FORMAT_STRATEGY_CLASS` boundary: converts tracking output into the
/// shape the rule engine expects (spec §4.5 FormatConversionTask).
#[async_trait]
pub trait FormatStrategy: Send + Sync {
    async fn format(&self, global_objects: &Value, local_objects: &Value) -> Value;
}

/// Combines global/local tracking output into one object without
/// reshaping either side.
pub struct PassthroughFormatStrategy;

#[async_trait]
impl FormatStrategy for PassthroughFormatStrategy {
    async fn format(&self, global_objects: &Value, local_objects: &Value) -> Value {
        json!({"global": global_objects, "local": local_objects})
    }
}

/// `RULES_ENGINE_CLASS` boundary: evaluates the formatted tracking output
/// and returns zero or more dispatch events to enqueue (spec §4.5
/// RuleEvaluationTask). Rule engine internals are out of this spec's scope;
/// only the trait boundary is specified.
#[async_trait]
pub trait RuleEngine: Send + Sync {
    async fn evaluate(&self, rules_payload: &Value) -> Vec<DispatchEvent>;
}

/// Used when `RULES_ENGINE_CLASS` is unset: evaluates nothing, enqueues
/// nothing.
pub struct NoopRuleEngine;

#[async_trait]
impl RuleEngine for NoopRuleEngine {
    async fn evaluate(&self, _rules_payload: &Value) -> Vec<DispatchEvent> {
        Vec::new()
    }
}

/// One named delivery target for a `DispatchEvent` (spec §4.5
/// EventDispatchTask "routes each event to the handlers named in
/// `event.handlers`"). Concrete handlers (API clients, DB writers) are
/// external collaborators out of this spec's scope.
#[async_trait]
pub trait DispatchHandler: Send + Sync {
    fn name(&self) -> &str;
    async fn handle(&self, event: &DispatchEvent) -> Result<(), DispatchError>;
}

/// Logs every delivery at INFO. Always succeeds; used as the built-in
/// `monitor` handler so phase-change events (spec §4.6 step 3) have
/// somewhere to go without any external wiring.
pub struct MonitorDispatchHandler;

#[async_trait]
impl DispatchHandler for MonitorDispatchHandler {
    fn name(&self) -> &str {
        "monitor"
    }

    async fn handle(&self, event: &DispatchEvent) -> Result<(), DispatchError> {
        tracing::info!(origin = %event.origin, data = %event.data, "monitor event");
        Ok(())
    }
}

/// `EVENT_DISPATCH_ENGINE_CLASS` boundary: drains the tick's event queue
/// and routes each event to its named handlers (spec §4.5, §7
/// DispatchError).
#[async_trait]
pub trait DispatchEngine: Send + Sync {
    async fn dispatch(&self, events: Vec<DispatchEvent>);
}

/// Routes events to a name->handler map. Isolates per-handler failures (one
/// failing handler never blocks another event's or another handler's
/// delivery), retries a failed handler once, then drops with an ERROR log
/// naming the handler (spec §7 DispatchError, §8 scenario 6). Each handler
/// call is bounded by `handler_timeout`.
pub struct HandlerDispatchEngine {
    handlers: HashMap<String, Arc<dyn DispatchHandler>>,
    handler_timeout: Duration,
}

impl HandlerDispatchEngine {
    pub fn new(handlers: Vec<Arc<dyn DispatchHandler>>, handler_timeout: Duration) -> Self {
        let handlers = handlers.into_iter().map(|h| (h.name().to_string(), h)).collect();
        Self {
            handlers,
            handler_timeout,
        }
    }

    /// The default engine: only the built-in `monitor` handler registered,
    /// matching `DispatchEngine` semantics when `EVENT_DISPATCH_ENGINE_CLASS`
    /// is left at its default.
    pub fn with_monitor_only(handler_timeout: Duration) -> Self {
        Self::new(vec![Arc::new(MonitorDispatchHandler)], handler_timeout)
    }

    async fn deliver_once(&self, handler: &Arc<dyn DispatchHandler>, event: &DispatchEvent) -> Result<(), DispatchError> {
        match tokio::time::timeout(self.handler_timeout, handler.handle(event)).await {
            Ok(result) => result,
            Err(_) => Err(DispatchError::Timeout {
                handler: handler.name().to_string(),
                timeout: self.handler_timeout,
            }),
        }
    }
}

#[async_trait]
impl DispatchEngine for HandlerDispatchEngine {
    async fn dispatch(&self, events: Vec<DispatchEvent>) {
        for event in &events {
            for handler_name in &event.handlers {
                let Some(handler) = self.handlers.get(handler_name) else {
                    warn!(handler = %handler_name, origin = %event.origin, "no dispatch handler registered for name");
                    continue;
                };
                if self.deliver_once(handler, event).await.is_ok() {
                    continue;
                }
                warn!(handler = %handler_name, origin = %event.origin, "dispatch handler failed, retrying once");
                if let Err(e) = self.deliver_once(handler, event).await {
                    error!(handler = %handler_name, origin = %event.origin, error = %e, "dispatch handler failed after retry, dropping event");
                }
            }
        }
    }
}
