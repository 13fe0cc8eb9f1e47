//! `PipelineSelector` (spec §4.4): given the current phase, picks the
//! registry key and optional per-tick overrides.
//!
//! Spec §9's Open Question treats the selector as authoritative on pipeline
//! name and the phase engine as authoritative on phase; this selector is
//! consulted every tick *after* `PhaseEngine::current_phase` has already
//! committed.

use sitelink_core::Phase;

use crate::context::TaskContext;

/// Metadata a selector may attach alongside the chosen pipeline name.
/// `phase_changed` lets a custom selector force a phase-change dispatch
/// even when the phase engine's own committed phase didn't move (e.g. a
/// selector that reacts to scratch state from the previous tick);
/// `sleep` overrides the registry's default sleep for the next interval.
#[derive(Debug, Clone, Default)]
pub struct SelectorMeta {
    pub phase_changed: Option<bool>,
    pub sleep: Option<f64>,
}

pub trait PipelineSelector: Send + Sync {
    fn select(&self, phase: &Phase, ctx: &TaskContext) -> (String, SelectorMeta);
}

/// Default selector: the pipeline name is the phase name verbatim, no
/// overrides (spec §4.4 "Default WorkingHoursSelector").
pub struct WorkingHoursSelector;

impl PipelineSelector for WorkingHoursSelector {
    fn select(&self, phase: &Phase, _ctx: &TaskContext) -> (String, SelectorMeta) {
        (phase.as_str().to_string(), SelectorMeta::default())
    }
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
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn default_selector_returns_phase_name_with_no_overrides() {
        let ctx = TaskContext::new(Resources {
            edge_event_store: Arc::new(EdgeEventStore::new()),
            edge_comm_adapter: Arc::new(HttpEdgeCommAdapter::new("127.0.0.1", 0, None)),
            ingestion_engine: Arc::new(DefaultIngestionEngine),
            tracking_engine: Arc::new(NoopTrackingEngine),
            format_strategy: Arc::new(PassthroughFormatStrategy),
            rule_engine: Arc::new(NoopRuleEngine),
            dispatch_engine: Arc::new(HandlerDispatchEngine::with_monitor_only(Duration::from_secs(1))),
        });
        let (name, meta) = WorkingHoursSelector.select(&Phase::new("working"), &ctx);
        assert_eq!(name, "working");
        assert!(meta.sleep.is_none());
        assert!(meta.phase_changed.is_none());
    }
}
