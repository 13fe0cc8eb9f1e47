//! `InitPipelineTask` (spec §4.6 startup step 3): parses the schedule JSON,
//! instantiates one `PipelineTask` per registered pipeline class, and
//! populates the `PipelineRegistry` with each phase's default sleep.

use std::sync::Arc;

use sitelink_pipeline::{noop_pipeline, standard_pipeline, PipelineRegistry};

use crate::error::ConfigError;
use crate::schedule::PipelineSchedule;

/// Maps a `"module:Class"` class-path to the lowercased `Class` segment,
/// the key the built-in pipeline factories below are chosen by. A bare
/// class name with no `:` is used verbatim.
fn pipeline_key(class: &str) -> String {
    class.rsplit(':').next().unwrap_or(class).to_lowercase()
}

/// Builds the registry from a validated schedule. Every pipeline task
/// pulls its engines from the shared `TaskContext::resources` at run time
/// (spec §9 "typed context struct"), so construction here only needs to
/// pick a task list shape — not wire up engine instances.
pub fn init_registry(schedule: &PipelineSchedule, format_task_enabled: bool) -> Result<PipelineRegistry, ConfigError> {
    let mut registry = PipelineRegistry::new();

    for (phase, phase_def) in &schedule.phases {
        // `PipelineSchedule::validate` already guarantees this lookup
        // succeeds; a missing entry here would be a bug in that check.
        let pipeline_def = schedule
            .pipelines
            .get(&phase_def.pipeline)
            .ok_or_else(|| ConfigError::UnknownPipelineReference {
                phase: phase.clone(),
                pipeline: phase_def.pipeline.clone(),
            })?;

        let key = pipeline_key(&pipeline_def.class);
        let pipeline = if key.contains("noop") {
            noop_pipeline(phase_def.pipeline.clone())
        } else {
            standard_pipeline(phase_def.pipeline.clone(), format_task_enabled)
        };

        registry.register(phase.clone(), Arc::new(pipeline), phase_def.interval_seconds);
    }

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::schedule::{PhaseDef, PipelineDef};

    fn schedule(pipeline_class: &str) -> PipelineSchedule {
        let mut pipelines = HashMap::new();
        pipelines.insert("working".to_string(), PipelineDef { class: pipeline_class.to_string() });
        let mut phases = HashMap::new();
        phases.insert(
            "working".to_string(),
            PhaseDef { pipeline: "working".to_string(), interval_seconds: Some(2.0) },
        );
        PipelineSchedule { pipelines, phases }
    }

    #[test]
    fn noop_class_path_builds_registry_entry_with_configured_sleep() {
        let schedule = schedule("demo:Noop");
        let registry = init_registry(&schedule, true).unwrap();
        let (_, sleep) = registry.get("working").unwrap();
        assert_eq!(sleep, Some(2.0));
    }

    #[test]
    fn default_class_path_builds_standard_pipeline() {
        let schedule = schedule("sitelink.pipelines:Standard");
        let registry = init_registry(&schedule, true).unwrap();
        assert!(registry.get("working").is_ok());
    }
}
