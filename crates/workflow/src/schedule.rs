//! Pipeline schedule JSON (spec §3 `PipelineSchedule`, §6 "Pipeline schedule
//! file"): `{pipelines: {name: {class}}, phases: {phase: {pipeline,
//! interval_seconds?}}}`. Validated once at startup; every
//! `phases[*].pipeline` must resolve in `pipelines` or the process exits 1.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineDef {
    pub class: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhaseDef {
    pub pipeline: String,
    pub interval_seconds: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSchedule {
    pub pipelines: HashMap<String, PipelineDef>,
    pub phases: HashMap<String, PhaseDef>,
}

impl PipelineSchedule {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ScheduleRead {
            path: path.display().to_string(),
            source,
        })?;
        let schedule: Self = serde_json::from_str(&text).map_err(|source| ConfigError::ScheduleParse {
            path: path.display().to_string(),
            source,
        })?;
        schedule.validate()?;
        Ok(schedule)
    }

    /// Every referenced pipeline name must exist; an empty schedule (no
    /// phases) is also fatal (spec §8 boundary: "Empty schedule (no
    /// phases): startup fails with ConfigError"). Unknown top-level JSON
    /// keys are tolerated by serde's default (de)serialization behavior,
    /// matching "unknown keys are warnings, not errors."
    fn validate(&self) -> Result<(), ConfigError> {
        if self.phases.is_empty() {
            return Err(ConfigError::EmptySchedule);
        }
        for (phase, def) in &self.phases {
            if !self.pipelines.contains_key(&def.pipeline) {
                return Err(ConfigError::UnknownPipelineReference {
                    phase: phase.clone(),
                    pipeline: def.pipeline.clone(),
                });
            }
        }
        Ok(())
    }
}
