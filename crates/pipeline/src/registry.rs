//! `PipelineRegistry` (spec §4.4): built once by `InitPipelineTask` from the
//! schedule JSON, immutable thereafter.
//!
//! Keyed by the same string the active `PipelineSelector` returns. The
//! default `WorkingHoursSelector` returns the phase name, so for the common
//! case this is literally spec §3's "phase -> (PipelineTask, default_sleep)"
//! mapping; a custom selector is expected to return a key that resolves
//! here too (see the Open Question note in `sitelink-workflow`'s DESIGN.md
//! entry on selector/registry precedence).

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::PipelineError;
use crate::task::PipelineTask;

#[derive(Clone)]
struct Entry {
    pipeline: Arc<PipelineTask>,
    default_sleep: Option<f64>,
}

#[derive(Default)]
pub struct PipelineRegistry {
    entries: HashMap<String, Entry>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: impl Into<String>, pipeline: Arc<PipelineTask>, default_sleep: Option<f64>) {
        self.entries.insert(key.into(), Entry { pipeline, default_sleep });
    }

    pub fn get(&self, key: &str) -> Result<(Arc<PipelineTask>, Option<f64>), PipelineError> {
        self.entries
            .get(key)
            .map(|e| (e.pipeline.clone(), e.default_sleep))
            .ok_or_else(|| PipelineError::UnknownPhase(key.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
