//! Phase labels and the reserved "stale" fallback phase.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A site-wide operational label (e.g. `working`, `non_working`). Phases are
/// plain strings configured by the deployment, not a closed Rust enum,
/// because the set of phases is schedule-driven (see `PipelineSchedule`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Phase(pub String);

impl Phase {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Phase {
    fn from(s: &str) -> Self {
        Phase(s.to_string())
    }
}

impl From<String> for Phase {
    fn from(s: String) -> Self {
        Phase(s)
    }
}
