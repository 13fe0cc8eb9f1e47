//! Startup (`ConfigError`) vs. per-tick-contained (`WorkflowError`) error
//! taxonomy (spec §7). Only a `ConfigError` at startup, or an uncaught
//! fatal, ever terminates the process.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read pipeline schedule at {path}: {source}")]
    ScheduleRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse pipeline schedule at {path}: {source}")]
    ScheduleParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("pipeline schedule has no phases")]
    EmptySchedule,

    #[error("phase {phase:?} references unknown pipeline {pipeline:?}")]
    UnknownPipelineReference { phase: String, pipeline: String },

    #[error("unknown {kind} plugin class-path {class_path:?}")]
    UnknownPlugin { kind: &'static str, class_path: String },

    #[error("invalid timezone {0:?}")]
    InvalidTimezone(String),

    #[error("invalid working-hours window {value:?}: {reason}")]
    InvalidWindow { value: String, reason: String },
}

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("adapter error: {0}")]
    Adapter(#[from] sitelink_comm_adapter::AdapterError),
}
