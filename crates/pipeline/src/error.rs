//! Pipeline-crate error types (spec §7).

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("unknown phase in pipeline registry: {0}")]
    UnknownPhase(String),
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("dispatch handler failed: {0}")]
    Failed(String),

    #[error("handler {handler:?} timed out after {timeout:?}")]
    Timeout { handler: String, timeout: Duration },
}
