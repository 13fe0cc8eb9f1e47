pub mod error;
pub mod init;
pub mod plugin;
pub mod runner;
pub mod schedule;

pub use error::{ConfigError, WorkflowError};
pub use init::init_registry;
pub use plugin::{resolve_phase_engine, resolve_scheduler_engine, PluginRegistry};
pub use runner::WorkflowRunner;
pub use schedule::{PhaseDef, PipelineDef, PipelineSchedule};
