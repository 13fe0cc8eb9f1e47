pub mod context;
pub mod engines;
pub mod error;
pub mod registry;
pub mod selector;
pub mod task;
pub mod tasks;

pub use context::{DispatchEvent, Resources, Scratch, TaskContext};
pub use engines::{
    DefaultIngestionEngine, DispatchEngine, DispatchHandler, FormatStrategy, HandlerDispatchEngine,
    IngestionEngine, MonitorDispatchHandler, NoopRuleEngine, NoopTrackingEngine,
    PassthroughFormatStrategy, RuleEngine, TrackingEngine,
};
pub use error::{DispatchError, PipelineError};
pub use registry::PipelineRegistry;
pub use selector::{PipelineSelector, SelectorMeta, WorkingHoursSelector};
pub use task::{BaseTask, PipelineTask, TaskResult};
pub use tasks::{
    noop_pipeline, standard_pipeline, EventDispatchTask, FormatConversionTask, IngestionTask,
    MCMOTTask, RuleEvaluationTask,
};
