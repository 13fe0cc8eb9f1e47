pub mod engine;
pub mod scheduler;
pub mod state;

pub use engine::{DebouncedPhaseEngine, PhaseEngine, TimeBasedPhaseEngine};
pub use scheduler::{
    DoorSignal, IronGateSchedulerEngine, SchedulerEngine, SinglePhaseSchedulerEngine,
    TimeBasedSchedulerEngine, TimeWindow,
};
pub use state::{PhaseState, StaleConfig, StaleMode};
