mod cli;
mod config;
mod error;
mod executor;
mod init;
mod manager;
mod policy;
mod progress;
mod run;
mod runner;
mod scenario;
mod shutdown;
mod sla;
mod types;
mod worker;

pub mod prelude {
    pub use crate::cli::YardstickCli;
    pub use crate::config::{
        IterType, RangeSpec, RunStep, RunnerConfig, ScenarioConfig, SlaAction, SlaConfig,
        TaskEntry, TaskFile,
    };
    pub use crate::error::{ConfigError, RegistryError, WorkerError};
    pub use crate::executor::Executor;
    pub use crate::init::init;
    pub use crate::manager::{AbortSwitch, RunnerManager};
    pub use crate::policy::{
        range_values, AdaptiveSearch, FixedCount, IpcSynchronized, IterationPolicy,
        ParameterSweep, PolicyFactory, PolicyRegistry, RangeValues, RunnerType, TimeBound,
        BARRIER_TIMEOUT_ERROR, MAX_SEARCH_ATTEMPTS,
    };
    pub use crate::run::{run, RunReport};
    pub use crate::runner::{Runner, RunnerState};
    pub use crate::scenario::{Scenario, ScenarioFactory, ScenarioOutcome, ScenarioRegistry};
    pub use crate::sla::{classify, Disposition, FailureKind};
    pub use crate::types::YardstickResult;
    pub use crate::worker::{EmittedIteration, IterationOutcome, LoopExit, Worker, WorkerStatus};

    pub use yardstick_core::prelude::*;
    pub use yardstick_result_model::{load_records, RecordData, ResultRecord};
}
