use crate::policy::RunnerType;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("`{field}` must be a finite, non-negative number of seconds, got {value}")]
    InvalidSeconds { field: &'static str, value: f64 },
    #[error("invalid run_step `{0}`, expected a comma separated subset of setup,run,teardown")]
    InvalidRunStep(String),
    #[error("iterator `{name}` has a zero step")]
    ZeroStep { name: String },
    #[error("iterator `{name}` has a non-finite bound or step")]
    NonFiniteRange { name: String },
    #[error("the {0} runner needs at least one entry in `iterators`")]
    NoIterators(RunnerType),
    #[error("the {runner} runner needs `{field}`")]
    MissingField {
        runner: RunnerType,
        field: &'static str,
    },
    #[error("`{field}` must be greater than zero, got {value}")]
    NotPositive { field: &'static str, value: f64 },
    #[error("`{0}` must be at least 1")]
    ZeroCapacity(&'static str),
    #[error("iterator `{name}` has too many values to sweep")]
    RangeTooLarge { name: String },
}

#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("unknown runner type `{0}`")]
    UnknownRunnerType(String),
    #[error("no policy registered for runner type {0}")]
    UnregisteredRunnerType(RunnerType),
    #[error("unknown scenario type `{0}`")]
    UnknownScenarioType(String),
}

/// Errors which end a worker's run loop.
#[derive(thiserror::Error, Debug)]
pub enum WorkerError {
    #[error("SLA assertion failed: {0}")]
    SlaAssertion(String),
    #[error("scenario setup did not return any collaborator process ids")]
    NoCollaborators,
    #[error("runner needs a notification bus but none is attached")]
    NoNotificationBus,
    #[error("failed to subscribe to collaborator notifications: {0:#}")]
    Subscribe(anyhow::Error),
}

impl WorkerError {
    /// Setup related errors are reported with the setup failure exit status.
    pub fn is_setup_error(&self) -> bool {
        !matches!(self, WorkerError::SlaAssertion(_))
    }
}
