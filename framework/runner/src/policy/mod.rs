//! Iteration policies decide how many times, and with which options, a runner calls its scenario.

mod duration;
mod iteration;
mod iteration_ipc;
mod search;
mod sweep;

pub use duration::TimeBound;
pub use iteration::FixedCount;
pub use iteration_ipc::{IpcSynchronized, BARRIER_TIMEOUT_ERROR};
pub use search::{AdaptiveSearch, MAX_SEARCH_ATTEMPTS};
pub use sweep::{range_values, ParameterSweep, RangeValues};

use crate::config::RunnerConfig;
use crate::error::{ConfigError, RegistryError, WorkerError};
use crate::worker::{LoopExit, Worker};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// The runner types known to the default [PolicyRegistry].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunnerType {
    Iteration,
    Duration,
    Arithmetic,
    Sequence,
    Stepping,
    Search,
    IterationIpc,
}

impl RunnerType {
    pub const ALL: [RunnerType; 7] = [
        RunnerType::Iteration,
        RunnerType::Duration,
        RunnerType::Arithmetic,
        RunnerType::Sequence,
        RunnerType::Stepping,
        RunnerType::Search,
        RunnerType::IterationIpc,
    ];

    /// The name used for this runner type in task files.
    pub fn name(&self) -> &'static str {
        match self {
            RunnerType::Iteration => "Iteration",
            RunnerType::Duration => "Duration",
            RunnerType::Arithmetic => "Arithmetic",
            RunnerType::Sequence => "Sequence",
            RunnerType::Stepping => "Stepping",
            RunnerType::Search => "Search",
            RunnerType::IterationIpc => "IterationIPC",
        }
    }
}

impl Display for RunnerType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RunnerType {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RunnerType::ALL
            .into_iter()
            .find(|runner_type| runner_type.name() == s)
            .ok_or_else(|| RegistryError::UnknownRunnerType(s.to_string()))
    }
}

/// The loop that drives a [Worker].
///
/// Implementations must check [Worker::abort_requested] before every iteration and return
/// [LoopExit::Aborted] once it is set. They must also stop when an emitted iteration asks them to.
pub trait IterationPolicy: Send {
    fn runner_type(&self) -> RunnerType;

    fn run(&mut self, worker: &mut Worker) -> Result<LoopExit, WorkerError>;
}

pub type PolicyFactory = fn(&RunnerConfig) -> Result<Box<dyn IterationPolicy>, ConfigError>;

/// Maps runner types to the policies that implement them.
pub struct PolicyRegistry {
    factories: HashMap<RunnerType, PolicyFactory>,
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(RunnerType::Iteration, iteration::build);
        registry.register(RunnerType::Duration, duration::build);
        registry.register(RunnerType::Arithmetic, sweep::build_arithmetic);
        registry.register(RunnerType::Sequence, sweep::build_sequence);
        registry.register(RunnerType::Stepping, sweep::build_stepping);
        registry.register(RunnerType::Search, search::build);
        registry.register(RunnerType::IterationIpc, iteration_ipc::build);
        registry
    }
}

impl PolicyRegistry {
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register the policy for a runner type, returning the one it replaces.
    pub fn register(
        &mut self,
        runner_type: RunnerType,
        factory: PolicyFactory,
    ) -> Option<PolicyFactory> {
        self.factories.insert(runner_type, factory)
    }

    /// Resolve the config's runner type and build its policy.
    pub fn create(&self, config: &RunnerConfig) -> anyhow::Result<Box<dyn IterationPolicy>> {
        let runner_type: RunnerType = config.runner_type.parse()?;
        let factory = self
            .factories
            .get(&runner_type)
            .ok_or(RegistryError::UnregisteredRunnerType(runner_type))?;

        Ok(factory(config)?)
    }
}

/// Integral values are written as JSON integers so scenarios see `64` rather than `64.0`.
pub(crate) fn number_value(value: f64) -> Value {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;

    if value.fract() == 0.0 && value.abs() < MAX_EXACT {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn runner_type_names_round_trip() {
        for runner_type in RunnerType::ALL {
            assert_eq!(runner_type.name().parse::<RunnerType>().unwrap(), runner_type);
        }
        assert_eq!(RunnerType::IterationIpc.to_string(), "IterationIPC");
    }

    #[test]
    fn unknown_runner_type_is_rejected() {
        let err = PolicyRegistry::default()
            .create(&RunnerConfig::new("Forever"))
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<RegistryError>(),
            Some(RegistryError::UnknownRunnerType(name)) if name == "Forever"
        ));
    }

    #[test]
    fn unregistered_runner_type_is_rejected() {
        let err = PolicyRegistry::empty()
            .create(&RunnerConfig::new("Iteration"))
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<RegistryError>(),
            Some(RegistryError::UnregisteredRunnerType(RunnerType::Iteration))
        ));
    }

    #[test]
    fn default_registry_builds_every_runner_type() {
        let registry = PolicyRegistry::default();
        for runner_type in [
            RunnerType::Iteration,
            RunnerType::Duration,
            RunnerType::IterationIpc,
        ] {
            let policy = registry
                .create(&RunnerConfig::new(runner_type.name()))
                .unwrap();
            assert_eq!(policy.runner_type(), runner_type);
        }
    }

    #[test]
    fn integral_numbers_become_integers() {
        assert_eq!(number_value(64.0), json!(64));
        assert_eq!(number_value(-3.0), json!(-3));
        assert_eq!(number_value(0.5), json!(0.5));
    }
}
