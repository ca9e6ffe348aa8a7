use crate::config::ScenarioConfig;
use crate::error::RegistryError;
use crate::types::YardstickResult;
use std::collections::HashMap;
use yardstick_core::prelude::SlaViolationError;
use yardstick_result_model::RecordData;

/// The unit of work being benchmarked.
///
/// A runner calls `setup` once, `run` once per iteration and `teardown` once, in that order,
/// from a single worker thread.
pub trait Scenario: Send {
    /// Prepare the scenario.
    ///
    /// Scenarios driven by an `IterationIPC` runner return the process ids of the collaborators,
    /// for example traffic generators, whose iteration reports the runner waits for.
    fn setup(&mut self) -> YardstickResult<Option<Vec<u32>>> {
        Ok(None)
    }

    /// Run one iteration.
    ///
    /// `options` holds the current parameters, including any a sweeping runner wrote for this
    /// iteration. Measurements go into `data`, which becomes the iteration's record. Anything
    /// returned in [ScenarioOutcome::Completed] is pushed to the runner's KPI output queue.
    fn run(&mut self, options: &RecordData, data: &mut RecordData) -> ScenarioOutcome;

    fn teardown(&mut self) -> YardstickResult<()> {
        Ok(())
    }
}

/// The result of one scenario run.
#[derive(Debug)]
pub enum ScenarioOutcome {
    Completed(Option<RecordData>),
    /// A measured value breached a configured threshold
    SlaViolation(String),
    /// Any other failure
    Fault(anyhow::Error),
}

impl ScenarioOutcome {
    pub fn ok() -> Self {
        ScenarioOutcome::Completed(None)
    }

    /// Convert a fallible run, treating a [SlaViolationError] anywhere in the error chain as an
    /// SLA violation.
    pub fn from_result(result: YardstickResult<Option<RecordData>>) -> Self {
        match result {
            Ok(output) => ScenarioOutcome::Completed(output),
            Err(e) => match e.chain().find_map(|cause| cause.downcast_ref::<SlaViolationError>()) {
                Some(violation) => ScenarioOutcome::SlaViolation(violation.to_string()),
                None => ScenarioOutcome::Fault(e),
            },
        }
    }
}

impl From<YardstickResult<Option<RecordData>>> for ScenarioOutcome {
    fn from(value: YardstickResult<Option<RecordData>>) -> Self {
        ScenarioOutcome::from_result(value)
    }
}

pub type ScenarioFactory =
    Box<dyn Fn(&ScenarioConfig) -> YardstickResult<Box<dyn Scenario>> + Send + Sync>;

/// Maps scenario type names to the code that builds them.
#[derive(Default)]
pub struct ScenarioRegistry {
    factories: HashMap<String, ScenarioFactory>,
}

impl ScenarioRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scenario type. Names must be unique.
    pub fn register<F>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn(&ScenarioConfig) -> YardstickResult<Box<dyn Scenario>> + Send + Sync + 'static,
    {
        let previous = self.factories.insert(name.to_string(), Box::new(factory));

        if previous.is_some() {
            panic!("Scenario [{}] is already registered", name);
        }

        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn create(
        &self,
        name: &str,
        config: &ScenarioConfig,
    ) -> YardstickResult<Box<dyn Scenario>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| RegistryError::UnknownScenarioType(name.to_string()))?;

        factory(config)
    }
}
