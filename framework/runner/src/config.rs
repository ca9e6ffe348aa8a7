use crate::error::ConfigError;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use yardstick_result_model::RecordData;

pub const DEFAULT_INTERVAL_S: f64 = 1.0;
pub const DEFAULT_DURATION_S: f64 = 60.0;
pub const DEFAULT_ITERATIONS: u64 = 1;
pub const DEFAULT_IPC_TIMEOUT_S: f64 = 3600.0;
pub const DEFAULT_POLL_INTERVAL_S: f64 = 0.1;
pub const DEFAULT_RATE_OPTION: &str = "rate";
pub const DEFAULT_ACHIEVED_KEY: &str = "achieved_rate";
pub const DEFAULT_OUTPUT_CAPACITY: usize = 1024;
pub const DEFAULT_OUTPUT_TIMEOUT_S: f64 = 10.0;

/// Iteration policy parameters for one runner.
///
/// Which fields matter depends on `type`, everything else is ignored by that runner type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// The runner type name, resolved against the policy registry when the runner is created
    #[serde(rename = "type")]
    pub runner_type: String,
    /// Seconds to wait after each scenario run
    #[serde(default = "default_interval")]
    pub interval: f64,
    /// Seconds to keep iterating for, `Duration` runners only
    #[serde(default = "default_duration")]
    pub duration: f64,
    /// Number of iterations for `Iteration`, `IterationIPC` and `Search` runners
    #[serde(default = "default_iterations")]
    pub iterations: u64,
    #[serde(default)]
    pub run_step: RunStep,
    /// How `Arithmetic` combines its iterators
    #[serde(default)]
    pub iter_type: IterType,
    /// Ranges swept by `Arithmetic`
    #[serde(default)]
    pub iterators: Vec<RangeSpec>,
    /// Option substituted by `Sequence` and `Stepping`
    #[serde(default)]
    pub scenario_option_name: Option<String>,
    /// Values substituted by `Sequence`
    #[serde(default)]
    pub sequence: Vec<Value>,
    /// Values substituted by `Stepping`, after the option's current value
    #[serde(default)]
    pub steps: Vec<Value>,
    /// Starting rate for `Search`
    #[serde(default)]
    pub initial_rate: Option<f64>,
    /// `Search` stops bisecting once the search window is narrower than this
    #[serde(default)]
    pub delta: Option<f64>,
    /// Option `Search` writes the requested rate into
    #[serde(default = "default_rate_option")]
    pub rate_option: String,
    /// Data key `Search` reads the achieved rate from
    #[serde(default = "default_achieved_key")]
    pub achieved_key: String,
    /// Seconds `IterationIPC` waits for collaborators to report an iteration
    #[serde(default = "default_ipc_timeout")]
    pub timeout: f64,
    /// Seconds between collaborator status checks for `IterationIPC`
    #[serde(default = "default_poll_interval")]
    pub poll_interval: f64,
    /// How many KPI outputs can be queued before the scenario has to wait for them to be drained
    #[serde(default = "default_output_capacity")]
    pub output_capacity: usize,
    /// Seconds to wait for room on a full KPI output queue before failing the iteration's output
    #[serde(default = "default_output_timeout")]
    pub output_timeout: f64,
}

fn default_interval() -> f64 {
    DEFAULT_INTERVAL_S
}

fn default_duration() -> f64 {
    DEFAULT_DURATION_S
}

fn default_iterations() -> u64 {
    DEFAULT_ITERATIONS
}

fn default_rate_option() -> String {
    DEFAULT_RATE_OPTION.to_string()
}

fn default_achieved_key() -> String {
    DEFAULT_ACHIEVED_KEY.to_string()
}

fn default_ipc_timeout() -> f64 {
    DEFAULT_IPC_TIMEOUT_S
}

fn default_poll_interval() -> f64 {
    DEFAULT_POLL_INTERVAL_S
}

fn default_output_capacity() -> usize {
    DEFAULT_OUTPUT_CAPACITY
}

fn default_output_timeout() -> f64 {
    DEFAULT_OUTPUT_TIMEOUT_S
}

impl RunnerConfig {
    pub fn new(runner_type: &str) -> Self {
        Self {
            runner_type: runner_type.to_string(),
            interval: DEFAULT_INTERVAL_S,
            duration: DEFAULT_DURATION_S,
            iterations: DEFAULT_ITERATIONS,
            run_step: RunStep::default(),
            iter_type: IterType::default(),
            iterators: Vec::new(),
            scenario_option_name: None,
            sequence: Vec::new(),
            steps: Vec::new(),
            initial_rate: None,
            delta: None,
            rate_option: default_rate_option(),
            achieved_key: default_achieved_key(),
            timeout: DEFAULT_IPC_TIMEOUT_S,
            poll_interval: DEFAULT_POLL_INTERVAL_S,
            output_capacity: DEFAULT_OUTPUT_CAPACITY,
            output_timeout: DEFAULT_OUTPUT_TIMEOUT_S,
        }
    }

    pub fn with_iterations(mut self, iterations: u64) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_interval(mut self, interval: f64) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_run_step(mut self, run_step: RunStep) -> Self {
        self.run_step = run_step;
        self
    }

    pub fn interval(&self) -> Result<Duration, ConfigError> {
        seconds("interval", self.interval)
    }

    pub fn duration(&self) -> Result<Duration, ConfigError> {
        seconds("duration", self.duration)
    }

    pub fn ipc_timeout(&self) -> Result<Duration, ConfigError> {
        seconds("timeout", self.timeout)
    }

    pub fn poll_interval(&self) -> Result<Duration, ConfigError> {
        seconds("poll_interval", self.poll_interval)
    }

    pub fn output_timeout(&self) -> Result<Duration, ConfigError> {
        seconds("output_timeout", self.output_timeout)
    }

    pub fn output_capacity(&self) -> Result<usize, ConfigError> {
        if self.output_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("output_capacity"));
        }

        Ok(self.output_capacity)
    }
}

fn seconds(field: &'static str, value: f64) -> Result<Duration, ConfigError> {
    if value < 0.0 {
        return Err(ConfigError::InvalidSeconds { field, value });
    }

    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::InvalidSeconds { field, value })
}

/// Which of the scenario's setup, run and teardown steps a runner performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RunStep {
    pub setup: bool,
    pub run: bool,
    pub teardown: bool,
}

impl Default for RunStep {
    fn default() -> Self {
        Self {
            setup: true,
            run: true,
            teardown: true,
        }
    }
}

impl FromStr for RunStep {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut run_step = RunStep {
            setup: false,
            run: false,
            teardown: false,
        };

        for step in s.split(',').map(str::trim).filter(|step| !step.is_empty()) {
            match step {
                "setup" => run_step.setup = true,
                "run" => run_step.run = true,
                "teardown" => run_step.teardown = true,
                _ => return Err(ConfigError::InvalidRunStep(s.to_string())),
            }
        }

        Ok(run_step)
    }
}

impl TryFrom<String> for RunStep {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Display for RunStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let steps = [
            (self.setup, "setup"),
            (self.run, "run"),
            (self.teardown, "teardown"),
        ]
        .into_iter()
        .filter_map(|(enabled, name)| enabled.then_some(name))
        .collect::<Vec<_>>();

        write!(f, "{}", steps.join(","))
    }
}

impl From<RunStep> for String {
    fn from(value: RunStep) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterType {
    /// Every combination of the iterators' values
    #[default]
    NestedForLoops,
    /// The iterators' values zipped together, stopping at the shortest
    TupleLoops,
}

/// A named numeric range, inclusive of `stop`.
///
/// The direction comes from `start` and `stop`, so the sign of `step` does not matter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeSpec {
    pub name: String,
    pub start: f64,
    pub stop: f64,
    pub step: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlaAction {
    /// Stop the runner on the first SLA violation
    Assert,
    /// Record SLA violations and keep iterating
    Monitor,
    /// No SLA configured
    None,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlaConfig {
    #[serde(default)]
    pub action: Option<SlaAction>,
    /// Scenario specific thresholds
    #[serde(flatten)]
    pub thresholds: RecordData,
}

/// Scenario options and SLA for one runner.
///
/// The runner owns its copy. Sweeping runners write the current iteration's values into
/// [ScenarioConfig::options] before every run, which is where the scenario reads them from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub options: RecordData,
    #[serde(default)]
    pub sla: Option<SlaConfig>,
    /// Set by the runner to the scenario type it resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario_type: Option<String>,
}

impl ScenarioConfig {
    pub fn with_options(options: RecordData) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }

    pub fn with_sla(mut self, action: SlaAction) -> Self {
        self.sla = Some(SlaConfig {
            action: Some(action),
            thresholds: RecordData::new(),
        });
        self
    }

    /// The configured SLA action, `assert` if an `sla` block exists without one and `none` if
    /// there is no `sla` block at all.
    pub fn sla_action(&self) -> SlaAction {
        match &self.sla {
            None => SlaAction::None,
            Some(sla) => sla.action.unwrap_or(SlaAction::Assert),
        }
    }
}

/// A task file lists the scenarios to run and how to run each of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFile {
    /// Start every runner before joining any of them
    #[serde(default)]
    pub run_in_parallel: bool,
    pub scenarios: Vec<TaskEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEntry {
    #[serde(rename = "type")]
    pub scenario_type: String,
    pub runner: RunnerConfig,
    #[serde(default)]
    pub options: RecordData,
    #[serde(default)]
    pub sla: Option<SlaConfig>,
}

impl TaskEntry {
    pub fn scenario_config(&self) -> ScenarioConfig {
        ScenarioConfig {
            options: self.options.clone(),
            sla: self.sla.clone(),
            scenario_type: None,
        }
    }
}

impl TaskFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read task file {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse task file {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}
