use crate::config::{RunStep, ScenarioConfig, SlaAction};
use crate::error::WorkerError;
use crate::executor::Executor;
use crate::policy::IterationPolicy;
use crate::scenario::{Scenario, ScenarioOutcome};
use crate::sla::{classify, Disposition, FailureKind};
use anyhow::Context;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Sender;
use yardstick_core::prelude::AbortListener;
use yardstick_messaging::prelude::NotificationBus;
use yardstick_output::ResultSender;
use yardstick_result_model::{RecordData, ResultRecord};

/// How a worker ended. Fatal endings have a non-zero exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Completed,
    Aborted,
    SlaAssertion,
    SetupFailed,
    TeardownFailed,
    Panicked,
}

impl WorkerStatus {
    pub fn exit_code(&self) -> i32 {
        match self {
            WorkerStatus::Completed | WorkerStatus::Aborted => 0,
            WorkerStatus::SlaAssertion => 1,
            WorkerStatus::SetupFailed => 2,
            WorkerStatus::TeardownFailed => 3,
            WorkerStatus::Panicked => 4,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code() == 0
    }
}

/// Why a policy's run loop returned normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Completed,
    Aborted,
}

/// A scenario run after the SLA action has been applied.
#[derive(Debug)]
pub struct IterationOutcome {
    pub data: RecordData,
    pub output: Option<RecordData>,
    pub errors: String,
    /// The failure means the runner must not iterate again
    pub stop: bool,
}

/// What a policy needs to know after an iteration's record has been emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmittedIteration {
    pub sequence: u64,
    pub stop: bool,
}

/// Everything a worker shares with the runner that spawned it.
pub(crate) struct WorkerChannels {
    pub results: ResultSender,
    pub output: Sender<RecordData>,
    /// How long to wait for room on a full output queue
    pub output_timeout: Duration,
    pub abort: AbortListener,
    pub executor: Arc<Executor>,
    pub bus: Option<Arc<dyn NotificationBus>>,
}

/// The per-runner state an iteration policy drives.
///
/// Owns the scenario and its config for the lifetime of one runner.
pub struct Worker {
    runner_id: u32,
    scenario: Box<dyn Scenario>,
    scenario_cfg: ScenarioConfig,
    sla_action: SlaAction,
    interval: Duration,
    channels: WorkerChannels,
    next_sequence: u64,
    collaborators: Vec<u32>,
}

impl Worker {
    pub(crate) fn new(
        runner_id: u32,
        scenario: Box<dyn Scenario>,
        scenario_cfg: ScenarioConfig,
        interval: Duration,
        channels: WorkerChannels,
    ) -> Self {
        Self {
            runner_id,
            scenario,
            sla_action: scenario_cfg.sla_action(),
            scenario_cfg,
            interval,
            channels,
            next_sequence: 1,
            collaborators: Vec::new(),
        }
    }

    pub fn runner_id(&self) -> u32 {
        self.runner_id
    }

    /// The sequence number the next emitted record will get.
    pub fn sequence(&self) -> u64 {
        self.next_sequence
    }

    pub fn abort_requested(&self) -> bool {
        self.channels.abort.should_abort()
    }

    pub fn abort_listener(&self) -> &AbortListener {
        &self.channels.abort
    }

    pub fn options(&self) -> &RecordData {
        &self.scenario_cfg.options
    }

    pub fn options_mut(&mut self) -> &mut RecordData {
        &mut self.scenario_cfg.options
    }

    pub fn sla_action(&self) -> SlaAction {
        self.sla_action
    }

    /// Collaborator process ids returned by the scenario's setup.
    pub fn collaborators(&self) -> &[u32] {
        &self.collaborators
    }

    pub fn bus(&self) -> Option<&Arc<dyn NotificationBus>> {
        self.channels.bus.as_ref()
    }

    /// Call the scenario's `run` with a fresh data map.
    pub fn call_run(&mut self) -> (RecordData, ScenarioOutcome) {
        let mut data = RecordData::new();
        let outcome = self.scenario.run(&self.scenario_cfg.options, &mut data);
        (data, outcome)
    }

    /// Apply the SLA action to a scenario outcome.
    pub fn settle(
        &self,
        data: RecordData,
        outcome: ScenarioOutcome,
    ) -> Result<IterationOutcome, WorkerError> {
        let (output, failure) = match outcome {
            ScenarioOutcome::Completed(output) => (output, None),
            ScenarioOutcome::SlaViolation(msg) => (None, Some((FailureKind::SlaViolation, msg))),
            ScenarioOutcome::Fault(e) => {
                log::error!("Runner {} scenario run failed: {:?}", self.runner_id, e);
                (None, Some((FailureKind::Defect, format!("{e:#}"))))
            }
        };

        let mut settled = IterationOutcome {
            data,
            output,
            errors: String::new(),
            stop: false,
        };

        if let Some((kind, errors)) = failure {
            match classify(self.sla_action, kind) {
                Disposition::Fatal => return Err(WorkerError::SlaAssertion(errors)),
                Disposition::Record => {
                    if kind == FailureKind::SlaViolation {
                        log::warn!("Runner {} SLA violation: {}", self.runner_id, errors);
                    }
                    settled.errors = errors;
                }
                Disposition::RecordAndStop => {
                    settled.errors = errors;
                    settled.stop = true;
                }
                Disposition::Ignore => {}
            }
        }

        Ok(settled)
    }

    pub fn execute(&mut self) -> Result<IterationOutcome, WorkerError> {
        let (data, outcome) = self.call_run();
        self.settle(data, outcome)
    }

    /// One full iteration: run the scenario, forward its output, wait the configured interval and
    /// emit the record.
    pub fn iterate(&mut self) -> Result<EmittedIteration, WorkerError> {
        log::debug!("runner={} seq={} START", self.runner_id, self.next_sequence);
        let outcome = self.execute()?;
        Ok(self.finish_iteration(outcome))
    }

    /// Complete an iteration whose scenario step has already been settled.
    pub fn finish_iteration(&mut self, mut outcome: IterationOutcome) -> EmittedIteration {
        if let Some(output) = outcome.output.take().filter(|output| !output.is_empty()) {
            if let Err(e) = self.push_output(output) {
                log::error!("Runner {} failed to push KPI output: {:?}", self.runner_id, e);
                append_error(&mut outcome.errors, format!("{e:#}"));
            }
        }

        self.wait_interval();

        let sequence = self.emit(outcome.data, outcome.errors);
        EmittedIteration {
            sequence,
            stop: outcome.stop,
        }
    }

    pub fn wait_interval(&self) {
        if !self.interval.is_zero() {
            std::thread::sleep(self.interval);
        }
    }

    /// Send a record for the next sequence number to the result sink.
    pub fn emit(&mut self, data: RecordData, errors: String) -> u64 {
        let sequence = self.next_sequence;
        self.channels
            .results
            .send(ResultRecord::new(self.runner_id, sequence, data, errors));
        self.next_sequence += 1;

        log::debug!("runner={} seq={} END", self.runner_id, sequence);
        sequence
    }

    /// Push scenario output to the KPI queue, waiting up to the runner's `output_timeout` for
    /// room.
    pub fn push_output(&self, output: RecordData) -> anyhow::Result<()> {
        let sender = self.channels.output.clone();
        let timeout = self.channels.output_timeout;
        self.channels.executor.execute_in_place(
            async move {
                tokio::time::timeout(timeout, sender.send(output))
                    .await
                    .context("KPI output queue is full")?
                    .map_err(|_| anyhow::anyhow!("KPI output queue is closed"))
            },
            &self.channels.abort,
        )
    }
}

pub(crate) fn append_error(errors: &mut String, error: String) {
    if !errors.is_empty() {
        errors.push('\n');
    }
    errors.push_str(&error);
}

/// Run a policy against a worker's scenario: setup, the policy's loop, then teardown.
///
/// Teardown is attempted after the loop however it ended, including fatal SLA assertions, aborts
/// and panics. A setup failure skips both the loop and teardown.
pub(crate) fn run_worker(
    mut policy: Box<dyn IterationPolicy>,
    mut worker: Worker,
    run_step: RunStep,
) -> WorkerStatus {
    let runner_id = worker.runner_id;
    log::info!(
        "Runner {} starting {} runner, run_step={}",
        runner_id,
        policy.runner_type(),
        run_step
    );

    if run_step.setup {
        match worker.scenario.setup() {
            Ok(collaborators) => worker.collaborators = collaborators.unwrap_or_default(),
            Err(e) => {
                log::error!("Scenario setup failed for runner {}: {:?}", runner_id, e);
                return WorkerStatus::SetupFailed;
            }
        }
    }

    let mut status = WorkerStatus::Completed;
    if run_step.run {
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| policy.run(&mut worker)));
        status = match result {
            Ok(Ok(LoopExit::Completed)) => WorkerStatus::Completed,
            Ok(Ok(LoopExit::Aborted)) => {
                log::info!("Runner {} aborted", runner_id);
                WorkerStatus::Aborted
            }
            Ok(Err(e)) => {
                log::error!("Runner {} stopped: {}", runner_id, e);
                if e.is_setup_error() {
                    WorkerStatus::SetupFailed
                } else {
                    WorkerStatus::SlaAssertion
                }
            }
            Err(_) => {
                log::error!("Runner {} panicked during its run loop", runner_id);
                WorkerStatus::Panicked
            }
        };
    }

    if run_step.teardown {
        if let Err(e) = worker.scenario.teardown() {
            log::error!("Scenario teardown failed for runner {}: {:?}", runner_id, e);
            return WorkerStatus::TeardownFailed;
        }
    }

    log::info!("Runner {} finished: {:?}", runner_id, status);
    status
}
