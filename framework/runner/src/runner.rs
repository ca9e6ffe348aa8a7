use crate::config::{RunnerConfig, ScenarioConfig};
use crate::executor::Executor;
use crate::policy::{IterationPolicy, RunnerType};
use crate::scenario::ScenarioRegistry;
use crate::worker::{run_worker, Worker, WorkerChannels, WorkerStatus};
use anyhow::Context;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc::{Receiver, Sender};
use yardstick_core::prelude::{AbortHandle, AbortListener};
use yardstick_messaging::prelude::NotificationBus;
use yardstick_output::ResultSender;
use yardstick_result_model::RecordData;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// Created but not started
    Created,
    /// Started and not yet joined
    Running,
    Completed,
    Aborted,
    Failed,
}

/// Shared resources a [crate::manager::RunnerManager] hands to each runner it creates.
pub(crate) struct RunnerResources {
    pub results: ResultSender,
    pub scenarios: Arc<ScenarioRegistry>,
    pub executor: Arc<Executor>,
    pub bus: Option<Arc<dyn NotificationBus>>,
}

/// One iteration policy driving one scenario on its own worker thread.
///
/// Get one from [crate::manager::RunnerManager::get] and give it back with
/// [crate::manager::RunnerManager::release] once done with it.
pub struct Runner {
    id: u32,
    config: RunnerConfig,
    runner_type: RunnerType,
    policy: Option<Box<dyn IterationPolicy>>,
    resources: RunnerResources,
    abort: AbortHandle,
    output_sender: Sender<RecordData>,
    output_receiver: Receiver<RecordData>,
    worker: Option<JoinHandle<WorkerStatus>>,
    status: Option<WorkerStatus>,
}

impl Runner {
    pub(crate) fn new(
        id: u32,
        config: RunnerConfig,
        policy: Box<dyn IterationPolicy>,
        resources: RunnerResources,
        abort: AbortHandle,
        output_capacity: usize,
    ) -> Self {
        let (output_sender, output_receiver) = tokio::sync::mpsc::channel(output_capacity);

        Self {
            id,
            config,
            runner_type: policy.runner_type(),
            policy: Some(policy),
            resources,
            abort,
            output_sender,
            output_receiver,
            worker: None,
            status: None,
        }
    }

    /// Identifies this runner's records in the result stream.
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn runner_type(&self) -> RunnerType {
        self.runner_type
    }

    pub fn state(&self) -> RunnerState {
        match (self.status, &self.worker) {
            (Some(WorkerStatus::Completed), _) => RunnerState::Completed,
            (Some(WorkerStatus::Aborted), _) => RunnerState::Aborted,
            (Some(_), _) => RunnerState::Failed,
            (None, Some(_)) => RunnerState::Running,
            (None, None) => RunnerState::Created,
        }
    }

    /// Create the scenario and start the worker thread.
    ///
    /// The scenario config is moved into the worker, which stamps it with the scenario type.
    pub fn run(
        &mut self,
        scenario_type: &str,
        mut scenario_cfg: ScenarioConfig,
    ) -> anyhow::Result<()> {
        if self.policy.is_none() {
            anyhow::bail!("Runner {} has already been started", self.id);
        }

        let interval = self.config.interval()?;
        let output_timeout = self.config.output_timeout()?;
        let scenario = self
            .resources
            .scenarios
            .create(scenario_type, &scenario_cfg)
            .with_context(|| format!("Failed to create scenario {}", scenario_type))?;
        scenario_cfg.scenario_type = Some(scenario_type.to_string());

        let policy = self.policy.take().context("Runner policy is missing")?;
        let worker = Worker::new(
            self.id,
            scenario,
            scenario_cfg,
            interval,
            WorkerChannels {
                results: self.resources.results.clone(),
                output: self.output_sender.clone(),
                output_timeout,
                abort: self.abort.new_listener(),
                executor: self.resources.executor.clone(),
                bus: self.resources.bus.clone(),
            },
        );

        let run_step = self.config.run_step;
        let handle = std::thread::Builder::new()
            .name(format!("runner-{}", self.id))
            .spawn(move || run_worker(policy, worker, run_step))
            .context("Failed to spawn runner thread")?;

        log::info!(
            "Started {} runner {} for scenario {}",
            self.runner_type,
            self.id,
            scenario_type
        );
        self.worker = Some(handle);

        Ok(())
    }

    /// Ask the worker to stop after its current iteration.
    pub fn abort(&self) {
        self.abort.abort();
    }

    pub fn abort_listener(&self) -> AbortListener {
        self.abort.new_listener()
    }

    /// Whether the worker has exited. A runner that was never started is not finished.
    pub fn is_finished(&self) -> bool {
        self.status.is_some()
            || self
                .worker
                .as_ref()
                .is_some_and(|handle| handle.is_finished())
    }

    /// Block until the worker exits. Joining again returns the same status.
    pub fn join(&mut self) -> anyhow::Result<WorkerStatus> {
        if let Some(status) = self.status {
            return Ok(status);
        }

        let handle = self
            .worker
            .take()
            .with_context(|| format!("Runner {} has not been started", self.id))?;
        let status = handle.join().unwrap_or_else(|e| {
            log::error!("Runner {} worker thread panicked: {:?}", self.id, e);
            WorkerStatus::Panicked
        });

        self.status = Some(status);
        Ok(status)
    }

    /// Take everything the scenario has pushed to the KPI output queue so far.
    pub fn drain_output(&mut self) -> Vec<RecordData> {
        let mut output = Vec::new();
        while let Ok(item) = self.output_receiver.try_recv() {
            output.push(item);
        }
        output
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.take() {
            self.abort.abort();
            if handle.join().is_err() {
                log::error!("Runner {} worker thread panicked", self.id);
            }
        }
    }
}
