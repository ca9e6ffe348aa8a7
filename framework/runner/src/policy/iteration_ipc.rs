use crate::config::RunnerConfig;
use crate::error::{ConfigError, WorkerError};
use crate::policy::{IterationPolicy, RunnerType};
use crate::scenario::ScenarioOutcome;
use crate::worker::{LoopExit, Worker};
use anyhow::anyhow;
use serde_json::json;
use std::time::Duration;
use yardstick_messaging::prelude::*;
use yardstick_result_model::RecordData;

/// Leads the recorded error of an iteration whose collaborators did not report in time.
pub const BARRIER_TIMEOUT_ERROR: &str = "barrier timeout";

/// Run the scenario a fixed number of times, in lock step with collaborator processes.
///
/// Every iteration is announced on the runner topic, then the runner waits until each
/// collaborator returned by the scenario's setup has reported the iteration done before running
/// the scenario. A collaborator that does not report in time fails that iteration.
#[derive(Debug)]
pub struct IpcSynchronized {
    iterations: u64,
    timeout: Duration,
    poll_interval: Duration,
}

pub(crate) fn build(config: &RunnerConfig) -> Result<Box<dyn IterationPolicy>, ConfigError> {
    Ok(Box::new(IpcSynchronized {
        iterations: config.iterations,
        timeout: config.ipc_timeout()?,
        poll_interval: config.poll_interval()?,
    }))
}

fn notify(bus: &dyn NotificationBus, runner_id: u32, method: &str, iteration: u64) {
    match RunnerPayload::new(PAYLOAD_VERSION, json!({ "iteration": iteration })).to_fields() {
        Ok(fields) => bus.publish(TOPIC_RUNNER, MessageContext::new(runner_id), method, fields),
        Err(e) => log::error!("Failed to build {} notification: {}", method, e),
    }
}

impl IterationPolicy for IpcSynchronized {
    fn runner_type(&self) -> RunnerType {
        RunnerType::IterationIpc
    }

    fn run(&mut self, worker: &mut Worker) -> Result<LoopExit, WorkerError> {
        if worker.collaborators().is_empty() {
            return Err(WorkerError::NoCollaborators);
        }

        let bus = worker
            .bus()
            .cloned()
            .ok_or(WorkerError::NoNotificationBus)?;
        let mut barrier =
            IterationBarrier::subscribe(bus.as_ref(), worker.collaborators(), self.iterations)
                .map_err(WorkerError::Subscribe)?;

        loop {
            if worker.abort_requested() {
                return Ok(LoopExit::Aborted);
            }

            let index = worker.sequence();
            if index > self.iterations {
                return Ok(LoopExit::Completed);
            }

            notify(
                bus.as_ref(),
                worker.runner_id(),
                RUNNER_METHOD_START_ITERATION,
                index,
            );

            let waited = wait_until(
                || barrier.check_iteration_status(index),
                self.timeout,
                self.poll_interval,
                worker.abort_listener(),
            );

            let iteration = match waited {
                Ok(()) => worker.iterate()?,
                Err(WaitError::Aborted(_)) => return Ok(LoopExit::Aborted),
                Err(WaitError::Timeout(e)) => {
                    log::error!(
                        "Runner {} gave up waiting for collaborators {:?} in iteration {}",
                        worker.runner_id(),
                        worker.collaborators(),
                        index
                    );
                    let fault = anyhow!(e).context(format!(
                        "{}: collaborators {:?} did not report iteration {}",
                        BARRIER_TIMEOUT_ERROR,
                        worker.collaborators(),
                        index
                    ));
                    let outcome =
                        worker.settle(RecordData::new(), ScenarioOutcome::Fault(fault))?;
                    worker.finish_iteration(outcome)
                }
            };

            notify(
                bus.as_ref(),
                worker.runner_id(),
                RUNNER_METHOD_STOP_ITERATION,
                index,
            );

            if iteration.stop {
                return Ok(LoopExit::Completed);
            }
        }
    }
}
