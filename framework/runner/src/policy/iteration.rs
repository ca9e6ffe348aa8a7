use crate::config::RunnerConfig;
use crate::error::{ConfigError, WorkerError};
use crate::policy::{IterationPolicy, RunnerType};
use crate::worker::{LoopExit, Worker};

/// Run the scenario a fixed number of times.
#[derive(Debug)]
pub struct FixedCount {
    iterations: u64,
}

impl FixedCount {
    pub fn new(iterations: u64) -> Self {
        Self { iterations }
    }
}

pub(crate) fn build(config: &RunnerConfig) -> Result<Box<dyn IterationPolicy>, ConfigError> {
    Ok(Box::new(FixedCount::new(config.iterations)))
}

impl IterationPolicy for FixedCount {
    fn runner_type(&self) -> RunnerType {
        RunnerType::Iteration
    }

    fn run(&mut self, worker: &mut Worker) -> Result<LoopExit, WorkerError> {
        loop {
            if worker.abort_requested() {
                return Ok(LoopExit::Aborted);
            }

            if worker.sequence() > self.iterations {
                return Ok(LoopExit::Completed);
            }

            if worker.iterate()?.stop {
                return Ok(LoopExit::Completed);
            }
        }
    }
}
