use crate::config::RunnerConfig;
use crate::error::{ConfigError, WorkerError};
use crate::policy::{IterationPolicy, RunnerType};
use crate::worker::{LoopExit, Worker};
use std::time::{Duration, Instant};

/// Keep running the scenario until the configured duration has passed.
///
/// Elapsed time is checked after each iteration, so the last one can overrun the deadline by up
/// to one scenario run plus the interval.
#[derive(Debug)]
pub struct TimeBound {
    duration: Duration,
}

impl TimeBound {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

pub(crate) fn build(config: &RunnerConfig) -> Result<Box<dyn IterationPolicy>, ConfigError> {
    Ok(Box::new(TimeBound::new(config.duration()?)))
}

impl IterationPolicy for TimeBound {
    fn runner_type(&self) -> RunnerType {
        RunnerType::Duration
    }

    fn run(&mut self, worker: &mut Worker) -> Result<LoopExit, WorkerError> {
        let started = Instant::now();
        loop {
            if worker.abort_requested() {
                return Ok(LoopExit::Aborted);
            }

            let iteration = worker.iterate()?;
            if iteration.stop || started.elapsed() > self.duration {
                log::debug!(
                    "Duration runner {} done after {} iterations",
                    worker.runner_id(),
                    iteration.sequence
                );
                return Ok(LoopExit::Completed);
            }
        }
    }
}
