use crate::config::RunnerConfig;
use crate::error::{ConfigError, WorkerError};
use crate::policy::{number_value, IterationPolicy, RunnerType};
use crate::scenario::ScenarioOutcome;
use crate::worker::{append_error, IterationOutcome, LoopExit, Worker};
use serde_json::Value;

/// Upper bound on scenario runs in one bisection.
pub const MAX_SEARCH_ATTEMPTS: u32 = 10;
/// Until a ceiling is found, a sustained rate raises the ceiling to this multiple of itself.
const CEILING_RAISE_FACTOR: f64 = 1.5;
/// An achieved rate below this fraction of the requested one means the sender is the limit.
const SENDER_LIMIT_RATIO: f64 = 2.0 / 3.0;

/// Binary search for the highest rate the system under test sustains without an SLA violation.
///
/// Each bisection writes the current ceiling into the scenario's rate option and runs it. An SLA
/// violation lowers the ceiling to the achieved rate, anything else raises the floor to it. One
/// record is emitted per bisection, for the best sample found.
#[derive(Debug)]
pub struct AdaptiveSearch {
    iterations: u64,
    initial_rate: f64,
    delta: f64,
    rate_option: String,
    achieved_key: String,
}

pub(crate) fn build(config: &RunnerConfig) -> Result<Box<dyn IterationPolicy>, ConfigError> {
    let initial_rate = positive(config.initial_rate, "initial_rate")?;
    let delta = positive(config.delta, "delta")?;

    Ok(Box::new(AdaptiveSearch {
        iterations: config.iterations,
        initial_rate,
        delta,
        rate_option: config.rate_option.clone(),
        achieved_key: config.achieved_key.clone(),
    }))
}

fn positive(value: Option<f64>, field: &'static str) -> Result<f64, ConfigError> {
    let value = value.ok_or(ConfigError::MissingField {
        runner: RunnerType::Search,
        field,
    })?;

    if !(value.is_finite() && value > 0.0) {
        return Err(ConfigError::NotPositive { field, value });
    }

    Ok(value)
}

#[derive(Debug)]
struct Bisection {
    search_min: f64,
    search_max: f64,
    attempts: u32,
    sample: Option<IterationOutcome>,
    aborted: bool,
}

impl AdaptiveSearch {
    fn bisect(
        &self,
        worker: &mut Worker,
        search_min: f64,
        search_max: f64,
    ) -> Result<Bisection, WorkerError> {
        let mut bisection = Bisection {
            search_min,
            search_max,
            attempts: 0,
            sample: None,
            aborted: false,
        };
        let mut ceiling_found = false;
        let mut best: Option<IterationOutcome> = None;
        let mut last: Option<IterationOutcome> = None;
        let mut failure: Option<IterationOutcome> = None;

        loop {
            if worker.abort_requested() {
                bisection.aborted = true;
                break;
            }

            if bisection.search_max - bisection.search_min < self.delta
                || bisection.search_max <= bisection.search_min
                || bisection.attempts >= MAX_SEARCH_ATTEMPTS
            {
                break;
            }

            if bisection.attempts > 0 {
                worker.wait_interval();
            }
            bisection.attempts += 1;

            let requested = bisection.search_max;
            worker
                .options_mut()
                .insert(self.rate_option.clone(), number_value(requested));

            let (data, outcome) = worker.call_run();
            let achieved = data
                .get(&self.achieved_key)
                .and_then(Value::as_f64)
                .unwrap_or(requested);

            match outcome {
                ScenarioOutcome::SlaViolation(msg) => {
                    log::debug!(
                        "Runner {} rate {} too high, achieved {}: {}",
                        worker.runner_id(),
                        requested,
                        achieved,
                        msg
                    );
                    bisection.search_max = achieved;
                    ceiling_found = true;
                    last = Some(IterationOutcome {
                        data,
                        output: None,
                        errors: msg,
                        stop: false,
                    });
                }
                ScenarioOutcome::Completed(output) => {
                    log::debug!(
                        "Runner {} rate {} sustained, achieved {}",
                        worker.runner_id(),
                        requested,
                        achieved
                    );
                    bisection.search_min = achieved;
                    if achieved < requested * SENDER_LIMIT_RATIO {
                        bisection.search_max = achieved;
                    } else if !ceiling_found {
                        bisection.search_max = achieved * CEILING_RAISE_FACTOR;
                    }
                    best = Some(IterationOutcome {
                        data,
                        output,
                        errors: String::new(),
                        stop: false,
                    });
                }
                fault @ ScenarioOutcome::Fault(_) => {
                    failure = Some(worker.settle(data, fault)?);
                    break;
                }
            }
        }

        bisection.sample = match (best.or(last), failure) {
            (Some(mut sample), Some(failure)) => {
                if !failure.errors.is_empty() {
                    append_error(&mut sample.errors, failure.errors);
                }
                sample.stop |= failure.stop;
                Some(sample)
            }
            (sample, failure) => sample.or(failure),
        };

        Ok(bisection)
    }
}

impl IterationPolicy for AdaptiveSearch {
    fn runner_type(&self) -> RunnerType {
        RunnerType::Search
    }

    fn run(&mut self, worker: &mut Worker) -> Result<LoopExit, WorkerError> {
        let mut search_min = 0.0;

        for round in 1..=self.iterations {
            if worker.abort_requested() {
                return Ok(LoopExit::Aborted);
            }

            let bisection = self.bisect(worker, search_min, self.initial_rate)?;
            log::info!(
                "Runner {} search round {} settled on [{}, {}] after {} attempts",
                worker.runner_id(),
                round,
                bisection.search_min,
                bisection.search_max,
                bisection.attempts
            );

            let mut stop = false;
            if let Some(mut sample) = bisection.sample {
                sample
                    .data
                    .insert("search_min".to_string(), number_value(bisection.search_min));
                sample
                    .data
                    .insert("search_max".to_string(), number_value(bisection.search_max));
                sample
                    .data
                    .insert("attempts".to_string(), Value::from(bisection.attempts));
                stop = worker.finish_iteration(sample).stop;
            }

            if bisection.aborted {
                return Ok(LoopExit::Aborted);
            }

            if stop {
                break;
            }

            search_min = bisection.search_min / 2.0;
        }

        Ok(LoopExit::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needs_positive_rate_and_delta() {
        let mut config = RunnerConfig::new("Search");
        assert!(matches!(
            build(&config).err(),
            Some(ConfigError::MissingField {
                field: "initial_rate",
                ..
            })
        ));

        config.initial_rate = Some(1000.0);
        config.delta = Some(0.0);
        assert!(matches!(
            build(&config).err(),
            Some(ConfigError::NotPositive { field: "delta", .. })
        ));

        config.delta = Some(10.0);
        assert_eq!(build(&config).unwrap().runner_type(), RunnerType::Search);
    }
}
