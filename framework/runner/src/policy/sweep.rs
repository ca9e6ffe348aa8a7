use crate::config::{IterType, RangeSpec, RunnerConfig};
use crate::error::{ConfigError, WorkerError};
use crate::policy::{number_value, IterationPolicy, RunnerType};
use crate::worker::{LoopExit, Worker};
use itertools::Itertools;
use serde_json::Value;
use std::ops::Range;

type Assignment = Vec<(String, Value)>;

#[derive(Debug)]
enum SweepPlan {
    /// Values of every iterator, generated as the sweep goes
    Arithmetic {
        iter_type: IterType,
        ranges: Vec<(String, RangeValues)>,
    },
    /// Every assignment is known up front
    Fixed(Vec<Assignment>),
    /// The option's value at run time goes first, then the configured steps
    Stepping { option: String, steps: Vec<Value> },
}

/// Run the scenario once per parameter assignment, writing the assignment into the scenario
/// options before each run.
///
/// Backs the `Arithmetic`, `Sequence` and `Stepping` runner types.
#[derive(Debug)]
pub struct ParameterSweep {
    runner_type: RunnerType,
    plan: SweepPlan,
}

impl ParameterSweep {
    fn assignments<'a>(&'a self, worker: &Worker) -> Box<dyn Iterator<Item = Assignment> + 'a> {
        match &self.plan {
            SweepPlan::Arithmetic { iter_type, ranges } => {
                arithmetic_assignments(*iter_type, ranges)
            }
            SweepPlan::Fixed(assignments) => Box::new(assignments.iter().cloned()),
            SweepPlan::Stepping { option, steps } => Box::new(
                worker
                    .options()
                    .get(option)
                    .cloned()
                    .into_iter()
                    .chain(steps.iter().cloned())
                    .map(|value| vec![(option.clone(), value)])
                    .collect::<Vec<_>>()
                    .into_iter(),
            ),
        }
    }
}

/// The values of a [RangeSpec], computed on demand.
#[derive(Debug, Clone)]
pub struct RangeValues {
    start: f64,
    step: f64,
    indexes: Range<usize>,
}

impl RangeValues {
    /// The `i`th value of the whole range, whatever has been consumed so far.
    fn value(&self, i: usize) -> Value {
        number_value(self.start + self.step * i as f64)
    }
}

impl Iterator for RangeValues {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        self.indexes.next().map(|i| self.value(i))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.indexes.size_hint()
    }
}

impl ExactSizeIterator for RangeValues {}

/// Expand a range, inclusive of `stop`, with the direction taken from `start` and `stop`.
pub fn range_values(spec: &RangeSpec) -> Result<RangeValues, ConfigError> {
    if !(spec.start.is_finite() && spec.stop.is_finite() && spec.step.is_finite()) {
        return Err(ConfigError::NonFiniteRange {
            name: spec.name.clone(),
        });
    }

    if spec.step == 0.0 {
        return Err(ConfigError::ZeroStep {
            name: spec.name.clone(),
        });
    }

    let magnitude = spec.step.abs();
    let direction = if spec.start > spec.stop { -1.0 } else { 1.0 };
    // Tolerate rounding so a stop that lands on a step boundary is included
    let steps = ((spec.stop - spec.start).abs() / magnitude + 1e-9).floor();
    let count = Some(steps)
        .filter(|steps| *steps < MAX_RANGE_STEPS)
        .and_then(|steps| usize::try_from(steps as u64 + 1).ok())
        .ok_or_else(|| ConfigError::RangeTooLarge {
            name: spec.name.clone(),
        })?;

    Ok(RangeValues {
        start: spec.start,
        step: direction * magnitude,
        indexes: 0..count,
    })
}

/// Step counts from here on are no longer exact in an `f64`.
const MAX_RANGE_STEPS: f64 = (1u64 << 53) as f64;

/// Every assignment of an `Arithmetic` sweep, generated lazily in sweep order.
fn arithmetic_assignments(
    iter_type: IterType,
    ranges: &[(String, RangeValues)],
) -> Box<dyn Iterator<Item = Assignment> + '_> {
    match iter_type {
        IterType::NestedForLoops => Box::new(
            ranges
                .iter()
                .map(|(name, values)| values.clone().map(move |value| (name.clone(), value)))
                .multi_cartesian_product(),
        ),
        IterType::TupleLoops => {
            let len = ranges
                .iter()
                .map(|(_, values)| values.len())
                .min()
                .unwrap_or_default();
            Box::new((0..len).map(move |i| {
                ranges
                    .iter()
                    .map(|(name, values)| (name.clone(), values.value(i)))
                    .collect()
            }))
        }
    }
}

fn arithmetic_ranges(config: &RunnerConfig) -> Result<Vec<(String, RangeValues)>, ConfigError> {
    if config.iterators.is_empty() {
        return Err(ConfigError::NoIterators(RunnerType::Arithmetic));
    }

    config
        .iterators
        .iter()
        .map(|spec| Ok((spec.name.clone(), range_values(spec)?)))
        .collect()
}

pub(crate) fn build_arithmetic(
    config: &RunnerConfig,
) -> Result<Box<dyn IterationPolicy>, ConfigError> {
    Ok(Box::new(ParameterSweep {
        runner_type: RunnerType::Arithmetic,
        plan: SweepPlan::Arithmetic {
            iter_type: config.iter_type,
            ranges: arithmetic_ranges(config)?,
        },
    }))
}

pub(crate) fn build_sequence(
    config: &RunnerConfig,
) -> Result<Box<dyn IterationPolicy>, ConfigError> {
    let option = option_name(config, RunnerType::Sequence)?;

    Ok(Box::new(ParameterSweep {
        runner_type: RunnerType::Sequence,
        plan: SweepPlan::Fixed(
            config
                .sequence
                .iter()
                .map(|value| vec![(option.clone(), value.clone())])
                .collect(),
        ),
    }))
}

pub(crate) fn build_stepping(
    config: &RunnerConfig,
) -> Result<Box<dyn IterationPolicy>, ConfigError> {
    Ok(Box::new(ParameterSweep {
        runner_type: RunnerType::Stepping,
        plan: SweepPlan::Stepping {
            option: option_name(config, RunnerType::Stepping)?,
            steps: config.steps.clone(),
        },
    }))
}

fn option_name(config: &RunnerConfig, runner: RunnerType) -> Result<String, ConfigError> {
    config
        .scenario_option_name
        .clone()
        .ok_or(ConfigError::MissingField {
            runner,
            field: "scenario_option_name",
        })
}

impl IterationPolicy for ParameterSweep {
    fn runner_type(&self) -> RunnerType {
        self.runner_type
    }

    fn run(&mut self, worker: &mut Worker) -> Result<LoopExit, WorkerError> {
        for assignment in self.assignments(worker) {
            if worker.abort_requested() {
                return Ok(LoopExit::Aborted);
            }

            log::debug!("Runner {} sweeping to {:?}", worker.runner_id(), assignment);
            for (name, value) in assignment {
                worker.options_mut().insert(name, value);
            }

            if worker.iterate()?.stop {
                break;
            }
        }

        Ok(LoopExit::Completed)
    }
}
