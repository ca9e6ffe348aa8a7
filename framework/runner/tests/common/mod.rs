#![allow(dead_code)]

use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use yardstick_runner::prelude::*;

/// How many times each lifecycle method of [Scripted] was called, across every instance.
#[derive(Debug, Default, Clone)]
pub struct Calls {
    pub setup: Arc<AtomicUsize>,
    pub run: Arc<AtomicUsize>,
    pub teardown: Arc<AtomicUsize>,
}

impl Calls {
    pub fn setups(&self) -> usize {
        self.setup.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> usize {
        self.run.load(Ordering::SeqCst)
    }

    pub fn teardowns(&self) -> usize {
        self.teardown.load(Ordering::SeqCst)
    }
}

/// A scenario whose behaviour is driven by its options.
///
/// - `start`: initial counter value, incremented and recorded as `my_key` on every run
/// - `violate_on` / `fail_on` / `panic_on`: 1-based run numbers of this instance that breach the
///   SLA, fail or panic
/// - `kpi`: push `{"call": n}` to the KPI output queue on every successful run
/// - `collaborators`: pids returned from setup
/// - `fail_setup` / `fail_teardown`: make those steps fail
pub struct Scripted {
    calls: Calls,
    runs: usize,
    value: i64,
    collaborators: Option<Vec<u32>>,
    fail_setup: bool,
    fail_teardown: bool,
}

impl Scripted {
    pub fn new(calls: Calls, config: &ScenarioConfig) -> Self {
        let options = &config.options;
        Self {
            calls,
            runs: 0,
            value: options.get("start").and_then(Value::as_i64).unwrap_or(0),
            collaborators: options.get("collaborators").and_then(|pids| {
                pids.as_array().map(|pids| {
                    pids.iter()
                        .filter_map(Value::as_u64)
                        .map(|pid| pid as u32)
                        .collect()
                })
            }),
            fail_setup: flag(options, "fail_setup"),
            fail_teardown: flag(options, "fail_teardown"),
        }
    }
}

fn flag(options: &RecordData, key: &str) -> bool {
    options.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn listed(options: &RecordData, key: &str, call: usize) -> bool {
    options
        .get(key)
        .and_then(Value::as_array)
        .is_some_and(|calls| calls.contains(&json!(call)))
}

impl Scenario for Scripted {
    fn setup(&mut self) -> YardstickResult<Option<Vec<u32>>> {
        self.calls.setup.fetch_add(1, Ordering::SeqCst);
        if self.fail_setup {
            anyhow::bail!("setup failed on purpose");
        }
        Ok(self.collaborators.clone())
    }

    fn run(&mut self, options: &RecordData, data: &mut RecordData) -> ScenarioOutcome {
        self.calls.run.fetch_add(1, Ordering::SeqCst);
        self.runs += 1;
        let call = self.runs;
        self.value += 1;
        data.insert("my_key".to_string(), json!(self.value));
        data.insert("options".to_string(), Value::Object(options.clone()));

        if listed(options, "panic_on", call) {
            panic!("run {call} panicked on purpose");
        }
        if listed(options, "violate_on", call) {
            return ScenarioOutcome::SlaViolation(format!("run {call} breached the threshold"));
        }
        if listed(options, "fail_on", call) {
            return ScenarioOutcome::Fault(anyhow::anyhow!("run {call} failed"));
        }

        if flag(options, "kpi") {
            let mut kpi = RecordData::new();
            kpi.insert("call".to_string(), json!(call));
            return ScenarioOutcome::Completed(Some(kpi));
        }

        ScenarioOutcome::ok()
    }

    fn teardown(&mut self) -> YardstickResult<()> {
        self.calls.teardown.fetch_add(1, Ordering::SeqCst);
        if self.fail_teardown {
            anyhow::bail!("teardown failed on purpose");
        }
        Ok(())
    }
}

pub fn registry(calls: &Calls) -> ScenarioRegistry {
    let calls = calls.clone();
    ScenarioRegistry::new().register("Scripted", move |config| {
        Ok(Box::new(Scripted::new(calls.clone(), config)))
    })
}

pub fn options(value: Value) -> RecordData {
    match value {
        Value::Object(options) => options,
        other => panic!("Options must be an object, got {other}"),
    }
}

/// A scratch directory with a result destination inside it.
pub struct Workspace {
    pub dir: TempDir,
    pub results: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let results = dir.path().join("results.jsonl");
        Self { dir, results }
    }

    pub fn records(&self) -> Vec<ResultRecord> {
        load_records(&self.results).unwrap()
    }
}

/// Run one scripted scenario to completion and release it, returning the final status.
pub fn run_scripted(
    workspace: &Workspace,
    calls: &Calls,
    config: RunnerConfig,
    scenario_cfg: ScenarioConfig,
) -> anyhow::Result<WorkerStatus> {
    let manager = RunnerManager::new(&workspace.results, registry(calls))?;
    let mut runner = manager.get(config)?;
    runner.run("Scripted", scenario_cfg)?;
    let status = runner.join()?;
    manager.release(runner)?;
    Ok(status)
}

pub fn sequences(records: &[ResultRecord]) -> Vec<u64> {
    records.iter().map(|record| record.sequence).collect()
}
