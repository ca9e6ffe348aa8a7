mod common;

use common::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use yardstick_runner::prelude::*;

fn iterations(count: u64) -> RunnerConfig {
    RunnerConfig::new("Iteration")
        .with_iterations(count)
        .with_interval(0.0)
}

#[test]
fn fixed_count_records_every_iteration_in_order() -> anyhow::Result<()> {
    let workspace = Workspace::new();
    let calls = Calls::default();

    let status = run_scripted(
        &workspace,
        &calls,
        iterations(3),
        ScenarioConfig::with_options(options(json!({"start": 101}))),
    )?;

    assert_eq!(status, WorkerStatus::Completed);
    let records = workspace.records();
    assert_eq!(sequences(&records), vec![1, 2, 3]);
    assert_eq!(
        records
            .iter()
            .map(|record| record.data["my_key"].clone())
            .collect::<Vec<_>>(),
        vec![json!(102), json!(103), json!(104)]
    );
    assert!(records.iter().all(|record| !record.has_errors()));
    assert!(records.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert_eq!(calls.setups(), 1);
    assert_eq!(calls.teardowns(), 1);

    Ok(())
}

#[test]
fn monitor_records_violations_without_gaps() -> anyhow::Result<()> {
    let workspace = Workspace::new();
    let calls = Calls::default();

    let status = run_scripted(
        &workspace,
        &calls,
        iterations(4),
        ScenarioConfig::with_options(options(json!({"violate_on": [2, 3]})))
            .with_sla(SlaAction::Monitor),
    )?;

    assert_eq!(status, WorkerStatus::Completed);
    let records = workspace.records();
    assert_eq!(sequences(&records), vec![1, 2, 3, 4]);
    assert_eq!(
        records.iter().map(ResultRecord::has_errors).collect::<Vec<_>>(),
        vec![false, true, true, false]
    );
    assert_eq!(records[1].errors, "run 2 breached the threshold");

    Ok(())
}

#[test]
fn monitor_keeps_going_after_a_defect() -> anyhow::Result<()> {
    let workspace = Workspace::new();
    let calls = Calls::default();

    run_scripted(
        &workspace,
        &calls,
        iterations(3),
        ScenarioConfig::with_options(options(json!({"fail_on": [1]}))).with_sla(SlaAction::Monitor),
    )?;

    let records = workspace.records();
    assert_eq!(sequences(&records), vec![1, 2, 3]);
    assert!(records[0].errors.contains("run 1 failed"));
    assert!(!records[1].has_errors());

    Ok(())
}

#[test]
fn defect_without_sla_is_recorded_once_then_stops() -> anyhow::Result<()> {
    let workspace = Workspace::new();
    let calls = Calls::default();

    let status = run_scripted(
        &workspace,
        &calls,
        iterations(5),
        ScenarioConfig::with_options(options(json!({"fail_on": [2]}))),
    )?;

    assert_eq!(status, WorkerStatus::Completed);
    let records = workspace.records();
    assert_eq!(sequences(&records), vec![1, 2]);
    assert!(records[1].errors.contains("run 2 failed"));
    assert_eq!(calls.runs(), 2);
    assert_eq!(calls.teardowns(), 1);

    Ok(())
}

#[test]
fn violation_without_sla_is_ignored() -> anyhow::Result<()> {
    let workspace = Workspace::new();
    let calls = Calls::default();

    run_scripted(
        &workspace,
        &calls,
        iterations(2),
        ScenarioConfig::with_options(options(json!({"violate_on": [1]}))),
    )?;

    let records = workspace.records();
    assert_eq!(sequences(&records), vec![1, 2]);
    assert!(records.iter().all(|record| !record.has_errors()));

    Ok(())
}

#[test]
fn assert_is_fatal_and_teardown_still_runs() -> anyhow::Result<()> {
    let workspace = Workspace::new();
    let calls = Calls::default();
    let manager = RunnerManager::new(&workspace.results, registry(&calls))?;

    let mut runner = manager.get(iterations(5))?;
    runner.run(
        "Scripted",
        ScenarioConfig::with_options(options(json!({"violate_on": [3]})))
            .with_sla(SlaAction::Assert),
    )?;
    let status = runner.join()?;
    assert_eq!(status, WorkerStatus::SlaAssertion);
    assert_eq!(status.exit_code(), 1);
    assert_eq!(runner.state(), RunnerState::Failed);
    manager.release(runner)?;

    // The failing iteration is not recorded
    assert_eq!(sequences(&workspace.records()), vec![1, 2]);
    assert_eq!(calls.runs(), 3);
    assert_eq!(calls.teardowns(), 1);

    Ok(())
}

#[test]
fn setup_failure_skips_run_and_teardown() -> anyhow::Result<()> {
    let workspace = Workspace::new();
    let calls = Calls::default();

    let status = run_scripted(
        &workspace,
        &calls,
        iterations(3),
        ScenarioConfig::with_options(options(json!({"fail_setup": true}))),
    )?;

    assert_eq!(status, WorkerStatus::SetupFailed);
    assert!(workspace.records().is_empty());
    assert_eq!(calls.runs(), 0);
    assert_eq!(calls.teardowns(), 0);

    Ok(())
}

#[test]
fn teardown_failure_is_fatal() -> anyhow::Result<()> {
    let workspace = Workspace::new();
    let calls = Calls::default();

    let status = run_scripted(
        &workspace,
        &calls,
        iterations(2),
        ScenarioConfig::with_options(options(json!({"fail_teardown": true}))),
    )?;

    assert_eq!(status, WorkerStatus::TeardownFailed);
    assert_eq!(sequences(&workspace.records()), vec![1, 2]);

    Ok(())
}

#[test]
fn panicking_scenario_still_gets_torn_down() -> anyhow::Result<()> {
    let workspace = Workspace::new();
    let calls = Calls::default();

    let status = run_scripted(
        &workspace,
        &calls,
        iterations(3),
        ScenarioConfig::with_options(options(json!({"panic_on": [2]}))),
    )?;

    assert_eq!(status, WorkerStatus::Panicked);
    assert_eq!(sequences(&workspace.records()), vec![1]);
    assert_eq!(calls.teardowns(), 1);

    Ok(())
}

#[test]
fn run_step_can_skip_the_run_loop() -> anyhow::Result<()> {
    let workspace = Workspace::new();
    let calls = Calls::default();

    let status = run_scripted(
        &workspace,
        &calls,
        iterations(3).with_run_step("setup,teardown".parse()?),
        ScenarioConfig::default(),
    )?;

    assert_eq!(status, WorkerStatus::Completed);
    assert!(workspace.records().is_empty());
    assert_eq!(calls.setups(), 1);
    assert_eq!(calls.runs(), 0);
    assert_eq!(calls.teardowns(), 1);

    Ok(())
}

#[test]
fn time_bound_stops_after_duration() -> anyhow::Result<()> {
    let workspace = Workspace::new();
    let calls = Calls::default();

    let status = run_scripted(
        &workspace,
        &calls,
        RunnerConfig::new("Duration")
            .with_duration(0.3)
            .with_interval(0.05),
        ScenarioConfig::default(),
    )?;

    assert_eq!(status, WorkerStatus::Completed);
    let records = workspace.records();
    assert!(!records.is_empty());
    assert_eq!(
        sequences(&records),
        (1..=records.len() as u64).collect::<Vec<_>>()
    );
    assert_eq!(calls.teardowns(), 1);

    Ok(())
}

#[test]
fn abort_stops_a_long_running_runner() -> anyhow::Result<()> {
    let workspace = Workspace::new();
    let calls = Calls::default();
    let manager = RunnerManager::new(&workspace.results, registry(&calls))?;

    let mut runner = manager.get(
        RunnerConfig::new("Duration")
            .with_duration(60.0)
            .with_interval(0.01),
    )?;
    runner.run("Scripted", ScenarioConfig::default())?;
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(runner.state(), RunnerState::Running);

    runner.abort();
    assert_eq!(runner.join()?, WorkerStatus::Aborted);
    assert_eq!(runner.state(), RunnerState::Aborted);
    manager.release(runner)?;

    assert_eq!(calls.teardowns(), 1);
    let records = workspace.records();
    assert_eq!(
        sequences(&records),
        (1..=records.len() as u64).collect::<Vec<_>>()
    );

    Ok(())
}

#[test]
fn scenario_output_reaches_the_kpi_queue() -> anyhow::Result<()> {
    let workspace = Workspace::new();
    let calls = Calls::default();
    let manager = RunnerManager::new(&workspace.results, registry(&calls))?;

    let mut runner = manager.get(iterations(3))?;
    runner.run(
        "Scripted",
        ScenarioConfig::with_options(options(json!({"kpi": true}))),
    )?;
    runner.join()?;

    let output = runner.drain_output();
    assert_eq!(
        output,
        vec![
            options(json!({"call": 1})),
            options(json!({"call": 2})),
            options(json!({"call": 3})),
        ]
    );
    assert!(runner.drain_output().is_empty());
    manager.release(runner)?;

    Ok(())
}

#[test]
fn full_kpi_queue_fails_that_iterations_output_only() -> anyhow::Result<()> {
    let workspace = Workspace::new();
    let calls = Calls::default();
    let manager = RunnerManager::new(&workspace.results, registry(&calls))?;

    let mut config = iterations(3);
    config.output_capacity = 1;
    config.output_timeout = 0.05;
    let mut runner = manager.get(config)?;
    runner.run(
        "Scripted",
        ScenarioConfig::with_options(options(json!({"kpi": true}))),
    )?;
    assert_eq!(runner.join()?, WorkerStatus::Completed);

    // Only the first output fit, nothing was draining the queue
    assert_eq!(runner.drain_output(), vec![options(json!({"call": 1}))]);
    manager.release(runner)?;

    let records = workspace.records();
    assert_eq!(sequences(&records), vec![1, 2, 3]);
    assert!(!records[0].has_errors());
    for record in &records[1..] {
        assert!(record.errors.contains("KPI output queue is full"));
        assert_eq!(record.data["my_key"], json!(record.sequence));
    }

    Ok(())
}

#[test]
fn huge_sweep_starts_without_expanding_its_ranges() -> anyhow::Result<()> {
    let workspace = Workspace::new();
    let calls = Calls::default();
    let manager = RunnerManager::new(&workspace.results, registry(&calls))?;

    let mut config = RunnerConfig::new("Arithmetic").with_interval(0.01);
    config.iterators = vec![RangeSpec {
        name: "a".to_string(),
        start: 0.0,
        stop: 1e14,
        step: 1.0,
    }];
    let mut runner = manager.get(config)?;
    runner.run("Scripted", ScenarioConfig::default())?;
    std::thread::sleep(Duration::from_millis(100));

    runner.abort();
    assert_eq!(runner.join()?, WorkerStatus::Aborted);
    manager.release(runner)?;

    let records = workspace.records();
    assert!(!records.is_empty());
    assert_eq!(records[0].data["options"]["a"], json!(0));

    Ok(())
}

#[test]
fn nested_sweep_writes_every_combination_into_options() -> anyhow::Result<()> {
    let workspace = Workspace::new();
    let calls = Calls::default();

    let mut config = RunnerConfig::new("Arithmetic").with_interval(0.0);
    config.iterators = vec![
        RangeSpec {
            name: "a".to_string(),
            start: 1.0,
            stop: 3.0,
            step: 1.0,
        },
        RangeSpec {
            name: "b".to_string(),
            start: 10.0,
            stop: 20.0,
            step: 10.0,
        },
    ];

    run_scripted(&workspace, &calls, config.clone(), ScenarioConfig::default())?;

    let records = workspace.records();
    assert_eq!(records.len(), 6);
    let seen = records
        .iter()
        .map(|record| {
            let options = &record.data["options"];
            (options["a"].clone(), options["b"].clone())
        })
        .collect::<Vec<_>>();
    assert_eq!(seen[0], (json!(1), json!(10)));
    assert_eq!(seen[1], (json!(1), json!(20)));
    assert_eq!(seen[5], (json!(3), json!(20)));

    let workspace = Workspace::new();
    config.iter_type = IterType::TupleLoops;
    run_scripted(&workspace, &calls, config, ScenarioConfig::default())?;
    assert_eq!(workspace.records().len(), 2);

    Ok(())
}

#[test]
fn sequence_substitutes_each_value() -> anyhow::Result<()> {
    let workspace = Workspace::new();
    let calls = Calls::default();

    let mut config = RunnerConfig::new("Sequence").with_interval(0.0);
    config.scenario_option_name = Some("packet_size".to_string());
    config.sequence = vec![json!(64), json!(128), json!(256)];

    run_scripted(&workspace, &calls, config, ScenarioConfig::default())?;

    let sizes = workspace
        .records()
        .iter()
        .map(|record| record.data["options"]["packet_size"].clone())
        .collect::<Vec<_>>();
    assert_eq!(sizes, vec![json!(64), json!(128), json!(256)]);

    Ok(())
}

#[test]
fn stepping_starts_from_the_current_value() -> anyhow::Result<()> {
    let workspace = Workspace::new();
    let calls = Calls::default();

    let mut config = RunnerConfig::new("Stepping").with_interval(0.0);
    config.scenario_option_name = Some("rate".to_string());
    config.steps = vec![json!(10), json!(20)];

    run_scripted(
        &workspace,
        &calls,
        config,
        ScenarioConfig::with_options(options(json!({"rate": 5}))),
    )?;

    let rates = workspace
        .records()
        .iter()
        .map(|record| record.data["options"]["rate"].clone())
        .collect::<Vec<_>>();
    assert_eq!(rates, vec![json!(5), json!(10), json!(20)]);

    Ok(())
}
