use crate::cli::YardstickCli;
use crate::config::{TaskEntry, TaskFile};
use crate::manager::RunnerManager;
use crate::policy::RunnerType;
use crate::progress::start_progress;
use crate::runner::Runner;
use crate::scenario::ScenarioRegistry;
use crate::shutdown::start_abort_listener;
use crate::worker::WorkerStatus;
use std::collections::BTreeMap;
use std::time::Duration;
use yardstick_result_model::RecordData;

/// How often KPI output is drained while waiting for runners to finish.
const DRAIN_INTERVAL: Duration = Duration::from_millis(20);

/// The outcome of a task run.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: String,
    /// The first fatal runner status, or [WorkerStatus::Completed] if every runner succeeded
    pub status: WorkerStatus,
    /// KPI output drained from each runner, keyed by runner id
    pub output: BTreeMap<u32, Vec<RecordData>>,
}

/// Run every scenario in the CLI's task file.
///
/// Scenarios run one after another unless the task sets `run_in_parallel`, in which case every
/// runner is started before any of them is joined. KPI output is drained from the runners while
/// they run, so scenarios never wait on a full output queue.
pub fn run(cli: YardstickCli, scenarios: ScenarioRegistry) -> anyhow::Result<RunReport> {
    let task = TaskFile::load(&cli.task)?;
    let run_id = cli.run_id.clone().unwrap_or_else(|| nanoid::nanoid!());
    let output_path = cli.output_path(&run_id);

    log::info!(
        "Running {} scenarios from {} as run {}, writing results to {}",
        task.scenarios.len(),
        cli.task.display(),
        run_id,
        output_path.display()
    );

    let manager = RunnerManager::new(&output_path, scenarios)?.with_local_bus();
    start_abort_listener(manager.executor(), manager.abort_switch());

    let mut statuses = Vec::with_capacity(task.scenarios.len());
    let mut output = BTreeMap::new();
    if task.run_in_parallel {
        let mut runners = Vec::with_capacity(task.scenarios.len());
        for entry in &task.scenarios {
            match start_entry(&manager, entry, &cli) {
                Ok(runner) => runners.push(runner),
                Err(e) => {
                    // Stop the runners already started rather than leaving them to run unattended
                    manager.abort_all();
                    for runner in runners {
                        manager.release(runner)?;
                    }
                    return Err(e);
                }
            }
        }

        statuses.extend(wait_draining(&mut runners, &mut output)?);
        for runner in runners {
            manager.release(runner)?;
        }
    } else {
        for entry in &task.scenarios {
            if manager.is_aborted() {
                log::info!("Skipping remaining scenarios after abort");
                statuses.push(WorkerStatus::Aborted);
                break;
            }

            let mut runner = start_entry(&manager, entry, &cli)?;
            statuses.extend(wait_draining(
                std::slice::from_mut(&mut runner),
                &mut output,
            )?);
            manager.release(runner)?;
        }
    }

    for (runner_id, kpis) in &output {
        log::info!("Runner {} produced {} KPI outputs", runner_id, kpis.len());
    }

    let status = worst_status(&statuses);
    log::info!("Run {} finished: {:?}", run_id, status);

    Ok(RunReport {
        run_id,
        status,
        output,
    })
}

/// Join every runner, draining their KPI output into `output` until each has finished.
fn wait_draining(
    runners: &mut [Runner],
    output: &mut BTreeMap<u32, Vec<RecordData>>,
) -> anyhow::Result<Vec<WorkerStatus>> {
    loop {
        let mut finished = true;
        for runner in runners.iter_mut() {
            finished &= runner.is_finished();
            output
                .entry(runner.id())
                .or_default()
                .extend(runner.drain_output());
        }

        if finished {
            break;
        }
        std::thread::sleep(DRAIN_INTERVAL);
    }

    runners
        .iter_mut()
        .map(|runner| {
            let status = runner.join()?;
            output
                .entry(runner.id())
                .or_default()
                .extend(runner.drain_output());
            Ok(status)
        })
        .collect()
}

fn start_entry(
    manager: &RunnerManager,
    entry: &TaskEntry,
    cli: &YardstickCli,
) -> anyhow::Result<Runner> {
    let mut runner = manager.get(entry.runner.clone())?;

    if let Err(e) = runner.run(&entry.scenario_type, entry.scenario_config()) {
        manager.release(runner)?;
        return Err(e);
    }

    if runner.runner_type() == RunnerType::Duration && !cli.no_progress {
        start_progress(entry.runner.duration()?, runner.abort_listener());
    }

    Ok(runner)
}

/// The first fatal status, or [WorkerStatus::Completed] if every runner succeeded.
fn worst_status(statuses: &[WorkerStatus]) -> WorkerStatus {
    statuses
        .iter()
        .copied()
        .find(|status| !status.is_success())
        .unwrap_or(WorkerStatus::Completed)
}
