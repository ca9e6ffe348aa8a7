use crate::config::RunnerConfig;
use crate::executor::Executor;
use crate::policy::PolicyRegistry;
use crate::runner::{Runner, RunnerResources, RunnerState};
use crate::scenario::ScenarioRegistry;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use yardstick_core::prelude::{AbortHandle, AbortSignalError};
use yardstick_messaging::prelude::{LocalBus, NotificationBus};
use yardstick_output::ResultSink;

/// Aborts every runner a manager currently has out, and refuses new ones afterwards.
///
/// Cheap to clone and independent of the manager's lifetime, so signal handlers can hold one.
#[derive(Clone, Default)]
pub struct AbortSwitch {
    active: Arc<Mutex<HashMap<u32, AbortHandle>>>,
    aborted: AbortHandle,
}

impl AbortSwitch {
    pub fn abort_all(&self) {
        self.aborted.abort();
        let active = self.active.lock();
        log::info!("Aborting {} active runners", active.len());
        for handle in active.values() {
            handle.abort();
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_aborted()
    }
}

/// Creates runners and owns the state they share: the result sink, the async runtime and the
/// notification bus.
///
/// The result sink is started when the first runner is created and stopped, after draining,
/// when the last active runner is released.
pub struct RunnerManager {
    executor: Arc<Executor>,
    destination: PathBuf,
    policies: PolicyRegistry,
    scenarios: Arc<ScenarioRegistry>,
    bus: Option<Arc<dyn NotificationBus>>,
    sink: Mutex<Option<ResultSink>>,
    switch: AbortSwitch,
    next_runner_id: AtomicU32,
}

impl RunnerManager {
    pub fn new(
        destination: impl Into<PathBuf>,
        scenarios: ScenarioRegistry,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            executor: Arc::new(Executor::new()?),
            destination: destination.into(),
            policies: PolicyRegistry::default(),
            scenarios: Arc::new(scenarios),
            bus: None,
            sink: Mutex::new(None),
            switch: AbortSwitch::default(),
            next_runner_id: AtomicU32::new(1),
        })
    }

    /// Attach an in-process notification bus running on this manager's runtime.
    pub fn with_local_bus(mut self) -> Self {
        let bus = LocalBus::new(self.executor.handle().clone());
        self.bus = Some(Arc::new(bus));
        self
    }

    pub fn with_bus(mut self, bus: Arc<dyn NotificationBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_policies(mut self, policies: PolicyRegistry) -> Self {
        self.policies = policies;
        self
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub fn bus(&self) -> Option<&Arc<dyn NotificationBus>> {
        self.bus.as_ref()
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Create a runner for the config's runner type.
    ///
    /// The runner type and its parameters are validated before anything else, so an invalid
    /// config never starts the result sink.
    pub fn get(&self, config: RunnerConfig) -> anyhow::Result<Runner> {
        if self.switch.is_aborted() {
            return Err(AbortSignalError::default().into());
        }

        let policy = self.policies.create(&config)?;
        config.interval()?;
        config.output_timeout()?;
        let output_capacity = config.output_capacity()?;

        // The sink lock is held until the runner is registered as active, so a concurrent release
        // of the last runner cannot stop the sink this runner writes to.
        let mut sink = self.sink.lock();
        let results = match sink.as_ref() {
            Some(sink) => sink.sender(),
            None => {
                log::info!("Starting result sink at {}", self.destination.display());
                let started = ResultSink::start(self.executor.handle(), &self.destination)?;
                let sender = started.sender();
                *sink = Some(started);
                sender
            }
        };

        let id = self.next_runner_id.fetch_add(1, Ordering::Relaxed);
        let abort = AbortHandle::new();
        self.switch.active.lock().insert(id, abort.clone());
        drop(sink);

        log::debug!("Created {} runner {}", config.runner_type, id);
        Ok(Runner::new(
            id,
            config,
            policy,
            RunnerResources {
                results,
                scenarios: self.scenarios.clone(),
                executor: self.executor.clone(),
                bus: self.bus.clone(),
            },
            abort,
            output_capacity,
        ))
    }

    /// Give a runner back. A runner that is still running is aborted and joined first.
    ///
    /// Releasing the last active runner stops the result sink once every queued record is
    /// written.
    pub fn release(&self, mut runner: Runner) -> anyhow::Result<()> {
        if runner.state() == RunnerState::Running {
            if !runner.is_finished() {
                log::warn!("Releasing runner {} while it is still running", runner.id());
                runner.abort();
            }
            runner.join()?;
        }

        let id = runner.id();
        drop(runner);

        let finished_sink = {
            let mut sink = self.sink.lock();
            let mut active = self.switch.active.lock();
            active.remove(&id);
            if active.is_empty() {
                sink.take()
            } else {
                None
            }
        };

        if let Some(sink) = finished_sink {
            let written = sink.stop()?;
            log::info!(
                "Result sink stopped, {} records written to {}",
                written,
                self.destination.display()
            );
        }

        Ok(())
    }

    pub fn active_count(&self) -> usize {
        self.switch.active.lock().len()
    }

    pub fn is_sink_running(&self) -> bool {
        self.sink.lock().is_some()
    }

    pub fn abort_all(&self) {
        self.switch.abort_all();
    }

    pub fn is_aborted(&self) -> bool {
        self.switch.is_aborted()
    }

    pub fn abort_switch(&self) -> AbortSwitch {
        self.switch.clone()
    }
}

impl Drop for RunnerManager {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.get_mut().take() {
            if let Err(e) = sink.stop() {
                log::error!("Failed to stop result sink: {:?}", e);
            }
        }
    }
}
