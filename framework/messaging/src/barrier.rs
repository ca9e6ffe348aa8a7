use crate::bus::{Endpoint, MessageContext, NotificationBus, Subscription};
use crate::payload::{Fields, GeneratorPayload, Payload};
use crate::{TG_METHOD_ITERATION, TOPIC_TG};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// Tracks, per collaborator pid, which iterations have been reported complete.
///
/// Each collaborator expects iterations `1..=expected` and keeps the KPI of every iteration it
/// has reported, keyed by iteration, so duplicate and out of order delivery converge on the same
/// state. Storage grows with the reports received, not with the number of expected iterations.
pub struct IterationBarrier {
    collaborators: HashMap<u32, Reports>,
    receiver: UnboundedReceiver<IterationReport>,
    sender: UnboundedSender<IterationReport>,
    subscription: Option<Subscription>,
}

#[derive(Debug)]
struct Reports {
    expected: u64,
    kpis: HashMap<u64, Value>,
}

impl Reports {
    fn has_reported(&self, iteration: u64) -> bool {
        self.expected == 0 || self.kpis.contains_key(&iteration)
    }
}

#[derive(Debug)]
struct IterationReport {
    pid: u32,
    iteration: u64,
    kpi: Value,
}

impl IterationBarrier {
    /// Track every pid for the same number of iterations.
    pub fn new(pids: &[u32], max_iterations: u64) -> Self {
        Self::with_expected(pids.iter().map(|pid| (*pid, max_iterations)))
    }

    /// Track each pid for its own number of iterations.
    pub fn with_expected(expected: impl IntoIterator<Item = (u32, u64)>) -> Self {
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
        Self {
            collaborators: expected
                .into_iter()
                .map(|(pid, expected)| {
                    (
                        pid,
                        Reports {
                            expected,
                            kpis: HashMap::new(),
                        },
                    )
                })
                .collect(),
            receiver,
            sender,
            subscription: None,
        }
    }

    /// Create a barrier fed by iteration reports published on the traffic generator topic.
    pub fn subscribe(
        bus: &dyn NotificationBus,
        pids: &[u32],
        max_iterations: u64,
    ) -> anyhow::Result<Self> {
        let mut barrier = Self::new(pids, max_iterations);
        let subscription = bus.subscribe(TOPIC_TG, vec![barrier.endpoint()])?;
        barrier.subscription = Some(subscription);
        Ok(barrier)
    }

    /// An endpoint which forwards iteration reports for the tracked pids into this barrier.
    ///
    /// Reports are buffered until the next call to [IterationBarrier::check_iteration_status].
    pub fn endpoint(&self) -> Arc<dyn Endpoint> {
        Arc::new(BarrierEndpoint {
            pids: self.collaborators.keys().copied().collect(),
            sender: self.sender.clone(),
        })
    }

    pub fn pids(&self) -> impl Iterator<Item = &u32> {
        self.collaborators.keys()
    }

    /// Record a report directly. Reports for unknown pids or out of range iterations are
    /// ignored.
    pub fn record(&mut self, pid: u32, iteration: u64, kpi: Value) {
        let Some(reports) = self.collaborators.get_mut(&pid) else {
            log::trace!("Ignoring iteration report from untracked pid {}", pid);
            return;
        };

        if !(1..=reports.expected).contains(&iteration) {
            log::warn!(
                "Ignoring report for iteration {} from pid {}, expected 1..={}",
                iteration,
                pid,
                reports.expected
            );
            return;
        }

        reports.kpis.insert(iteration, kpi);
    }

    /// Apply every buffered report without blocking, then check whether every tracked pid has
    /// reported `target_index` (1-based).
    ///
    /// A pid with no expected iterations always satisfies the check.
    pub fn check_iteration_status(&mut self, target_index: u64) -> bool {
        while let Ok(report) = self.receiver.try_recv() {
            self.record(report.pid, report.iteration, report.kpi);
        }

        self.collaborators
            .values()
            .all(|reports| reports.has_reported(target_index))
    }

    /// The KPIs every pid reported for `iteration` (1-based), for the pids that have reported.
    pub fn iteration_kpis(&self, iteration: u64) -> HashMap<u32, Value> {
        self.collaborators
            .iter()
            .filter_map(|(pid, reports)| {
                reports
                    .kpis
                    .get(&iteration)
                    .map(|kpi| (*pid, kpi.clone()))
            })
            .collect()
    }
}

struct BarrierEndpoint {
    pids: HashSet<u32>,
    sender: UnboundedSender<IterationReport>,
}

impl Endpoint for BarrierEndpoint {
    fn methods(&self) -> &[&'static str] {
        &[TG_METHOD_ITERATION]
    }

    fn handle(
        &self,
        _method: &str,
        context: &MessageContext,
        payload: Fields,
    ) -> anyhow::Result<()> {
        if !self.pids.contains(&context.pid) {
            return Ok(());
        }

        let payload = GeneratorPayload::from_fields(payload)?;
        self.sender.send(IterationReport {
            pid: context.pid,
            iteration: payload.iteration,
            kpi: payload.kpi,
        })?;

        Ok(())
    }
}
