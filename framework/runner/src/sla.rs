use crate::config::SlaAction;

/// What went wrong in a single scenario run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// A measured value breached a configured threshold
    SlaViolation,
    /// Anything else: a scenario defect or a collaborator that never reported
    Defect,
}

/// What the runner does with a failed scenario run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Stop the run loop. Teardown still runs.
    Fatal,
    /// Capture the error in the iteration's record and keep iterating.
    Record,
    /// Capture the error in the iteration's record, then stop iterating.
    RecordAndStop,
    /// Carry on as if nothing happened.
    Ignore,
}

impl Disposition {
    pub fn records_error(&self) -> bool {
        matches!(self, Disposition::Record | Disposition::RecordAndStop)
    }
}

/// Decide what to do with a failed scenario run, given the configured SLA action.
///
/// SLA violations are expected, for example while a system under test ramps up, so they follow
/// the configured action. Other failures are recorded and iteration continues while an SLA is
/// configured. Without an SLA they are recorded once and the runner stops.
pub fn classify(action: SlaAction, kind: FailureKind) -> Disposition {
    match (kind, action) {
        (FailureKind::SlaViolation, SlaAction::Assert) => Disposition::Fatal,
        (FailureKind::SlaViolation, SlaAction::Monitor) => Disposition::Record,
        (FailureKind::SlaViolation, SlaAction::None) => Disposition::Ignore,
        (FailureKind::Defect, SlaAction::None) => Disposition::RecordAndStop,
        (FailureKind::Defect, SlaAction::Assert | SlaAction::Monitor) => Disposition::Record,
    }
}
