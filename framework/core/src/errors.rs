/// Return this error from a scenario when a measured value breaches a configured threshold.
///
/// The runner treats it as an SLA violation rather than a scenario defect, so what happens next
/// is decided by the configured SLA action: `assert` stops the runner, `monitor` records the
/// violation and keeps iterating.
#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct SlaViolationError {
    msg: String,
}

impl SlaViolationError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

impl Default for SlaViolationError {
    fn default() -> Self {
        Self {
            msg: "SLA validation failed".to_string(),
        }
    }
}

/// A collaborator never reported completion of an iteration within the allowed time.
///
/// Kept distinct from scenario failures so that callers can tell "collaborator never reported"
/// apart from "scenario itself failed".
#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct BarrierTimeoutError {
    msg: String,
}

impl BarrierTimeoutError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct AbortSignalError {
    msg: String,
}

impl Default for AbortSignalError {
    fn default() -> Self {
        Self {
            msg: "Execution cancelled by abort signal".to_string(),
        }
    }
}
