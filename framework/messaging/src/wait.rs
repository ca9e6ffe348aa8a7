use std::time::{Duration, Instant};
use yardstick_core::prelude::{AbortListener, AbortSignalError, BarrierTimeoutError};

#[derive(thiserror::Error, Debug)]
pub enum WaitError {
    #[error(transparent)]
    Timeout(#[from] BarrierTimeoutError),
    #[error(transparent)]
    Aborted(#[from] AbortSignalError),
}

/// Retry `predicate` every `poll_interval` until it returns true.
///
/// Fails with [BarrierTimeoutError] once `timeout` has elapsed, or with [AbortSignalError] as
/// soon as an abort is observed between polls. The predicate is always tried at least once.
pub fn wait_until<F>(
    mut predicate: F,
    timeout: Duration,
    poll_interval: Duration,
    abort: &AbortListener,
) -> Result<(), WaitError>
where
    F: FnMut() -> bool,
{
    let started = Instant::now();
    loop {
        if predicate() {
            return Ok(());
        }

        if abort.should_abort() {
            return Err(AbortSignalError::default().into());
        }

        let elapsed = started.elapsed();
        if elapsed >= timeout {
            return Err(BarrierTimeoutError::new(format!(
                "Condition not met after {:.1}s",
                elapsed.as_secs_f64()
            ))
            .into());
        }

        std::thread::sleep(poll_interval.min(timeout - elapsed));
    }
}
