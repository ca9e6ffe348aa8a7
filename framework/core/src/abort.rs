use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::Sender;

/// Cooperative cancellation primitive for runners and the background tasks they own.
///
/// The flag is sticky: once [AbortHandle::abort] has been called, every listener created from
/// this handle, before or after the call, reports the abort.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    sender: Sender<()>,
    aborted: Arc<AtomicBool>,
}

impl Default for AbortHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortHandle {
    pub fn new() -> Self {
        Self {
            sender: tokio::sync::broadcast::channel(1).0,
            aborted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn abort(&self) {
        if self.aborted.swap(true, Ordering::SeqCst) {
            return;
        }

        if self.sender.send(()).is_err() {
            // Nobody is waiting asynchronously, listeners will still see the flag.
            log::trace!("No async listeners for abort signal");
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    pub fn new_listener(&self) -> AbortListener {
        AbortListener {
            sender: self.sender.clone(),
            aborted: self.aborted.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AbortListener {
    sender: Sender<()>,
    aborted: Arc<AtomicBool>,
}

impl AbortListener {
    /// Point in time check of the abort flag. Policies call this at the top of every iteration.
    pub fn should_abort(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Wait until the abort flag is set. It is safe to race this with another future so that the
    /// abort can be used to cancel other work in progress.
    pub async fn wait_for_abort(&self) {
        // Subscribe before reading the flag so that an abort between the two is not missed.
        let mut receiver = self.sender.subscribe();
        if self.should_abort() {
            return;
        }

        // The listener holds a sender so the channel cannot close, and only one message is ever
        // sent, after the flag is set.
        let _ = receiver.recv().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn listener_sees_abort_before_and_after_creation() {
        let handle = AbortHandle::new();
        let early = handle.new_listener();
        assert!(!early.should_abort());

        handle.abort();

        let late = handle.new_listener();
        assert!(early.should_abort());
        assert!(late.should_abort());
        assert!(handle.is_aborted());
    }

    #[test]
    fn repeated_abort_is_harmless() {
        let handle = AbortHandle::new();
        handle.abort();
        handle.abort();
        assert!(handle.new_listener().should_abort());
    }

    #[tokio::test]
    async fn wait_for_abort_wakes_up_all_clones() {
        let handle = AbortHandle::new();
        let first = handle.new_listener();
        let second = first.clone();

        let waiters = tokio::spawn(async move {
            tokio::join!(first.wait_for_abort(), second.wait_for_abort());
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.abort();

        tokio::time::timeout(Duration::from_secs(5), waiters)
            .await
            .expect("Listeners did not observe abort")
            .unwrap();
    }

    #[tokio::test]
    async fn wait_for_abort_returns_immediately_when_already_aborted() {
        let handle = AbortHandle::new();
        handle.abort();

        tokio::time::timeout(
            Duration::from_secs(1),
            handle.new_listener().wait_for_abort(),
        )
        .await
        .expect("Should not wait when already aborted");
    }
}
