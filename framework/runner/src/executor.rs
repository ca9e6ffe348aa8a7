use anyhow::Context;
use std::future::Future;
use tokio::runtime::Handle;
use yardstick_core::prelude::{AbortListener, AbortSignalError};

/// Owns the async runtime shared by the result sink, the notification bus listeners and the
/// bounded waits in runner workers.
#[derive(Debug)]
pub struct Executor {
    runtime: tokio::runtime::Runtime,
}

impl Executor {
    pub fn new() -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("yardstick-io")
            .build()
            .context("Failed to create Tokio runtime")?;

        Ok(Self { runtime })
    }

    pub fn handle(&self) -> &Handle {
        self.runtime.handle()
    }

    /// Run async code in place, blocking until it completes.
    ///
    /// The future is cancelled if the abort is observed first, in which case this returns an
    /// [AbortSignalError]. Must not be called from within an async context.
    pub fn execute_in_place<T>(
        &self,
        fut: impl Future<Output = anyhow::Result<T>>,
        abort: &AbortListener,
    ) -> anyhow::Result<T> {
        self.runtime.block_on(async move {
            tokio::select! {
                result = fut => result,
                _ = abort.wait_for_abort() => {
                    Err(anyhow::anyhow!(AbortSignalError::default()))
                },
            }
        })
    }

    /// Submit async code to be run in the background.
    ///
    /// Nothing waits for the future to complete before the executor is dropped.
    pub fn spawn(&self, fut: impl Future<Output = ()> + Send + 'static) {
        self.runtime.spawn(fut);
    }
}
