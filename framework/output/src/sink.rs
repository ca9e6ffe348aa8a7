use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::runtime::Handle;
use tokio::select;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use yardstick_core::prelude::{AbortHandle, AbortListener};
use yardstick_result_model::{store_record, ResultRecord};

/// Write result records to a single destination, one JSON object per line.
///
/// Exactly one writer task exists per sink. Any number of producers can hold a [ResultSender]
/// and enqueue records from any thread. Records are written in the order they arrive at the
/// queue, and always as whole lines.
pub struct ResultSink {
    runtime: Handle,
    destination: PathBuf,
    join_handle: JoinHandle<anyhow::Result<u64>>,
    sender: ResultSender,
    close: AbortHandle,
}

impl ResultSink {
    /// Open the destination and spawn the writer task on the given runtime.
    ///
    /// The destination is opened in append mode, so a sink that is stopped and started again
    /// for the same path continues the same stream.
    pub fn start(runtime: &Handle, destination: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let destination = destination.into();
        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create output directory {}", parent.display())
                })?;
            }
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&destination)
            .with_context(|| {
                format!(
                    "Failed to open result destination {}",
                    destination.display()
                )
            })?;

        let (writer, receiver) = tokio::sync::mpsc::unbounded_channel();
        let flush_complete = Arc::new(AtomicBool::new(false));
        let close = AbortHandle::new();

        let join_handle = runtime.spawn(write_records(
            file,
            receiver,
            close.new_listener(),
            flush_complete.clone(),
        ));

        log::debug!("Result sink writing to {}", destination.display());

        Ok(Self {
            runtime: runtime.clone(),
            destination,
            join_handle,
            sender: ResultSender {
                writer,
                flush_complete,
            },
            close,
        })
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Get a producer handle for this sink.
    pub fn sender(&self) -> ResultSender {
        self.sender.clone()
    }

    pub fn enqueue(&self, record: ResultRecord) -> bool {
        self.sender.send(record)
    }

    pub fn is_running(&self) -> bool {
        !self.join_handle.is_finished()
    }

    /// Close the queue and block until the writer has drained it, flushed and exited.
    ///
    /// Records enqueued after this call are dropped with a log message. Returns the number of
    /// records written during the lifetime of this sink.
    ///
    /// This blocks the calling thread so it must not be called from within an async context.
    pub fn stop(self) -> anyhow::Result<u64> {
        self.close.abort();

        let written = self
            .runtime
            .block_on(self.join_handle)
            .context("Result sink writer task panicked")??;

        log::debug!(
            "Result sink for {} stopped after writing {} records",
            self.destination.display(),
            written
        );

        Ok(written)
    }
}

/// Producer side of a [ResultSink].
#[derive(Debug, Clone)]
pub struct ResultSender {
    writer: UnboundedSender<ResultRecord>,
    flush_complete: Arc<AtomicBool>,
}

impl ResultSender {
    /// Queue a record for writing. Never blocks.
    ///
    /// Returns false if the sink has already stopped and the record was dropped.
    pub fn send(&self, record: ResultRecord) -> bool {
        match self.writer.send(record) {
            Ok(()) => true,
            Err(e) => {
                if self.flush_complete.load(Ordering::Acquire) {
                    log::info!(
                        "Dropped record {} from runner {} because the result sink has stopped",
                        e.0.sequence,
                        e.0.runner_id
                    );
                } else {
                    log::warn!(
                        "Failed to queue record {} from runner {}: {}",
                        e.0.sequence,
                        e.0.runner_id,
                        e
                    );
                }
                false
            }
        }
    }
}

async fn write_records(
    file: std::fs::File,
    mut receiver: UnboundedReceiver<ResultRecord>,
    close: AbortListener,
    flush_complete: Arc<AtomicBool>,
) -> anyhow::Result<u64> {
    let mut writer = BufWriter::new(File::from_std(file));
    let mut written = 0u64;

    let result = async {
        // Listen and write records until the sink is closed
        loop {
            select! {
                _ = close.wait_for_abort() => {
                    log::debug!("Closing result sink");
                    break;
                }
                record = receiver.recv() => {
                    match record {
                        Some(record) => {
                            if write_record(&mut writer, &record).await? {
                                written += 1;
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        // Refuse new records, then drain what was queued before the close.
        receiver.close();
        let mut drain_count = 0;
        while let Some(record) = receiver.recv().await {
            if write_record(&mut writer, &record).await? {
                written += 1;
            }
            drain_count += 1;

            if drain_count % 1000 == 0 {
                log::debug!("Drained {} remaining records", drain_count);
            }
        }

        writer.flush().await?;
        log::debug!("Drained {} remaining records", drain_count);

        Ok::<_, anyhow::Error>(written)
    }
    .await;

    flush_complete.store(true, Ordering::Release);

    if let Err(e) = &result {
        log::error!("Result sink writer failed: {:?}", e);
    }

    result
}

/// Returns false when the record could not be serialized. That record is skipped and the sink
/// keeps going.
async fn write_record<W>(writer: &mut W, record: &ResultRecord) -> anyhow::Result<bool>
where
    W: AsyncWriteExt + Unpin,
{
    let mut line = Vec::new();
    if let Err(e) = store_record(record, &mut line) {
        log::error!(
            "Failed to serialize record {} from runner {}: {:?}",
            record.sequence,
            record.runner_id,
            e
        );
        return Ok(false);
    }

    writer.write_all(&line).await?;

    Ok(true)
}
