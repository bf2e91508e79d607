//! Two-stage streaming pipeline

use super::backpressure::{bounded, QueueClosed, RecordReceiver};
use super::processor::{BoxedSource, StreamProcessor};
use super::types::{PipelineConfig, RunOutcome, RunReport, RunState};
use crate::error::{AggregatedError, ConfigError, StreamError};
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Moves records from a source to a sink through a bounded queue.
///
/// The produce stage reads and transforms, the write stage writes; both run
/// as separate tasks and share one cancellation token per run. A pipeline
/// runs once: [`run`](StreamPipeline::run) consumes it.
pub struct StreamPipeline {
    config: PipelineConfig,
    processor: Box<dyn StreamProcessor>,
    state: watch::Sender<RunState>,
}

impl StreamPipeline {
    pub fn new(
        config: PipelineConfig,
        processor: Box<dyn StreamProcessor>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let (state, _) = watch::channel(RunState::Idle);
        Ok(Self {
            config,
            processor,
            state,
        })
    }

    /// Observe state transitions of this pipeline's run
    pub fn state(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    /// Stream `source` into `sink` until end of stream, a fatal error or
    /// cancellation.
    ///
    /// Cancelling `cancel` (or hitting the configured timeout) is not an
    /// error: the outcome reports [`RunState::Cancelled`] and output may be
    /// incomplete. Malformed records are reported as
    /// [`StreamError::Aggregated`] only after the source was fully drained.
    pub async fn run<R, W>(
        self,
        source: R,
        sink: W,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome<W>, StreamError>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let Self {
            config,
            mut processor,
            state,
        } = self;
        let started = Instant::now();
        let token = cancel.child_token();

        state.send_replace(RunState::Running);
        debug!(
            processor = processor.name(),
            capacity = config.queue_capacity,
            timeout = ?config.timeout,
            "Pipeline run started"
        );

        let timer = config.timeout.map(|limit| {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(limit) => {
                        warn!("Run timed out after {:?}, cancelling", limit);
                        token.cancel();
                    }
                }
            })
        });

        let (tx, rx) = bounded(config.queue_capacity, token.clone());
        let source: BoxedSource = Box::new(source);

        let producer = tokio::spawn(async move {
            let result = processor.produce(source, &tx).await;
            if result.is_err() {
                tx.cancel();
            }
            // Dropping the sender here closes the queue
            result
        });
        let writer = tokio::spawn(write_records(rx, sink));

        let (produced, written) = tokio::join!(producer, writer);
        if let Some(timer) = timer {
            timer.abort();
        }

        let written = written
            .map_err(|source| StreamError::Task {
                stage: "write",
                source,
            })
            .and_then(|result| result);
        let produced = produced
            .map_err(|source| StreamError::Task {
                stage: "produce",
                source,
            })
            .and_then(|result| result);

        let WriteSummary {
            sink,
            written: records_written,
            interrupted,
        } = match written {
            Ok(written) => written,
            Err(e) => return Err(fail(&state, e)),
        };
        let summary = match produced {
            Ok(summary) => summary,
            Err(e) => return Err(fail(&state, e)),
        };

        let final_state = if summary.cancelled || interrupted {
            RunState::Cancelled
        } else if summary.failures.is_empty() {
            RunState::Completed
        } else {
            RunState::Failed
        };

        let report = RunReport {
            state: final_state,
            records_read: summary.records_read,
            records_blanked: summary.records_blanked,
            records_malformed: summary.failures.len(),
            records_written,
            duration: started.elapsed(),
        };
        debug!(
            state = %report.state,
            read = report.records_read,
            blanked = report.records_blanked,
            malformed = report.records_malformed,
            written = report.records_written,
            duration = ?report.duration,
            "Pipeline run finished"
        );
        state.send_replace(final_state);

        if final_state == RunState::Failed {
            if let Some(aggregated) = AggregatedError::from_causes(summary.failures) {
                return Err(StreamError::Aggregated(aggregated));
            }
        }

        Ok(RunOutcome { report, sink })
    }
}

fn fail(state: &watch::Sender<RunState>, err: StreamError) -> StreamError {
    error!("Pipeline run failed: {}", err);
    state.send_replace(RunState::Failed);
    err
}

struct WriteSummary<W> {
    sink: W,
    written: u64,
    /// Cancellation stopped the stage before the queue was drained and flushed
    interrupted: bool,
}

/// Write stage: drain the queue into the sink, one record per line
async fn write_records<W>(
    mut rx: RecordReceiver,
    mut sink: W,
) -> Result<WriteSummary<W>, StreamError>
where
    W: AsyncWrite + Unpin,
{
    let token = rx.token().clone();
    let mut written = 0u64;

    let mut interrupted = loop {
        let record = match rx.recv().await {
            Ok(record) => record,
            Err(closed) => break closed == QueueClosed::Cancelled,
        };
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => break true,
            result = write_record(&mut sink, &record) => result,
        };
        if let Err(e) = result {
            token.cancel();
            return Err(StreamError::Write(e));
        }
        written += 1;
    };

    if !interrupted {
        tokio::select! {
            biased;
            _ = token.cancelled() => interrupted = true,
            flushed = sink.flush() => {
                if let Err(e) = flushed {
                    token.cancel();
                    return Err(StreamError::Write(e));
                }
            }
        }
    }

    Ok(WriteSummary {
        sink,
        written,
        interrupted,
    })
}

async fn write_record<W>(sink: &mut W, record: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    sink.write_all(record.as_bytes()).await?;
    sink.write_all(b"\n").await
}
