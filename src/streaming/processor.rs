//! Produce-stage processors: turn a byte source into queued records

use super::assembler::LineAssembler;
use super::backpressure::{QueueClosed, RecordSender};
use super::jsonl::{canonical_json, JsonLinesDecoder, JsonlRecord};
use super::transformer::TransformerChain;
use super::types::{OutputMode, ProduceSummary};
use crate::error::StreamError;
use async_trait::async_trait;
use tokio::io::AsyncRead;
use tracing::{debug, trace, warn};

/// Source handed to the produce stage
pub type BoxedSource = Box<dyn AsyncRead + Send + Unpin>;

/// Drains a source into the record queue
#[async_trait]
pub trait StreamProcessor: Send {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Read `source` until it is exhausted, the run is cancelled or the
    /// write stage goes away. Read errors end production with `Err`;
    /// record-local failures are collected in the summary instead.
    async fn produce(
        &mut self,
        source: BoxedSource,
        queue: &RecordSender,
    ) -> Result<ProduceSummary, StreamError>;

    /// Called once production stopped without a read error
    fn on_complete(&self, summary: &ProduceSummary) {
        debug!(
            processor = self.name(),
            records = summary.records_read,
            blanked = summary.records_blanked,
            malformed = summary.failures.len(),
            "Produce stage finished"
        );
    }
}

/// Pick the processor for an output mode.
///
/// Text and whole-document JSON both run line by line through `chain`.
/// JSONL events are re-encoded as-is and never see the chain.
pub fn processor_for(mode: OutputMode, chain: TransformerChain) -> Box<dyn StreamProcessor> {
    match mode {
        OutputMode::Text | OutputMode::Json => Box::new(LineProcessor::new(chain)),
        OutputMode::Jsonl => {
            if !chain.is_empty() {
                debug!(
                    transformers = chain.len(),
                    "Transformers are not applied to JSONL events"
                );
            }
            Box::new(JsonLinesProcessor::new())
        }
    }
}

/// Assembles lines and runs each through a transformer chain
#[derive(Debug, Clone, Default)]
pub struct LineProcessor {
    chain: TransformerChain,
}

impl LineProcessor {
    pub fn new(chain: TransformerChain) -> Self {
        Self { chain }
    }
}

#[async_trait]
impl StreamProcessor for LineProcessor {
    fn name(&self) -> &'static str {
        "lines"
    }

    async fn produce(
        &mut self,
        source: BoxedSource,
        queue: &RecordSender,
    ) -> Result<ProduceSummary, StreamError> {
        let mut lines = LineAssembler::new(source);
        let mut summary = ProduceSummary::default();

        loop {
            let next = tokio::select! {
                biased;
                _ = queue.cancelled() => {
                    summary.cancelled = true;
                    break;
                }
                next = lines.next_line() => next,
            };
            let Some(line) = next.map_err(StreamError::Read)? else {
                break;
            };
            summary.records_read += 1;

            let was_empty = line.is_empty();
            let record = self.chain.apply(line);
            if record.is_empty() && !was_empty {
                summary.records_blanked += 1;
            }
            trace!(line = summary.records_read, "{}", record);

            if let Err(closed) = queue.send(record).await {
                summary.cancelled = closed == QueueClosed::Cancelled;
                break;
            }
        }

        self.on_complete(&summary);
        Ok(summary)
    }
}

/// Decodes one JSON event per record and queues its canonical encoding
#[derive(Debug, Default)]
pub struct JsonLinesProcessor;

impl JsonLinesProcessor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StreamProcessor for JsonLinesProcessor {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    async fn produce(
        &mut self,
        source: BoxedSource,
        queue: &RecordSender,
    ) -> Result<ProduceSummary, StreamError> {
        let mut decoder = JsonLinesDecoder::new(source);
        let mut summary = ProduceSummary::default();

        loop {
            let next = tokio::select! {
                biased;
                _ = queue.cancelled() => {
                    summary.cancelled = true;
                    break;
                }
                next = decoder.next_record() => next,
            };
            let Some(record) = next.map_err(StreamError::Read)? else {
                break;
            };
            summary.records_read += 1;

            match record {
                JsonlRecord::Event(value) => {
                    let encoded = canonical_json(value);
                    trace!(line = decoder.line(), "{}", encoded);
                    if let Err(closed) = queue.send(encoded).await {
                        summary.cancelled = closed == QueueClosed::Cancelled;
                        break;
                    }
                }
                JsonlRecord::Malformed(err) => {
                    warn!("Skipping malformed JSONL record at {}", err);
                    summary.failures.push(err);
                }
            }
        }

        self.on_complete(&summary);
        Ok(summary)
    }
}
