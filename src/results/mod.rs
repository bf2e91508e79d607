//! Whole-document JSON results
//!
//! In document mode the engine prints one JSON result document spread over
//! many lines, sometimes with a line of timer output around it. The document
//! is relayed through the same pipeline as free text and parsed once the
//! stream has ended.

pub mod capture;
pub mod model;

pub use capture::TeeWriter;
pub use model::{Duration, HostResult, HostStats, Play, PlayResult, ResultDocument, Task, TaskResult};

use crate::error::{ConfigError, DocumentError};
use crate::streaming::{
    IgnoreMessage, LineProcessor, PipelineConfig, RunOutcome, RunReport, StreamPipeline,
    TransformerChain,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Engine noise printed around the result document
pub const DEFAULT_SKIP_PATTERNS: &[&str] =
    &[r"^[\s\t]*Playbook run took [0-9]+ days, [0-9]+ hours, [0-9]+ minutes, [0-9]+ seconds$"];

/// `chain` followed by suppression of [`DEFAULT_SKIP_PATTERNS`]
pub fn document_chain(chain: TransformerChain) -> Result<TransformerChain, ConfigError> {
    Ok(TransformerChain::builder()
        .then(chain)
        .then(IgnoreMessage::new(DEFAULT_SKIP_PATTERNS)?)
        .build())
}

/// Relay `source` in document mode into memory and return the raw bytes.
///
/// Fails with [`DocumentError::Cancelled`] if `cancel` fired first, since the
/// document would be incomplete.
pub async fn collect_document<R>(
    source: R,
    chain: TransformerChain,
    config: PipelineConfig,
    cancel: &CancellationToken,
) -> Result<Vec<u8>, DocumentError>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let processor = LineProcessor::new(document_chain(chain)?);
    let pipeline = StreamPipeline::new(config, Box::new(processor))?;
    let outcome = pipeline.run(source, Vec::new(), cancel).await?;

    if outcome.is_cancelled() {
        return Err(DocumentError::Cancelled);
    }
    debug!(
        bytes = outcome.sink.len(),
        blanked = outcome.report.records_blanked,
        "Collected result document"
    );
    Ok(outcome.sink)
}

/// A document-mode run whose output went to a sink as it arrived
#[derive(Debug)]
pub struct RelayedDocument<W> {
    pub report: RunReport,
    pub sink: W,
    /// `None` when the run was cancelled
    pub document: Option<ResultDocument>,
}

/// Relay `source` in document mode into `sink` record by record and parse a
/// copy of the relayed text once the run has completed.
///
/// Cancellation is not an error: the partial output is already in `sink`
/// and no document is parsed.
pub async fn relay_document<R, W>(
    source: R,
    sink: W,
    chain: TransformerChain,
    config: PipelineConfig,
    cancel: &CancellationToken,
) -> Result<RelayedDocument<W>, DocumentError>
where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let processor = LineProcessor::new(document_chain(chain)?);
    let pipeline = StreamPipeline::new(config, Box::new(processor))?;
    let outcome = pipeline.run(source, TeeWriter::new(sink), cancel).await?;

    let cancelled = outcome.is_cancelled();
    let RunOutcome { report, sink } = outcome;
    let (sink, relayed) = sink.into_parts();

    let document = if cancelled {
        debug!(bytes = relayed.len(), "Document relay cancelled, not parsing");
        None
    } else {
        Some(ResultDocument::from_slice(&relayed)?)
    };
    Ok(RelayedDocument {
        report,
        sink,
        document,
    })
}

/// Relay `source` in document mode and parse the result.
///
/// Stats are not checked here; call [`ResultDocument::check_stats`].
pub async fn decode_document<R>(
    source: R,
    chain: TransformerChain,
    config: PipelineConfig,
    cancel: &CancellationToken,
) -> Result<ResultDocument, DocumentError>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let bytes = collect_document(source, chain, config, cancel).await?;
    Ok(ResultDocument::from_slice(&bytes)?)
}
