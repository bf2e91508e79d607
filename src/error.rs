use std::fmt;
use thiserror::Error;

/// Longest slice of a malformed record kept for error messages
const SNIPPET_LIMIT: usize = 120;

/// Errors that terminate a pipeline run
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Read error: {0}")]
    Read(#[source] std::io::Error),

    #[error("Write error: {0}")]
    Write(#[source] std::io::Error),

    #[error(transparent)]
    Aggregated(#[from] AggregatedError),

    #[error("Pipeline stage '{stage}' did not finish: {source}")]
    Task {
        stage: &'static str,
        #[source]
        source: tokio::task::JoinError,
    },
}

impl StreamError {
    /// True for errors that aborted the run, as opposed to record failures
    /// reported once the stream was fully drained.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, StreamError::Aggregated(_))
    }
}

/// A single JSONL record that could not be decoded
#[derive(Error, Debug)]
#[error("line {line}: {source} (record: {snippet:?})")]
pub struct RecordError {
    pub line: usize,
    pub snippet: String,
    #[source]
    pub source: serde_json::Error,
}

impl RecordError {
    pub fn new(line: usize, raw: &[u8], source: serde_json::Error) -> Self {
        let text = String::from_utf8_lossy(raw);
        let text = text.trim_end_matches(&['\r', '\n'][..]);
        let snippet = match text.char_indices().nth(SNIPPET_LIMIT) {
            Some((cut, _)) => format!("{}...", &text[..cut]),
            None => text.to_string(),
        };
        Self {
            line,
            snippet,
            source,
        }
    }
}

/// Every record failure collected over one run, in stream order
#[derive(Debug, Default)]
pub struct AggregatedError {
    causes: Vec<RecordError>,
}

impl AggregatedError {
    /// Returns `None` when nothing failed
    pub fn from_causes(causes: Vec<RecordError>) -> Option<Self> {
        if causes.is_empty() {
            None
        } else {
            Some(Self { causes })
        }
    }

    pub fn causes(&self) -> &[RecordError] {
        &self.causes
    }

    pub fn len(&self) -> usize {
        self.causes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.causes.is_empty()
    }
}

impl fmt::Display for AggregatedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} malformed record(s)", self.causes.len())?;
        for cause in &self.causes {
            write!(f, "; {cause}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregatedError {}

/// Health-check failures found in a decoded result document
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatsError {
    #[error("host {host} finished with {count} failures")]
    Failures { host: String, count: u64 },

    #[error("host {host} finished with {count} unreachable")]
    Unreachable { host: String, count: u64 },
}

impl StatsError {
    pub fn host(&self) -> &str {
        match self {
            StatsError::Failures { host, .. } | StatsError::Unreachable { host, .. } => host,
        }
    }
}

/// Invalid construction-time configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Queue capacity must be positive")]
    InvalidCapacity,

    #[error("Invalid skip pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Invalid timestamp layout: {0}")]
    InvalidTimestampLayout(String),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures while turning a stream into a result document
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("Stream was cancelled before the document was complete")]
    Cancelled,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid result document: {0}")]
    Parse(#[from] serde_json::Error),
}
