//! Core types for the streaming pipeline

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default number of processed records buffered between the two stages
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// How the engine's stdout is interpreted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Free-text lines, decorated and filtered one by one
    #[default]
    #[value(name = "text")]
    #[serde(alias = "plain")]
    Text,
    /// A single JSON result document spread over many lines
    #[value(name = "json")]
    Json,
    /// One JSON event per line, re-encoded canonically
    #[value(name = "jsonl")]
    Jsonl,
}

/// Lifecycle of a single pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl RunState {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Cancelled | RunState::Failed
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Cancelled => "cancelled",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Construction-time settings of the pipeline engine
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Capacity of the bounded queue between the produce and write stages
    pub queue_capacity: usize,
    /// Cancel the run after this long
    pub timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            timeout: None,
        }
    }
}

impl PipelineConfig {
    pub fn with_capacity(queue_capacity: usize) -> Self {
        Self {
            queue_capacity,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidCapacity);
        }
        Ok(())
    }
}

/// What the produce stage saw while draining its source
#[derive(Debug, Default)]
pub struct ProduceSummary {
    /// Records pulled from the source, malformed ones included
    pub records_read: u64,
    /// Records replaced by an empty line through suppression
    pub records_blanked: u64,
    /// Record-local failures, in stream order
    pub failures: Vec<crate::error::RecordError>,
    /// Production stopped because the run was cancelled
    pub cancelled: bool,
}

/// Counters for a finished run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub state: RunState,
    pub records_read: u64,
    pub records_blanked: u64,
    pub records_malformed: usize,
    pub records_written: u64,
    pub duration: Duration,
}

/// Result of a successful (completed or cancelled) run
#[derive(Debug)]
pub struct RunOutcome<W> {
    pub report: RunReport,
    /// The sink handed back once the write stage has finished with it
    pub sink: W,
}

impl<W> RunOutcome<W> {
    pub fn is_cancelled(&self) -> bool {
        self.report.state == RunState::Cancelled
    }
}
