//! Result document emitted by the engine's JSON callback

use crate::error::StatsError;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Aggregate outcome of one engine run: plays, their tasks, per-host
/// results and the final per-host counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultDocument {
    #[serde(default)]
    pub custom_stats: Value,
    #[serde(default)]
    pub global_custom_stats: Value,
    #[serde(default)]
    pub plays: Vec<PlayResult>,
    #[serde(default)]
    pub stats: BTreeMap<String, HostStats>,
}

impl ResultDocument {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Fails if any host recorded failures, or else if any host was
    /// unreachable. Failures are looked for on every host first.
    ///
    /// When several hosts are at fault, which one is named is unspecified.
    pub fn check_stats(&self) -> Result<(), StatsError> {
        if let Some((host, stats)) = self.stats.iter().find(|(_, s)| s.failures > 0) {
            return Err(StatsError::Failures {
                host: host.clone(),
                count: stats.failures,
            });
        }
        if let Some((host, stats)) = self.stats.iter().find(|(_, s)| s.unreachable > 0) {
            return Err(StatsError::Unreachable {
                host: host.clone(),
                count: stats.unreachable,
            });
        }
        Ok(())
    }

    /// Every task across all plays, in run order
    pub fn tasks(&self) -> impl Iterator<Item = &TaskResult> {
        self.plays.iter().flat_map(|play| play.tasks.iter())
    }
}

impl fmt::Display for ResultDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for play in &self.plays {
            writeln!(f, "PLAY [{}]", play.play.name)?;
            for task in &play.tasks {
                writeln!(f, "  TASK [{}]", task.task.name)?;
                for (host, result) in &task.hosts {
                    write!(f, "    {}: [{}]", result.status(), host)?;
                    if let Some(msg) = result.message() {
                        write!(f, " {msg}")?;
                    }
                    writeln!(f)?;
                }
            }
        }
        if !self.stats.is_empty() {
            writeln!(f, "RECAP")?;
            for (host, stats) in &self.stats {
                writeln!(f, "  {host}: {stats}")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayResult {
    pub play: Play,
    #[serde(default)]
    pub tasks: Vec<TaskResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Play {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub duration: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task: Task,
    #[serde(default)]
    pub hosts: BTreeMap<String, HostResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub duration: Duration,
}

/// Start and end timestamps as RFC 3339 strings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Duration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

impl Duration {
    /// `None` unless both ends are present and parse
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        let start = DateTime::parse_from_rfc3339(self.start.as_deref()?).ok()?;
        let end = DateTime::parse_from_rfc3339(self.end.as_deref()?).ok()?;
        Some(end - start)
    }
}

/// What one task did on one host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostResult {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub changed: bool,
    #[serde(default)]
    pub failed: bool,
    #[serde(default)]
    pub skipped: bool,
    #[serde(default)]
    pub unreachable: bool,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub msg: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stdout_lines: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stderr_lines: Vec<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub cmd: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub ansible_facts: Value,
    /// Module-specific keys not modelled above
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HostResult {
    pub fn status(&self) -> &'static str {
        if self.unreachable {
            "unreachable"
        } else if self.failed {
            "failed"
        } else if self.skipped {
            "skipping"
        } else if self.changed {
            "changed"
        } else {
            "ok"
        }
    }

    /// Human-readable message, falling back to the skip reason
    pub fn message(&self) -> Option<String> {
        match &self.msg {
            Value::Null => self.skip_reason.clone(),
            Value::String(text) if text.is_empty() => self.skip_reason.clone(),
            Value::String(text) => Some(text.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Final per-host counters; missing counters are zero
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostStats {
    #[serde(default)]
    pub changed: u64,
    #[serde(default)]
    pub failures: u64,
    #[serde(default)]
    pub ignored: u64,
    #[serde(default)]
    pub ok: u64,
    #[serde(default)]
    pub rescued: u64,
    #[serde(default)]
    pub skipped: u64,
    #[serde(default)]
    pub unreachable: u64,
}

impl fmt::Display for HostStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ok={} changed={} unreachable={} failed={} skipped={} rescued={} ignored={}",
            self.ok,
            self.changed,
            self.unreachable,
            self.failures,
            self.skipped,
            self.rescued,
            self.ignored
        )
    }
}
