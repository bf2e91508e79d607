//! Composable line transformers

use crate::error::ConfigError;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, Local};
use regex::RegexSet;
use std::sync::Arc;

/// Layout used by [`LogFormat`] when none is configured
pub const DEFAULT_LOG_FORMAT_LAYOUT: &str = "%Y-%m-%d %H:%M:%S";

/// A pure line-to-line function
pub trait Transform: Send + Sync {
    fn apply(&self, line: String) -> String;
}

impl<F> Transform for F
where
    F: Fn(String) -> String + Send + Sync,
{
    fn apply(&self, line: String) -> String {
        self(line)
    }
}

/// Transformers applied in registration order.
///
/// Built once through [`TransformerChain::builder`] and immutable afterwards.
/// Cloning is cheap and shares the underlying transformers.
#[derive(Clone)]
pub struct TransformerChain {
    steps: Arc<[Box<dyn Transform>]>,
}

impl Default for TransformerChain {
    fn default() -> Self {
        Self {
            steps: Arc::from(Vec::new()),
        }
    }
}

impl TransformerChain {
    pub fn builder() -> TransformerChainBuilder {
        TransformerChainBuilder::default()
    }

    /// A chain that returns every line unchanged
    pub fn identity() -> Self {
        Self::default()
    }

    /// `fk(...f2(f1(line)))` for transformers `f1..fk`
    pub fn apply(&self, line: String) -> String {
        self.steps.iter().fold(line, |line, step| step.apply(line))
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// A whole chain can be one step of a longer chain
impl Transform for TransformerChain {
    fn apply(&self, line: String) -> String {
        TransformerChain::apply(self, line)
    }
}

impl std::fmt::Debug for TransformerChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformerChain")
            .field("steps", &self.steps.len())
            .finish()
    }
}

#[derive(Default)]
pub struct TransformerChainBuilder {
    steps: Vec<Box<dyn Transform>>,
}

impl TransformerChainBuilder {
    pub fn then(mut self, step: impl Transform + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn build(self) -> TransformerChain {
        TransformerChain {
            steps: self.steps.into(),
        }
    }
}

/// Puts `expression` and a space in front of the line
#[derive(Debug, Clone)]
pub struct Prepend {
    expression: String,
}

impl Prepend {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
        }
    }
}

impl Transform for Prepend {
    fn apply(&self, line: String) -> String {
        format!("{} {}", self.expression, line)
    }
}

/// Puts a space and `expression` after the line
#[derive(Debug, Clone)]
pub struct Append {
    expression: String,
}

impl Append {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
        }
    }
}

impl Transform for Append {
    fn apply(&self, mut line: String) -> String {
        line.push(' ');
        line.push_str(&self.expression);
        line
    }
}

/// Source of the current time for [`LogFormat`]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

impl<F> Clock for F
where
    F: Fn() -> DateTime<FixedOffset> + Send + Sync,
{
    fn now(&self) -> DateTime<FixedOffset> {
        self()
    }
}

/// Wall clock in the local timezone
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// Always returns the same instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<FixedOffset>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.0
    }
}

/// Prefixes the line with a timestamp and a tab
pub struct LogFormat {
    layout: String,
    clock: Arc<dyn Clock>,
}

impl LogFormat {
    /// `layout` is a strftime string. Formatting an invalid layout panics in
    /// chrono, so it is checked up front.
    pub fn new(layout: impl Into<String>, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        let layout = layout.into();
        if StrftimeItems::new(&layout).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::InvalidTimestampLayout(layout));
        }
        Ok(Self { layout, clock })
    }
}

impl Transform for LogFormat {
    fn apply(&self, line: String) -> String {
        format!("{}\t{}", self.clock.now().format(&self.layout), line)
    }
}

/// Blanks lines that match any of its patterns.
///
/// A matching line becomes the empty string; it is not removed, so one
/// empty record is still emitted for it. Register this last so the patterns
/// see the fully decorated line.
#[derive(Debug, Clone)]
pub struct IgnoreMessage {
    patterns: RegexSet,
}

impl IgnoreMessage {
    pub fn new<I, S>(patterns: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self {
            patterns: RegexSet::new(patterns)?,
        })
    }

    pub fn matches(&self, line: &str) -> bool {
        self.patterns.is_match(line)
    }
}

impl Transform for IgnoreMessage {
    fn apply(&self, line: String) -> String {
        if self.matches(&line) {
            String::new()
        } else {
            line
        }
    }
}
