//! Relay configuration
//!
//! Settings come from a TOML file and/or command-line flags; nothing is read
//! from the environment. Every field has a default, so an empty file is a
//! valid configuration that relays text unchanged.

pub mod loader;

use crate::error::ConfigError;
use crate::streaming::{
    processor_for, Append, Clock, IgnoreMessage, LogFormat, OutputMode, PipelineConfig, Prepend,
    StreamProcessor, SystemClock, TransformerChain, DEFAULT_LOG_FORMAT_LAYOUT,
    DEFAULT_QUEUE_CAPACITY,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    pub mode: OutputMode,
    pub queue_capacity: usize,
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prepend: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub append: Option<String>,
    /// Prefix each line with the current time
    pub timestamp: bool,
    pub timestamp_layout: String,
    /// Lines matching any of these are blanked
    pub skip_patterns: Vec<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            mode: OutputMode::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            timeout: None,
            prepend: None,
            append: None,
            timestamp: false,
            timestamp_layout: DEFAULT_LOG_FORMAT_LAYOUT.to_string(),
            skip_patterns: Vec::new(),
        }
    }
}

impl RelayConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: RelayConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check everything that would otherwise fail when building the pipeline
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pipeline_config().validate()?;
        IgnoreMessage::new(&self.skip_patterns)?;
        if self.timestamp {
            LogFormat::new(self.timestamp_layout.as_str(), Arc::new(SystemClock))?;
        }
        Ok(())
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            queue_capacity: self.queue_capacity,
            timeout: self.timeout,
        }
    }

    /// Transformers in fixed order: prepend, append, timestamp, suppression.
    /// Suppression goes last so patterns see the decorated line.
    pub fn build_chain(&self, clock: Arc<dyn Clock>) -> Result<TransformerChain, ConfigError> {
        let mut builder = TransformerChain::builder();
        if let Some(expression) = &self.prepend {
            builder = builder.then(Prepend::new(expression.as_str()));
        }
        if let Some(expression) = &self.append {
            builder = builder.then(Append::new(expression.as_str()));
        }
        if self.timestamp {
            builder = builder.then(LogFormat::new(self.timestamp_layout.as_str(), clock)?);
        }
        if !self.skip_patterns.is_empty() {
            builder = builder.then(IgnoreMessage::new(&self.skip_patterns)?);
        }
        Ok(builder.build())
    }

    /// Processor for the configured mode; document mode also blanks the
    /// engine's default noise lines.
    pub fn build_processor(
        &self,
        clock: Arc<dyn Clock>,
    ) -> Result<Box<dyn StreamProcessor>, ConfigError> {
        let mut chain = self.build_chain(clock)?;
        if self.mode == OutputMode::Json {
            chain = crate::results::document_chain(chain)?;
        }
        Ok(processor_for(self.mode, chain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::FixedClock;
    use chrono::{FixedOffset, TimeZone};

    fn clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock(
            FixedOffset::east_opt(0)
                .unwrap()
                .with_ymd_and_hms(2024, 6, 1, 8, 30, 0)
                .unwrap(),
        ))
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = RelayConfig::from_toml_str("").unwrap();
        assert_eq!(config, RelayConfig::default());
        assert_eq!(config.queue_capacity, 64);
        assert_eq!(config.mode, OutputMode::Text);
    }

    #[test]
    fn test_full_document() {
        let config = RelayConfig::from_toml_str(
            r#"
mode = "jsonl"
queue_capacity = 8
timeout = "5m"
prepend = "[deploy]"
append = "(prod)"
timestamp = true
timestamp_layout = "%H:%M"
skip_patterns = ["^\\s*$", "DEPRECATION"]
"#,
        )
        .unwrap();

        assert_eq!(config.mode, OutputMode::Jsonl);
        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.timeout, Some(Duration::from_secs(300)));
        assert_eq!(config.prepend.as_deref(), Some("[deploy]"));
        assert_eq!(config.skip_patterns.len(), 2);
        assert_eq!(config.pipeline_config().timeout, Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            RelayConfig::from_toml_str("queue_capacity = 0"),
            Err(ConfigError::InvalidCapacity)
        ));
        assert!(matches!(
            RelayConfig::from_toml_str("skip_patterns = [\"(\"]"),
            Err(ConfigError::InvalidPattern(_))
        ));
        assert!(matches!(
            RelayConfig::from_toml_str("timestamp = true\ntimestamp_layout = \"%Q\""),
            Err(ConfigError::InvalidTimestampLayout(_))
        ));
        assert!(matches!(
            RelayConfig::from_toml_str("mode = \"xml\""),
            Err(ConfigError::Toml(_))
        ));
        assert!(matches!(
            RelayConfig::from_toml_str("colour = true"),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_chain_order() {
        let config = RelayConfig {
            prepend: Some("[web]".into()),
            append: Some("(prod)".into()),
            timestamp: true,
            timestamp_layout: "%H:%M".into(),
            skip_patterns: vec!["^08:30\\t\\[web\\] skipping".into()],
            ..RelayConfig::default()
        };
        let chain = config.build_chain(clock()).unwrap();

        assert_eq!(chain.len(), 4);
        assert_eq!(chain.apply("ok: [h1]".into()), "08:30\t[web] ok: [h1] (prod)");
        assert_eq!(chain.apply("skipping: [h1]".into()), "");
    }

    #[test]
    fn test_default_chain_is_identity() {
        let chain = RelayConfig::default().build_chain(clock()).unwrap();
        assert!(chain.is_empty());
    }

    #[test]
    fn test_processor_per_mode() {
        let mut config = RelayConfig::default();
        assert_eq!(config.build_processor(clock()).unwrap().name(), "lines");
        config.mode = OutputMode::Json;
        assert_eq!(config.build_processor(clock()).unwrap().name(), "lines");
        config.mode = OutputMode::Jsonl;
        assert_eq!(config.build_processor(clock()).unwrap().name(), "jsonl");
    }
}
