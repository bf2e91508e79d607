use super::RelayConfig;
use crate::error::ConfigError;
use std::path::Path;
use tokio::fs;
use tracing::debug;

/// Read, parse and validate a TOML config file
pub async fn load(path: &Path) -> Result<RelayConfig, ConfigError> {
    let content = fs::read_to_string(path).await?;
    let config = RelayConfig::from_toml_str(&content)?;
    debug!("Loaded relay config from {}", path.display());
    Ok(config)
}

/// Load `path` if given, otherwise fall back to defaults
pub async fn load_or_default(path: Option<&Path>) -> Result<RelayConfig, ConfigError> {
    match path {
        Some(path) => load(path).await,
        None => Ok(RelayConfig::default()),
    }
}
