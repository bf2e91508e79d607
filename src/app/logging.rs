//! Logging configuration and initialization
//!
//! Logs always go to stderr; stdout carries relayed records only.

use crate::app::config::AppConfig;
use tracing::{debug, trace};

/// Initialize tracing for the binary
pub fn init_logging(config: &AppConfig) {
    tracing_subscriber::fmt()
        .with_env_filter(config.log_level())
        .with_writer(std::io::stderr)
        .with_target(config.verbose >= 2)
        .with_line_number(config.verbose >= 2)
        .init();

    debug!("stdout-relay started with verbosity level: {}", config.verbose);
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());
}
