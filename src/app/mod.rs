//! Application module
//!
//! Binary-level plumbing shared by `main`: verbosity settings, logging setup
//! and fatal error reporting.

pub mod config;
pub mod error_handling;
pub mod logging;

pub use config::AppConfig;
pub use error_handling::{exit_code, handle_fatal_error};
pub use logging::init_logging;
