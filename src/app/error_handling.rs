//! Fatal error reporting for the binary

use crate::error::StatsError;
use tracing::error;

/// Exit status for a stats health failure
pub const EXIT_UNHEALTHY: i32 = 2;
/// Exit status for every other fatal error
pub const EXIT_FAILURE: i32 = 1;

/// Exit status for `error`
pub fn exit_code(error: &anyhow::Error) -> i32 {
    if error.downcast_ref::<StatsError>().is_some() {
        EXIT_UNHEALTHY
    } else {
        EXIT_FAILURE
    }
}

/// Log `error`, print it to stderr and exit
///
/// With `verbose >= 1` the whole cause chain is printed.
pub fn handle_fatal_error(error: anyhow::Error, verbose: u8) -> ! {
    error!("Fatal error: {:#}", error);

    eprintln!("Error: {error:#}");
    if verbose >= 1 {
        eprintln!("\nError chain:");
        for (i, cause) in error.chain().enumerate() {
            eprintln!("  {}: {}", i, cause);
        }
    }

    std::process::exit(exit_code(&error))
}
