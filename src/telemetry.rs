//! Log output for the command-line tool.

use tracing_subscriber::{fmt, EnvFilter};

/// Install a stderr formatter. `RUST_LOG` wins when set; otherwise the level
/// is `info`, or `debug` with `verbose`.
pub fn init_subscriber(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // A subscriber may already be installed (e.g. by a test harness).
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
