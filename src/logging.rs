//! Structured logging setup.
//!
//! Log lines go to stderr so command output on stdout stays parseable.
//! The filter is read from `PINSPECT_LOG` (e.g. `PINSPECT_LOG=patent_inspector=debug`)
//! and defaults to `info`, or `debug` with `--verbose`.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "PINSPECT_LOG";

pub fn init(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}
