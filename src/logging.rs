use std::time::{SystemTime, UNIX_EPOCH};

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVE: &str = "csv_table_sync=info";

/// Install the global subscriber: `RUST_LOG`-driven filter plus a console layer on stderr.
///
/// Calling it again (or after another subscriber was installed) is a no-op.
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));
    let console_layer = fmt::layer().with_writer(std::io::stderr).with_target(true);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .try_init();
}

/// Seconds since the Unix epoch, for file log lines and outbox messages.
pub(crate) fn unix_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
