//! Tracing initialization.

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "SQLPROBE_LOG";

const DEFAULT_FILTER: &str = "sqlprobe=warn";

static INIT: Once = Once::new();

/// Install the global subscriber.
///
/// Reads [`LOG_ENV`] as an `EnvFilter` directive list, for example
/// `SQLPROBE_LOG=sqlprobe::pipeline=debug`. Falls back to `sqlprobe=warn`
/// when unset or invalid. Logs go to stderr so that instrumented SQL on
/// stdout stays clean.
///
/// Safe to call more than once.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_line_number(true),
            )
            .with(filter)
            .init();
    });
}
