//! Utilities for logging.

use std::sync::Once;

use tracing::Level;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoggingFormat {
    #[default]
    Pretty,
    Json,
}

/// Install a global subscriber writing to stderr.
///
/// `RUST_LOG` takes precedence over `default_level` for any directive it
/// specifies.
pub fn configure_global_logger(
    default_level: Level,
    format: LoggingFormat,
) -> Result<(), SetGlobalDefaultError> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let builder = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true);

    match format {
        LoggingFormat::Pretty => tracing::subscriber::set_global_default(builder.finish()),
        LoggingFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
    }
}

/// Install a test-writer subscriber once per process.
///
/// Safe to call from every test.
pub fn init_test() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let env_filter = EnvFilter::builder()
            .with_default_directive(Level::DEBUG.into())
            .from_env_lossy();
        let subscriber = FmtSubscriber::builder()
            .with_test_writer()
            .with_env_filter(env_filter)
            .finish();
        // Another harness may have installed one already.
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}
