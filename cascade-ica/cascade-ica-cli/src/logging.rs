//! Log output for the binary. Always stderr; stdout carries the JSON record.

use cascade_ica::config::LogLevel;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set.
pub fn default_directives(level: LogLevel) -> String {
    format!("cascade_ica={level},cascade_ica_cli={level}")
}

/// Install the global subscriber. A second call is a no-op.
pub fn init(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
