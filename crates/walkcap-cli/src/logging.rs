//! tracing-subscriber setup

use tracing_subscriber::EnvFilter;
use walkcap_core::config::{LogFormat, LoggingConfig};

/// Install the global subscriber; `RUST_LOG` wins over the configured level
pub fn init(config: &LoggingConfig, verbose: bool) {
    let mut config = config.clone();
    if verbose {
        config.level = "debug".to_string();
    }
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directive()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let result = match config.format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if let Err(e) = result {
        eprintln!("logging already initialized: {e}");
    }
}
