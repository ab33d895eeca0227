//! Tracing setup for the command-line binary

use std::env;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding an `EnvFilter` directive
pub const LOG_ENV: &str = "MEDIA_SAMPLER_LOG";

/// Filter directive used when the environment does not provide one
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// Install a stderr fmt layer. `MEDIA_SAMPLER_LOG` wins over `-v` flags.
pub fn init_logging(verbosity: u8) {
    let filter = env::var(LOG_ENV)
        .ok()
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| EnvFilter::new(default_directive(verbosity)));

    let registered = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .with(filter)
        .try_init();

    if let Err(e) = registered {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }
}
