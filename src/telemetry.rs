//! Logging setup

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "info,vaultlink=debug,sqlx=warn,hyper=warn";

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Human-readable logs; `RUST_LOG` overrides the default filter
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(filter())
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

/// One JSON object per line
pub fn init_logging_json() {
    tracing_subscriber::registry()
        .with(filter())
        .with(fmt::layer().json().with_current_span(false))
        .init();
}
