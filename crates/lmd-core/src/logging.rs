//! Logging setup for lmd.
//!
//! Every lmd binary logs to stderr through one `tracing` subscriber. The
//! filter covers all `lmd*` crates.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LEVEL: &str = "info";

/// Initialize logging from `RUST_LOG`, falling back to `lmd=info`.
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| level_filter(DEFAULT_LEVEL));
    install(filter);
}

/// Initialize logging at `level`, ignoring `RUST_LOG`.
pub fn init_with_level(level: &str) {
    install(level_filter(level));
}

fn level_filter(level: &str) -> EnvFilter {
    EnvFilter::new(format!("lmd={level}"))
}

fn install(filter: EnvFilter) {
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
