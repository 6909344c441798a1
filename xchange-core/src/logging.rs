//! Standardized logging configuration.
//!
//! A human-readable initializer and a JSON initializer, both driven by
//! `RUST_LOG`, defaulting to `info`.
//!
//! ```rust,ignore
//! use xchange_core::logging::init_logging;
//!
//! fn main() {
//!     init_logging();
//!     tracing::info!("adapter starting");
//! }
//! ```

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initializes human-readable logging to stdout, filtered by `RUST_LOG`
/// (default `info`).
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer())
        .init()
}

/// Initializes JSON logging to stdout, suitable for log aggregators.
pub fn init_json_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
        .init()
}
