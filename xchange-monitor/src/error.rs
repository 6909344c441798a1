//! Crate-local error aggregation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("alert not found: {0}")]
    AlertNotFound(String),

    #[error("invalid alert transition: {0}")]
    InvalidTransition(String),

    #[error("notification transport error: {0}")]
    Transport(String),
}
