//! Crate-local error aggregation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("adapter error: {0}")]
    Adapter(#[from] xchange_exchange::AdapterError),

    #[error("checkpoint store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unknown venue: {0}")]
    UnknownVenue(String),
}

impl IngestionError {
    pub fn message(&self) -> String {
        self.to_string()
    }
}
