//! Validation error type shared by every canonical model.

use thiserror::Error;

/// A schema validation failure. Carries the offending field path (e.g.
/// `"order.remaining"`) so callers can pinpoint exactly what was wrong.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validation failed at `{field}`: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience macro for building a [`ValidationError`] with a `format!`-style
/// reason, keeping call sites in `validate.rs` terse.
macro_rules! invalid {
    ($field:expr, $($arg:tt)*) => {
        return Err($crate::error::ValidationError::new($field, format!($($arg)*)))
    };
}

pub(crate) use invalid;
