//! The exhaustive error taxonomy.

use std::time::Duration;
use thiserror::Error;
use xchange_integration::SocketError;
use xchange_schema::Symbol;

/// One of the eleven taxonomy kinds. Retryability is a property of the kind,
/// not of the call site — see [`ErrorKind::retryable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AuthenticationError,
    InsufficientFunds,
    InvalidOrder,
    OrderNotFound,
    RateLimitExceeded,
    NetworkError,
    ExchangeError,
    InvalidSymbol,
    WebsocketError,
    ParseError,
    UnknownError,
}

impl ErrorKind {
    /// Whether a caller may retry the operation.
    pub fn retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimitExceeded | ErrorKind::NetworkError | ErrorKind::WebsocketError
        )
    }
}

/// Adapter-level error, enriched with `{symbol?, orderId?, retryable,
/// retryAfter?}` context so callers never have to match on venue status
/// text.
#[derive(Debug, Error)]
#[error("{kind:?}: {message}")]
pub struct AdapterError {
    pub kind: ErrorKind,
    pub message: String,
    pub symbol: Option<Symbol>,
    pub order_id: Option<String>,
    pub retry_after: Option<Duration>,
}

impl AdapterError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            symbol: None,
            order_id: None,
            retry_after: None,
        }
    }

    pub fn with_symbol(mut self, symbol: Symbol) -> Self {
        self.symbol = Some(symbol);
        self
    }

    pub fn with_order_id(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// Whether the caller may retry this specific error.
    pub fn retryable(&self) -> bool {
        self.kind.retryable()
    }

    pub fn rate_limited(retry_after: Duration) -> Self {
        Self::new(ErrorKind::RateLimitExceeded, "venue rate limit exceeded")
            .with_retry_after(retry_after)
    }

    pub fn invalid_symbol(symbol: Symbol) -> Self {
        Self::new(ErrorKind::InvalidSymbol, format!("unknown symbol: {symbol}")).with_symbol(symbol)
    }

    pub fn parse_error(field: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        let field = field.into();
        Self::new(ErrorKind::ParseError, format!("{field}: {reason}"))
    }
}

impl From<xchange_schema::ValidationError> for AdapterError {
    fn from(value: xchange_schema::ValidationError) -> Self {
        Self::new(ErrorKind::ParseError, value.to_string())
    }
}

impl From<SocketError> for AdapterError {
    fn from(value: SocketError) -> Self {
        match value {
            SocketError::RateLimitExhausted(_) => {
                Self::new(ErrorKind::RateLimitExceeded, value.to_string())
            }
            SocketError::ConnectFailed(_) | SocketError::SendFailed(_) | SocketError::Closed => {
                Self::new(ErrorKind::WebsocketError, value.to_string())
            }
            SocketError::Http(_) => Self::new(ErrorKind::NetworkError, value.to_string()),
            SocketError::HttpStatus { status, body } => {
                let kind = if status == 429 {
                    ErrorKind::RateLimitExceeded
                } else {
                    ErrorKind::NetworkError
                };
                Self::new(kind, format!("http {status}: {body}"))
            }
            SocketError::BuildRequest(_) | SocketError::Serialization(_) => {
                Self::new(ErrorKind::ParseError, value.to_string())
            }
            SocketError::Subscribe(_) => Self::new(ErrorKind::WebsocketError, value.to_string()),
        }
    }
}
