//! Transport-level error type shared by the rate limiter, reconnect controller
//! and protocol layer.

use thiserror::Error;

/// Errors raised below the venue-adapter boundary: connectivity, protocol
/// framing, and request construction failures. Adapter-level semantic errors
/// (insufficient funds, unknown symbol, ...) are the §7 `AdapterError` taxonomy
/// in `xchange-exchange`, which wraps `SocketError` as its `NETWORK_ERROR` and
/// `WEBSOCKET_ERROR` variants.
#[derive(Debug, Error)]
pub enum SocketError {
    #[error("failed to build request: {0}")]
    BuildRequest(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("websocket connect failed: {0}")]
    ConnectFailed(String),

    #[error("websocket send failed: {0}")]
    SendFailed(String),

    #[error("websocket closed by peer")]
    Closed,

    #[error("http transport error: {0}")]
    Http(String),

    /// A non-2xx HTTP response, with its status and raw body preserved so the
    /// adapter layer can deserialize the venue's own error envelope instead of
    /// losing it to a generic transport failure.
    #[error("http status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("rate limiter: max retries exceeded after {0} consecutive throttles")]
    RateLimitExhausted(u32),

    #[error("subscription rejected: {0}")]
    Subscribe(String),
}

impl From<reqwest::Error> for SocketError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SocketError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::ConnectFailed(value.to_string())
    }
}
