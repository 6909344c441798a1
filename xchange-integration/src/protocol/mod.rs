//! Protocol-level abstractions shared by every venue adapter.

/// HTTP REST request/signing abstractions.
pub mod http;

/// WebSocket transport wrapper.
pub mod websocket;

use crate::error::SocketError;

/// Parses a raw transport frame into a borrowed textual payload, or `None` for
/// frames that carry no application data (pings, close frames). Adapters parse
/// the payload further into domain events.
pub trait StreamParser {
    type Message;

    fn parse(message: Self::Message) -> Result<Option<String>, SocketError>;
}
