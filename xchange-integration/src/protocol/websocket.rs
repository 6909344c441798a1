//! Thin WebSocket transport wrapper over `tokio-tungstenite`.
//!
//! Exposes just what the stream session needs: connect with a handshake
//! timeout, and a split sink/stream pair so one reader task and one writer
//! can run independently while sharing the same socket.

use crate::error::SocketError;
use crate::protocol::StreamParser;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};

/// A raw WebSocket frame, re-exported from `tungstenite`.
pub type WsMessage = Message;

/// The underlying duplex socket type.
pub type WebSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects to `url`, failing after a 10s handshake timeout.
pub async fn connect(url: &str) -> Result<WebSocket, SocketError> {
    let (stream, _response) = tokio::time::timeout(
        Duration::from_secs(10),
        tokio_tungstenite::connect_async(url),
    )
    .await
    .map_err(|_| SocketError::ConnectFailed(format!("handshake timed out connecting to {url}")))??;
    Ok(stream)
}

/// Sends a text frame.
pub async fn send_text(socket: &mut WebSocket, text: String) -> Result<(), SocketError> {
    socket
        .send(Message::Text(text.into()))
        .await
        .map_err(|e| SocketError::SendFailed(e.to_string()))
}

/// Sends a ping frame (liveness, every 30s).
pub async fn send_ping(socket: &mut WebSocket) -> Result<(), SocketError> {
    socket
        .send(Message::Ping(Vec::new().into()))
        .await
        .map_err(|e| SocketError::SendFailed(e.to_string()))
}

/// Reads the next frame, or `Ok(None)` when the peer closed the connection.
pub async fn next_message(socket: &mut WebSocket) -> Result<Option<WsMessage>, SocketError> {
    match socket.next().await {
        Some(Ok(message)) => Ok(Some(message)),
        Some(Err(e)) => Err(e.into()),
        None => Ok(None),
    }
}

/// [`StreamParser`] for the standard WebSocket transport: text frames carry
/// the payload; everything else (ping/pong/binary/close) is consumed
/// silently.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketParser;

impl StreamParser for WebSocketParser {
    type Message = WsMessage;

    fn parse(message: Self::Message) -> Result<Option<String>, SocketError> {
        match message {
            Message::Text(text) => Ok(Some(text.as_str().to_string())),
            Message::Close(_) => Err(SocketError::Closed),
            _ => Ok(None),
        }
    }
}
