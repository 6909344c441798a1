#![forbid(unsafe_code)]
#![warn(missing_debug_implementations, rust_2018_idioms)]
//! # xchange-integration
//!
//! Low-level, venue-agnostic framework for composing web integrations with
//! financial exchanges: admission control, reconnect-with-jitter, and the
//! HTTP/WebSocket protocol seams that every venue adapter builds on.

/// [`SocketError`](error::SocketError): the shared transport-level error type.
pub mod error;

/// Token-bucket-with-backoff admission control.
pub mod ratelimit;

/// Exponential-backoff-with-jitter reconnect loop.
pub mod reconnect;

/// HTTP request signing and WebSocket transport abstractions.
pub mod protocol;

pub use error::SocketError;
