#![forbid(unsafe_code)]
#![warn(missing_debug_implementations, rust_2018_idioms)]
//! # xchange-exchange
//!
//! The exchange adapter runtime: a duplex stream session with auth handshake,
//! subscribe/unsubscribe, ping/idle detection and reconnect-triggered
//! resubscription, plus the fixed venue-adapter capability surface that
//! normalizes venue-native payloads into [`xchange_schema`]'s unified domain
//! model.
//!
//! Request signing and response error classification follow the same shape
//! for every venue, generalized behind the
//! [`VenueAdapter`](adapter::VenueAdapter) trait each one implements.

/// The error taxonomy: [`AdapterError`](error::AdapterError).
pub mod error;

/// Duplex stream session: connect, authenticate, subscribe, dispatch.
pub mod session;

/// [`VenueAdapter`](adapter::VenueAdapter) trait and concrete venue
/// implementations.
pub mod adapter;

pub use error::{AdapterError, ErrorKind};
pub use session::{StreamSession, StreamSessionHandle};
