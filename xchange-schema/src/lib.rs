#![forbid(unsafe_code)]
#![warn(missing_debug_implementations, rust_2018_idioms)]
//! # xchange-schema
//!
//! The single source of truth for inter-component types: canonical,
//! venue-independent domain entities plus the runtime validator that every
//! adapter output and checkpoint load must pass through before crossing a
//! component boundary.
//!
//! `Side`, `OrderType`, and the other enums follow the same
//! enum-with-`as_str`/`FromStr` idiom used throughout this workspace's
//! domain types, generalized to a multi-venue domain rather than a single
//! broker.

/// Canonical domain types: [`Symbol`], [`Market`], [`Order`], [`Position`],
/// [`Balance`], [`Ticker`], [`OrderBook`], [`Trade`], [`Kline`],
/// [`FundingRate`], [`Checkpoint`], [`Alert`], [`Metric`], [`Subscription`].
pub mod model;

/// [`ValidationError`](error::ValidationError) and the field-path formatting
/// shared by every `Validate` impl.
pub mod error;

/// The [`Validate`](validate::Validate) trait and its implementations for every
/// canonical type.
pub mod validate;

pub use error::ValidationError;
pub use model::*;
pub use validate::Validate;
