#![forbid(unsafe_code)]
#![warn(missing_debug_implementations, rust_2018_idioms)]
//! # xchange-core
//!
//! Ambient plumbing shared by every other crate in the workspace: structured
//! logging setup, a cooperative shutdown signal, a small time helper module, and
//! the field-wise configuration override convention used across the system.
//!
//! Nothing here is venue- or subsystem-specific; `xchange-exchange`,
//! `xchange-ingestion` and `xchange-monitor` all depend on this crate so
//! cross-cutting concerns live in exactly one place.

/// Structured logging initialization (human-readable and JSON layers).
pub mod logging;

/// Cooperative cancellation signal threaded through every long-running loop.
pub mod shutdown;

/// Millisecond-since-epoch helpers shared by the cleaner, checkpoint store and
/// stream session idle/ping timers.
pub mod time;

/// Field-wise configuration override (`Config::merge`).
pub mod config;
