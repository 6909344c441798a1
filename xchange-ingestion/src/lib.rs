#![forbid(unsafe_code)]
#![warn(missing_debug_implementations, rust_2018_idioms)]
//! # xchange-ingestion
//!
//! Historical data ingestion: durable per-task checkpointing, record
//! cleaning (validation, dedup, sort, anomaly detection, gap filling), and
//! the bounded-concurrency orchestrator that drives a configured ingestion
//! plan to completion.

pub mod checkpoint;
pub mod clean;
pub mod error;
pub mod orchestrator;
pub mod sink;

pub use checkpoint::{CheckpointStore, ColumnarCheckpointStore, LocalFileCheckpointStore};
pub use clean::Cleaner;
pub use error::IngestionError;
pub use orchestrator::{IngestionEvent, IngestionPlan, Orchestrator, TaskSpec};
pub use sink::{InMemorySink, RecordSink};
