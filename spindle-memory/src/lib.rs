//! In-process storage engine.
//!
//! `MemoryEngine` implements [`spindle_core::Engine`] on top of an MVCC
//! map: optimistic conflict detection against recent commits, a
//! read-your-writes overlay per transaction, watches, retry backoff and a
//! single network thread that completes every future. It stands in for a
//! real cluster in tests, benchmarks and the command-line tool.

pub mod backoff;
pub mod config;
pub mod engine;
pub mod stats;

mod futures;
mod network;
mod store;
mod transaction;

pub use backoff::BackoffPolicy;
pub use config::EngineConfig;
pub use engine::{CommitFault, MemoryEngine, MAX_API_VERSION};
pub use stats::EngineStats;
