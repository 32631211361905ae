//! Spindle client library
//!
//! The application-facing layer over a transactional key-value engine:
//!
//! - [`AsyncResult`] futures that any thread can wait on, decoded once and
//!   cached;
//! - [`Transaction`] and [`Snapshot`] handles with read-your-writes;
//! - [`Database::transact`], which runs a function in a retry loop and
//!   lets the engine decide which failures are worth retrying;
//! - [`RangeResult`] and [`RangeIterator`], which stream ordered range
//!   reads page by page.
//!
//! # Example
//! ```no_run
//! use spindle_client::{Error, ReadTransaction};
//! use std::sync::Arc;
//! # fn example(engine: Arc<dyn spindle_client::Engine>) -> Result<(), Error> {
//! spindle_client::api_version(100)?;
//! spindle_client::start_network(engine)?;
//! let db = spindle_client::open(None)?;
//!
//! db.transact(|tr| {
//!     tr.set(b"hello", b"world")?;
//!     Ok::<_, Error>(())
//! })?;
//! assert!(db.get(b"hello")?.is_some());
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod error;
pub mod future;
pub mod network;
pub mod range;
pub mod transaction;

#[cfg(test)]
mod testing;

// Re-export key types
pub use database::{Database, Transactor};
pub use error::{EngineError, Error, Result, TransactError};
pub use future::{AsyncResult, FutureKey, FutureNil, FutureStringArray, FutureValue, FutureVersion};
pub use network::{
    api_version, open, selected_api_version, start_network, stop_network, Network, API_VERSION,
};
pub use range::{RangeIterator, RangeResult};
pub use transaction::{ReadTransaction, Snapshot, Transaction};

pub use spindle_core::{
    error_code, key_after, prefix_range, strinc, Engine, ErrorCode, ExactRange, KeyRange,
    KeySelector, KeyValue, MutationType, Range, RangeOptions, SelectorRange, StreamingMode,
};
