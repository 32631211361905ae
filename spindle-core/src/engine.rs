//! The narrow interface to the storage engine.
//!
//! An engine is a handle-based black box: it hands out opaque ids for
//! databases, transactions and pending operations ("futures"), completes the
//! futures on its own network thread and lets the caller copy results out
//! once they are ready. Engines report failures as raw numeric codes; the
//! client layer turns them into [`crate::Error`] values.

use crate::error_code::{self, ErrorCode};
use crate::key::{KeySelector, KeyValue};
use crate::options::{ConflictRangeType, MutationType, StreamingMode};
use bytes::Bytes;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatabaseId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FutureId(pub u64);

pub type EngineResult<T> = std::result::Result<T, ErrorCode>;

/// Single-shot completion notification, invoked on the engine's thread.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Parameters of one range page fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRequest {
    pub begin: KeySelector,
    pub end: KeySelector,
    /// Remaining pair limit for the whole read; 0 means unlimited.
    pub limit: usize,
    pub mode: StreamingMode,
    /// 1 for the first page, incremented for every follow-up page.
    pub iteration: u32,
    pub snapshot: bool,
    pub reverse: bool,
}

pub trait Engine: Send + Sync + 'static {
    /// Highest API version this engine understands.
    fn max_api_version(&self) -> i32;

    fn setup_network(&self) -> EngineResult<()>;

    /// Drives the engine's event loop. Blocks until [`Engine::stop_network`].
    fn run_network(&self) -> EngineResult<()>;

    fn stop_network(&self) -> EngineResult<()>;

    fn describe_error(&self, code: ErrorCode) -> String {
        error_code::describe(code).to_string()
    }

    fn create_database(&self, cluster_file: Option<&str>) -> EngineResult<DatabaseId>;

    fn destroy_database(&self, db: DatabaseId);

    fn create_transaction(&self, db: DatabaseId) -> EngineResult<TransactionId>;

    fn destroy_transaction(&self, tr: TransactionId);

    // Operations that complete asynchronously.

    fn get(&self, tr: TransactionId, key: &[u8], snapshot: bool) -> FutureId;

    fn get_key(&self, tr: TransactionId, selector: &KeySelector, snapshot: bool) -> FutureId;

    fn get_range(&self, tr: TransactionId, request: &RangeRequest) -> FutureId;

    fn get_read_version(&self, tr: TransactionId) -> FutureId;

    fn get_addresses_for_key(&self, tr: TransactionId, key: &[u8]) -> FutureId;

    fn watch(&self, tr: TransactionId, key: &[u8]) -> FutureId;

    fn commit(&self, tr: TransactionId) -> FutureId;

    /// Classifies `code`. The returned future resolves without error (after
    /// a backoff delay) when the error is retryable, or with `code` itself
    /// when it is fatal.
    fn on_error(&self, tr: TransactionId, code: ErrorCode) -> FutureId;

    // Operations that take effect immediately.

    fn set(&self, tr: TransactionId, key: &[u8], value: &[u8]);

    fn clear(&self, tr: TransactionId, key: &[u8]);

    fn clear_range(&self, tr: TransactionId, begin: &[u8], end: &[u8]);

    fn atomic_op(&self, tr: TransactionId, key: &[u8], param: &[u8], mutation: MutationType);

    fn add_conflict_range(
        &self,
        tr: TransactionId,
        begin: &[u8],
        end: &[u8],
        kind: ConflictRangeType,
    ) -> EngineResult<()>;

    fn set_read_version(&self, tr: TransactionId, version: i64);

    fn get_committed_version(&self, tr: TransactionId) -> EngineResult<i64>;

    fn reset(&self, tr: TransactionId);

    fn cancel(&self, tr: TransactionId);

    // Futures.

    fn future_is_ready(&self, f: FutureId) -> bool;

    /// Registers a callback fired once when `f` becomes ready. If `f` is
    /// already ready the callback fires immediately on the calling thread.
    fn future_set_callback(&self, f: FutureId, callback: Callback) -> EngineResult<()>;

    fn future_cancel(&self, f: FutureId);

    fn future_destroy(&self, f: FutureId);

    /// Error code of a ready future, `SUCCESS` when it completed normally.
    fn future_get_error(&self, f: FutureId) -> ErrorCode;

    fn future_get_value(&self, f: FutureId) -> EngineResult<Option<Bytes>>;

    fn future_get_key(&self, f: FutureId) -> EngineResult<Bytes>;

    /// A page of pairs and whether more data is available past it.
    fn future_get_key_values(&self, f: FutureId) -> EngineResult<(Vec<KeyValue>, bool)>;

    fn future_get_version(&self, f: FutureId) -> EngineResult<i64>;

    fn future_get_string_array(&self, f: FutureId) -> EngineResult<Vec<String>>;
}
