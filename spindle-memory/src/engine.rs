//! `MemoryEngine`: an in-process implementation of the engine interface.

use crate::config::EngineConfig;
use crate::futures::{FutureRegistry, Output};
use crate::network::NetworkQueue;
use crate::stats::{EngineStats, StatsRecorder};
use crate::store::Store;
use crate::transaction::TxnState;
use bytes::Bytes;
use parking_lot::Mutex;
use spindle_core::error_code::{self, ErrorCode};
use spindle_core::{
    Callback, ConflictRangeType, DatabaseId, Engine, EngineResult, FutureId, KeySelector, KeyValue,
    MutationType, RangeRequest, TransactionId,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, info};

/// Highest API version the in-process engine speaks.
pub const MAX_API_VERSION: i32 = 100;

/// Error codes `on_error` treats as transient.
const RETRYABLE: [ErrorCode; 5] = [
    error_code::PAST_VERSION,
    error_code::FUTURE_VERSION,
    error_code::NOT_COMMITTED,
    error_code::COMMIT_UNKNOWN_RESULT,
    error_code::PROCESS_BEHIND,
];

/// A scripted commit failure, consumed by the next commit that writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitFault {
    /// Fail the commit with this code without applying it.
    Fail(ErrorCode),
    /// Apply the commit, then report `commit_unknown_result`.
    UnknownResult,
}

#[derive(Default)]
struct Faults {
    commits: VecDeque<CommitFault>,
    creates: VecDeque<ErrorCode>,
}

struct State {
    store: Store,
    databases: HashSet<DatabaseId>,
    transactions: HashMap<TransactionId, TxnState>,
    faults: Faults,
}

/// What an issued operation leaves behind.
enum Issued {
    Ready(Output),
    /// The future resolves later (watches).
    Waiting,
}

pub struct MemoryEngine {
    config: EngineConfig,
    state: Mutex<State>,
    futures: FutureRegistry,
    network: NetworkQueue,
    stats: StatsRecorder,
    next_id: AtomicU64,
    network_setup: AtomicBool,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::build(EngineConfig::default())
    }

    /// Creates an engine with custom limits.
    pub fn with_config(config: EngineConfig) -> Result<Self, String> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: EngineConfig) -> Self {
        let stats = StatsRecorder::new();
        Self {
            state: Mutex::new(State {
                store: Store::new(config.version_window),
                databases: HashSet::new(),
                transactions: HashMap::new(),
                faults: Faults::default(),
            }),
            futures: FutureRegistry::new(stats.clone()),
            network: NetworkQueue::new(),
            stats,
            next_id: AtomicU64::new(1),
            network_setup: AtomicBool::new(false),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stats(&self) -> EngineStats {
        self.stats.snapshot()
    }

    /// Version of the latest applied commit.
    pub fn current_version(&self) -> i64 {
        self.state.lock().store.version()
    }

    pub fn is_network_running(&self) -> bool {
        self.network.is_running()
    }

    /// Queues a failure for an upcoming commit.
    pub fn inject_commit_fault(&self, fault: CommitFault) {
        self.state.lock().faults.commits.push_back(fault);
    }

    /// Makes the next `create_transaction` call fail with `code`.
    pub fn inject_create_error(&self, code: ErrorCode) {
        self.state.lock().faults.creates.push_back(code);
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Runs `op` against a live transaction and queues the outcome for
    /// delivery on the network thread.
    fn issue<F>(&self, tr: TransactionId, op: F) -> FutureId
    where
        F: FnOnce(&mut State, FutureId) -> EngineResult<Issued>,
    {
        let id = self.futures.create(Some(tr));
        let issued = {
            let mut state = self.state.lock();
            let refused = match state.transactions.get(&tr) {
                None => Some(error_code::CLIENT_INVALID_OPERATION),
                Some(txn) if txn.cancelled => Some(error_code::TRANSACTION_CANCELLED),
                Some(_) => None,
            };
            match refused {
                Some(code) => Err(code),
                None => op(&mut *state, id),
            }
        };
        match issued {
            Ok(Issued::Ready(output)) => self.network.deliver(id, output),
            Ok(Issued::Waiting) => {}
            Err(code) => self.network.deliver(id, Output::Error(code)),
        }
        id
    }

    /// Applies an immediate operation; ignored for unknown or cancelled
    /// transactions.
    fn mutate(&self, tr: TransactionId, op: impl FnOnce(&mut TxnState)) {
        let mut state = self.state.lock();
        match state.transactions.get_mut(&tr) {
            Some(txn) if !txn.cancelled => op(txn),
            Some(_) => debug!(?tr, "Ignoring mutation on cancelled transaction"),
            None => debug!(?tr, "Ignoring mutation on unknown transaction"),
        }
    }

    fn commit_txn(&self, state: &mut State, tr: TransactionId) -> EngineResult<Issued> {
        let State {
            store,
            transactions,
            faults,
            ..
        } = state;
        let txn = transactions
            .get_mut(&tr)
            .ok_or(error_code::CLIENT_INVALID_OPERATION)?;

        let outcome = if let Some(code) = txn.deferred_error() {
            Err(code)
        } else if txn.is_read_only() {
            txn.finish_commit(-1);
            Ok(None)
        } else {
            let fault = faults.commits.pop_front();
            let read_version = txn.commit_read_version(store);
            if let Some(CommitFault::Fail(code)) = fault {
                Err(code)
            } else if read_version < store.oldest_version() {
                Err(error_code::PAST_VERSION)
            } else if store.has_conflict(read_version, txn.read_conflicts()) {
                Err(error_code::NOT_COMMITTED)
            } else {
                let mutations = txn.mutations(store);
                let version = store.apply(mutations, txn.write_conflicts().to_vec());
                txn.finish_commit(version);
                self.stats.committed();
                debug!(?tr, version, "Committed transaction");
                Ok(fault)
            }
        };

        let watches = txn.take_watches();
        match outcome {
            Ok(fault) => {
                for watch in watches {
                    self.futures.detach(watch.id);
                    store.arm_watch(watch);
                }
                store.prune_watches(|id| self.futures.is_pending(id));
                for id in store.fire_watches() {
                    self.network.deliver(id, Output::Nil);
                }
                self.stats.set_live_watches(store.watch_count());
                match fault {
                    Some(CommitFault::UnknownResult) => Err(error_code::COMMIT_UNKNOWN_RESULT),
                    _ => Ok(Issued::Ready(Output::Nil)),
                }
            }
            Err(code) => {
                debug!(?tr, code, "Commit failed");
                for watch in watches {
                    self.network.deliver(watch.id, Output::Error(code));
                }
                Err(code)
            }
        }
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for MemoryEngine {
    fn max_api_version(&self) -> i32 {
        MAX_API_VERSION
    }

    fn setup_network(&self) -> EngineResult<()> {
        if self.network_setup.swap(true, Ordering::SeqCst) {
            return Err(error_code::NETWORK_ALREADY_SETUP);
        }
        info!("Network configured");
        Ok(())
    }

    fn run_network(&self) -> EngineResult<()> {
        if !self.network_setup.load(Ordering::SeqCst) {
            return Err(error_code::NETWORK_NOT_SETUP);
        }
        self.network.run(&self.futures)
    }

    fn stop_network(&self) -> EngineResult<()> {
        if !self.network_setup.load(Ordering::SeqCst) {
            return Err(error_code::NETWORK_NOT_SETUP);
        }
        self.network.stop();
        Ok(())
    }

    fn create_database(&self, cluster_file: Option<&str>) -> EngineResult<DatabaseId> {
        let db = DatabaseId(self.next_id());
        self.state.lock().databases.insert(db);
        info!(?db, cluster_file = cluster_file.unwrap_or("<default>"), "Opened database");
        Ok(db)
    }

    fn destroy_database(&self, db: DatabaseId) {
        self.state.lock().databases.remove(&db);
        debug!(?db, "Closed database");
    }

    fn create_transaction(&self, db: DatabaseId) -> EngineResult<TransactionId> {
        let mut state = self.state.lock();
        if let Some(code) = state.faults.creates.pop_front() {
            return Err(code);
        }
        if !state.databases.contains(&db) {
            return Err(error_code::CLIENT_INVALID_OPERATION);
        }
        let tr = TransactionId(self.next_id());
        state.transactions.insert(tr, TxnState::new(db));
        self.stats.transaction_created();
        Ok(tr)
    }

    fn destroy_transaction(&self, tr: TransactionId) {
        let removed = self.state.lock().transactions.remove(&tr).is_some();
        if removed {
            self.futures.fail_owned(tr, error_code::OPERATION_CANCELLED);
        }
    }

    fn get(&self, tr: TransactionId, key: &[u8], snapshot: bool) -> FutureId {
        self.issue(tr, |state, _| {
            let State {
                store,
                transactions,
                ..
            } = state;
            let txn = transactions
                .get_mut(&tr)
                .ok_or(error_code::CLIENT_INVALID_OPERATION)?;
            txn.get(store, key, snapshot)
                .map(|value| Issued::Ready(Output::Value(value)))
        })
    }

    fn get_key(&self, tr: TransactionId, selector: &KeySelector, snapshot: bool) -> FutureId {
        self.issue(tr, |state, _| {
            let State {
                store,
                transactions,
                ..
            } = state;
            let txn = transactions
                .get_mut(&tr)
                .ok_or(error_code::CLIENT_INVALID_OPERATION)?;
            txn.get_key(store, selector, snapshot)
                .map(|key| Issued::Ready(Output::Key(key)))
        })
    }

    fn get_range(&self, tr: TransactionId, request: &RangeRequest) -> FutureId {
        self.issue(tr, |state, _| {
            let State {
                store,
                transactions,
                ..
            } = state;
            let txn = transactions
                .get_mut(&tr)
                .ok_or(error_code::CLIENT_INVALID_OPERATION)?;
            let (kvs, more) = txn.get_range(store, request, &self.config)?;
            debug!(
                ?tr,
                iteration = request.iteration,
                rows = kvs.len(),
                more,
                "Fetched range page"
            );
            Ok(Issued::Ready(Output::KeyValues(kvs, more)))
        })
    }

    fn get_read_version(&self, tr: TransactionId) -> FutureId {
        self.issue(tr, |state, _| {
            let State {
                store,
                transactions,
                ..
            } = state;
            let txn = transactions
                .get_mut(&tr)
                .ok_or(error_code::CLIENT_INVALID_OPERATION)?;
            txn.read_version(store)
                .map(|version| Issued::Ready(Output::Version(version)))
        })
    }

    fn get_addresses_for_key(&self, tr: TransactionId, _key: &[u8]) -> FutureId {
        self.issue(tr, |_, _| {
            Ok(Issued::Ready(Output::Strings(self.config.addresses.clone())))
        })
    }

    fn watch(&self, tr: TransactionId, key: &[u8]) -> FutureId {
        self.issue(tr, |state, id| {
            let State {
                store,
                transactions,
                ..
            } = state;
            store.prune_watches(|watch| self.futures.is_pending(watch));
            let txn = transactions
                .get_mut(&tr)
                .ok_or(error_code::CLIENT_INVALID_OPERATION)?;
            if store.watch_count() + txn.watch_count() >= self.config.max_watches {
                return Err(error_code::TOO_MANY_WATCHES);
            }
            txn.add_watch(store, id, key)?;
            Ok(Issued::Waiting)
        })
    }

    fn commit(&self, tr: TransactionId) -> FutureId {
        self.issue(tr, |state, _| self.commit_txn(state, tr))
    }

    fn on_error(&self, tr: TransactionId, code: ErrorCode) -> FutureId {
        self.stats.on_error_called();
        let delay = {
            let mut state = self.state.lock();
            match state.transactions.get_mut(&tr) {
                None => Err(error_code::CLIENT_INVALID_OPERATION),
                Some(_) if !RETRYABLE.contains(&code) => Err(code),
                Some(txn) => {
                    let delay = self.config.backoff.backoff_duration(txn.attempts);
                    txn.attempts += 1;
                    txn.reset();
                    Ok(delay)
                }
            }
        };

        let id = self.futures.create(None);
        match delay {
            Ok(delay) => {
                debug!(?tr, code, ?delay, "Retryable error, resetting transaction");
                self.futures.fail_owned(tr, error_code::OPERATION_CANCELLED);
                self.network.deliver_after(delay, id, Output::Nil);
            }
            Err(code) => {
                debug!(?tr, code, "Error is not retryable");
                self.network.deliver(id, Output::Error(code));
            }
        }
        id
    }

    fn set(&self, tr: TransactionId, key: &[u8], value: &[u8]) {
        self.mutate(tr, |txn| txn.set(key, value, &self.config));
    }

    fn clear(&self, tr: TransactionId, key: &[u8]) {
        self.mutate(tr, |txn| txn.clear(key, &self.config));
    }

    fn clear_range(&self, tr: TransactionId, begin: &[u8], end: &[u8]) {
        self.mutate(tr, |txn| txn.clear_range(begin, end));
    }

    fn atomic_op(&self, tr: TransactionId, key: &[u8], param: &[u8], mutation: MutationType) {
        self.mutate(tr, |txn| txn.atomic_op(key, param, mutation, &self.config));
    }

    fn add_conflict_range(
        &self,
        tr: TransactionId,
        begin: &[u8],
        end: &[u8],
        kind: ConflictRangeType,
    ) -> EngineResult<()> {
        if begin > end {
            return Err(error_code::INVERTED_RANGE);
        }
        let mut state = self.state.lock();
        let txn = state
            .transactions
            .get_mut(&tr)
            .ok_or(error_code::CLIENT_INVALID_OPERATION)?;
        let (begin, end) = (Bytes::copy_from_slice(begin), Bytes::copy_from_slice(end));
        match kind {
            ConflictRangeType::Read => txn.add_read_conflict(begin, end),
            ConflictRangeType::Write => txn.add_write_conflict(begin, end),
        }
        Ok(())
    }

    fn set_read_version(&self, tr: TransactionId, version: i64) {
        self.mutate(tr, |txn| txn.set_read_version(version));
    }

    fn get_committed_version(&self, tr: TransactionId) -> EngineResult<i64> {
        let state = self.state.lock();
        let txn = state
            .transactions
            .get(&tr)
            .ok_or(error_code::CLIENT_INVALID_OPERATION)?;
        Ok(txn.committed_version.unwrap_or(-1))
    }

    fn reset(&self, tr: TransactionId) {
        let found = match self.state.lock().transactions.get_mut(&tr) {
            Some(txn) => {
                txn.reset();
                txn.attempts = 0;
                true
            }
            None => false,
        };
        if found {
            self.futures.fail_owned(tr, error_code::OPERATION_CANCELLED);
        }
    }

    fn cancel(&self, tr: TransactionId) {
        let found = match self.state.lock().transactions.get_mut(&tr) {
            Some(txn) => {
                txn.cancelled = true;
                txn.take_watches();
                true
            }
            None => false,
        };
        if found {
            let failed = self.futures.fail_owned(tr, error_code::TRANSACTION_CANCELLED);
            debug!(?tr, failed, "Cancelled transaction");
        }
    }

    fn future_is_ready(&self, f: FutureId) -> bool {
        self.futures.is_ready(f)
    }

    fn future_set_callback(&self, f: FutureId, callback: Callback) -> EngineResult<()> {
        self.futures.set_callback(f, callback)
    }

    fn future_cancel(&self, f: FutureId) {
        self.futures.cancel(f);
    }

    fn future_destroy(&self, f: FutureId) {
        self.futures.destroy(f);
    }

    fn future_get_error(&self, f: FutureId) -> ErrorCode {
        self.futures.error(f)
    }

    fn future_get_value(&self, f: FutureId) -> EngineResult<Option<Bytes>> {
        self.futures.read(f, |output| match output {
            Output::Value(Some(value)) => Ok(Some(value.clone())),
            Output::Value(None) => Err(error_code::VALUE_NOT_PRESENT),
            _ => Err(error_code::CLIENT_INVALID_OPERATION),
        })
    }

    fn future_get_key(&self, f: FutureId) -> EngineResult<Bytes> {
        self.futures.read(f, |output| match output {
            Output::Key(key) => Ok(key.clone()),
            _ => Err(error_code::CLIENT_INVALID_OPERATION),
        })
    }

    fn future_get_key_values(&self, f: FutureId) -> EngineResult<(Vec<KeyValue>, bool)> {
        self.futures.read(f, |output| match output {
            Output::KeyValues(kvs, more) => Ok((kvs.clone(), *more)),
            _ => Err(error_code::CLIENT_INVALID_OPERATION),
        })
    }

    fn future_get_version(&self, f: FutureId) -> EngineResult<i64> {
        self.futures.read(f, |output| match output {
            Output::Version(version) => Ok(*version),
            _ => Err(error_code::CLIENT_INVALID_OPERATION),
        })
    }

    fn future_get_string_array(&self, f: FutureId) -> EngineResult<Vec<String>> {
        self.futures.read(f, |output| match output {
            Output::Strings(strings) => Ok(strings.clone()),
            _ => Err(error_code::CLIENT_INVALID_OPERATION),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::BackoffPolicy;
    use spindle_core::StreamingMode;
    use std::sync::Arc;
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    struct Running {
        engine: Arc<MemoryEngine>,
        db: DatabaseId,
        handle: Option<JoinHandle<EngineResult<()>>>,
    }

    impl Running {
        fn start(config: EngineConfig) -> Self {
            let engine = Arc::new(MemoryEngine::with_config(config).unwrap());
            engine.setup_network().unwrap();
            let handle = {
                let engine = Arc::clone(&engine);
                thread::spawn(move || engine.run_network())
            };
            let db = engine.create_database(None).unwrap();
            Self {
                engine,
                db,
                handle: Some(handle),
            }
        }

        fn wait(&self, f: FutureId) -> ErrorCode {
            while !self.engine.future_is_ready(f) {
                thread::sleep(Duration::from_micros(200));
            }
            self.engine.future_get_error(f)
        }

        fn txn(&self) -> TransactionId {
            self.engine.create_transaction(self.db).unwrap()
        }

        fn commit(&self, tr: TransactionId) -> ErrorCode {
            let f = self.engine.commit(tr);
            self.wait(f)
        }

        fn read(&self, tr: TransactionId, key: &[u8]) -> EngineResult<Option<Bytes>> {
            let f = self.engine.get(tr, key, false);
            self.wait(f);
            self.engine.future_get_value(f)
        }
    }

    impl Drop for Running {
        fn drop(&mut self) {
            let _ = self.engine.stop_network();
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
        }
    }

    fn fast_config() -> EngineConfig {
        EngineConfig::default().with_backoff(BackoffPolicy::fast())
    }

    #[test]
    fn test_set_commit_read() {
        let rt = Running::start(fast_config());
        let tr = rt.txn();
        rt.engine.set(tr, b"hello", b"world");
        assert_eq!(rt.commit(tr), error_code::SUCCESS);
        assert!(rt.engine.get_committed_version(tr).unwrap() > 0);

        let tr = rt.txn();
        assert_eq!(rt.read(tr, b"hello"), Ok(Some(Bytes::from_static(b"world"))));
        assert_eq!(rt.read(tr, b"missing"), Err(error_code::VALUE_NOT_PRESENT));
    }

    #[test]
    fn test_read_only_commit_has_no_version() {
        let rt = Running::start(fast_config());
        let tr = rt.txn();
        let _ = rt.read(tr, b"k");
        assert_eq!(rt.commit(tr), error_code::SUCCESS);
        assert_eq!(rt.engine.get_committed_version(tr), Ok(-1));
        assert_eq!(rt.engine.stats().commits, 0);
    }

    #[test]
    fn test_conflicting_commit_fails() {
        let rt = Running::start(fast_config());
        let t1 = rt.txn();
        let t2 = rt.txn();

        let _ = rt.read(t1, b"k");
        rt.engine.set(t1, b"k", b"1");
        rt.engine.set(t2, b"k", b"2");
        assert_eq!(rt.commit(t2), error_code::SUCCESS);
        assert_eq!(rt.commit(t1), error_code::NOT_COMMITTED);
    }

    #[test]
    fn test_snapshot_read_does_not_conflict() {
        let rt = Running::start(fast_config());
        let t1 = rt.txn();
        let t2 = rt.txn();

        let f = rt.engine.get(t1, b"k", true);
        rt.wait(f);
        rt.engine.set(t1, b"other", b"1");
        rt.engine.set(t2, b"k", b"2");
        assert_eq!(rt.commit(t2), error_code::SUCCESS);
        assert_eq!(rt.commit(t1), error_code::SUCCESS);
    }

    #[test]
    fn test_on_error_classifies_codes() {
        let rt = Running::start(fast_config());
        let tr = rt.txn();
        rt.engine.set(tr, b"k", b"v");

        let f = rt.engine.on_error(tr, error_code::NOT_COMMITTED);
        assert_eq!(rt.wait(f), error_code::SUCCESS);
        // The retry resets buffered writes.
        assert_eq!(rt.commit(tr), error_code::SUCCESS);
        assert_eq!(rt.engine.get_committed_version(tr), Ok(-1));

        let f = rt.engine.on_error(tr, error_code::KEY_TOO_LARGE);
        assert_eq!(rt.wait(f), error_code::KEY_TOO_LARGE);
        assert_eq!(rt.engine.stats().on_error_calls, 2);
    }

    #[test]
    fn test_backoff_attempts_are_per_transaction() {
        let rt = Running::start(fast_config());
        let attempts = |tr: TransactionId| rt.engine.state.lock().transactions[&tr].attempts;

        let tr = rt.txn();
        for _ in 0..2 {
            let f = rt.engine.on_error(tr, error_code::NOT_COMMITTED);
            assert_eq!(rt.wait(f), error_code::SUCCESS);
        }
        assert_eq!(attempts(tr), 2);

        // A fresh transaction starts from the initial delay again.
        let fresh = rt.txn();
        assert_eq!(attempts(fresh), 0);
        let f = rt.engine.on_error(fresh, error_code::NOT_COMMITTED);
        assert_eq!(rt.wait(f), error_code::SUCCESS);
        assert_eq!(attempts(fresh), 1);
    }

    #[test]
    fn test_cancel_fails_later_operations() {
        let rt = Running::start(fast_config());
        let tr = rt.txn();
        rt.engine.cancel(tr);
        assert_eq!(rt.read(tr, b"k"), Err(error_code::TRANSACTION_CANCELLED));
        assert_eq!(rt.commit(tr), error_code::TRANSACTION_CANCELLED);

        rt.engine.reset(tr);
        assert_eq!(rt.read(tr, b"k"), Err(error_code::VALUE_NOT_PRESENT));
    }

    #[test]
    fn test_injected_faults() {
        let rt = Running::start(fast_config());
        rt.engine.inject_create_error(error_code::OPERATION_FAILED);
        assert_eq!(
            rt.engine.create_transaction(rt.db),
            Err(error_code::OPERATION_FAILED)
        );

        rt.engine.inject_commit_fault(CommitFault::Fail(error_code::PROCESS_BEHIND));
        let tr = rt.txn();
        rt.engine.set(tr, b"k", b"v");
        assert_eq!(rt.commit(tr), error_code::PROCESS_BEHIND);

        rt.engine.inject_commit_fault(CommitFault::UnknownResult);
        let tr = rt.txn();
        rt.engine.set(tr, b"k", b"v");
        assert_eq!(rt.commit(tr), error_code::COMMIT_UNKNOWN_RESULT);

        let tr = rt.txn();
        assert_eq!(rt.read(tr, b"k"), Ok(Some(Bytes::from_static(b"v"))));
    }

    #[test]
    fn test_watch_fires_on_change() {
        let rt = Running::start(fast_config());
        let tr = rt.txn();
        let watch = rt.engine.watch(tr, b"w");
        assert_eq!(rt.commit(tr), error_code::SUCCESS);
        assert!(!rt.engine.future_is_ready(watch));
        assert_eq!(rt.engine.stats().live_watches, 1);

        let writer = rt.txn();
        rt.engine.set(writer, b"w", b"changed");
        assert_eq!(rt.commit(writer), error_code::SUCCESS);
        assert_eq!(rt.wait(watch), error_code::SUCCESS);
    }

    #[test]
    fn test_watch_limit() {
        let rt = Running::start(fast_config().with_max_watches(1));
        let tr = rt.txn();
        let first = rt.engine.watch(tr, b"a");
        let second = rt.engine.watch(tr, b"b");
        assert_eq!(rt.wait(second), error_code::TOO_MANY_WATCHES);

        rt.engine.destroy_transaction(tr);
        assert_eq!(rt.wait(first), error_code::OPERATION_CANCELLED);
    }

    #[test]
    fn test_range_page() {
        let rt = Running::start(fast_config());
        let tr = rt.txn();
        for key in ["a", "b", "c"] {
            rt.engine.set(tr, key.as_bytes(), b"v");
        }
        assert_eq!(rt.commit(tr), error_code::SUCCESS);

        let tr = rt.txn();
        let f = rt.engine.get_range(
            tr,
            &RangeRequest {
                begin: KeySelector::first_greater_or_equal(&b"a"[..]),
                end: KeySelector::first_greater_or_equal(&b"z"[..]),
                limit: 2,
                mode: StreamingMode::WantAll,
                iteration: 1,
                snapshot: false,
                reverse: true,
            },
        );
        rt.wait(f);
        let (kvs, more) = rt.engine.future_get_key_values(f).unwrap();
        let keys: Vec<&[u8]> = kvs.iter().map(|kv| &kv.key[..]).collect();
        assert_eq!(keys, vec![&b"c"[..], &b"b"[..]]);
        assert!(!more);
    }

    #[test]
    fn test_run_network_requires_setup() {
        let engine = MemoryEngine::new();
        assert_eq!(engine.run_network(), Err(error_code::NETWORK_NOT_SETUP));
        engine.setup_network().unwrap();
        assert_eq!(engine.setup_network(), Err(error_code::NETWORK_ALREADY_SETUP));
    }
}
