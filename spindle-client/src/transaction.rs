//! Transactions and snapshot views.

use crate::database::Database;
use crate::error::{engine_error, Error, Result};
use crate::future::{
    AsyncResult, Decode, FutureKey, FutureNil, FutureStringArray, FutureValue, FutureVersion,
};
use crate::range::RangeResult;
use spindle_core::{
    key_after, prefix_range, ConflictRangeType, Engine, ExactRange, FutureId, KeySelector,
    MutationType, Range, RangeOptions, TransactionId,
};
use std::fmt;
use std::sync::Arc;

/// The engine transaction shared by a [`Transaction`], its clones and its
/// [`Snapshot`] views. Destroyed when the last of them is dropped.
pub(crate) struct TransactionInner {
    db: Database,
    id: TransactionId,
}

impl TransactionInner {
    pub(crate) fn new(db: Database, id: TransactionId) -> Self {
        Self { db, id }
    }

    pub(crate) fn engine(&self) -> &Arc<dyn Engine> {
        self.db.engine()
    }

    pub(crate) fn id(&self) -> TransactionId {
        self.id
    }

    fn future<T: Decode>(&self, id: FutureId) -> AsyncResult<T> {
        AsyncResult::new(Arc::clone(self.engine()), id)
    }

    fn get(&self, key: &[u8], snapshot: bool) -> FutureValue {
        self.future(self.engine().get(self.id, key, snapshot))
    }

    fn get_key(&self, selector: &KeySelector, snapshot: bool) -> FutureKey {
        self.future(self.engine().get_key(self.id, selector, snapshot))
    }

    fn get_read_version(&self) -> FutureVersion {
        self.future(self.engine().get_read_version(self.id))
    }

    fn get_addresses_for_key(&self, key: &[u8]) -> FutureStringArray {
        self.future(self.engine().get_addresses_for_key(self.id, key))
    }

    fn add_conflict_range(&self, begin: &[u8], end: &[u8], kind: ConflictRangeType) -> Result<()> {
        self.engine()
            .add_conflict_range(self.id, begin, end, kind)
            .map_err(|code| engine_error(&**self.engine(), code))
    }
}

impl Drop for TransactionInner {
    fn drop(&mut self) {
        self.db.engine().destroy_transaction(self.id);
    }
}

fn zero_transaction() -> Error {
    Error::InvalidOperation("use of a zero-value transaction".to_string())
}

fn issue<T: Decode>(
    inner: &Option<Arc<TransactionInner>>,
    op: impl FnOnce(&TransactionInner) -> AsyncResult<T>,
) -> AsyncResult<T> {
    match inner {
        Some(inner) => op(inner),
        None => AsyncResult::default(),
    }
}

/// Read operations shared by [`Transaction`] and [`Snapshot`].
///
/// Reads through a `Transaction` add read conflict ranges, so the commit
/// fails if another transaction changed what was read. Reads through a
/// `Snapshot` do not.
pub trait ReadTransaction {
    /// Reads the value of `key`, `None` if it is absent.
    fn get(&self, key: &[u8]) -> FutureValue;

    /// Resolves a key selector to a key in the database.
    fn get_key(&self, selector: &KeySelector) -> FutureKey;

    /// Starts an ordered range read. The first page is requested
    /// immediately; further pages are fetched as the result is consumed.
    fn get_range<R: Range + ?Sized>(&self, range: &R, options: RangeOptions) -> RangeResult;

    /// Reads every key beginning with `prefix`.
    fn get_range_starts_with(&self, prefix: &[u8], options: RangeOptions) -> Result<RangeResult> {
        let range = prefix_range(prefix)?;
        Ok(self.get_range(&range, options))
    }

    /// The version at which this transaction reads.
    fn get_read_version(&self) -> FutureVersion;

    fn get_database(&self) -> Result<Database>;

    /// Addresses of the storage servers holding `key`.
    fn get_addresses_for_key(&self, key: &[u8]) -> FutureStringArray;
}

/// A handle to an engine transaction.
///
/// Clones refer to the same engine transaction. Reads see the
/// transaction's own writes, all reads happen at one read version, and
/// writes stay invisible to other transactions until [`Transaction::commit`]
/// succeeds.
///
/// `Transaction::default()` is the zero transaction: every operation on it
/// fails with [`Error::InvalidOperation`].
///
/// Handles may be shared between threads. Calling `reset` and `cancel`
/// concurrently on the same transaction leaves it in an unspecified state.
#[derive(Clone, Default)]
pub struct Transaction {
    inner: Option<Arc<TransactionInner>>,
}

impl Transaction {
    pub(crate) fn new(inner: TransactionInner) -> Self {
        Self {
            inner: Some(Arc::new(inner)),
        }
    }

    fn inner(&self) -> Result<&TransactionInner> {
        self.inner.as_deref().ok_or_else(zero_transaction)
    }

    /// A view of this transaction whose reads add no read conflicts.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            inner: self.inner.clone(),
        }
    }

    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let inner = self.inner()?;
        inner.engine().set(inner.id, key, value);
        Ok(())
    }

    pub fn clear(&self, key: &[u8]) -> Result<()> {
        let inner = self.inner()?;
        inner.engine().clear(inner.id, key);
        Ok(())
    }

    /// Removes every key in `[begin, end)`.
    pub fn clear_range<R: ExactRange + ?Sized>(&self, range: &R) -> Result<()> {
        let inner = self.inner()?;
        inner
            .engine()
            .clear_range(inner.id, range.begin_key(), range.end_key());
        Ok(())
    }

    /// Removes every key beginning with `prefix`.
    pub fn clear_range_starts_with(&self, prefix: &[u8]) -> Result<()> {
        let range = prefix_range(prefix)?;
        self.clear_range(&range)
    }

    /// Applies an atomic read-modify-write to `key` at commit time.
    ///
    /// Atomic operations add no read conflict, so concurrent updates to the
    /// same key do not make each other retry.
    pub fn atomic_op(&self, key: &[u8], param: &[u8], mutation: MutationType) -> Result<()> {
        let inner = self.inner()?;
        inner.engine().atomic_op(inner.id, key, param, mutation);
        Ok(())
    }

    /// Adds `param` to the little-endian integer stored at `key`.
    pub fn add(&self, key: &[u8], param: &[u8]) -> Result<()> {
        self.atomic_op(key, param, MutationType::Add)
    }

    pub fn bit_and(&self, key: &[u8], param: &[u8]) -> Result<()> {
        self.atomic_op(key, param, MutationType::BitAnd)
    }

    pub fn bit_or(&self, key: &[u8], param: &[u8]) -> Result<()> {
        self.atomic_op(key, param, MutationType::BitOr)
    }

    pub fn bit_xor(&self, key: &[u8], param: &[u8]) -> Result<()> {
        self.atomic_op(key, param, MutationType::BitXor)
    }

    pub fn add_read_conflict_range<R: ExactRange + ?Sized>(&self, range: &R) -> Result<()> {
        self.inner()?
            .add_conflict_range(range.begin_key(), range.end_key(), ConflictRangeType::Read)
    }

    pub fn add_read_conflict_key(&self, key: &[u8]) -> Result<()> {
        self.inner()?
            .add_conflict_range(key, &key_after(key), ConflictRangeType::Read)
    }

    pub fn add_write_conflict_range<R: ExactRange + ?Sized>(&self, range: &R) -> Result<()> {
        self.inner()?
            .add_conflict_range(range.begin_key(), range.end_key(), ConflictRangeType::Write)
    }

    pub fn add_write_conflict_key(&self, key: &[u8]) -> Result<()> {
        self.inner()?
            .add_conflict_range(key, &key_after(key), ConflictRangeType::Write)
    }

    /// Makes the transaction read at `version` instead of a fresh one.
    pub fn set_read_version(&self, version: i64) -> Result<()> {
        let inner = self.inner()?;
        inner.engine().set_read_version(inner.id, version);
        Ok(())
    }

    /// The version at which the last successful commit applied, or -1 for
    /// a commit that wrote nothing.
    pub fn get_committed_version(&self) -> Result<i64> {
        let inner = self.inner()?;
        inner
            .engine()
            .get_committed_version(inner.id)
            .map_err(|code| engine_error(&**inner.engine(), code))
    }

    /// Watches `key` for a change of value.
    ///
    /// The watch starts reporting changes made by other transactions only
    /// after this transaction commits, and it outlives the transaction.
    /// Cancel watches that are no longer needed.
    pub fn watch(&self, key: &[u8]) -> FutureNil {
        issue(&self.inner, |inner| {
            inner.future(inner.engine().watch(inner.id, key))
        })
    }

    /// Commits the transaction's writes.
    ///
    /// Pass any error to [`Transaction::on_error`]. A commit may fail with
    /// `commit_unknown_result` even though it was applied.
    pub fn commit(&self) -> FutureNil {
        issue(&self.inner, |inner| inner.future(inner.engine().commit(inner.id)))
    }

    /// Asks the engine whether `err` is worth retrying.
    ///
    /// The returned future completes without error, after a backoff delay and
    /// with the transaction reset, when the error is retryable. Otherwise it
    /// fails with `err` itself. Errors that did not come from the engine
    /// are never retryable.
    pub fn on_error(&self, err: &Error) -> FutureNil {
        match err.engine_error() {
            Some(engine_err) => issue(&self.inner, |inner| {
                inner.future(inner.engine().on_error(inner.id, engine_err.code()))
            }),
            None => FutureNil::from_error(err.clone()),
        }
    }

    /// Discards all reads and writes and starts over as a new transaction.
    pub fn reset(&self) -> Result<()> {
        let inner = self.inner()?;
        inner.engine().reset(inner.id);
        Ok(())
    }

    /// Fails all pending and future operations on this transaction until
    /// [`Transaction::reset`] is called.
    ///
    /// Cancelling while a commit is outstanding leaves it unknown whether
    /// the commit applied.
    pub fn cancel(&self) -> Result<()> {
        let inner = self.inner()?;
        inner.engine().cancel(inner.id);
        Ok(())
    }
}

impl ReadTransaction for Transaction {
    fn get(&self, key: &[u8]) -> FutureValue {
        issue(&self.inner, |inner| inner.get(key, false))
    }

    fn get_key(&self, selector: &KeySelector) -> FutureKey {
        issue(&self.inner, |inner| inner.get_key(selector, false))
    }

    fn get_range<R: Range + ?Sized>(&self, range: &R, options: RangeOptions) -> RangeResult {
        RangeResult::new(self.inner.clone(), range, options, false)
    }

    fn get_read_version(&self) -> FutureVersion {
        issue(&self.inner, TransactionInner::get_read_version)
    }

    fn get_database(&self) -> Result<Database> {
        Ok(self.inner()?.db.clone())
    }

    fn get_addresses_for_key(&self, key: &[u8]) -> FutureStringArray {
        issue(&self.inner, |inner| inner.get_addresses_for_key(key))
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.inner.as_ref().map(|inner| inner.id))
            .finish()
    }
}

/// Snapshot reads through a [`Transaction`].
///
/// Obtained from [`Transaction::snapshot`]. Reads still see the
/// transaction's own writes but add no read conflicts, trading
/// serializability for fewer retries.
#[derive(Clone, Default)]
pub struct Snapshot {
    inner: Option<Arc<TransactionInner>>,
}

impl ReadTransaction for Snapshot {
    fn get(&self, key: &[u8]) -> FutureValue {
        issue(&self.inner, |inner| inner.get(key, true))
    }

    fn get_key(&self, selector: &KeySelector) -> FutureKey {
        issue(&self.inner, |inner| inner.get_key(selector, true))
    }

    fn get_range<R: Range + ?Sized>(&self, range: &R, options: RangeOptions) -> RangeResult {
        RangeResult::new(self.inner.clone(), range, options, true)
    }

    fn get_read_version(&self) -> FutureVersion {
        issue(&self.inner, TransactionInner::get_read_version)
    }

    fn get_database(&self) -> Result<Database> {
        self.inner
            .as_deref()
            .map(|inner| inner.db.clone())
            .ok_or_else(zero_transaction)
    }

    fn get_addresses_for_key(&self, key: &[u8]) -> FutureStringArray {
        issue(&self.inner, |inner| inner.get_addresses_for_key(key))
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("id", &self.inner.as_ref().map(|inner| inner.id))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Cluster;
    use bytes::Bytes;
    use spindle_core::{error_code, KeyRange};

    fn value(v: &'static [u8]) -> Option<Bytes> {
        Some(Bytes::from_static(v))
    }

    #[test]
    fn test_read_your_writes() {
        let cluster = Cluster::start();
        let tr = cluster.db.create_transaction().unwrap();
        tr.set(b"a", b"1").unwrap();
        assert_eq!(tr.get(b"a").get().unwrap(), value(b"1"));
        tr.clear(b"a").unwrap();
        assert_eq!(tr.get(b"a").get().unwrap(), None);
    }

    #[test]
    fn test_writes_invisible_until_commit() {
        let cluster = Cluster::start();
        let writer = cluster.db.create_transaction().unwrap();
        writer.set(b"a", b"1").unwrap();

        let reader = cluster.db.create_transaction().unwrap();
        assert_eq!(reader.get(b"a").get().unwrap(), None);

        writer.commit().get().unwrap();
        assert!(writer.get_committed_version().unwrap() > 0);
        let reader = cluster.db.create_transaction().unwrap();
        assert_eq!(reader.get(b"a").get().unwrap(), value(b"1"));
    }

    #[test]
    fn test_conflicting_commit_then_on_error() {
        let cluster = Cluster::start();
        let first = cluster.db.create_transaction().unwrap();
        let second = cluster.db.create_transaction().unwrap();

        first.get(b"k").get().unwrap();
        first.set(b"k", b"first").unwrap();
        second.get(b"k").get().unwrap();
        second.set(b"k", b"second").unwrap();

        second.commit().get().unwrap();
        let err = first.commit().get().unwrap_err();
        assert_eq!(err.code(), error_code::NOT_COMMITTED);

        first.on_error(&err).get().unwrap();
        first.set(b"k", b"first").unwrap();
        first.commit().get().unwrap();
        assert_eq!(cluster.db.get(b"k").unwrap(), value(b"first"));
    }

    #[test]
    fn test_snapshot_reads_add_no_conflict() {
        let cluster = Cluster::start();
        let tr = cluster.db.create_transaction().unwrap();
        tr.snapshot().get(b"k").get().unwrap();
        tr.set(b"other", b"x").unwrap();

        cluster.db.set(b"k", b"changed").unwrap();
        tr.commit().get().unwrap();
    }

    #[test]
    fn test_explicit_read_conflict_key() {
        let cluster = Cluster::start();
        let tr = cluster.db.create_transaction().unwrap();
        tr.get_read_version().get().unwrap();
        tr.add_read_conflict_key(b"k").unwrap();
        tr.set(b"other", b"x").unwrap();

        cluster.db.set(b"k", b"changed").unwrap();
        assert_eq!(
            tr.commit().get().unwrap_err().code(),
            error_code::NOT_COMMITTED
        );
    }

    #[test]
    fn test_inverted_conflict_range_fails() {
        let cluster = Cluster::start();
        let tr = cluster.db.create_transaction().unwrap();
        let err = tr
            .add_write_conflict_range(&KeyRange::new(&b"z"[..], &b"a"[..]))
            .unwrap_err();
        assert_eq!(err.code(), error_code::INVERTED_RANGE);
    }

    #[test]
    fn test_clear_range_starts_with() {
        let cluster = Cluster::start();
        cluster.db.set(b"user/1", b"a").unwrap();
        cluster.db.set(b"user/2", b"b").unwrap();
        cluster.db.set(b"users", b"c").unwrap();

        let tr = cluster.db.create_transaction().unwrap();
        tr.clear_range_starts_with(b"user/").unwrap();
        tr.commit().get().unwrap();

        assert_eq!(cluster.db.get(b"user/1").unwrap(), None);
        assert_eq!(cluster.db.get(b"users").unwrap(), value(b"c"));
    }

    #[test]
    fn test_atomic_add() {
        let cluster = Cluster::start();
        for _ in 0..3 {
            let tr = cluster.db.create_transaction().unwrap();
            tr.add(b"counter", &5i64.to_le_bytes()).unwrap();
            tr.commit().get().unwrap();
        }
        let stored = cluster.db.get(b"counter").unwrap().unwrap();
        assert_eq!(&stored[..], &15i64.to_le_bytes()[..]);
    }

    #[test]
    fn test_cancel_then_reset() {
        let cluster = Cluster::start();
        let tr = cluster.db.create_transaction().unwrap();
        tr.cancel().unwrap();
        assert_eq!(
            tr.get(b"k").get().unwrap_err().code(),
            error_code::TRANSACTION_CANCELLED
        );

        tr.reset().unwrap();
        assert_eq!(tr.get(b"k").get().unwrap(), None);
    }

    #[test]
    fn test_on_error_passes_local_errors_through() {
        let cluster = Cluster::start();
        let tr = cluster.db.create_transaction().unwrap();
        let err = Error::Encoding("bad tuple".into());
        assert_eq!(tr.on_error(&err).get(), Err(err));
        assert_eq!(cluster.engine.stats().on_error_calls, 0);
    }

    #[test]
    fn test_zero_value_transaction() {
        let tr = Transaction::default();
        assert!(tr.set(b"k", b"v").unwrap_err().is_invalid_operation());
        assert!(tr.clear(b"k").unwrap_err().is_invalid_operation());
        assert!(tr.reset().unwrap_err().is_invalid_operation());
        assert!(tr.get_committed_version().unwrap_err().is_invalid_operation());
        assert!(tr.get(b"k").get().unwrap_err().is_invalid_operation());
        assert!(tr.commit().get().unwrap_err().is_invalid_operation());
        assert!(tr.snapshot().get(b"k").get().unwrap_err().is_invalid_operation());
        assert!(tr.get_database().unwrap_err().is_invalid_operation());
        assert!(tr
            .get_range(&KeyRange::new(&b"a"[..], &b"b"[..]), RangeOptions::default())
            .get_slice()
            .unwrap_err()
            .is_invalid_operation());
    }

    #[test]
    fn test_locality_addresses() {
        let cluster = Cluster::start();
        let tr = cluster.db.create_transaction().unwrap();
        let addresses = tr.get_addresses_for_key(b"k").get().unwrap();
        assert!(!addresses.is_empty());
    }
}
