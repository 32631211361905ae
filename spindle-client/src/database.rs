//! Database handles and the transaction retry loop.

use crate::error::{engine_error, Error, Result, TransactError};
use crate::future::FutureNil;
use crate::transaction::{ReadTransaction, Transaction, TransactionInner};
use bytes::Bytes;
use spindle_core::{DatabaseId, Engine, ExactRange, KeySelector, KeyValue, Range, RangeOptions};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::debug;

struct DatabaseInner {
    engine: Arc<dyn Engine>,
    id: DatabaseId,
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        self.engine.destroy_database(self.id);
    }
}

/// A handle to a database.
///
/// Cheap to clone and safe to share between threads. The engine database
/// is released when the last clone, and the last transaction created from
/// it, is dropped.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    /// Opens a database on `engine`, whose network must already be running.
    ///
    /// Most programs use [`crate::open`] or [`crate::Network::open_database`]
    /// instead.
    pub fn open(engine: Arc<dyn Engine>, cluster_file: Option<&str>) -> Result<Self> {
        let id = engine
            .create_database(cluster_file)
            .map_err(|code| engine_error(&*engine, code))?;
        Ok(Self {
            inner: Arc::new(DatabaseInner { engine, id }),
        })
    }

    pub(crate) fn engine(&self) -> &Arc<dyn Engine> {
        &self.inner.engine
    }

    /// Creates a transaction that the caller commits and retries by hand.
    ///
    /// [`Database::transact`] is usually the better choice.
    pub fn create_transaction(&self) -> Result<Transaction> {
        let id = self
            .inner
            .engine
            .create_transaction(self.inner.id)
            .map_err(|code| engine_error(&*self.inner.engine, code))?;
        Ok(Transaction::new(TransactionInner::new(self.clone(), id)))
    }

    /// Runs `f` in a transaction, commits, and retries on retryable errors.
    ///
    /// Every attempt gets a fresh transaction. An attempt fails when `f`
    /// returns an error, when `f` panics with an [`Error`] (see
    /// [`crate::AsyncResult::get_or_panic`]), or when the commit fails. If
    /// the failure is an engine error, the engine decides through
    /// `on_error` whether to try again, after a backoff. Any other error,
    /// and any engine error the engine deems fatal, is returned. Panics with
    /// other payloads are resumed untouched.
    ///
    /// There is no retry limit here; the engine bounds retries.
    ///
    /// `f` may run more than once, so it should not have side effects
    /// outside the transaction. A commit that fails with
    /// `commit_unknown_result` may have been applied; making `f`
    /// idempotent keeps such a retry harmless.
    ///
    /// # Example
    /// ```no_run
    /// # use spindle_client::{Database, Error, ReadTransaction};
    /// # fn example(db: &Database) -> Result<(), Error> {
    /// let previous = db.transact(|tr| {
    ///     let previous = tr.get(b"counter").get()?;
    ///     tr.set(b"counter", b"1")?;
    ///     Ok::<_, Error>(previous)
    /// })?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn transact<T, E, F>(&self, mut f: F) -> std::result::Result<T, E>
    where
        E: TransactError,
        F: FnMut(&Transaction) -> std::result::Result<T, E>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let tr = self.create_transaction()?;

            let outcome = match catch_error(|| f(&tr)) {
                Ok(Ok(value)) => match tr.commit().get() {
                    Ok(()) => return Ok(value),
                    Err(err) => E::from(err),
                },
                Ok(Err(err)) => err,
                Err(err) => E::from(err),
            };

            let code = match outcome.engine_error() {
                Some(engine_err) => engine_err.code(),
                None => return Err(outcome),
            };
            match tr.on_error(&Error::engine(code)).get() {
                Ok(()) => debug!(attempt, code, "Retrying transaction"),
                Err(err) if err.code() == code => return Err(outcome),
                Err(err) => return Err(E::from(err)),
            }
        }
    }

    /// Reads `key` in its own transaction.
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        self.transact(|tr| tr.get(key).get())
    }

    pub fn get_key(&self, selector: &KeySelector) -> Result<Bytes> {
        self.transact(|tr| tr.get_key(selector).get())
    }

    /// Reads a whole range in its own transaction.
    pub fn get_range<R: Range + ?Sized>(
        &self,
        range: &R,
        options: RangeOptions,
    ) -> Result<Vec<KeyValue>> {
        self.transact(|tr| tr.get_range(range, options).get_slice())
    }

    pub fn get_range_starts_with(
        &self,
        prefix: &[u8],
        options: RangeOptions,
    ) -> Result<Vec<KeyValue>> {
        self.transact(|tr| tr.get_range_starts_with(prefix, options)?.get_slice())
    }

    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.transact(|tr| tr.set(key, value))
    }

    pub fn clear(&self, key: &[u8]) -> Result<()> {
        self.transact(|tr| tr.clear(key))
    }

    pub fn clear_range<R: ExactRange + ?Sized>(&self, range: &R) -> Result<()> {
        self.transact(|tr| tr.clear_range(range))
    }

    pub fn clear_range_starts_with(&self, prefix: &[u8]) -> Result<()> {
        self.transact(|tr| tr.clear_range_starts_with(prefix))
    }

    /// Reads `key` and watches it for the next change.
    pub fn get_and_watch(&self, key: &[u8]) -> Result<(Option<Bytes>, FutureNil)> {
        self.transact(|tr| {
            let value = tr.get(key).get()?;
            Ok((value, tr.watch(key)))
        })
    }

    /// Sets `key` and watches it for the next change made by someone else.
    pub fn set_and_watch(&self, key: &[u8], value: &[u8]) -> Result<FutureNil> {
        self.transact(|tr| {
            tr.set(key, value)?;
            Ok(tr.watch(key))
        })
    }

    pub fn clear_and_watch(&self, key: &[u8]) -> Result<FutureNil> {
        self.transact(|tr| {
            tr.clear(key)?;
            Ok(tr.watch(key))
        })
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database").field("id", &self.inner.id).finish()
    }
}

/// Runs `f`, turning a panic whose payload is an [`Error`] into that error.
///
/// The panic hook has already run by the time the panic is caught here.
fn catch_error<R>(f: impl FnOnce() -> R) -> Result<R> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| match payload.downcast::<Error>() {
        Ok(err) => *err,
        Err(payload) => panic::resume_unwind(payload),
    })
}

/// Something a transactional function can run against.
///
/// Implemented by [`Database`], which runs the function in the retry loop,
/// and by [`Transaction`], which runs it directly in that transaction
/// without committing. Functions written against `Transactor` can call each
/// other and still run in a single transaction.
pub trait Transactor {
    fn transact<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        E: TransactError,
        F: FnMut(&Transaction) -> std::result::Result<T, E>;
}

impl Transactor for Database {
    fn transact<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        E: TransactError,
        F: FnMut(&Transaction) -> std::result::Result<T, E>,
    {
        Database::transact(self, f)
    }
}

impl Transactor for Transaction {
    fn transact<T, E, F>(&self, mut f: F) -> std::result::Result<T, E>
    where
        E: TransactError,
        F: FnMut(&Transaction) -> std::result::Result<T, E>,
    {
        catch_error(|| f(self)).unwrap_or_else(|err| Err(E::from(err)))
    }
}
