//! Futures: values produced asynchronously by the engine.
//!
//! Every read, commit and retry decision comes back from the engine as an
//! opaque future id that the engine completes on its network thread. An
//! [`AsyncResult`] wraps that id, lets any thread wait for it, decodes the
//! result once and caches it. Clones share the cached result and the
//! underlying engine future.
//!
//! The engine future is destroyed exactly once: right after the first
//! successful decode, or when the last clone is dropped if nobody decoded it.

use crate::error::{engine_error, Error, Result};
use bytes::Bytes;
use crossbeam::channel;
use parking_lot::Mutex;
use spindle_core::error_code;
use spindle_core::{Engine, EngineResult, FutureId, KeyValue};
use std::fmt;
use std::sync::Arc;

mod sealed {
    pub trait Sealed {}
}

/// Result types an engine future can be decoded into.
///
/// Sealed: the set of engine decoders is fixed.
pub trait Decode: sealed::Sealed + Clone + Send + Sized + 'static {
    #[doc(hidden)]
    fn decode(engine: &dyn Engine, id: FutureId) -> EngineResult<Self>;
}

impl sealed::Sealed for Option<Bytes> {}

/// A missing key decodes to `None`.
impl Decode for Option<Bytes> {
    fn decode(engine: &dyn Engine, id: FutureId) -> EngineResult<Self> {
        match engine.future_get_value(id) {
            Err(error_code::VALUE_NOT_PRESENT) => Ok(None),
            other => other,
        }
    }
}

impl sealed::Sealed for Bytes {}

/// A missing key decodes to the empty key.
impl Decode for Bytes {
    fn decode(engine: &dyn Engine, id: FutureId) -> EngineResult<Self> {
        match engine.future_get_key(id) {
            Err(error_code::VALUE_NOT_PRESENT) => Ok(Bytes::new()),
            other => other,
        }
    }
}

impl sealed::Sealed for () {}

impl Decode for () {
    fn decode(engine: &dyn Engine, id: FutureId) -> EngineResult<Self> {
        match engine.future_get_error(id) {
            error_code::SUCCESS => Ok(()),
            code => Err(code),
        }
    }
}

impl sealed::Sealed for i64 {}

impl Decode for i64 {
    fn decode(engine: &dyn Engine, id: FutureId) -> EngineResult<Self> {
        engine.future_get_version(id)
    }
}

impl sealed::Sealed for Vec<String> {}

impl Decode for Vec<String> {
    fn decode(engine: &dyn Engine, id: FutureId) -> EngineResult<Self> {
        engine.future_get_string_array(id)
    }
}

/// One page of a range read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyValuePage {
    pub kvs: Vec<KeyValue>,
    /// More pairs exist past the end of this page.
    pub more: bool,
}

impl sealed::Sealed for KeyValuePage {}

impl Decode for KeyValuePage {
    fn decode(engine: &dyn Engine, id: FutureId) -> EngineResult<Self> {
        engine
            .future_get_key_values(id)
            .map(|(kvs, more)| KeyValuePage { kvs, more })
    }
}

/// Owned engine future id, destroyed on drop.
struct RawFuture {
    engine: Arc<dyn Engine>,
    id: FutureId,
}

impl Drop for RawFuture {
    fn drop(&mut self) {
        self.engine.future_destroy(self.id);
    }
}

enum State<T> {
    Pending(RawFuture),
    Done(Result<T>),
}

/// A value the engine delivers later.
///
/// The default value is the zero future: it is not attached to any engine
/// operation and every accessor fails with [`Error::InvalidOperation`].
pub struct AsyncResult<T> {
    shared: Option<Arc<Mutex<State<T>>>>,
}

/// The value of a key, `None` when absent.
pub type FutureValue = AsyncResult<Option<Bytes>>;
/// A key resolved from a selector.
pub type FutureKey = AsyncResult<Bytes>;
/// Completion with no value (commit, watch, `on_error`).
pub type FutureNil = AsyncResult<()>;
pub type FutureVersion = AsyncResult<i64>;
pub type FutureStringArray = AsyncResult<Vec<String>>;
pub(crate) type FutureKeyValues = AsyncResult<KeyValuePage>;

impl<T: Decode> AsyncResult<T> {
    pub(crate) fn new(engine: Arc<dyn Engine>, id: FutureId) -> Self {
        Self {
            shared: Some(Arc::new(Mutex::new(State::Pending(RawFuture { engine, id })))),
        }
    }

    /// A future that is already complete with `err`.
    pub(crate) fn from_error(err: Error) -> Self {
        Self {
            shared: Some(Arc::new(Mutex::new(State::Done(Err(err))))),
        }
    }

    fn shared(&self) -> Result<&Mutex<State<T>>> {
        self.shared
            .as_deref()
            .ok_or_else(|| Error::InvalidOperation("use of a zero-value future".to_string()))
    }

    /// Returns true once the result is available. Never blocks.
    pub fn is_ready(&self) -> Result<bool> {
        let state = self.shared()?.lock();
        Ok(match &*state {
            State::Done(_) => true,
            State::Pending(raw) => raw.engine.future_is_ready(raw.id),
        })
    }

    /// Blocks the calling thread until the result is available.
    pub fn block_until_ready(&self) -> Result<()> {
        let shared = self.shared()?;
        loop {
            let (tx, rx) = channel::bounded::<()>(1);
            {
                let state = shared.lock();
                let raw = match &*state {
                    State::Done(_) => return Ok(()),
                    State::Pending(raw) => raw,
                };
                if raw.engine.future_is_ready(raw.id) {
                    return Ok(());
                }
                raw.engine
                    .future_set_callback(
                        raw.id,
                        Box::new(move || {
                            let _ = tx.try_send(());
                        }),
                    )
                    .map_err(|code| engine_error(&*raw.engine, code))?;
            }
            // A dropped sender means the callback was discarded; recheck.
            let _ = rx.recv();
        }
    }

    /// Asks the engine to abandon the operation.
    ///
    /// Has no effect on a future that is already ready. Waiting on a
    /// cancelled future returns `operation_cancelled`.
    pub fn cancel(&self) -> Result<()> {
        let state = self.shared()?.lock();
        if let State::Pending(raw) = &*state {
            raw.engine.future_cancel(raw.id);
        }
        Ok(())
    }

    /// Waits for the result and returns it.
    ///
    /// The engine is asked to decode the result only once; later calls, on
    /// this handle or any clone of it, return the cached value.
    pub fn get(&self) -> Result<T> {
        self.block_until_ready()?;
        let mut state = self.shared()?.lock();
        let decoded = match &*state {
            State::Done(result) => return result.clone(),
            State::Pending(raw) => {
                T::decode(&*raw.engine, raw.id).map_err(|code| engine_error(&*raw.engine, code))
            }
        };
        *state = State::Done(decoded.clone());
        decoded
    }

    /// Like [`AsyncResult::get`], but panics with the [`Error`] as payload.
    ///
    /// Meant for transactional functions: [`crate::Database::transact`]
    /// recovers the panic and treats the error as if it had been returned.
    ///
    /// The panic still runs the process panic hook, so the default hook
    /// prints a "panicked" line to stderr for every recovered error, even
    /// when the retry then succeeds. Prefer [`AsyncResult::get`] with `?`
    /// in ordinary code.
    pub fn get_or_panic(&self) -> T {
        self.get().unwrap_or_else(|err| std::panic::panic_any(err))
    }
}

impl<T> Default for AsyncResult<T> {
    fn default() -> Self {
        Self { shared: None }
    }
}

impl<T> Clone for AsyncResult<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> fmt::Debug for AsyncResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.shared {
            None => "zero",
            Some(shared) => match &*shared.lock() {
                State::Pending(_) => "pending",
                State::Done(Ok(_)) => "ready",
                State::Done(Err(_)) => "failed",
            },
        };
        f.debug_struct("AsyncResult").field("state", &state).finish()
    }
}
