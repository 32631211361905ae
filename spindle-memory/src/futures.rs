//! Future slots: pending operations, their results and completion callbacks.

use crate::stats::StatsRecorder;
use bytes::Bytes;
use parking_lot::Mutex;
use spindle_core::error_code::{self, ErrorCode};
use spindle_core::{Callback, EngineResult, FutureId, KeyValue, TransactionId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Result carried by a ready future.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Output {
    Nil,
    Value(Option<Bytes>),
    Key(Bytes),
    KeyValues(Vec<KeyValue>, bool),
    Version(i64),
    Strings(Vec<String>),
    Error(ErrorCode),
}

enum SlotState {
    Pending,
    Ready(Output),
}

struct Slot {
    state: SlotState,
    callbacks: Vec<Callback>,
    /// Transaction whose reset, cancel or destruction fails this future.
    owner: Option<TransactionId>,
}

pub(crate) struct FutureRegistry {
    slots: Mutex<HashMap<FutureId, Slot>>,
    next_id: AtomicU64,
    stats: StatsRecorder,
}

impl FutureRegistry {
    pub fn new(stats: StatsRecorder) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            stats,
        }
    }

    /// Allocates a pending future.
    pub fn create(&self, owner: Option<TransactionId>) -> FutureId {
        self.insert(owner, SlotState::Pending)
    }

    /// Allocates a future that is ready from the start.
    pub fn create_ready(&self, owner: Option<TransactionId>, output: Output) -> FutureId {
        self.insert(owner, SlotState::Ready(output))
    }

    fn insert(&self, owner: Option<TransactionId>, state: SlotState) -> FutureId {
        let id = FutureId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.slots.lock().insert(
            id,
            Slot {
                state,
                callbacks: Vec::new(),
                owner,
            },
        );
        self.stats.future_created();
        id
    }

    /// Makes a pending future ready and fires its callbacks.
    ///
    /// Returns false when the future was already ready or has been destroyed.
    pub fn resolve(&self, id: FutureId, output: Output) -> bool {
        let callbacks = {
            let mut slots = self.slots.lock();
            match slots.get_mut(&id) {
                Some(slot) if matches!(slot.state, SlotState::Pending) => {
                    slot.state = SlotState::Ready(output);
                    std::mem::take(&mut slot.callbacks)
                }
                _ => return false,
            }
        };
        for callback in callbacks {
            callback();
        }
        true
    }

    /// Fails every pending future owned by `tr` with `code`.
    pub fn fail_owned(&self, tr: TransactionId, code: ErrorCode) -> usize {
        let callbacks: Vec<Vec<Callback>> = {
            let mut slots = self.slots.lock();
            slots
                .values_mut()
                .filter(|slot| slot.owner == Some(tr) && matches!(slot.state, SlotState::Pending))
                .map(|slot| {
                    slot.state = SlotState::Ready(Output::Error(code));
                    std::mem::take(&mut slot.callbacks)
                })
                .collect()
        };
        let failed = callbacks.len();
        for callback in callbacks.into_iter().flatten() {
            callback();
        }
        failed
    }

    /// Unties a future from its transaction so it outlives it.
    pub fn detach(&self, id: FutureId) {
        if let Some(slot) = self.slots.lock().get_mut(&id) {
            slot.owner = None;
        }
    }

    pub fn is_pending(&self, id: FutureId) -> bool {
        matches!(
            self.slots.lock().get(&id).map(|slot| &slot.state),
            Some(SlotState::Pending)
        )
    }

    /// A destroyed future reports ready so that no waiter blocks on it.
    pub fn is_ready(&self, id: FutureId) -> bool {
        !self.is_pending(id)
    }

    pub fn set_callback(&self, id: FutureId, callback: Callback) -> EngineResult<()> {
        {
            let mut slots = self.slots.lock();
            let slot = slots.get_mut(&id).ok_or(error_code::FUTURE_RELEASED)?;
            if matches!(slot.state, SlotState::Pending) {
                slot.callbacks.push(callback);
                return Ok(());
            }
        }
        callback();
        Ok(())
    }

    pub fn cancel(&self, id: FutureId) {
        self.resolve(id, Output::Error(error_code::OPERATION_CANCELLED));
    }

    pub fn destroy(&self, id: FutureId) {
        if self.slots.lock().remove(&id).is_some() {
            self.stats.future_destroyed();
        }
    }

    pub fn error(&self, id: FutureId) -> ErrorCode {
        match self.slots.lock().get(&id).map(|slot| &slot.state) {
            None => error_code::FUTURE_RELEASED,
            Some(SlotState::Pending) => error_code::FUTURE_NOT_SET,
            Some(SlotState::Ready(Output::Error(code))) => *code,
            Some(SlotState::Ready(_)) => error_code::SUCCESS,
        }
    }

    /// Copies a result out of a ready future.
    pub fn read<T>(
        &self,
        id: FutureId,
        f: impl FnOnce(&Output) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let slots = self.slots.lock();
        let slot = slots.get(&id).ok_or(error_code::FUTURE_RELEASED)?;
        match &slot.state {
            SlotState::Pending => Err(error_code::FUTURE_NOT_SET),
            SlotState::Ready(Output::Error(code)) => Err(*code),
            SlotState::Ready(output) => {
                self.stats.decoded();
                f(output)
            }
        }
    }
}
