//! Paged range reads.
//!
//! A range read never materializes the whole range up front. The first page
//! is requested when the read is started; [`RangeIterator`] requests the
//! next page only once the current one is used up and the engine reported
//! that more pairs exist. Each follow-up request resumes right after the
//! last pair returned (or right before it, when reading in reverse), with
//! the limit reduced by what was already consumed.

use crate::error::{Error, Result};
use crate::future::{AsyncResult, FutureKeyValues, KeyValuePage};
use crate::transaction::TransactionInner;
use spindle_core::{KeySelector, KeyValue, Range, RangeOptions, RangeRequest, StreamingMode};
use std::sync::Arc;
use tracing::debug;

fn fetch(
    tr: &TransactionInner,
    begin: &KeySelector,
    end: &KeySelector,
    options: &RangeOptions,
    iteration: u32,
    snapshot: bool,
) -> FutureKeyValues {
    let request = RangeRequest {
        begin: begin.clone(),
        end: end.clone(),
        limit: options.limit,
        mode: options.mode,
        iteration,
        snapshot,
        reverse: options.reverse,
    };
    AsyncResult::new(Arc::clone(tr.engine()), tr.engine().get_range(tr.id(), &request))
}

/// The result of a range read, not yet consumed.
///
/// Consume it with [`RangeResult::iterator`] to stream pairs page by page,
/// or with [`RangeResult::get_slice`] to collect all of them. Every iterator
/// created from the same result shares the already requested first page.
#[derive(Clone)]
pub struct RangeResult {
    tr: Option<Arc<TransactionInner>>,
    begin: KeySelector,
    end: KeySelector,
    options: RangeOptions,
    snapshot: bool,
    first: FutureKeyValues,
}

impl RangeResult {
    pub(crate) fn new<R: Range + ?Sized>(
        tr: Option<Arc<TransactionInner>>,
        range: &R,
        options: RangeOptions,
        snapshot: bool,
    ) -> Self {
        let begin = range.begin_selector();
        let end = range.end_selector();
        let first = match &tr {
            Some(inner) => fetch(inner, &begin, &end, &options, 1, snapshot),
            None => FutureKeyValues::default(),
        };
        Self {
            tr,
            begin,
            end,
            options,
            snapshot,
            first,
        }
    }

    pub fn options(&self) -> RangeOptions {
        self.options
    }

    /// Streams the pairs of the range.
    pub fn iterator(&self) -> RangeIterator {
        RangeIterator {
            tr: self.tr.clone(),
            pending: Some(self.first.clone()),
            begin: self.begin.clone(),
            end: self.end.clone(),
            options: self.options,
            snapshot: self.snapshot,
            iteration: 1,
            done: false,
            more: false,
            kvs: Vec::new(),
            index: 0,
            error: None,
            advanced: false,
        }
    }

    /// Collects every pair of the range.
    ///
    /// Pages after the first are requested in `Exact` mode when a limit is
    /// set, and `WantAll` mode otherwise, since everything will be read
    /// anyway.
    pub fn get_slice(&self) -> Result<Vec<KeyValue>> {
        let mut it = self.iterator();
        it.options.mode = if self.options.limit != 0 {
            StreamingMode::Exact
        } else {
            StreamingMode::WantAll
        };

        let mut out = Vec::new();
        while it.advance() {
            if let Some(err) = it.error.take() {
                return Err(err);
            }
            out.extend_from_slice(&it.kvs[it.index..]);
            it.index = it.kvs.len();
            it.fetch_next_batch();
        }
        Ok(out)
    }

    /// Like [`RangeResult::get_slice`], but panics with the [`Error`] as
    /// payload. See [`AsyncResult::get_or_panic`].
    pub fn get_slice_or_panic(&self) -> Vec<KeyValue> {
        self.get_slice()
            .unwrap_or_else(|err| std::panic::panic_any(err))
    }
}

/// Streams the pairs of a [`RangeResult`].
///
/// Call [`RangeIterator::advance`] before every [`RangeIterator::get_next`].
/// `advance` blocks while a page is in flight and returns false once the
/// range is exhausted. Errors from the engine are reported by `get_next`,
/// after which the iterator is exhausted.
///
/// The iterator also implements [`Iterator`], yielding `Result<KeyValue>`.
pub struct RangeIterator {
    tr: Option<Arc<TransactionInner>>,
    pending: Option<FutureKeyValues>,
    begin: KeySelector,
    end: KeySelector,
    options: RangeOptions,
    snapshot: bool,
    iteration: u32,
    done: bool,
    more: bool,
    kvs: Vec<KeyValue>,
    index: usize,
    error: Option<Error>,
    advanced: bool,
}

impl RangeIterator {
    /// Returns true if [`RangeIterator::get_next`] has a pair (or an error)
    /// to return, waiting for the next page if needed.
    pub fn advance(&mut self) -> bool {
        if self.done {
            return false;
        }
        if let Some(pending) = self.pending.take() {
            match pending.get() {
                Ok(KeyValuePage { kvs, more }) => {
                    self.kvs = kvs;
                    self.more = more;
                }
                Err(err) => {
                    self.kvs.clear();
                    self.error = Some(err);
                }
            }
            self.index = 0;
            if self.error.is_none() && self.kvs.is_empty() {
                self.done = true;
                return false;
            }
        }
        self.advanced = true;
        true
    }

    /// Returns the next pair, or the error that ended the read.
    pub fn get_next(&mut self) -> Result<KeyValue> {
        if !std::mem::take(&mut self.advanced) {
            return Err(Error::InvalidOperation(
                "get_next called without a successful advance".to_string(),
            ));
        }
        if let Some(err) = self.error.take() {
            self.done = true;
            return Err(err);
        }
        let kv = match self.kvs.get(self.index) {
            Some(kv) => kv.clone(),
            None => {
                return Err(Error::InvalidOperation(
                    "range iterator has no pair to return".to_string(),
                ))
            }
        };
        self.index += 1;
        if self.index == self.kvs.len() {
            self.fetch_next_batch();
        }
        Ok(kv)
    }

    /// Like [`RangeIterator::get_next`], but panics with the [`Error`] as
    /// payload.
    pub fn get_next_or_panic(&mut self) -> KeyValue {
        self.get_next()
            .unwrap_or_else(|err| std::panic::panic_any(err))
    }

    /// Requests the page after the consumed one, or marks the iterator done.
    fn fetch_next_batch(&mut self) {
        if !self.more || self.index == 0 || self.index == self.options.limit {
            self.done = true;
            return;
        }
        let tr = match &self.tr {
            Some(tr) => Arc::clone(tr),
            None => {
                self.done = true;
                return;
            }
        };

        if self.options.limit > 0 {
            self.options.limit -= self.index;
        }
        let last = self.kvs[self.index - 1].key.clone();
        if self.options.reverse {
            self.end = KeySelector::first_greater_or_equal(last);
        } else {
            self.begin = KeySelector::first_greater_than(last);
        }
        self.iteration += 1;
        debug!(
            iteration = self.iteration,
            remaining = self.options.limit,
            "Requesting next range page"
        );
        self.pending = Some(fetch(
            &tr,
            &self.begin,
            &self.end,
            &self.options,
            self.iteration,
            self.snapshot,
        ));
    }
}

impl Iterator for RangeIterator {
    type Item = Result<KeyValue>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.advance() {
            Some(self.get_next())
        } else {
            None
        }
    }
}
