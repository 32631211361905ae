//! Per-transaction state: buffered writes, conflict ranges and the merged
//! read-your-writes view over the store.

use crate::config::EngineConfig;
use crate::store::{bounds_nonempty, value_at, Store, Watch};
use bytes::Bytes;
use spindle_core::error_code::{self, ErrorCode};
use spindle_core::{
    key_after, DatabaseId, EngineResult, FutureId, KeySelector, KeyValue, MutationType,
    RangeRequest, StreamingMode,
};
use std::collections::BTreeMap;
use std::iter::Peekable;
use std::ops::Bound;

const KEYSPACE_END: &[u8] = b"\xff";

#[derive(Debug, Clone, PartialEq)]
enum PendingWrite {
    Value(Option<Bytes>),
    /// Atomic operations on a key whose base value is read at commit.
    Atomic(Vec<(MutationType, Bytes)>),
}

pub(crate) struct TxnState {
    pub db: DatabaseId,
    read_version: Option<i64>,
    writes: BTreeMap<Bytes, PendingWrite>,
    clears: Vec<(Bytes, Bytes)>,
    read_conflicts: Vec<(Bytes, Bytes)>,
    write_conflicts: Vec<(Bytes, Bytes)>,
    deferred_error: Option<ErrorCode>,
    watches: Vec<Watch>,
    pub cancelled: bool,
    pub committed_version: Option<i64>,
    /// Number of retryable errors handled since the last explicit reset.
    pub attempts: u32,
}

type Row = (Bytes, Bytes);
type RowIter<'a> = Box<dyn Iterator<Item = Row> + 'a>;

impl TxnState {
    pub fn new(db: DatabaseId) -> Self {
        Self {
            db,
            read_version: None,
            writes: BTreeMap::new(),
            clears: Vec::new(),
            read_conflicts: Vec::new(),
            write_conflicts: Vec::new(),
            deferred_error: None,
            watches: Vec::new(),
            cancelled: false,
            committed_version: None,
            attempts: 0,
        }
    }

    /// Returns the transaction to its initial state, keeping the retry count.
    pub fn reset(&mut self) {
        let attempts = self.attempts;
        *self = Self::new(self.db);
        self.attempts = attempts;
    }

    fn defer(&mut self, code: ErrorCode) {
        self.deferred_error.get_or_insert(code);
    }

    pub fn deferred_error(&self) -> Option<ErrorCode> {
        self.deferred_error
    }

    fn check_key(&mut self, key: &[u8], config: &EngineConfig) -> bool {
        if key >= KEYSPACE_END {
            self.defer(error_code::KEY_OUTSIDE_LEGAL_RANGE);
            false
        } else if key.len() > config.max_key_size {
            self.defer(error_code::KEY_TOO_LARGE);
            false
        } else {
            true
        }
    }

    // Mutations

    pub fn set(&mut self, key: &[u8], value: &[u8], config: &EngineConfig) {
        if !self.check_key(key, config) {
            return;
        }
        if value.len() > config.max_value_size {
            self.defer(error_code::VALUE_TOO_LARGE);
            return;
        }
        let key = Bytes::copy_from_slice(key);
        self.write_conflicts.push((key.clone(), key_after(&key)));
        self.writes
            .insert(key, PendingWrite::Value(Some(Bytes::copy_from_slice(value))));
    }

    pub fn clear(&mut self, key: &[u8], config: &EngineConfig) {
        if !self.check_key(key, config) {
            return;
        }
        let key = Bytes::copy_from_slice(key);
        self.write_conflicts.push((key.clone(), key_after(&key)));
        self.writes.insert(key, PendingWrite::Value(None));
    }

    pub fn clear_range(&mut self, begin: &[u8], end: &[u8]) {
        if begin > end {
            self.defer(error_code::INVERTED_RANGE);
            return;
        }
        if end > KEYSPACE_END {
            self.defer(error_code::KEY_OUTSIDE_LEGAL_RANGE);
            return;
        }
        if begin == end {
            return;
        }
        let doomed: Vec<Bytes> = self
            .writes
            .range::<[u8], _>((Bound::Included(begin), Bound::Excluded(end)))
            .map(|(key, _)| key.clone())
            .collect();
        for key in doomed {
            self.writes.remove(&key);
        }
        let range = (Bytes::copy_from_slice(begin), Bytes::copy_from_slice(end));
        self.write_conflicts.push(range.clone());
        self.clears.push(range);
    }

    pub fn atomic_op(
        &mut self,
        key: &[u8],
        param: &[u8],
        mutation: MutationType,
        config: &EngineConfig,
    ) {
        if !self.check_key(key, config) {
            return;
        }
        if param.len() > config.max_value_size {
            self.defer(error_code::VALUE_TOO_LARGE);
            return;
        }
        let cleared = self.is_cleared(key);
        let key = Bytes::copy_from_slice(key);
        let param = Bytes::copy_from_slice(param);
        self.write_conflicts.push((key.clone(), key_after(&key)));

        let next = match self.writes.remove(&key) {
            Some(PendingWrite::Value(base)) => {
                PendingWrite::Value(Some(apply_atomic(base.as_deref(), &param, mutation)))
            }
            Some(PendingWrite::Atomic(mut ops)) => {
                ops.push((mutation, param));
                PendingWrite::Atomic(ops)
            }
            None if cleared => PendingWrite::Value(Some(apply_atomic(None, &param, mutation))),
            None => PendingWrite::Atomic(vec![(mutation, param)]),
        };
        self.writes.insert(key, next);
    }

    pub fn add_read_conflict(&mut self, begin: Bytes, end: Bytes) {
        self.read_conflicts.push((begin, end));
    }

    pub fn add_write_conflict(&mut self, begin: Bytes, end: Bytes) {
        self.write_conflicts.push((begin, end));
    }

    pub fn set_read_version(&mut self, version: i64) {
        self.read_version = Some(version);
    }

    /// The transaction's read version, fixed on first use.
    pub fn read_version(&mut self, store: &Store) -> EngineResult<i64> {
        let version = *self.read_version.get_or_insert(store.version());
        store.check_read_version(version)?;
        Ok(version)
    }

    // Reads

    fn is_cleared(&self, key: &[u8]) -> bool {
        self.clears
            .iter()
            .any(|(begin, end)| key >= &begin[..] && key < &end[..])
    }

    /// Value of `key` as this transaction sees it.
    fn lookup(&self, store: &Store, version: i64, key: &[u8]) -> Option<Bytes> {
        match self.writes.get(key) {
            Some(write) => self.resolve_write(store, version, key, write),
            None if self.is_cleared(key) => None,
            None => store.get(key, version),
        }
    }

    fn resolve_write(
        &self,
        store: &Store,
        version: i64,
        key: &[u8],
        write: &PendingWrite,
    ) -> Option<Bytes> {
        match write {
            PendingWrite::Value(value) => value.clone(),
            PendingWrite::Atomic(ops) => {
                let base = store.get(key, version);
                Some(apply_all(base, ops))
            }
        }
    }

    pub fn get(
        &mut self,
        store: &Store,
        key: &[u8],
        snapshot: bool,
    ) -> EngineResult<Option<Bytes>> {
        if key >= KEYSPACE_END {
            return Err(error_code::KEY_OUTSIDE_LEGAL_RANGE);
        }
        let version = self.read_version(store)?;
        if !snapshot {
            self.add_read_conflict(Bytes::copy_from_slice(key), key_after(key));
        }
        Ok(self.lookup(store, version, key))
    }

    pub fn get_key(
        &mut self,
        store: &Store,
        selector: &KeySelector,
        snapshot: bool,
    ) -> EngineResult<Bytes> {
        let version = self.read_version(store)?;
        let resolved = self.resolve_selector(store, version, selector);
        if !snapshot {
            let (low, high) = if resolved < selector.key {
                (resolved.clone(), selector.key.clone())
            } else {
                (selector.key.clone(), resolved.clone())
            };
            self.add_read_conflict(low, key_after(&high));
        }
        Ok(resolved)
    }

    /// Reads one page of a range.
    pub fn get_range(
        &mut self,
        store: &Store,
        request: &RangeRequest,
        config: &EngineConfig,
    ) -> EngineResult<(Vec<KeyValue>, bool)> {
        let rows = page_rows(request, config)?;
        let version = self.read_version(store)?;
        let begin = self.resolve_selector(store, version, &request.begin);
        let end = self
            .resolve_selector(store, version, &request.end)
            .min(Bytes::from_static(KEYSPACE_END));
        if begin >= end {
            return Ok((Vec::new(), false));
        }

        let (kvs, more) = {
            let mut scan = self.scan(
                store,
                version,
                Bound::Included(&begin[..]),
                Bound::Excluded(&end[..]),
                request.reverse,
            );
            let mut kvs = Vec::new();
            while rows.map_or(true, |rows| kvs.len() < rows) {
                match scan.next() {
                    Some((key, value)) => kvs.push(KeyValue { key, value }),
                    None => break,
                }
            }
            let at_limit = request.limit > 0 && kvs.len() >= request.limit;
            let more = !at_limit
                && rows.map_or(false, |rows| kvs.len() == rows)
                && scan.peek().is_some();
            (kvs, more)
        };

        if !request.snapshot {
            let partial = (request.limit > 0 && kvs.len() >= request.limit) || more;
            match kvs.last() {
                Some(last) if partial && request.reverse => {
                    self.add_read_conflict(last.key.clone(), end);
                }
                Some(last) if partial => {
                    self.add_read_conflict(begin, key_after(&last.key));
                }
                _ => self.add_read_conflict(begin, end),
            }
        }
        Ok((kvs, more))
    }

    /// Merged scan over the store and this transaction's writes.
    fn scan<'a>(
        &'a self,
        store: &'a Store,
        version: i64,
        lower: Bound<&[u8]>,
        upper: Bound<&[u8]>,
        reverse: bool,
    ) -> Peekable<Merge<'a>> {
        if !bounds_nonempty(lower, upper) {
            let empty: RowIter<'a> = Box::new(std::iter::empty());
            let none: RowIter<'a> = Box::new(std::iter::empty());
            return Merge::new(empty, none, reverse).peekable();
        }

        let stored = store.entries(lower, upper);
        let stored: RowIter<'a> = {
            let visible = move |(key, versions): (&'a Bytes, &'a Vec<(i64, Option<Bytes>)>)| {
                if self.writes.contains_key(key) || self.is_cleared(key) {
                    return None;
                }
                value_at(versions, version).map(|value| (key.clone(), value))
            };
            if reverse {
                Box::new(stored.rev().filter_map(visible))
            } else {
                Box::new(stored.filter_map(visible))
            }
        };

        let buffered = self.writes.range::<[u8], _>((lower, upper));
        let buffered: RowIter<'a> = {
            let visible = move |(key, write): (&'a Bytes, &'a PendingWrite)| {
                self.resolve_write(store, version, key, write)
                    .map(|value| (key.clone(), value))
            };
            if reverse {
                Box::new(buffered.rev().filter_map(visible))
            } else {
                Box::new(buffered.filter_map(visible))
            }
        };

        Merge::new(stored, buffered, reverse).peekable()
    }

    /// Resolves a selector to a key, clamped to `""` and `"\xff"`.
    fn resolve_selector(&self, store: &Store, version: i64, selector: &KeySelector) -> Bytes {
        let key = &selector.key[..];
        if selector.offset >= 1 {
            let lower = if selector.or_equal {
                Bound::Excluded(key)
            } else {
                Bound::Included(key)
            };
            self.scan(store, version, lower, Bound::Excluded(KEYSPACE_END), false)
                .nth((selector.offset - 1) as usize)
                .map(|(key, _)| key)
                .unwrap_or_else(|| Bytes::from_static(KEYSPACE_END))
        } else {
            let upper = if selector.or_equal {
                Bound::Included(key)
            } else {
                Bound::Excluded(key)
            };
            self.scan(store, version, Bound::Unbounded, upper, true)
                .nth(selector.offset.unsigned_abs() as usize)
                .map(|(key, _)| key)
                .unwrap_or_default()
        }
    }

    // Watches

    /// Records a watch; its baseline is the value this transaction sees now.
    pub fn add_watch(&mut self, store: &Store, id: FutureId, key: &[u8]) -> EngineResult<()> {
        if key >= KEYSPACE_END {
            return Err(error_code::KEY_OUTSIDE_LEGAL_RANGE);
        }
        let version = self.read_version(store)?;
        let baseline = self.lookup(store, version, key);
        self.watches.push(Watch {
            id,
            key: Bytes::copy_from_slice(key),
            baseline,
        });
        Ok(())
    }

    pub fn watch_count(&self) -> usize {
        self.watches.len()
    }

    pub fn take_watches(&mut self) -> Vec<Watch> {
        std::mem::take(&mut self.watches)
    }

    // Commit

    pub fn is_read_only(&self) -> bool {
        self.writes.is_empty() && self.clears.is_empty() && self.write_conflicts.is_empty()
    }

    pub fn read_conflicts(&self) -> &[(Bytes, Bytes)] {
        &self.read_conflicts
    }

    /// Read version used for conflict checking at commit.
    pub fn commit_read_version(&self, store: &Store) -> i64 {
        self.read_version.unwrap_or_else(|| store.version())
    }

    /// Turns buffered writes into concrete key updates against the latest
    /// committed state. Cleared keys come first; keys are never repeated.
    pub fn mutations(&self, store: &Store) -> Vec<(Bytes, Option<Bytes>)> {
        let mut out: BTreeMap<Bytes, Option<Bytes>> = BTreeMap::new();
        for (begin, end) in &self.clears {
            for key in store.live_keys(begin, end) {
                if !self.writes.contains_key(&key) {
                    out.insert(key, None);
                }
            }
        }
        for (key, write) in &self.writes {
            let value = match write {
                PendingWrite::Value(value) => value.clone(),
                PendingWrite::Atomic(ops) => Some(apply_all(store.latest(key), ops)),
            };
            out.insert(key.clone(), value);
        }
        out.into_iter().collect()
    }

    pub fn write_conflicts(&self) -> &[(Bytes, Bytes)] {
        &self.write_conflicts
    }

    /// Clears buffered state after a successful commit.
    pub fn finish_commit(&mut self, version: i64) {
        self.committed_version = Some(version);
        self.writes.clear();
        self.clears.clear();
        self.read_conflicts.clear();
        self.write_conflicts.clear();
    }
}

/// Rows per page for a request, `None` meaning unlimited.
fn page_rows(request: &RangeRequest, config: &EngineConfig) -> EngineResult<Option<usize>> {
    let base = match request.mode {
        StreamingMode::WantAll => None,
        StreamingMode::Exact if request.limit == 0 => {
            return Err(error_code::EXACT_MODE_WITHOUT_LIMITS)
        }
        StreamingMode::Exact => None,
        StreamingMode::Iterator => {
            let shift = request.iteration.saturating_sub(1).min(20);
            Some(
                config
                    .iterator_initial_rows
                    .saturating_mul(1usize << shift)
                    .min(config.iterator_max_rows),
            )
        }
        StreamingMode::Small => Some(config.small_rows),
        StreamingMode::Medium => Some(config.medium_rows),
        StreamingMode::Large => Some(config.large_rows),
        StreamingMode::Serial => Some(config.serial_rows),
    };
    Ok(match (base, request.limit) {
        (None, 0) => None,
        (None, limit) => Some(limit),
        (Some(rows), 0) => Some(rows),
        (Some(rows), limit) => Some(rows.min(limit)),
    })
}

fn apply_all(base: Option<Bytes>, ops: &[(MutationType, Bytes)]) -> Bytes {
    let mut value = base;
    for (mutation, param) in ops {
        value = Some(apply_atomic(value.as_deref(), param, *mutation));
    }
    value.unwrap_or_default()
}

/// Applies one atomic operation. The result has the length of `param`; the
/// existing value is truncated or zero-extended to match.
pub(crate) fn apply_atomic(base: Option<&[u8]>, param: &[u8], mutation: MutationType) -> Bytes {
    let existing = |i: usize| base.and_then(|b| b.get(i).copied()).unwrap_or(0);
    let out: Vec<u8> = match mutation {
        MutationType::Add => {
            let mut carry = 0u16;
            (0..param.len())
                .map(|i| {
                    let sum = existing(i) as u16 + param[i] as u16 + carry;
                    carry = sum >> 8;
                    sum as u8
                })
                .collect()
        }
        MutationType::BitAnd if base.is_none() => param.to_vec(),
        MutationType::BitAnd => (0..param.len()).map(|i| existing(i) & param[i]).collect(),
        MutationType::BitOr => (0..param.len()).map(|i| existing(i) | param[i]).collect(),
        MutationType::BitXor => (0..param.len()).map(|i| existing(i) ^ param[i]).collect(),
    };
    Bytes::from(out)
}

/// Sorted merge of two row streams with disjoint keys.
pub(crate) struct Merge<'a> {
    left: Peekable<RowIter<'a>>,
    right: Peekable<RowIter<'a>>,
    reverse: bool,
}

impl<'a> Merge<'a> {
    fn new(left: RowIter<'a>, right: RowIter<'a>, reverse: bool) -> Self {
        Self {
            left: left.peekable(),
            right: right.peekable(),
            reverse,
        }
    }
}

impl Iterator for Merge<'_> {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        let take_left = match (self.left.peek(), self.right.peek()) {
            (None, None) => return None,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (Some(l), Some(r)) => {
                if self.reverse {
                    l.0 > r.0
                } else {
                    l.0 < r.0
                }
            }
        };
        if take_left {
            self.left.next()
        } else {
            self.right.next()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    fn store_with(keys: &[&str]) -> Store {
        let mut store = Store::new(1000);
        let mutations = keys.iter().map(|k| (b(k), Some(b(&k.to_uppercase())))).collect();
        store.apply(mutations, vec![]);
        store
    }

    fn request(
        begin: KeySelector,
        end: KeySelector,
        limit: usize,
        mode: StreamingMode,
        reverse: bool,
    ) -> RangeRequest {
        RangeRequest {
            begin,
            end,
            limit,
            mode,
            iteration: 1,
            snapshot: false,
            reverse,
        }
    }

    fn keys(kvs: &[KeyValue]) -> Vec<Bytes> {
        kvs.iter().map(|kv| kv.key.clone()).collect()
    }

    #[test]
    fn test_read_your_writes() {
        let store = store_with(&["a", "b"]);
        let config = EngineConfig::default();
        let mut txn = TxnState::new(DatabaseId(1));

        txn.set(b"c", b"new", &config);
        txn.clear(b"a", &config);
        assert_eq!(txn.get(&store, b"c", false).unwrap(), Some(b("new")));
        assert_eq!(txn.get(&store, b"a", false).unwrap(), None);
        assert_eq!(txn.get(&store, b"b", true).unwrap(), Some(b("B")));
    }

    #[test]
    fn test_clear_range_hides_store_and_buffered_keys() {
        let store = store_with(&["a", "b", "c"]);
        let config = EngineConfig::default();
        let mut txn = TxnState::new(DatabaseId(1));
        txn.set(b"bb", b"x", &config);
        txn.clear_range(b"b", b"c");

        let req = request(
            KeySelector::first_greater_or_equal(&b""[..]),
            KeySelector::first_greater_or_equal(&b"\xff"[..]),
            0,
            StreamingMode::WantAll,
            false,
        );
        let (kvs, more) = txn.get_range(&store, &req, &config).unwrap();
        assert_eq!(keys(&kvs), vec![b("a"), b("c")]);
        assert!(!more);

        let mutations = txn.mutations(&store);
        assert_eq!(mutations, vec![(b("b"), None)]);
    }

    #[test]
    fn test_reverse_range_with_limit() {
        let store = store_with(&["a", "b", "c"]);
        let config = EngineConfig::default();
        let mut txn = TxnState::new(DatabaseId(1));

        let req = request(
            KeySelector::first_greater_or_equal(&b"a"[..]),
            KeySelector::first_greater_or_equal(&b"d"[..]),
            2,
            StreamingMode::Iterator,
            true,
        );
        let (kvs, more) = txn.get_range(&store, &req, &config).unwrap();
        assert_eq!(keys(&kvs), vec![b("c"), b("b")]);
        assert!(!more);
    }

    #[test]
    fn test_iterator_pages_grow() {
        let names: Vec<String> = (0..100).map(|i| format!("k{:03}", i)).collect();
        let refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        let store = store_with(&refs);
        let config = EngineConfig::default().with_iterator_rows(4, 16);
        let mut txn = TxnState::new(DatabaseId(1));

        let mut req = request(
            KeySelector::first_greater_or_equal(&b""[..]),
            KeySelector::first_greater_or_equal(&b"\xff"[..]),
            0,
            StreamingMode::Iterator,
            false,
        );
        let sizes: Vec<usize> = (1..=4)
            .map(|iteration| {
                req.iteration = iteration;
                txn.get_range(&store, &req, &config).unwrap().0.len()
            })
            .collect();
        assert_eq!(sizes, vec![4, 8, 16, 16]);
    }

    #[test]
    fn test_exact_mode_requires_limit() {
        let store = store_with(&["a"]);
        let config = EngineConfig::default();
        let mut txn = TxnState::new(DatabaseId(1));
        let req = request(
            KeySelector::first_greater_or_equal(&b""[..]),
            KeySelector::first_greater_or_equal(&b"\xff"[..]),
            0,
            StreamingMode::Exact,
            false,
        );
        assert_eq!(
            txn.get_range(&store, &req, &config),
            Err(error_code::EXACT_MODE_WITHOUT_LIMITS)
        );
    }

    #[test]
    fn test_selector_resolution() {
        let store = store_with(&["b", "d", "f"]);
        let mut txn = TxnState::new(DatabaseId(1));

        let mut resolve = |sel: KeySelector| txn.get_key(&store, &sel, true).unwrap();
        assert_eq!(resolve(KeySelector::first_greater_or_equal(&b"d"[..])), b("d"));
        assert_eq!(resolve(KeySelector::first_greater_than(&b"d"[..])), b("f"));
        assert_eq!(resolve(KeySelector::last_less_than(&b"d"[..])), b("b"));
        assert_eq!(resolve(KeySelector::last_less_or_equal(&b"d"[..])), b("d"));
        assert_eq!(resolve(KeySelector::first_greater_or_equal(&b"c"[..]) + 1), b("f"));
        assert_eq!(
            resolve(KeySelector::first_greater_than(&b"f"[..])),
            Bytes::from_static(b"\xff")
        );
        assert_eq!(resolve(KeySelector::last_less_than(&b"b"[..])), b(""));
    }

    #[test]
    fn test_atomic_ops() {
        assert_eq!(&apply_atomic(None, &[1, 0], MutationType::Add)[..], &[1, 0]);
        assert_eq!(&apply_atomic(Some(&[255u8, 0][..]), &[1, 0], MutationType::Add)[..], &[0, 1]);
        assert_eq!(&apply_atomic(Some(&[5u8][..]), &[1, 0], MutationType::Add)[..], &[6, 0]);
        assert_eq!(&apply_atomic(None, &[0x0f], MutationType::BitAnd)[..], &[0x0f]);
        assert_eq!(&apply_atomic(Some(&[0x3cu8][..]), &[0x0f], MutationType::BitAnd)[..], &[0x0c]);
        assert_eq!(&apply_atomic(Some(&[0x30u8][..]), &[0x0f], MutationType::BitOr)[..], &[0x3f]);
        assert_eq!(&apply_atomic(Some(&[0xffu8][..]), &[0x0f], MutationType::BitXor)[..], &[0xf0]);
    }

    #[test]
    fn test_atomic_resolves_against_latest_at_commit() {
        let mut store = store_with(&[]);
        let config = EngineConfig::default();
        store.apply(vec![(b("n"), Some(Bytes::from_static(&[1])))], vec![]);

        let mut txn = TxnState::new(DatabaseId(1));
        txn.atomic_op(b"n", &[2], MutationType::Add, &config);
        store.apply(vec![(b("n"), Some(Bytes::from_static(&[10])))], vec![]);

        assert_eq!(
            txn.mutations(&store),
            vec![(b("n"), Some(Bytes::from_static(&[12])))]
        );
        assert!(txn.read_conflicts().is_empty());
    }

    #[test]
    fn test_illegal_writes_are_deferred() {
        let config = EngineConfig::default().with_max_value_size(4);
        let mut txn = TxnState::new(DatabaseId(1));
        txn.set(b"ok", b"12345", &config);
        assert_eq!(txn.deferred_error(), Some(error_code::VALUE_TOO_LARGE));

        let mut txn = TxnState::new(DatabaseId(1));
        txn.set(b"\xffsystem", b"v", &config);
        assert_eq!(txn.deferred_error(), Some(error_code::KEY_OUTSIDE_LEGAL_RANGE));
        assert!(txn.is_read_only());
    }

    #[test]
    fn test_reset_keeps_attempts() {
        let config = EngineConfig::default();
        let mut txn = TxnState::new(DatabaseId(3));
        txn.attempts = 2;
        txn.set(b"k", b"v", &config);
        txn.cancelled = true;
        txn.reset();
        assert!(txn.is_read_only());
        assert!(!txn.cancelled);
        assert_eq!(txn.attempts, 2);
        assert_eq!(txn.db, DatabaseId(3));
    }

    proptest! {
        #[test]
        fn prop_paged_reads_match_full_read(
            keys in proptest::collection::btree_set("[a-f]{1,3}", 0..40),
            reverse in any::<bool>(),
            limit in 0usize..50,
        ) {
            let refs: Vec<&str> = keys.iter().map(|s| s.as_str()).collect();
            let store = store_with(&refs);
            let config = EngineConfig::default().with_iterator_rows(2, 8);
            let mut txn = TxnState::new(DatabaseId(1));

            let full = request(
                KeySelector::first_greater_or_equal(&b""[..]),
                KeySelector::first_greater_or_equal(&b"\xff"[..]),
                limit,
                StreamingMode::WantAll,
                reverse,
            );
            let (expected, _) = txn.get_range(&store, &full, &config).unwrap();

            let mut collected: Vec<KeyValue> = Vec::new();
            let mut req = full.clone();
            req.mode = StreamingMode::Iterator;
            loop {
                let (page, more) = txn.get_range(&store, &req, &config).unwrap();
                collected.extend(page.iter().cloned());
                if !more || (limit > 0 && collected.len() >= limit) {
                    break;
                }
                let last = page.last().unwrap().key.clone();
                if reverse {
                    req.end = KeySelector::first_greater_or_equal(last);
                } else {
                    req.begin = KeySelector::first_greater_than(last);
                }
                if limit > 0 {
                    req.limit = limit - collected.len();
                }
                req.iteration += 1;
            }
            prop_assert_eq!(collected, expected);
        }
    }
}
