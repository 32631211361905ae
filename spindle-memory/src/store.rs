//! Multi-version key-value store with a commit log for conflict detection.

use bytes::Bytes;
use spindle_core::error_code;
use spindle_core::{EngineResult, FutureId};
use std::collections::btree_map;
use std::collections::{BTreeMap, VecDeque};
use std::ops::Bound;

pub(crate) type Versions = Vec<(i64, Option<Bytes>)>;

/// Write conflict ranges of one applied commit.
#[derive(Debug)]
struct CommitRecord {
    version: i64,
    ranges: Vec<(Bytes, Bytes)>,
}

/// A watch waiting for its key to change.
#[derive(Debug, Clone)]
pub(crate) struct Watch {
    pub id: FutureId,
    pub key: Bytes,
    pub baseline: Option<Bytes>,
}

pub(crate) struct Store {
    data: BTreeMap<Bytes, Versions>,
    version: i64,
    oldest_version: i64,
    window: i64,
    commit_log: VecDeque<CommitRecord>,
    watches: Vec<Watch>,
}

impl Store {
    pub fn new(window: i64) -> Self {
        Self {
            data: BTreeMap::new(),
            version: 0,
            oldest_version: 0,
            window,
            commit_log: VecDeque::new(),
            watches: Vec::new(),
        }
    }

    /// Version of the latest commit.
    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn oldest_version(&self) -> i64 {
        self.oldest_version
    }

    /// Fails when `version` has been garbage-collected or is not yet committed.
    pub fn check_read_version(&self, version: i64) -> EngineResult<()> {
        if version < self.oldest_version {
            return Err(error_code::PAST_VERSION);
        }
        if version > self.version {
            return Err(error_code::FUTURE_VERSION);
        }
        Ok(())
    }

    pub fn get(&self, key: &[u8], version: i64) -> Option<Bytes> {
        self.data
            .get(key)
            .and_then(|versions| value_at(versions, version))
    }

    pub fn latest(&self, key: &[u8]) -> Option<Bytes> {
        self.get(key, self.version)
    }

    /// Raw version lists between two bounds, for merged scans.
    pub fn entries(
        &self,
        lower: Bound<&[u8]>,
        upper: Bound<&[u8]>,
    ) -> btree_map::Range<'_, Bytes, Versions> {
        if bounds_nonempty(lower, upper) {
            self.data.range::<[u8], _>((lower, upper))
        } else {
            self.data.range::<[u8], _>((Bound::Included(&b""[..]), Bound::Excluded(&b""[..])))
        }
    }

    /// Keys in `[begin, end)` that hold a value at the latest version.
    pub fn live_keys(&self, begin: &[u8], end: &[u8]) -> Vec<Bytes> {
        self.entries(Bound::Included(begin), Bound::Excluded(end))
            .filter(|(_, versions)| value_at(versions, self.version).is_some())
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// True if a commit newer than `read_version` wrote into any of `reads`.
    pub fn has_conflict(&self, read_version: i64, reads: &[(Bytes, Bytes)]) -> bool {
        self.commit_log
            .iter()
            .filter(|record| record.version > read_version)
            .any(|record| {
                record
                    .ranges
                    .iter()
                    .any(|(wb, we)| reads.iter().any(|(rb, re)| rb < we && wb < re))
            })
    }

    /// Applies a commit and returns its version.
    pub fn apply(
        &mut self,
        mutations: Vec<(Bytes, Option<Bytes>)>,
        ranges: Vec<(Bytes, Bytes)>,
    ) -> i64 {
        self.version += 1;
        let version = self.version;
        self.oldest_version = (version - self.window).max(0);

        let mut touched = Vec::with_capacity(mutations.len());
        for (key, value) in mutations {
            self.data.entry(key.clone()).or_default().push((version, value));
            touched.push(key);
        }
        self.commit_log.push_back(CommitRecord { version, ranges });

        while self
            .commit_log
            .front()
            .map_or(false, |record| record.version <= self.oldest_version)
        {
            self.commit_log.pop_front();
        }
        for key in touched {
            self.collect_garbage(&key);
        }
        version
    }

    /// Drops versions no reader can see any more.
    fn collect_garbage(&mut self, key: &[u8]) {
        let oldest = self.oldest_version;
        let remove = match self.data.get_mut(key) {
            Some(versions) => {
                if let Some(keep_from) = versions.iter().rposition(|(v, _)| *v <= oldest) {
                    versions.drain(..keep_from);
                }
                versions.len() == 1 && versions[0].1.is_none() && versions[0].0 <= oldest
            }
            None => false,
        };
        if remove {
            self.data.remove(key);
        }
    }

    pub fn arm_watch(&mut self, watch: Watch) {
        self.watches.push(watch);
    }

    /// Removes watches whose future is no longer waiting.
    pub fn prune_watches(&mut self, is_pending: impl Fn(FutureId) -> bool) {
        self.watches.retain(|watch| is_pending(watch.id));
    }

    pub fn watch_count(&self) -> usize {
        self.watches.len()
    }

    /// Removes and returns the watches whose key no longer holds the baseline.
    pub fn fire_watches(&mut self) -> Vec<FutureId> {
        let mut fired = Vec::new();
        let mut waiting = Vec::with_capacity(self.watches.len());
        for watch in self.watches.drain(..) {
            let current = self
                .data
                .get(&watch.key[..])
                .and_then(|versions| value_at(versions, self.version));
            if current != watch.baseline {
                fired.push(watch.id);
            } else {
                waiting.push(watch);
            }
        }
        self.watches = waiting;
        fired
    }
}

/// Latest value at or below `version`.
pub(crate) fn value_at(versions: &Versions, version: i64) -> Option<Bytes> {
    versions
        .iter()
        .rev()
        .find(|(v, _)| *v <= version)
        .and_then(|(_, value)| value.clone())
}

/// True if the bounds describe a range `BTreeMap::range` accepts and that
/// may hold keys.
pub(crate) fn bounds_nonempty(lower: Bound<&[u8]>, upper: Bound<&[u8]>) -> bool {
    match (lower, upper) {
        (Bound::Unbounded, _) | (_, Bound::Unbounded) => true,
        (Bound::Included(lo), Bound::Included(hi)) => lo <= hi,
        (Bound::Included(lo), Bound::Excluded(hi))
        | (Bound::Excluded(lo), Bound::Included(hi))
        | (Bound::Excluded(lo), Bound::Excluded(hi)) => lo < hi,
    }
}
