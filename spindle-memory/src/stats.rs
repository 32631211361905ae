//! Engine counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Point-in-time copy of the engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub transactions_created: u64,
    pub on_error_calls: u64,
    /// Commits that applied writes.
    pub commits: u64,
    /// Result copies made out of ready futures.
    pub decodes: u64,
    pub live_futures: u64,
    pub live_watches: u64,
}

#[derive(Debug, Default)]
struct Counters {
    transactions_created: AtomicU64,
    on_error_calls: AtomicU64,
    commits: AtomicU64,
    decodes: AtomicU64,
    live_futures: AtomicU64,
    live_watches: AtomicU64,
}

/// Shared atomic counters, cheap to clone into worker threads.
#[derive(Debug, Clone, Default)]
pub struct StatsRecorder {
    inner: Arc<Counters>,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transaction_created(&self) {
        self.inner.transactions_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_error_called(&self) {
        self.inner.on_error_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn committed(&self) {
        self.inner.commits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decoded(&self) {
        self.inner.decodes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn future_created(&self) {
        self.inner.live_futures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn future_destroyed(&self) {
        self.inner.live_futures.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn set_live_watches(&self, count: usize) {
        self.inner.live_watches.store(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> EngineStats {
        let c = &self.inner;
        EngineStats {
            transactions_created: c.transactions_created.load(Ordering::Relaxed),
            on_error_calls: c.on_error_calls.load(Ordering::Relaxed),
            commits: c.commits.load(Ordering::Relaxed),
            decodes: c.decodes.load(Ordering::Relaxed),
            live_futures: c.live_futures.load(Ordering::Relaxed),
            live_watches: c.live_watches.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_counters() {
        let stats = StatsRecorder::new();
        let clone = stats.clone();

        stats.transaction_created();
        clone.transaction_created();
        clone.decoded();
        stats.future_created();
        stats.future_created();
        clone.future_destroyed();
        stats.set_live_watches(3);

        let snap = stats.snapshot();
        assert_eq!(snap.transactions_created, 2);
        assert_eq!(snap.decodes, 1);
        assert_eq!(snap.live_futures, 1);
        assert_eq!(snap.live_watches, 3);
        assert_eq!(snap.commits, 0);
    }
}
