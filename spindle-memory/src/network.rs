//! The engine's network loop.
//!
//! Completions are queued by whichever thread issues an operation and are
//! delivered, in issue order, by the one thread running the loop. Delayed
//! completions (retry backoff) wait in a timer heap on that same thread.

use crate::futures::{FutureRegistry, Output};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use spindle_core::error_code;
use spindle_core::{EngineResult, FutureId};
use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

enum Task {
    Resolve(FutureId, Output),
    ResolveAt(Instant, FutureId, Output),
    Stop,
}

struct Timer {
    deadline: Instant,
    seq: u64,
    id: FutureId,
    output: Output,
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timer {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (self.deadline, self.seq).cmp(&(other.deadline, other.seq))
    }
}

pub(crate) struct NetworkQueue {
    tx: Sender<Task>,
    rx: Receiver<Task>,
    running: AtomicBool,
}

impl NetworkQueue {
    pub fn new() -> Self {
        let (tx, rx) = channel::unbounded();
        Self {
            tx,
            rx,
            running: AtomicBool::new(false),
        }
    }

    pub fn deliver(&self, id: FutureId, output: Output) {
        self.send(Task::Resolve(id, output));
    }

    pub fn deliver_after(&self, delay: Duration, id: FutureId, output: Output) {
        if delay.is_zero() {
            self.deliver(id, output);
        } else {
            self.send(Task::ResolveAt(Instant::now() + delay, id, output));
        }
    }

    pub fn stop(&self) {
        self.send(Task::Stop);
    }

    fn send(&self, task: Task) {
        // Both channel ends live in `self`, so sending cannot fail.
        let _ = self.tx.send(task);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Runs the loop on the calling thread until [`NetworkQueue::stop`].
    pub fn run(&self, futures: &FutureRegistry) -> EngineResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Network loop already running");
            return Err(error_code::NETWORK_ALREADY_SETUP);
        }
        info!("Network loop started");

        let mut timers: BinaryHeap<Reverse<Timer>> = BinaryHeap::new();
        let mut seq = 0u64;

        loop {
            let task = match timers.peek() {
                Some(Reverse(next)) => {
                    let wait = next.deadline.saturating_duration_since(Instant::now());
                    match self.rx.recv_timeout(wait) {
                        Ok(task) => Some(task),
                        Err(RecvTimeoutError::Timeout) => None,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match self.rx.recv() {
                    Ok(task) => Some(task),
                    Err(_) => break,
                },
            };

            match task {
                Some(Task::Resolve(id, output)) => {
                    futures.resolve(id, output);
                }
                Some(Task::ResolveAt(deadline, id, output)) => {
                    seq += 1;
                    timers.push(Reverse(Timer {
                        deadline,
                        seq,
                        id,
                        output,
                    }));
                }
                Some(Task::Stop) => break,
                None => {}
            }

            let now = Instant::now();
            while timers
                .peek()
                .map_or(false, |Reverse(timer)| timer.deadline <= now)
            {
                if let Some(Reverse(timer)) = timers.pop() {
                    futures.resolve(timer.id, timer.output);
                }
            }
        }

        if !timers.is_empty() {
            debug!(pending = timers.len(), "Cancelling delayed completions");
        }
        for Reverse(timer) in timers.into_vec() {
            futures.resolve(timer.id, Output::Error(error_code::OPERATION_CANCELLED));
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Network loop stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::StatsRecorder;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_delivers_in_order_and_stops() {
        let futures = Arc::new(FutureRegistry::new(StatsRecorder::new()));
        let queue = Arc::new(NetworkQueue::new());

        let a = futures.create(None);
        let b = futures.create(None);
        queue.deliver(a, Output::Version(1));
        queue.deliver(b, Output::Version(2));
        queue.stop();

        queue.run(&futures).unwrap();
        assert!(futures.is_ready(a));
        assert!(futures.is_ready(b));
        assert!(!queue.is_running());
    }

    #[test]
    fn test_delayed_delivery() {
        let futures = Arc::new(FutureRegistry::new(StatsRecorder::new()));
        let queue = Arc::new(NetworkQueue::new());

        let handle = {
            let futures = Arc::clone(&futures);
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.run(&futures))
        };

        let id = futures.create(None);
        let start = Instant::now();
        queue.deliver_after(Duration::from_millis(20), id, Output::Nil);
        while !futures.is_ready(id) {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(start.elapsed() >= Duration::from_millis(20));

        queue.stop();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn test_stop_cancels_pending_timers() {
        let futures = FutureRegistry::new(StatsRecorder::new());
        let queue = NetworkQueue::new();

        let id = futures.create(None);
        queue.deliver_after(Duration::from_secs(60), id, Output::Nil);
        queue.stop();
        queue.run(&futures).unwrap();

        assert_eq!(futures.error(id), error_code::OPERATION_CANCELLED);
    }
}
