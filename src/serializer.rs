//! Per-Key Write Serializer
//!
//! Runs read-modify-write units one at a time per key, in submission order.
//!
//! ## How It Works
//!
//! ```text
//!   registry: Mutex<HashMap<key, Arc<KeyQueue>>>
//!
//!   KeyQueue "a@x"   next_ticket = 7   now_serving = 4
//!                    tickets 4 (running), 5, 6 (waiting on the Condvar)
//! ```
//!
//! - A unit takes one ticket per key while holding the registry lock, then
//!   waits (registry lock released) until each queue is serving its ticket.
//! - A multi-key unit (rename) takes all of its tickets in one registry
//!   critical section. Any two units therefore hold tickets in the same
//!   relative order on every key they share, so they cannot deadlock.
//! - When a unit finishes (returns, fails or panics) its hold is dropped:
//!   each queue advances, and a queue with nobody left is removed from
//!   the registry.
//!
//! The registry lock covers only ticket bookkeeping; the work itself runs
//! with no serializer lock held. Units on unrelated keys never wait on each
//! other.
//!
//! A unit must not enqueue on a key it already holds: it would wait on its
//! own ticket forever.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// Registry of per-key FIFO queues
#[derive(Default)]
pub struct KeyedSerializer {
    queues: Mutex<HashMap<String, Arc<KeyQueue>>>,
}

#[derive(Default)]
struct KeyQueue {
    state: Mutex<QueueState>,
    turn: Condvar,
}

#[derive(Default)]
struct QueueState {
    /// Ticket handed to the next unit that arrives
    next_ticket: u64,
    /// Ticket allowed to run right now
    now_serving: u64,
}

/// One key's position held by a waiting or running unit
struct Slot {
    key: String,
    queue: Arc<KeyQueue>,
    ticket: u64,
}

impl Slot {
    fn wait_turn(&self) {
        let mut state = self.queue.state.lock();
        while state.now_serving != self.ticket {
            self.queue.turn.wait(&mut state);
        }
    }
}

/// Exclusive access to a set of keys; released on drop
struct Hold<'a> {
    serializer: &'a KeyedSerializer,
    slots: Vec<Slot>,
}

impl Drop for Hold<'_> {
    fn drop(&mut self) {
        let mut queues = self.serializer.queues.lock();
        for slot in self.slots.drain(..) {
            let idle = {
                let mut state = slot.queue.state.lock();
                state.now_serving += 1;
                state.now_serving == state.next_ticket
            };
            slot.queue.turn.notify_all();

            // Tickets are only issued under the registry lock we hold, so an
            // idle queue cannot gain a waiter before it is removed.
            if idle {
                queues.remove(&slot.key);
                tracing::trace!(key = %slot.key, "key queue collected");
            }
        }
    }
}

impl KeyedSerializer {
    /// Create an empty serializer
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` with exclusive access to `key`
    ///
    /// Blocks until every unit submitted earlier for `key` has finished.
    /// Whatever `work` returns (including an `Err`) is handed back as is.
    pub fn enqueue<T>(&self, key: &str, work: impl FnOnce() -> T) -> T {
        self.enqueue_all(&[key], work)
    }

    /// Run `work` with exclusive access to both `old_key` and `new_key`
    ///
    /// Units submitted afterwards on either key run after this one, so none
    /// of them can observe the rename half-done.
    pub fn enqueue_rename<T>(&self, old_key: &str, new_key: &str, work: impl FnOnce() -> T) -> T {
        self.enqueue_all(&[old_key, new_key], work)
    }

    /// Run `work` with exclusive access to every key in `keys`
    pub fn enqueue_all<T>(&self, keys: &[&str], work: impl FnOnce() -> T) -> T {
        let hold = self.acquire(keys);
        let result = work();
        drop(hold);
        result
    }

    /// Units queued or running for `key`
    pub fn pending(&self, key: &str) -> usize {
        let queues = self.queues.lock();
        queues.get(key).map_or(0, |queue| {
            let state = queue.state.lock();
            (state.next_ticket - state.now_serving) as usize
        })
    }

    /// Number of keys that currently have a queue
    pub fn tracked_keys(&self) -> usize {
        self.queues.lock().len()
    }

    fn acquire(&self, keys: &[&str]) -> Hold<'_> {
        let mut ordered = keys.to_vec();
        ordered.sort_unstable();
        ordered.dedup();

        let slots: Vec<Slot> = {
            let mut queues = self.queues.lock();
            ordered
                .into_iter()
                .map(|key| {
                    let queue = Arc::clone(queues.entry(key.to_string()).or_insert_with(|| {
                        tracing::trace!(key, "key queue created");
                        Arc::default()
                    }));
                    let ticket = {
                        let mut state = queue.state.lock();
                        let ticket = state.next_ticket;
                        state.next_ticket += 1;
                        ticket
                    };
                    Slot {
                        key: key.to_string(),
                        queue,
                        ticket,
                    }
                })
                .collect()
        };

        // Sorted order; with atomically issued tickets any order would do.
        for slot in &slots {
            slot.wait_turn();
        }
        Hold {
            serializer: self,
            slots,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    fn wait_for_pending(serializer: &KeyedSerializer, key: &str, count: usize) {
        while serializer.pending(key) < count {
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_returns_work_result() {
        let serializer = KeyedSerializer::new();
        let value = serializer.enqueue("k", || 41 + 1);

        assert_eq!(value, 42);
    }

    #[test]
    fn test_queue_collected_after_unit() {
        let serializer = KeyedSerializer::new();
        serializer.enqueue("k", || ());
        serializer.enqueue_rename("a", "b", || ());

        assert_eq!(serializer.tracked_keys(), 0);
        assert_eq!(serializer.pending("k"), 0);
    }

    #[test]
    fn test_error_does_not_block_queue() {
        let serializer = KeyedSerializer::new();
        let failed: Result<(), &str> = serializer.enqueue("k", || Err("boom"));
        let next: Result<u8, &str> = serializer.enqueue("k", || Ok(1));

        assert!(failed.is_err());
        assert_eq!(next, Ok(1));
        assert_eq!(serializer.tracked_keys(), 0);
    }

    #[test]
    fn test_panic_releases_key() {
        let serializer = KeyedSerializer::new();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            serializer.enqueue("k", || panic!("unit blew up"));
        }));

        assert!(outcome.is_err());
        assert_eq!(serializer.enqueue("k", || "still usable"), "still usable");
    }

    #[test]
    fn test_duplicate_keys_are_collapsed() {
        let serializer = KeyedSerializer::new();
        let ran = serializer.enqueue_rename("same", "same", || true);

        assert!(ran);
        assert_eq!(serializer.tracked_keys(), 0);
    }

    #[test]
    fn test_units_on_one_key_never_overlap() {
        let serializer = Arc::new(KeyedSerializer::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let serializer = Arc::clone(&serializer);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                thread::spawn(move || {
                    for _ in 0..25 {
                        serializer.enqueue("hot", || {
                            let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                            max_inside.fetch_max(now, Ordering::SeqCst);
                            thread::yield_now();
                            inside.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(serializer.tracked_keys(), 0);
    }

    #[test]
    fn test_pending_counts_waiters() {
        let serializer = Arc::new(KeyedSerializer::new());
        let (release_tx, release_rx) = crossbeam::channel::bounded::<()>(0);

        let blocker = {
            let serializer = Arc::clone(&serializer);
            thread::spawn(move || serializer.enqueue("k", || release_rx.recv().unwrap()))
        };
        wait_for_pending(&serializer, "k", 1);

        let waiter = {
            let serializer = Arc::clone(&serializer);
            thread::spawn(move || serializer.enqueue("k", || ()))
        };
        wait_for_pending(&serializer, "k", 2);
        assert_eq!(serializer.pending("other"), 0);

        release_tx.send(()).unwrap();
        blocker.join().unwrap();
        waiter.join().unwrap();
        assert_eq!(serializer.pending("k"), 0);
    }
}
