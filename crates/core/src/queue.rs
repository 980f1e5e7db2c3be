//! Unbounded blocking FIFO shared between producers and worker threads.
//!
//! All operations serialize on a single mutex guarding the backing
//! `VecDeque`. Blocked consumers park on a condition variable bound to that
//! same mutex and wait for "queue non-empty", re-checking the condition after
//! every wake so spurious wakeups are harmless.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

/// Thread-safe FIFO with a blocking dequeue.
#[derive(Debug)]
pub struct BlockingQueue<T> {
    items: Mutex<VecDeque<T>>,
    not_empty: Condvar,
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> BlockingQueue<T> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
        }
    }

    /// Append `value` at the tail and wake one blocked consumer, if any.
    ///
    /// Never blocks beyond acquiring the lock; capacity is unbounded.
    pub fn enqueue(&self, value: T) {
        {
            let mut items = self.items.lock();
            items.push_back(value);
        }
        self.not_empty.notify_one();
    }

    /// Remove and return the head, blocking until an element is available.
    pub fn dequeue_blocking(&self) -> T {
        let mut items = self.items.lock();
        loop {
            if let Some(value) = items.pop_front() {
                return value;
            }
            self.not_empty.wait(&mut items);
        }
    }

    /// Remove and return the head if there is one.
    pub fn try_dequeue(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Snapshot of emptiness.
    ///
    /// Best effort only: under concurrent access the answer may be stale by
    /// the time the caller looks at it. Not a synchronization primitive.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Snapshot of the current length. Same caveats as [`Self::is_empty`].
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_fifo_order() {
        let queue = BlockingQueue::new();
        queue.enqueue("a");
        queue.enqueue("b");
        queue.enqueue("c");

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dequeue_blocking(), "a");
        assert_eq!(queue.dequeue_blocking(), "b");
        assert_eq!(queue.try_dequeue(), Some("c"));
        assert_eq!(queue.try_dequeue(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_dequeue_blocks_until_enqueue() {
        let queue = Arc::new(BlockingQueue::new());
        let (tx, rx) = mpsc::channel();

        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || {
                let value = queue.dequeue_blocking();
                tx.send(value).unwrap();
            })
        };

        // Nothing to take yet, so the consumer must still be parked.
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        queue.enqueue(42u32);
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
        consumer.join().unwrap();
    }

    #[test]
    fn test_no_missed_wakeups_with_many_waiters() {
        const WAITERS: usize = 8;

        let queue = Arc::new(BlockingQueue::new());
        let (tx, rx) = mpsc::channel();

        let consumers: Vec<_> = (0..WAITERS)
            .map(|_| {
                let queue = queue.clone();
                let tx = tx.clone();
                thread::spawn(move || {
                    let value: usize = queue.dequeue_blocking();
                    tx.send(value).unwrap();
                })
            })
            .collect();
        drop(tx);

        // Give every consumer a chance to park before producing.
        thread::sleep(Duration::from_millis(50));
        for i in 0..WAITERS {
            queue.enqueue(i);
        }

        let mut received: Vec<usize> = (0..WAITERS)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        received.sort_unstable();
        assert_eq!(received, (0..WAITERS).collect::<Vec<_>>());

        for consumer in consumers {
            consumer.join().unwrap();
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_concurrent_producers_lose_nothing() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 250;

        let queue = Arc::new(BlockingQueue::new());
        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let queue = queue.clone();
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        queue.enqueue((p, i));
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let mut last_seen = [None::<usize>; PRODUCERS];
        for _ in 0..PRODUCERS * PER_PRODUCER {
            let (p, i) = queue.dequeue_blocking();
            // Per-producer order survives interleaving.
            if let Some(prev) = last_seen[p] {
                assert!(i > prev);
            }
            last_seen[p] = Some(i);
        }
        assert!(queue.is_empty());
    }
}
