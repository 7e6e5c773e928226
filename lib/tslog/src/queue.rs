//! Bounded measurement queue.

use std::{
    collections::VecDeque,
    fmt,
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

/// Default queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;

/// Backpressure policy applied when pushing into a full queue.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Backpressure {
    /// Block the calling thread until space becomes available, without any timeout.
    #[default]
    Block,

    /// Fail immediately if the queue is at capacity.
    FailFast,
}

/// Error returned when pushing into a full queue without waiting.
///
/// Carries the rejected item back to the caller, so that it can decide whether to drop it, retry, or escalate.
pub struct QueueFull<T> {
    item: T,
    capacity: usize,
}

impl<T> QueueFull<T> {
    /// Returns the capacity of the queue that rejected the item.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Consumes the error, returning the item that could not be pushed.
    pub fn into_item(self) -> T {
        self.item
    }
}

impl<T> fmt::Debug for QueueFull<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueFull").field("capacity", &self.capacity).finish_non_exhaustive()
    }
}

impl<T> fmt::Display for QueueFull<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Queue is full (capacity {}).", self.capacity)
    }
}

impl<T> std::error::Error for QueueFull<T> {}

/// A bounded, multi-producer multi-consumer FIFO queue.
///
/// Items are handed out in the order they were pushed, and every item is handed to exactly one consumer. All
/// synchronization is internal, so the queue can be shared (typically behind an `Arc`) between any number of producer
/// and consumer threads.
pub struct MeasurementQueue<T> {
    items: Mutex<VecDeque<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> MeasurementQueue<T> {
    /// Creates a new `MeasurementQueue` that holds at most `capacity` items.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be non-zero");

        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_QUEUE_CAPACITY))),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// Returns the maximum number of items the queue can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of items currently in the queue.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if the queue is currently empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Pushes an item to the back of the queue, applying the given backpressure policy if the queue is full.
    ///
    /// # Errors
    ///
    /// If the queue is full and `backpressure` is [`Backpressure::FailFast`], an error is returned that carries the
    /// item back to the caller.
    pub fn push(&self, item: T, backpressure: Backpressure) -> Result<(), QueueFull<T>> {
        match backpressure {
            Backpressure::Block => {
                self.push_blocking(item);
                Ok(())
            }
            Backpressure::FailFast => self.try_push(item),
        }
    }

    /// Pushes an item to the back of the queue, waiting for as long as it takes for space to become available.
    pub fn push_blocking(&self, item: T) {
        let mut items = self.lock();
        while items.len() >= self.capacity {
            items = self.not_full.wait(items).unwrap_or_else(PoisonError::into_inner);
        }

        items.push_back(item);
        drop(items);

        self.not_empty.notify_one();
    }

    /// Attempts to push an item to the back of the queue without waiting.
    ///
    /// # Errors
    ///
    /// If the queue is full, an error is returned that carries the item back to the caller.
    pub fn try_push(&self, item: T) -> Result<(), QueueFull<T>> {
        let mut items = self.lock();
        if items.len() >= self.capacity {
            return Err(QueueFull {
                item,
                capacity: self.capacity,
            });
        }

        items.push_back(item);
        drop(items);

        self.not_empty.notify_one();
        Ok(())
    }

    /// Pops an item from the front of the queue, waiting up to `timeout` for one to arrive.
    ///
    /// Returns `None` if no item arrived in time. This is not an error: consumers are expected to call `pop` in a loop,
    /// using the timeout as a point to periodically regain control.
    pub fn pop(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now().checked_add(timeout);
        let mut items = self.lock();

        loop {
            if let Some(item) = items.pop_front() {
                drop(items);
                self.not_full.notify_one();
                return Some(item);
            }

            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                // The timeout is so large that the deadline overflowed, so we'll just keep waiting in large chunks.
                None => timeout,
            };
            if remaining.is_zero() {
                return None;
            }

            let (guard, _) = self
                .not_empty
                .wait_timeout(items, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            items = guard;
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        // No operation can panic while holding the lock and leave the deque in a torn state, so a poisoned lock is
        // still safe to use.
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        sync::{mpsc, Arc, Mutex},
        thread,
        time::Duration,
    };

    use super::*;

    #[test]
    fn fifo_order() {
        let queue = MeasurementQueue::with_capacity(4);
        for i in 0..4 {
            queue.push(i, Backpressure::FailFast).unwrap();
        }

        let popped = (0..4)
            .map(|_| queue.pop(Duration::ZERO).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(popped, vec![0, 1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn try_push_full_returns_item() {
        let queue = MeasurementQueue::with_capacity(2);
        queue.try_push("a").unwrap();
        queue.try_push("b").unwrap();

        let err = queue.push("c", Backpressure::FailFast).unwrap_err();
        assert_eq!(err.capacity(), 2);
        assert_eq!(err.into_item(), "c");
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn pop_times_out_when_empty() {
        let queue = MeasurementQueue::<u32>::with_capacity(1);
        assert_eq!(queue.pop(Duration::from_millis(20)), None);
        assert_eq!(queue.pop(Duration::ZERO), None);
    }

    #[test]
    fn pop_wakes_on_push() {
        let queue = Arc::new(MeasurementQueue::with_capacity(1));

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop(Duration::from_secs(10)))
        };

        thread::sleep(Duration::from_millis(50));
        queue.push(42, Backpressure::Block).unwrap();

        assert_eq!(consumer.join().unwrap(), Some(42));
    }

    #[test]
    fn blocking_push_waits_for_space() {
        let queue = Arc::new(MeasurementQueue::with_capacity(1));
        queue.push(1, Backpressure::Block).unwrap();

        let (done_tx, done_rx) = mpsc::channel();
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                queue.push(2, Backpressure::Block).unwrap();
                done_tx.send(()).unwrap();
            })
        };

        // The producer should still be parked, since nothing has drained the queue yet.
        assert!(done_rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.pop(Duration::ZERO), Some(1));
        done_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        producer.join().unwrap();

        assert_eq!(queue.pop(Duration::ZERO), Some(2));
    }

    #[test]
    fn concurrent_consumers_never_share_items() {
        const PRODUCERS: usize = 4;
        const CONSUMERS: usize = 4;
        const ITEMS_PER_PRODUCER: usize = 500;

        let queue = Arc::new(MeasurementQueue::with_capacity(16));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let total = PRODUCERS * ITEMS_PER_PRODUCER;

        let consumers = (0..CONSUMERS)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let seen = Arc::clone(&seen);
                thread::spawn(move || loop {
                    if seen.lock().unwrap().len() >= total {
                        break;
                    }
                    if let Some(item) = queue.pop(Duration::from_millis(10)) {
                        seen.lock().unwrap().push(item);
                    }
                })
            })
            .collect::<Vec<_>>();

        let producers = (0..PRODUCERS)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..ITEMS_PER_PRODUCER {
                        queue.push(p * ITEMS_PER_PRODUCER + i, Backpressure::Block).unwrap();
                    }
                })
            })
            .collect::<Vec<_>>();

        for producer in producers {
            producer.join().unwrap();
        }
        for consumer in consumers {
            consumer.join().unwrap();
        }

        let seen = seen.lock().unwrap();
        let unique = seen.iter().copied().collect::<HashSet<_>>();
        assert_eq!(seen.len(), total);
        assert_eq!(unique.len(), total);
        assert!(queue.is_empty());
    }

    #[test]
    #[should_panic]
    fn zero_capacity_panics() {
        let _ = MeasurementQueue::<u8>::with_capacity(0);
    }
}
