//! Blocking priority queue of dirty line indices

use parking_lot::{Condvar, Mutex};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// A thread-safe blocking queue of line indices awaiting re-tokenization,
/// drained in ascending order.
///
/// Duplicate indices are tolerated; consumers filter stale entries via the
/// line's invalid flag on dequeue. This is the single synchronization point
/// between edit invalidation (producers) and the background worker
/// (consumer).
#[derive(Debug, Default)]
pub struct DirtyQueue {
    heap: Mutex<BinaryHeap<Reverse<usize>>>,
    available: Condvar,
}

impl DirtyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a line index and wake the worker.
    pub fn push(&self, line_index: usize) {
        self.heap.lock().push(Reverse(line_index));
        self.available.notify_one();
    }

    /// Block until an index is available or `should_exit` turns true.
    ///
    /// `should_exit` is re-checked on every wakeup, so it pairs with
    /// [`DirtyQueue::notify_all`] for cooperative shutdown.
    pub fn pop(&self, should_exit: impl Fn() -> bool) -> Option<usize> {
        let mut heap = self.heap.lock();
        loop {
            if should_exit() {
                return None;
            }
            if let Some(Reverse(line_index)) = heap.pop() {
                return Some(line_index);
            }
            self.available.wait(&mut heap);
        }
    }

    /// Wake all waiters so they can observe an exit condition.
    pub fn notify_all(&self) {
        self.available.notify_all();
    }

    pub fn is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }

    /// Drop all pending entries.
    pub fn clear(&self) {
        self.heap.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_pop_returns_ascending_indices() {
        let queue = DirtyQueue::new();
        queue.push(5);
        queue.push(1);
        queue.push(3);
        assert_eq!(queue.pop(|| false), Some(1));
        assert_eq!(queue.pop(|| false), Some(3));
        assert_eq!(queue.pop(|| false), Some(5));
    }

    #[test]
    fn test_duplicates_are_tolerated() {
        let queue = DirtyQueue::new();
        queue.push(2);
        queue.push(2);
        assert_eq!(queue.pop(|| false), Some(2));
        assert_eq!(queue.pop(|| false), Some(2));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pop_blocks_until_push() {
        let queue = Arc::new(DirtyQueue::new());
        let producer = {
            let queue = queue.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                queue.push(7);
            })
        };
        assert_eq!(queue.pop(|| false), Some(7));
        producer.join().expect("producer thread");
    }

    #[test]
    fn test_exit_condition_unblocks_pop() {
        let queue = Arc::new(DirtyQueue::new());
        let exit = Arc::new(AtomicBool::new(false));
        let consumer = {
            let queue = queue.clone();
            let exit = exit.clone();
            std::thread::spawn(move || queue.pop(move || exit.load(Ordering::SeqCst)))
        };
        std::thread::sleep(Duration::from_millis(20));
        exit.store(true, Ordering::SeqCst);
        queue.notify_all();
        assert_eq!(consumer.join().expect("consumer thread"), None);
    }
}
