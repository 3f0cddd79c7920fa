// ============================================================
// Layer 4 — Bounded Staging Queue
// ============================================================
// The meeting point of the decode workers (many producers) and the
// step loop (one consumer).
//
//   producers: push() blocks while the queue holds `capacity` items
//   consumer:  dequeue_many() blocks until it can take a batch while
//              leaving `min_after` items behind, or until every
//              producer has finished
//
// With an rng the dequeue picks random positions, which mixes
// examples from different shards (train). Without one it is FIFO,
// so each producer's emission order survives (eval / inference).
//
// The first failure wins: fail() stores the error and cancels the
// queue, every blocked push returns false and the consumer receives
// that error on its next dequeue.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use rand::rngs::StdRng;
use rand::Rng;

use crate::error::InputError;

#[derive(Debug)]
pub struct StagingQueue<T> {
    capacity:  usize,
    state:     Mutex<QueueState<T>>,
    not_full:  Condvar,
    not_empty: Condvar,
}

#[derive(Debug)]
struct QueueState<T> {
    items:            VecDeque<T>,
    active_producers: usize,
    error:            Option<InputError>,
    cancelled:        bool,
}

impl<T> StagingQueue<T> {
    pub fn new(capacity: usize, producers: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(QueueState {
                items:            VecDeque::with_capacity(capacity),
                active_producers: producers,
                error:            None,
                cancelled:        false,
            }),
            not_full:  Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Blocks while full. Returns false once the queue is cancelled;
    /// the item is dropped and the producer should stop.
    pub fn push(&self, item: T) -> bool {
        let mut state = self.lock();
        while state.items.len() >= self.capacity && !state.cancelled {
            state = self.not_full.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        if state.cancelled {
            return false;
        }
        state.items.push_back(item);
        self.not_empty.notify_one();
        true
    }

    /// Called exactly once by every producer, whether it succeeded or not.
    pub fn producer_finished(&self) {
        let mut state = self.lock();
        state.active_producers = state.active_producers.saturating_sub(1);
        self.not_empty.notify_all();
    }

    /// Record the first error and tear the queue down.
    pub fn fail(&self, error: InputError) {
        let mut state = self.lock();
        if state.error.is_none() && !state.cancelled {
            state.error = Some(error);
        }
        state.cancelled = true;
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    pub fn cancel(&self) {
        self.lock().cancelled = true;
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    /// Take up to `n` items.
    ///
    /// Returns None at end of input (or after cancellation), and the
    /// stored error exactly once if a producer failed.
    pub fn dequeue_many(
        &self,
        n:         usize,
        min_after: usize,
        rng:       Option<&mut StdRng>,
    ) -> Option<Result<Vec<T>, InputError>> {
        let mut state = self.lock();
        loop {
            if let Some(error) = state.error.take() {
                return Some(Err(error));
            }
            if state.cancelled {
                return None;
            }
            let exhausted = state.active_producers == 0;
            if state.items.len() >= n + min_after || (exhausted && !state.items.is_empty()) {
                break;
            }
            if exhausted {
                return None;
            }
            state = self.not_empty.wait(state).unwrap_or_else(PoisonError::into_inner);
        }

        let take = n.min(state.items.len());
        let batch = match rng {
            Some(rng) => (0..take)
                .filter_map(|_| {
                    let idx = rng.gen_range(0..state.items.len());
                    state.items.swap_remove_back(idx)
                })
                .collect(),
            None => state.items.drain(..take).collect(),
        };
        self.not_full.notify_all();
        Some(Ok(batch))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use rand::SeedableRng;

    use super::*;

    #[test]
    fn test_fifo_dequeue_keeps_order_and_allows_short_final_batch() {
        let queue = StagingQueue::new(10, 1);
        for i in 0..5 {
            assert!(queue.push(i));
        }
        queue.producer_finished();

        assert_eq!(queue.dequeue_many(3, 0, None).unwrap().unwrap(), vec![0, 1, 2]);
        assert_eq!(queue.dequeue_many(3, 0, None).unwrap().unwrap(), vec![3, 4]);
        assert!(queue.dequeue_many(3, 0, None).is_none());
    }

    #[test]
    fn test_push_blocks_while_full() {
        let queue = Arc::new(StagingQueue::new(2, 1));
        queue.push(1);
        queue.push(2);

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let pushed = queue.push(3);
                queue.producer_finished();
                pushed
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.dequeue_many(1, 0, None).unwrap().unwrap(), vec![1]);
        assert!(producer.join().unwrap());
        assert_eq!(queue.dequeue_many(5, 0, None).unwrap().unwrap(), vec![2, 3]);
    }

    #[test]
    fn test_consumer_waits_for_fill_threshold() {
        let queue = Arc::new(StagingQueue::new(20, 1));
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(0);
                queue.dequeue_many(2, 3, Some(&mut rng))
            })
        };

        for i in 0..4 {
            queue.push(i);
        }
        thread::sleep(Duration::from_millis(50));
        // 4 < 2 + 3, so the consumer is still waiting
        assert_eq!(queue.len(), 4);

        queue.push(4);
        let batch = consumer.join().unwrap().unwrap().unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_shuffled_drain_returns_every_item_once() {
        let queue = StagingQueue::new(100, 1);
        for i in 0..37 {
            queue.push(i);
        }
        queue.producer_finished();

        let mut rng = StdRng::seed_from_u64(9);
        let mut seen = Vec::new();
        while let Some(batch) = queue.dequeue_many(8, 5, Some(&mut rng)) {
            seen.extend(batch.unwrap());
        }
        seen.sort();
        assert_eq!(seen, (0..37).collect::<Vec<_>>());
    }

    #[test]
    fn test_failure_is_delivered_once_and_unblocks_producers() {
        let queue = Arc::new(StagingQueue::new(1, 2));
        queue.push(0);

        let blocked = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(1))
        };
        thread::sleep(Duration::from_millis(20));

        queue.fail(InputError::NoInputFiles { pattern: "x".into() });
        queue.fail(InputError::Io {
            path:   PathBuf::from("second"),
            source: std::io::Error::other("ignored"),
        });

        assert!(!blocked.join().unwrap());
        assert!(matches!(
            queue.dequeue_many(1, 0, None),
            Some(Err(InputError::NoInputFiles { .. }))
        ));
        assert!(queue.dequeue_many(1, 0, None).is_none());
    }
}
