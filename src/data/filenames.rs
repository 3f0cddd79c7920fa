// ============================================================
// Layer 4 — Shared Filename Source
// ============================================================
// Every decode worker pulls its next shard from one FilenameSource.
// A pass hands out each file exactly once, no matter how many
// workers call `next` concurrently. The cursor lives behind a Mutex
// and is only held for the few instructions it takes to advance it.
//
//   shuffle = true  → a fresh permutation every pass (seeded)
//   shuffle = false → sorted order, identical every pass
//
// After `num_epochs` passes the source is exhausted and keeps
// returning None.

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

#[derive(Debug)]
pub struct FilenameSource {
    files:      Vec<PathBuf>,
    shuffle:    bool,
    num_epochs: Option<usize>,
    cursor:     Mutex<Cursor>,
}

#[derive(Debug)]
struct Cursor {
    order:    Vec<usize>,
    position: usize,
    epoch:    usize,
    rng:      StdRng,
}

impl FilenameSource {
    pub fn new(files: Vec<PathBuf>, shuffle: bool, num_epochs: Option<usize>, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut order: Vec<usize> = (0..files.len()).collect();
        if shuffle {
            order.shuffle(&mut rng);
        }
        Self {
            files,
            shuffle,
            num_epochs,
            cursor: Mutex::new(Cursor { order, position: 0, epoch: 0, rng }),
        }
    }

    /// Next shard to decode, or None once the epoch cap is reached.
    pub fn next(&self) -> Option<PathBuf> {
        if self.files.is_empty() {
            return None;
        }
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);

        if cursor.position == self.files.len() {
            if let Some(cap) = self.num_epochs {
                if cursor.epoch + 1 >= cap {
                    return None;
                }
            }
            cursor.epoch += 1;
            cursor.position = 0;
            if self.shuffle {
                let Cursor { order, rng, .. } = &mut *cursor;
                order.shuffle(rng);
            }
            tracing::debug!("Filename source starting pass {}", cursor.epoch + 1);
        }

        let idx = cursor.order[cursor.position];
        cursor.position += 1;
        Some(self.files[idx].clone())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }
}
