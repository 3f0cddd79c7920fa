// ============================================================
// Layer 4 — Input Pipeline Builder
// ============================================================
// Turns a glob pattern into a stream of example batches:
//
//   data_pattern ──glob──▶ sorted shard list
//        │
//        ▼
//   FilenameSource (shared, one pass = every shard once)
//        │           │            │
//        ▼           ▼            ▼
//   decode-0     decode-1 …   decode-{num_readers-1}   (OS threads)
//        │           │            │
//        └───────────┴─────┬──────┘
//                          ▼
//               StagingQueue (bounded)
//                          │
//                          ▼
//               BatchStream::next()  →  Vec<Example>
//
// Queue sizing by stage:
//   train            capacity 10×batch, keeps 5×batch behind, random picks
//   eval / inference capacity  3×batch, FIFO
//
// Dropping the stream cancels the queue and joins every worker.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::data::filenames::FilenameSource;
use crate::data::staging::StagingQueue;
use crate::domain::config::ExperimentConfig;
use crate::domain::example::Example;
use crate::domain::traits::Reader;
use crate::error::InputError;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub pattern:     String,
    pub num_readers: usize,
    /// None cycles forever
    pub num_epochs:  Option<usize>,
    pub batch_size:  usize,
    pub shuffle:     bool,
    pub seed:        u64,
}

impl PipelineConfig {
    pub fn from_experiment(config: &ExperimentConfig) -> Self {
        Self {
            pattern:     config.data_pattern.clone(),
            num_readers: config.num_readers,
            num_epochs:  config.num_epochs,
            batch_size:  config.batch_size,
            shuffle:     config.stage.shuffles_input(),
            seed:        config.seed,
        }
    }

    pub fn capacity(&self) -> usize {
        let factor = if self.shuffle { 10 } else { 3 };
        factor * self.batch_size.max(1)
    }

    pub fn min_after_dequeue(&self) -> usize {
        if self.shuffle { 5 * self.batch_size } else { 0 }
    }
}

/// Expand `pattern` eagerly; an empty match set is an error.
pub fn expand_pattern(pattern: &str) -> Result<Vec<PathBuf>, InputError> {
    let paths = glob::glob(pattern).map_err(|source| InputError::BadPattern {
        pattern: pattern.to_string(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => {
                let path = e.path().to_path_buf();
                return Err(InputError::Io { path, source: e.into_error() });
            }
        }
    }
    files.sort();

    if files.is_empty() {
        return Err(InputError::NoInputFiles { pattern: pattern.to_string() });
    }
    Ok(files)
}

/// Start the decode workers and return the consumer end.
pub fn build_batches(cfg: &PipelineConfig, reader: Arc<dyn Reader>) -> Result<BatchStream, InputError> {
    let files = expand_pattern(&cfg.pattern)?;
    let num_readers = cfg.num_readers.max(1);

    let source = Arc::new(FilenameSource::new(files, cfg.shuffle, cfg.num_epochs, cfg.seed));
    tracing::info!(
        "Input pipeline: {} {} shard(s), {} reader(s), batch {}, {} (capacity {}, min after dequeue {})",
        source.len(),
        reader.feature_type(),
        num_readers,
        cfg.batch_size,
        if cfg.shuffle { "shuffled" } else { "ordered" },
        cfg.capacity(),
        cfg.min_after_dequeue(),
    );
    let queue = Arc::new(StagingQueue::new(cfg.capacity(), num_readers));

    let mut stream = BatchStream {
        queue:      Arc::clone(&queue),
        workers:    Vec::with_capacity(num_readers),
        batch_size: cfg.batch_size.max(1),
        min_after:  cfg.min_after_dequeue(),
        rng:        cfg.shuffle.then(|| StdRng::seed_from_u64(cfg.seed.wrapping_add(1))),
        finished:   false,
    };

    for id in 0..num_readers {
        let source = Arc::clone(&source);
        let reader = Arc::clone(&reader);
        let worker_queue = Arc::clone(&queue);
        let handle = thread::Builder::new()
            .name(format!("decode-{id}"))
            .spawn(move || decode_worker(id, &source, reader.as_ref(), &worker_queue));

        match handle {
            Ok(handle) => stream.workers.push(handle),
            Err(e) => {
                // Workers that never started will never report in
                for _ in id..num_readers {
                    queue.producer_finished();
                }
                queue.cancel();
                return Err(InputError::Spawn(e));
            }
        }
    }

    Ok(stream)
}

fn decode_worker(
    id:     usize,
    source: &FilenameSource,
    reader: &dyn Reader,
    queue:  &StagingQueue<Example>,
) {
    if let Err(e) = pump(id, source, reader, queue) {
        tracing::error!("decode-{id} aborting the pipeline: {e}");
        queue.fail(e);
    }
    queue.producer_finished();
}

fn pump(
    id:     usize,
    source: &FilenameSource,
    reader: &dyn Reader,
    queue:  &StagingQueue<Example>,
) -> Result<(), InputError> {
    while let Some(path) = source.next() {
        tracing::debug!("decode-{id} reading {}", path.display());
        for example in reader.prepare_reader(&path)? {
            if !queue.push(example?) {
                return Ok(());
            }
        }
    }
    Ok(())
}

// ─── BatchStream ─────────────────────────────────────────────────────────────
/// Consumer end of the pipeline. Yields batches until the input is
/// exhausted or the first error, which ends the stream.
#[derive(Debug)]
pub struct BatchStream {
    queue:      Arc<StagingQueue<Example>>,
    workers:    Vec<JoinHandle<()>>,
    batch_size: usize,
    min_after:  usize,
    rng:        Option<StdRng>,
    finished:   bool,
}

impl Iterator for BatchStream {
    type Item = Result<Vec<Example>, InputError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let item = self
            .queue
            .dequeue_many(self.batch_size, self.min_after, self.rng.as_mut());
        if !matches!(item, Some(Ok(_))) {
            self.finished = true;
        }
        item
    }
}

impl Drop for BatchStream {
    fn drop(&mut self) {
        self.queue.cancel();
        for handle in self.workers.drain(..) {
            let name = handle.thread().name().unwrap_or("decode").to_string();
            if handle.join().is_err() {
                tracing::warn!("{name} panicked during shutdown");
            }
        }
    }
}
