// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from record shards on disk to tensor batches.
//
//   *.jsonl shards
//       │
//       ▼
//   record       → RawRecord, label encoding, shard streaming
//       │
//       ▼
//   readers      → one decode strategy per input feature layout
//       │
//       ▼
//   filenames    → shared, epoch-capped shard source
//       │
//       ▼
//   staging      → bounded multi-producer queue
//       │
//       ▼
//   pipeline     → worker threads + BatchStream (Vec<Example>)
//       │
//       ▼
//   batcher      → VideoBatch<B> tensors
//
// Only batcher.rs touches burn; the rest is plain Rust and can be
// tested without a backend.

/// JSON-lines record format and label encoding
pub mod record;

/// Reader variants and select_reader
pub mod readers;

/// Shared filename source
pub mod filenames;

/// Bounded staging queue
pub mod staging;

/// build_batches and the BatchStream consumer
pub mod pipeline;

/// Example batches → burn tensors
pub mod batcher;
