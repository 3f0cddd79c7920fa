// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Everything a run writes to (or reads back from) its checkpoint
// directory:
//
//   checkpoint.rs — Model weights via Burn's NamedMpkFileRecorder, the
//                   latest-step pointer, and the resolved run config
//                   as JSON.
//
//   metrics.rs    — CSV logs of training progress and evaluation
//                   quality, appended across runs.
//
//   exports.rs    — Per-video outputs: the predictions CSV and the
//                   exported eval features.
//
// The run loops decide *what* to persist; this layer only knows
// *how* and *where*.

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Training and evaluation metrics CSV loggers
pub mod metrics;

/// predictions.csv and eval_feats.jsonl writers
pub mod exports;
