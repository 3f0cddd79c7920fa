// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All tensor code lives here. Layers below hand over host-side
// Examples; the application layer above only sees specs, run
// contexts and summaries.
//
//   backend.rs     — NdArray by default, Wgpu behind a feature
//   models/        — the registered architectures and their cards
//   losses.rs      — label losses used when a model has none
//   optimizers.rs  — optimizer registry and constructor visitor
//   assembly.rs    — normalisation, label slicing, model invocation
//   bundle.rs      — stage-specific named outputs, step counters
//   trainer.rs     — training loop with decay, alternation, checkpoints
//   evaluator.rs   — hit@1 / PERR / GAP over one ordered pass
//   inferencer.rs  — top-k predictions CSV
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)

/// Backend aliases and device selection
pub mod backend;

/// Video-classification architectures
pub mod models;

/// Label losses
pub mod losses;

/// Optimizer registry
pub mod optimizers;

/// Graph assembly: batch + model → forward pass
pub mod assembly;

/// Output bundles per stage
pub mod bundle;

/// Shared inputs of the run loops
pub mod run;

/// Training loop
pub mod trainer;

/// Evaluation loop and metric calculators
pub mod evaluator;

/// Inference loop
pub mod inferencer;
