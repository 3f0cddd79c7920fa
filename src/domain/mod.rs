// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs, enums and traits describing what an
// experiment IS: its stage, its configuration, the feature layout
// it reads and the examples that flow through the pipeline.
//
// Rules for this layer:
//   - NO burn types
//   - NO file I/O
//   - Only data and the capabilities other layers implement

/// train / eval / inference
pub mod stage;

/// The immutable settings bundle of one run
pub mod config;

/// Parsed (name, size) feature channel lists
pub mod features;

/// One decoded video
pub mod example;

/// Reader capability and optional-input bookkeeping
pub mod traits;
