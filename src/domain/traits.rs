// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The reader capability the input pipeline is written against,
// plus the small vocabulary used to check, before any batch exists,
// that a reader supplies every optional tensor a model needs.
//
// Model and loss capabilities are defined in the ml layer because
// their signatures are expressed in burn tensors.

use std::path::Path;

use crate::domain::config::FeatureType;
use crate::domain::example::Example;
use crate::error::InputError;

/// Lazily decoded examples from one shard, in file order.
pub type ExampleStream<'a> = Box<dyn Iterator<Item = Result<Example, InputError>> + 'a>;

// ─── Reader ──────────────────────────────────────────────────────────────────
/// One record-decoding strategy for a declared input feature layout.
///
/// Implementations:
///   - AggregatedFeatureReader  → "video"
///   - FrameFeatureReader       → "frame"
///   - VladFeatureReader        → "vlad"
///   - ScoreFeatureReader       → "score"
///   - FixedWidthFeatureReader  → "fixed-width"
pub trait Reader: Send + Sync {
    fn feature_type(&self) -> FeatureType;

    /// Optional tensors every example from this reader carries.
    fn provides(&self) -> OptionalInputs;

    /// Open one shard and stream its examples. Opening failures are
    /// reported here; per-record failures come out of the stream.
    fn prepare_reader<'a>(&'a self, source: &Path) -> Result<ExampleStream<'a>, InputError>;
}

// ─── OptionalInputs ──────────────────────────────────────────────────────────
/// Which optional batch tensors are present (reader side) or needed
/// (model side). Video ids, raw features and dense labels are always
/// handled by the stage, not by this set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptionalInputs {
    pub sparse_labels: bool,
    pub num_frames:    bool,
    pub label_weights: bool,
    pub input_weights: bool,
}

impl OptionalInputs {
    pub const NONE: OptionalInputs = OptionalInputs {
        sparse_labels: false,
        num_frames:    false,
        label_weights: false,
        input_weights: false,
    };

    /// First input named in `self` that `provided` lacks.
    pub fn first_missing(&self, provided: &OptionalInputs) -> Option<&'static str> {
        [
            (self.sparse_labels, provided.sparse_labels, "sparse_labels"),
            (self.num_frames,    provided.num_frames,    "num_frames"),
            (self.label_weights, provided.label_weights, "label_weights"),
            (self.input_weights, provided.input_weights, "input_weights"),
        ]
        .into_iter()
        .find(|&(needed, present, _)| needed && !present)
        .map(|(_, _, name)| name)
    }
}
