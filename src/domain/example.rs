// ============================================================
// Layer 3 — Example
// ============================================================
// One decoded video, as produced by a Reader and consumed by the
// batcher. Features are stored row-major as `steps` rows of equal
// width:
//
//   video-level readers → steps = 1
//   frame-level readers → steps = max_frames (zero-padded)
//
// Optional fields are present or absent per reader variant, never
// per record, so a batch is always uniform.

#[derive(Debug, Clone, PartialEq)]
pub struct Example {
    pub video_id:      String,
    /// steps × width values, row-major
    pub features:      Vec<f32>,
    pub steps:         usize,
    /// Multi-hot over the decoded label vocabulary
    pub dense_labels:  Option<Vec<f32>>,
    /// Up to num_max_labels label indices, padded
    pub sparse_labels: Option<Vec<i64>>,
    /// Number of real (unpadded) frames
    pub num_frames:    Option<usize>,
    pub label_weights: Option<Vec<f32>>,
    /// Per-step mask, 1.0 for real frames
    pub input_weights: Option<Vec<f32>>,
}

impl Example {
    pub fn feature_width(&self) -> usize {
        if self.steps == 0 { 0 } else { self.features.len() / self.steps }
    }
}
