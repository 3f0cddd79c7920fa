// ============================================================
// Layer 4 — Video Batcher
// ============================================================
// Converts a Vec<Example> from the staging queue into the aligned
// tensors of one VideoBatch.
//
// How batching works here:
//   Input:  N examples, each `steps` rows of `width` features
//   Output: raw_features [N, steps, width] plus the label / weight
//           tensors the reader supplied, all with leading dimension N
//
//   Every example is flattened into one long Vec, then reshaped:
//   [e1_s1_f1, …, e1_sS_fW, e2_s1_f1, …, eN_sS_fW] → [N, S, W]
//
// Readers guarantee a uniform shape per variant, but the batcher
// still checks it: a ragged batch would otherwise only surface as a
// reshape panic deep inside the backend.

use burn::prelude::*;

use crate::domain::example::Example;
use crate::domain::traits::OptionalInputs;
use crate::error::ShapeError;

// ─── VideoBatch ───────────────────────────────────────────────────────────────
/// One batch ready for graph assembly. B is the Burn backend, so the
/// same batcher serves training (autodiff) and evaluation.
#[derive(Debug, Clone)]
pub struct VideoBatch<B: Backend> {
    pub video_ids:     Vec<String>,
    /// [batch, steps, width]
    pub raw_features:  Tensor<B, 3>,
    /// [batch, label_vocab] multi-hot, absent at inference
    pub dense_labels:  Option<Tensor<B, 2>>,
    /// [batch, num_max_labels]
    pub sparse_labels: Option<Tensor<B, 2, Int>>,
    /// [batch]
    pub num_frames:    Option<Tensor<B, 1, Int>>,
    /// [batch, label_vocab]
    pub label_weights: Option<Tensor<B, 2>>,
    /// [batch, steps]
    pub input_weights: Option<Tensor<B, 2>>,
}

impl<B: Backend> VideoBatch<B> {
    pub fn len(&self) -> usize {
        self.video_ids.len()
    }
}

// ─── VideoBatcher ─────────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct VideoBatcher<B: Backend> {
    device: B::Device,
    /// Optional tensors to keep; anything else the reader decoded is dropped
    keep:   OptionalInputs,
}

impl<B: Backend> VideoBatcher<B> {
    pub fn new(device: B::Device, keep: OptionalInputs) -> Self {
        Self { device, keep }
    }

    pub fn batch(&self, items: Vec<Example>) -> Result<VideoBatch<B>, ShapeError> {
        let first = items.first().ok_or(ShapeError::EmptyBatch)?;
        let n     = items.len();
        let steps = first.steps;
        let width = first.feature_width();

        for item in &items {
            check_consistent(first, item)?;
        }

        // ── Features ──────────────────────────────────────────────────────────
        let features: Vec<f32> = items
            .iter()
            .flat_map(|e| e.features.iter().copied())
            .collect();
        let raw_features = Tensor::<B, 1>::from_floats(features.as_slice(), &self.device)
            .reshape([n, steps, width]);

        // ── Labels and weights ────────────────────────────────────────────────
        let dense_labels = stack_floats(&items, &self.device, |e| e.dense_labels.as_deref());

        let sparse_labels = if self.keep.sparse_labels {
            first.sparse_labels.as_ref().map(|s| {
                let flat: Vec<i64> = items
                    .iter()
                    .flat_map(|e| e.sparse_labels.iter().flatten().copied())
                    .collect();
                Tensor::<B, 1, Int>::from_ints(flat.as_slice(), &self.device).reshape([n, s.len()])
            })
        } else {
            None
        };

        let num_frames = if self.keep.num_frames && first.num_frames.is_some() {
            let counts: Vec<i64> = items
                .iter()
                .map(|e| e.num_frames.unwrap_or(0) as i64)
                .collect();
            Some(Tensor::<B, 1, Int>::from_ints(counts.as_slice(), &self.device))
        } else {
            None
        };

        let label_weights = if self.keep.label_weights {
            stack_floats(&items, &self.device, |e| e.label_weights.as_deref())
        } else {
            None
        };

        let input_weights = if self.keep.input_weights {
            stack_floats(&items, &self.device, |e| e.input_weights.as_deref())
        } else {
            None
        };

        Ok(VideoBatch {
            video_ids: items.into_iter().map(|e| e.video_id).collect(),
            raw_features,
            dense_labels,
            sparse_labels,
            num_frames,
            label_weights,
            input_weights,
        })
    }
}

/// Stack one per-example float vector into [n, len]. None when the
/// first example lacks it (the consistency check covers the rest).
fn stack_floats<B: Backend>(
    items:  &[Example],
    device: &B::Device,
    field:  impl Fn(&Example) -> Option<&[f32]>,
) -> Option<Tensor<B, 2>> {
    let len = field(items.first()?)?.len();
    let flat: Vec<f32> = items
        .iter()
        .flat_map(|e| field(e).unwrap_or_default().iter().copied())
        .collect();
    Some(Tensor::<B, 1>::from_floats(flat.as_slice(), device).reshape([items.len(), len]))
}

fn check_consistent(first: &Example, item: &Example) -> Result<(), ShapeError> {
    let fail = |reason: String| ShapeError::InconsistentBatch {
        video_id: item.video_id.clone(),
        reason,
    };

    if item.steps != first.steps || item.features.len() != first.features.len() {
        return Err(fail(format!(
            "{} steps × {} values, batch has {} steps × {} values",
            item.steps,
            item.features.len(),
            first.steps,
            first.features.len(),
        )));
    }
    if item.steps == 0 || item.features.len() % item.steps != 0 {
        return Err(fail(format!(
            "{} feature values do not split into {} steps",
            item.features.len(),
            item.steps
        )));
    }

    let lengths = |e: &Example| {
        [
            e.dense_labels.as_ref().map(Vec::len),
            e.sparse_labels.as_ref().map(Vec::len),
            e.label_weights.as_ref().map(Vec::len),
            e.input_weights.as_ref().map(Vec::len),
            e.num_frames.map(|_| 0),
        ]
    };
    let names = ["dense_labels", "sparse_labels", "label_weights", "input_weights", "num_frames"];
    for ((name, expected), actual) in names.iter().zip(lengths(first)).zip(lengths(item)) {
        if expected != actual {
            return Err(fail(format!("{name} is {actual:?}, batch has {expected:?}")));
        }
    }
    Ok(())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::backend::InferBackend;

    type B = InferBackend;

    fn example(id: &str, steps: usize, width: usize) -> Example {
        Example {
            video_id:      id.to_string(),
            features:      (0..steps * width).map(|v| v as f32).collect(),
            steps,
            dense_labels:  Some(vec![0.0, 1.0, 0.0]),
            sparse_labels: Some(vec![1, 1]),
            num_frames:    Some(steps),
            label_weights: None,
            input_weights: Some(vec![1.0; steps]),
        }
    }

    fn keep_all() -> OptionalInputs {
        OptionalInputs {
            sparse_labels: true,
            num_frames:    true,
            label_weights: true,
            input_weights: true,
        }
    }

    #[test]
    fn test_batch_shapes_share_leading_dimension() {
        let batcher = VideoBatcher::<B>::new(Default::default(), keep_all());
        let items = (0..5).map(|i| example(&format!("v{i}"), 4, 3)).collect();
        let batch = batcher.batch(items).unwrap();

        assert_eq!(batch.len(), 5);
        assert_eq!(batch.raw_features.dims(), [5, 4, 3]);
        assert_eq!(batch.dense_labels.unwrap().dims(), [5, 3]);
        assert_eq!(batch.sparse_labels.unwrap().dims(), [5, 2]);
        assert_eq!(batch.num_frames.unwrap().dims(), [5]);
        assert_eq!(batch.input_weights.unwrap().dims(), [5, 4]);
        assert!(batch.label_weights.is_none());
    }

    #[test]
    fn test_feature_values_keep_row_major_layout() {
        let batcher = VideoBatcher::<B>::new(Default::default(), OptionalInputs::NONE);
        let batch = batcher.batch(vec![example("a", 2, 2)]).unwrap();
        let values = batch.raw_features.into_data().to_vec::<f32>().unwrap();
        assert_eq!(values, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_optional_inputs_are_dropped_when_not_kept() {
        let batcher = VideoBatcher::<B>::new(Default::default(), OptionalInputs::NONE);
        let batch = batcher.batch(vec![example("a", 1, 4)]).unwrap();
        assert!(batch.dense_labels.is_some());
        assert!(batch.sparse_labels.is_none());
        assert!(batch.num_frames.is_none());
        assert!(batch.input_weights.is_none());
    }

    #[test]
    fn test_inconsistent_batch_is_rejected() {
        let batcher = VideoBatcher::<B>::new(Default::default(), keep_all());
        let err = batcher
            .batch(vec![example("a", 2, 3), example("b", 2, 4)])
            .unwrap_err();
        assert!(matches!(err, ShapeError::InconsistentBatch { video_id, .. } if video_id == "b"));

        let mut unlabeled = example("c", 2, 3);
        unlabeled.dense_labels = None;
        assert!(batcher.batch(vec![example("a", 2, 3), unlabeled]).is_err());
    }

    #[test]
    fn test_empty_batch_is_rejected() {
        let batcher = VideoBatcher::<B>::new(Default::default(), keep_all());
        assert_eq!(batcher.batch(Vec::new()).unwrap_err(), ShapeError::EmptyBatch);
    }
}
