// ============================================================
// Layer 5 — Graph Assembly
// ============================================================
// Binds one batch to one model:
//
//   raw_features ──(L2-normalise if the card asks)──▶ model_input
//   dense_labels ──(class-count slice table)────────▶ labels
//   ModelInputs ──create_model──▶ predictions, loss?, feats?
//   loss? missing and labels present ──▶ configured label loss
//
// Everything that can be checked without data is checked when the
// assembler is built, so a model that needs input weights paired
// with a reader that has none fails at startup, not on batch one.

use std::ops::Range;

use burn::prelude::*;

use crate::data::batcher::VideoBatch;
use crate::domain::config::ExperimentConfig;
use crate::domain::stage::Stage;
use crate::domain::traits::OptionalInputs;
use crate::error::ShapeError;
use crate::ml::losses::{LabelLoss, LossFn};
use crate::ml::models::{ModelCard, ModelInputs, ModelSpec, VideoModel};

const L2_EPSILON: f64 = 1e-12;

// ─── Label Slicing ────────────────────────────────────────────────────────────
/// Column range kept from the decoded label vector for a class count.
///
///   1000 → [0, 1000)
///   1001 → [1000, 2001)
///   3000 → [1000, 4000)
///   else → everything
///
/// Each entry is the label subset one model family is trained on.
pub fn label_range(num_classes: usize) -> Option<Range<usize>> {
    match num_classes {
        1000 => Some(0..1000),
        1001 => Some(1000..2001),
        3000 => Some(1000..4000),
        _ => None,
    }
}

/// Width of the labels after slicing a `label_width` wide vector.
pub fn sliced_label_width(num_classes: usize, label_width: usize) -> Result<usize, ShapeError> {
    match label_range(num_classes) {
        Some(range) if range.end > label_width => {
            Err(ShapeError::LabelWidth { num_classes, label_width })
        }
        Some(range) => Ok(range.len()),
        None => Ok(label_width),
    }
}

pub fn slice_labels<B: Backend>(labels: Tensor<B, 2>, num_classes: usize) -> Result<Tensor<B, 2>, ShapeError> {
    let [batch, width] = labels.dims();
    match label_range(num_classes) {
        None => Ok(labels),
        Some(range) if range.end > width => {
            Err(ShapeError::LabelWidth { num_classes, label_width: width })
        }
        Some(range) => Ok(labels.slice([0..batch, range])),
    }
}

/// x / sqrt(max(Σx², ε)) along the last (feature) axis.
pub fn l2_normalize<B: Backend>(x: Tensor<B, 3>) -> Tensor<B, 3> {
    let norm = x
        .clone()
        .powf_scalar(2.0)
        .sum_dim(2)
        .clamp_min(L2_EPSILON)
        .sqrt();
    x / norm
}

// ─── GraphAssembler ───────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct GraphAssembler {
    model_name:      String,
    card:            ModelCard,
    loss:            LossFn,
    stage:           Stage,
    label_smoothing: f64,
    feature_sizes:   Vec<usize>,
}

/// What one forward pass produced, before it is shaped into a bundle.
#[derive(Debug, Clone)]
pub struct ForwardPass<B: Backend> {
    pub video_ids:    Vec<String>,
    pub predictions:  Tensor<B, 2>,
    /// Sliced to the model's class count
    pub dense_labels: Option<Tensor<B, 2>>,
    pub loss:         Option<Tensor<B, 1>>,
    pub feats:        Option<Tensor<B, 2>>,
}

impl GraphAssembler {
    /// `provided` is what the batches will actually carry: the reader's
    /// optional inputs, or none at all when inputs come from HDFS.
    pub fn new(
        spec:     &ModelSpec,
        loss:     LossFn,
        config:   &ExperimentConfig,
        provided: OptionalInputs,
    ) -> Result<Self, ShapeError> {
        let mut needed = spec.card.requires;
        if !config.stage.requires_labels() {
            needed.sparse_labels = false;
            needed.label_weights = false;
        }
        if let Some(input) = needed.first_missing(&provided) {
            return Err(ShapeError::MissingInput { model: spec.name.to_string(), input });
        }

        if config.stage.requires_labels() {
            let num_classes = spec.card.num_classes;
            let width = sliced_label_width(num_classes, config.label_vocab_size)?;
            if width != num_classes {
                return Err(ShapeError::LabelWidth {
                    num_classes,
                    label_width: config.label_vocab_size,
                });
            }
        }

        if spec.card.normalize_input {
            tracing::info!("L2 normalising input features");
        }
        if let Some(range) = label_range(spec.card.num_classes) {
            tracing::info!(
                "num classes: {} (label columns {}..{})",
                spec.card.num_classes,
                range.start,
                range.end
            );
        }

        Ok(Self {
            model_name:      spec.name.to_string(),
            card:            spec.card.clone(),
            loss,
            stage:           config.stage,
            label_smoothing: config.label_smoothing,
            feature_sizes:   config.feature_descriptor().map(|d| d.sizes().to_vec()).unwrap_or_default(),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn forward<B: Backend, M: VideoModel<B>>(
        &self,
        model: &M,
        batch: VideoBatch<B>,
    ) -> Result<ForwardPass<B>, ShapeError> {
        let model_input = if self.card.normalize_input {
            l2_normalize(batch.raw_features)
        } else {
            batch.raw_features
        };

        let dense_labels = batch
            .dense_labels
            .map(|labels| slice_labels(labels, self.card.num_classes))
            .transpose()?;

        let outputs = model.create_model(ModelInputs {
            model_input,
            num_frames:      batch.num_frames,
            vocab_size:      self.card.num_classes,
            dense_labels:    dense_labels.clone(),
            sparse_labels:   batch.sparse_labels,
            label_weights:   batch.label_weights,
            is_training:     self.stage.is_training(),
            label_smoothing: self.label_smoothing,
            input_weights:   batch.input_weights,
            feature_sizes:   self.feature_sizes.clone(),
        })?;

        let loss = match (outputs.loss, &dense_labels) {
            (Some(loss), _) => Some(loss),
            (None, Some(labels)) => {
                Some(self.loss.calculate_loss(outputs.predictions.clone(), labels.clone()))
            }
            (None, None) => None,
        };

        Ok(ForwardPass {
            video_ids:   batch.video_ids,
            predictions: outputs.predictions,
            dense_labels,
            loss,
            feats:       outputs.feats,
        })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::config_registry::resolve_config;
    use crate::data::batcher::VideoBatcher;
    use crate::domain::example::Example;
    use crate::ml::backend::InferBackend;
    use crate::ml::models::{resolve_model, ModelVisitor};

    type B = InferBackend;

    fn ramp(batch: usize, width: usize) -> Tensor<B, 2> {
        let values: Vec<f32> = (0..batch * width).map(|v| (v % width) as f32).collect();
        Tensor::<B, 1>::from_floats(values.as_slice(), &Default::default()).reshape([batch, width])
    }

    #[test]
    fn test_label_slicing_table() {
        for (classes, start, end) in [(1000, 0, 1000), (1001, 1000, 2001), (3000, 1000, 4000)] {
            let sliced = slice_labels(ramp(2, 4716), classes).unwrap();
            assert_eq!(sliced.dims(), [2, end - start]);
            let first_row = sliced.slice([0..1, 0..end - start]).into_data().to_vec::<f32>().unwrap();
            assert_eq!(first_row.first().copied(), Some(start as f32));
            assert_eq!(first_row.last().copied(), Some((end - 1) as f32));
        }
    }

    #[test]
    fn test_other_class_counts_pass_through() {
        for classes in [2, 999, 4716, 5000] {
            assert_eq!(slice_labels(ramp(3, 4716), classes).unwrap().dims(), [3, 4716]);
        }
    }

    #[test]
    fn test_1001_classes_from_2001_wide_labels() {
        let sliced = slice_labels(ramp(1, 2001), 1001).unwrap();
        let values = sliced.into_data().to_vec::<f32>().unwrap();
        assert_eq!(values.len(), 1001);
        assert_eq!(values, (1000..2001).map(|v| v as f32).collect::<Vec<_>>());
    }

    #[test]
    fn test_too_narrow_labels_are_shape_error() {
        assert_eq!(
            slice_labels(ramp(1, 1500), 3000).unwrap_err(),
            ShapeError::LabelWidth { num_classes: 3000, label_width: 1500 }
        );
        assert_eq!(sliced_label_width(1001, 4716), Ok(1001));
        assert_eq!(sliced_label_width(7, 4716), Ok(4716));
    }

    #[test]
    fn test_l2_normalize_unit_rows_and_zero_safe() {
        let x = Tensor::<B, 1>::from_floats([3.0, 4.0, 0.0, 0.0], &Default::default()).reshape([1, 2, 2]);
        let values = l2_normalize(x).into_data().to_vec::<f32>().unwrap();
        assert!((values[0] - 0.6).abs() < 1e-6);
        assert!((values[1] - 0.8).abs() < 1e-6);
        assert_eq!(&values[2..], &[0.0, 0.0]);
    }

    #[test]
    fn test_missing_reader_input_fails_at_construction() {
        let config = resolve_config("FrameConfig", Stage::Train).unwrap();
        let spec = resolve_model("LstmMemNet").unwrap();
        let provided = OptionalInputs { sparse_labels: true, num_frames: true, ..OptionalInputs::NONE };

        let err = GraphAssembler::new(&spec, LossFn::CrossEntropy, &config, provided).unwrap_err();
        assert_eq!(
            err,
            ShapeError::MissingInput { model: "LstmMemNet".into(), input: "input_weights" }
        );
    }

    #[test]
    fn test_inference_does_not_need_sparse_labels() {
        let config = resolve_config("MemNetConfig", Stage::Inference).unwrap();
        let spec = resolve_model("LstmMemNet").unwrap();
        let provided = OptionalInputs { num_frames: true, input_weights: true, ..OptionalInputs::NONE };
        assert!(GraphAssembler::new(&spec, LossFn::CrossEntropy, &config, provided).is_ok());
    }

    #[test]
    fn test_label_vocab_must_cover_sliced_range() {
        let mut config = resolve_config("BaseConfig", Stage::Eval).unwrap();
        config.label_vocab_size = 1500;
        let mut spec = resolve_model("LogisticModel").unwrap();
        spec.card.num_classes = 3000;
        assert!(matches!(
            GraphAssembler::new(&spec, LossFn::CrossEntropy, &config, OptionalInputs::NONE),
            Err(ShapeError::LabelWidth { .. })
        ));

        // A pass-through class count must equal the decoded width
        spec.card.num_classes = 1200;
        assert!(GraphAssembler::new(&spec, LossFn::CrossEntropy, &config, OptionalInputs::NONE).is_err());
        spec.card.num_classes = 1500;
        assert!(GraphAssembler::new(&spec, LossFn::CrossEntropy, &config, OptionalInputs::NONE).is_ok());
    }

    struct Run<'a> {
        assembler: &'a GraphAssembler,
        batch:     VideoBatch<B>,
    }

    impl ModelVisitor<B> for Run<'_> {
        type Output = ForwardPass<B>;

        fn visit<M: VideoModel<B>>(self, model: M) -> ForwardPass<B> {
            self.assembler.forward(&model, self.batch).unwrap()
        }
    }

    #[test]
    fn test_forward_falls_back_to_label_loss() {
        let mut config = resolve_config("BaseConfig", Stage::Eval).unwrap();
        config.label_vocab_size = 2001;
        let mut spec = resolve_model("LogisticModel").unwrap();
        spec.card.num_classes = 1001;
        let assembler = GraphAssembler::new(&spec, LossFn::CrossEntropy, &config, OptionalInputs::NONE).unwrap();

        let examples = (0..3)
            .map(|i| Example {
                video_id:      format!("v{i}"),
                features:      vec![1.0; 6],
                steps:         1,
                dense_labels:  Some(vec![0.0; 2001]),
                sparse_labels: None,
                num_frames:    None,
                label_weights: None,
                input_weights: None,
            })
            .collect();
        let batch = VideoBatcher::<B>::new(Default::default(), OptionalInputs::NONE)
            .batch(examples)
            .unwrap();

        let pass = spec.build::<B, _>(6, &Default::default(), Run { assembler: &assembler, batch });
        assert_eq!(pass.video_ids, ["v0", "v1", "v2"]);
        assert_eq!(pass.predictions.dims(), [3, 1001]);
        assert_eq!(pass.dense_labels.unwrap().dims(), [3, 1001]);
        assert!(pass.loss.is_some());
        assert!(pass.feats.is_none());
    }
}
