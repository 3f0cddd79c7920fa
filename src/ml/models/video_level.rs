// ============================================================
// Layer 5 — Video-Level Models
// ============================================================
// Both models see one pooled feature row per video. With
// video-level readers there is a single step, so pooling is the
// identity; with frame readers it averages the padded frames.
//
//   LogisticModel  p = σ(W·x + b)
//   MoeModel       p_c = Σ_m gate_{c,m}(x) · σ(expert_{c,m}(x))
//                  gates are a softmax over m experts plus a dummy
//                  "none of the above" expert whose output is 0

use burn::{
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::activation::{sigmoid, softmax},
};

use super::{check_vocab, pool_steps, ModelInputs, ModelOutputs, VideoModel};
use crate::error::ShapeError;
use crate::ml::losses::smoothed_cross_entropy;

/// Own loss only when label smoothing is on; otherwise the driver's
/// configured label loss applies.
fn smoothing_loss<B: Backend>(
    predictions: &Tensor<B, 2>,
    labels:      Option<Tensor<B, 2>>,
    smoothing:   f64,
) -> Option<Tensor<B, 1>> {
    labels
        .filter(|_| smoothing > 0.0)
        .map(|labels| smoothed_cross_entropy(predictions.clone(), labels, smoothing))
}

// ─── LogisticModel ────────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct LogisticModelConfig {
    pub input_width: usize,
    pub num_classes: usize,
}

impl LogisticModelConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> LogisticModel<B> {
        LogisticModel {
            linear: LinearConfig::new(self.input_width, self.num_classes).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct LogisticModel<B: Backend> {
    pub linear: Linear<B>,
}

impl<B: Backend> VideoModel<B> for LogisticModel<B> {
    fn create_model(&self, inputs: ModelInputs<B>) -> Result<ModelOutputs<B>, ShapeError> {
        let pooled = pool_steps(inputs.model_input);
        let predictions = sigmoid(self.linear.forward(pooled));
        check_vocab(&predictions, inputs.vocab_size, "LogisticModel")?;
        let loss = smoothing_loss(&predictions, inputs.dense_labels, inputs.label_smoothing);
        Ok(ModelOutputs { predictions, loss, feats: None })
    }
}

// ─── MoeModel ─────────────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct MoeModelConfig {
    pub input_width: usize,
    pub num_classes: usize,
    #[config(default = 2)]
    pub num_mixtures: usize,
}

impl MoeModelConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> MoeModel<B> {
        let gates = self.num_classes * (self.num_mixtures + 1);
        let experts = self.num_classes * self.num_mixtures;
        MoeModel {
            gating:       LinearConfig::new(self.input_width, gates).init(device),
            experts:      LinearConfig::new(self.input_width, experts).init(device),
            num_classes:  self.num_classes,
            num_mixtures: self.num_mixtures,
        }
    }
}

#[derive(Module, Debug)]
pub struct MoeModel<B: Backend> {
    pub gating:       Linear<B>,
    pub experts:      Linear<B>,
    pub num_classes:  usize,
    pub num_mixtures: usize,
}

impl<B: Backend> VideoModel<B> for MoeModel<B> {
    fn create_model(&self, inputs: ModelInputs<B>) -> Result<ModelOutputs<B>, ShapeError> {
        let pooled = pool_steps(inputs.model_input);
        let [batch, _] = pooled.dims();
        let (classes, mixtures) = (self.num_classes, self.num_mixtures);

        let gates = softmax(
            self.gating.forward(pooled.clone()).reshape([batch, classes, mixtures + 1]),
            2,
        );
        let experts = sigmoid(self.experts.forward(pooled).reshape([batch, classes, mixtures]));

        // The dummy expert (last gate column) contributes nothing
        let predictions = (gates.slice([0..batch, 0..classes, 0..mixtures]) * experts)
            .sum_dim(2)
            .reshape([batch, classes]);
        check_vocab(&predictions, inputs.vocab_size, "MoeModel")?;

        let loss = smoothing_loss(&predictions, inputs.dense_labels, inputs.label_smoothing);
        Ok(ModelOutputs { predictions, loss, feats: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::backend::InferBackend;

    type B = InferBackend;

    fn inputs(batch: usize, width: usize, smoothing: f64) -> ModelInputs<B> {
        let device = Default::default();
        ModelInputs {
            model_input:     Tensor::<B, 3>::ones([batch, 1, width], &device),
            num_frames:      None,
            vocab_size:      3,
            dense_labels:    Some(Tensor::<B, 2>::zeros([batch, 3], &device)),
            sparse_labels:   None,
            label_weights:   None,
            is_training:     true,
            label_smoothing: smoothing,
            input_weights:   None,
            feature_sizes:   vec![width],
        }
    }

    #[test]
    fn test_moe_predictions_are_probabilities() {
        let model = MoeModelConfig::new(4, 3).with_num_mixtures(3).init::<B>(&Default::default());
        let out = model.create_model(inputs(2, 4, 0.0)).unwrap();
        let values = out.predictions.into_data().to_vec::<f32>().unwrap();
        assert_eq!(values.len(), 6);
        assert!(values.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_loss_only_with_label_smoothing() {
        let model = LogisticModelConfig::new(4, 3).init::<B>(&Default::default());
        assert!(model.create_model(inputs(2, 4, 0.0)).unwrap().loss.is_none());
        assert!(model.create_model(inputs(2, 4, 0.1)).unwrap().loss.is_some());
    }

    #[test]
    fn test_output_width_must_match_vocab() {
        let model = LogisticModelConfig::new(4, 5).init::<B>(&Default::default());
        assert!(matches!(
            model.create_model(inputs(2, 4, 0.0)),
            Err(ShapeError::VocabMismatch { vocab_size: 3, outputs: 5, .. })
        ));
    }
}
