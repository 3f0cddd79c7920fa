// ============================================================
// Layer 5 — Frame-Level Logistic Model
// ============================================================
// Sums the (zero-padded) frames and divides by the real frame count,
// so padding never dilutes the average, then applies a logistic
// layer. Needs `num_frames` from the reader.

use burn::{
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::activation::sigmoid,
};

use super::{check_vocab, required, ModelInputs, ModelOutputs, VideoModel};
use crate::error::ShapeError;

#[derive(Config, Debug)]
pub struct FrameLevelLogisticModelConfig {
    pub input_width: usize,
    pub num_classes: usize,
}

impl FrameLevelLogisticModelConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> FrameLevelLogisticModel<B> {
        FrameLevelLogisticModel {
            linear: LinearConfig::new(self.input_width, self.num_classes).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct FrameLevelLogisticModel<B: Backend> {
    pub linear: Linear<B>,
}

impl<B: Backend> VideoModel<B> for FrameLevelLogisticModel<B> {
    fn create_model(&self, inputs: ModelInputs<B>) -> Result<ModelOutputs<B>, ShapeError> {
        let frames = required(inputs.num_frames, "FrameLevelLogisticModel", "num_frames")?;
        let [batch, _, width] = inputs.model_input.dims();

        let denominator = frames.float().clamp_min(1.0).reshape([batch, 1]);
        let average = inputs.model_input.sum_dim(1).reshape([batch, width]) / denominator;
        let predictions = sigmoid(self.linear.forward(average));
        check_vocab(&predictions, inputs.vocab_size, "FrameLevelLogisticModel")?;

        Ok(ModelOutputs { predictions, loss: None, feats: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::backend::InferBackend;

    type B = InferBackend;

    #[test]
    fn test_missing_frame_counts_is_shape_error() {
        let device = Default::default();
        let model = FrameLevelLogisticModelConfig::new(2, 3).init::<B>(&device);
        let inputs = ModelInputs {
            model_input:     Tensor::<B, 3>::ones([1, 4, 2], &device),
            num_frames:      None,
            vocab_size:      3,
            dense_labels:    None,
            sparse_labels:   None,
            label_weights:   None,
            is_training:     false,
            label_smoothing: 0.0,
            input_weights:   None,
            feature_sizes:   vec![2],
        };
        assert_eq!(
            model.create_model(inputs).unwrap_err(),
            ShapeError::MissingInput { model: "FrameLevelLogisticModel".into(), input: "num_frames" }
        );
    }
}
