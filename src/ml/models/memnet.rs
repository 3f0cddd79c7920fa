// ============================================================
// Layer 5 — LstmMemNet
// ============================================================
// A single-hop memory network over the frames of a video:
//
//   memory  m_t = x_t · w_t                  (w = input weights, 0 on padding)
//   query   q   = Σ_t m_t / num_frames
//   score   s_t = vᵀ tanh(U·m_t + W·q)        (padding masked to −∞)
//   context c   = Σ_t softmax(s)_t · m_t
//   logits      = O·c
//
// Predictions are a softmax over classes. Training uses the first
// sparse label as the target of a softmax cross entropy, so the model
// returns its own loss whenever sparse labels are present. The
// context vector is exported as `feats`.

use burn::{
    nn::{loss::CrossEntropyLossConfig, Linear, LinearConfig},
    prelude::*,
    tensor::activation::softmax,
};

use super::{check_vocab, required, ModelInputs, ModelOutputs, VideoModel};
use crate::error::ShapeError;

const NAME: &str = "LstmMemNet";

#[derive(Config, Debug)]
pub struct LstmMemNetConfig {
    pub input_width: usize,
    pub num_classes: usize,
    #[config(default = 100)]
    pub attention_size: usize,
}

impl LstmMemNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> LstmMemNet<B> {
        LstmMemNet {
            memory_proj:    LinearConfig::new(self.input_width, self.attention_size).init(device),
            query_proj:     LinearConfig::new(self.input_width, self.attention_size).init(device),
            score:          LinearConfig::new(self.attention_size, 1).with_bias(false).init(device),
            output:         LinearConfig::new(self.input_width, self.num_classes).init(device),
            attention_size: self.attention_size,
        }
    }
}

#[derive(Module, Debug)]
pub struct LstmMemNet<B: Backend> {
    pub memory_proj:    Linear<B>,
    pub query_proj:     Linear<B>,
    pub score:          Linear<B>,
    pub output:         Linear<B>,
    pub attention_size: usize,
}

impl<B: Backend> VideoModel<B> for LstmMemNet<B> {
    fn create_model(&self, inputs: ModelInputs<B>) -> Result<ModelOutputs<B>, ShapeError> {
        let weights = required(inputs.input_weights, NAME, "input_weights")?;
        let frames  = required(inputs.num_frames, NAME, "num_frames")?;
        let [batch, steps, width] = inputs.model_input.dims();

        let memory = inputs.model_input * weights.clone().reshape([batch, steps, 1]);
        let query = memory.clone().sum_dim(1).reshape([batch, width])
            / frames.float().clamp_min(1.0).reshape([batch, 1]);

        let hidden = (self.memory_proj.forward(memory.clone())
            + self.query_proj.forward(query).reshape([batch, 1, self.attention_size]))
        .tanh();
        let scores = self
            .score
            .forward(hidden)
            .reshape([batch, steps])
            .mask_fill(weights.lower_elem(0.5), -1.0e9);
        let attention = softmax(scores, 1);

        let context = (memory * attention.reshape([batch, steps, 1]))
            .sum_dim(1)
            .reshape([batch, width]);
        let logits = self.output.forward(context.clone());
        check_vocab(&logits, inputs.vocab_size, NAME)?;

        let loss = inputs.sparse_labels.map(|labels| {
            let targets = labels.slice([0..batch, 0..1]).reshape([batch]);
            CrossEntropyLossConfig::new()
                .init(&logits.device())
                .forward(logits.clone(), targets)
        });

        Ok(ModelOutputs {
            predictions: softmax(logits, 1),
            loss,
            feats: Some(context),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::backend::InferBackend;

    type B = InferBackend;

    fn inputs(weights: Vec<f32>, sparse: bool) -> ModelInputs<B> {
        let device = Default::default();
        let steps = weights.len();
        ModelInputs {
            model_input:     Tensor::<B, 3>::ones([1, steps, 4], &device),
            num_frames:      Some(Tensor::<B, 1, Int>::from_ints([2], &device)),
            vocab_size:      6,
            dense_labels:    None,
            sparse_labels:   sparse.then(|| Tensor::<B, 1, Int>::from_ints([3], &device).reshape([1, 1])),
            label_weights:   None,
            is_training:     true,
            label_smoothing: 0.0,
            input_weights:   Some(Tensor::<B, 1>::from_floats(weights.as_slice(), &device).reshape([1, steps])),
            feature_sizes:   vec![4],
        }
    }

    #[test]
    fn test_predictions_sum_to_one_and_feats_exported() {
        let model = LstmMemNetConfig::new(4, 6).with_attention_size(8).init::<B>(&Default::default());
        let out = model.create_model(inputs(vec![1.0, 1.0, 0.0], true)).unwrap();

        let total: f32 = out.predictions.sum().into_scalar().elem();
        assert!((total - 1.0).abs() < 1e-4);
        assert_eq!(out.feats.unwrap().dims(), [1, 4]);
        assert!(out.loss.is_some());
    }

    #[test]
    fn test_no_sparse_labels_means_no_model_loss() {
        let model = LstmMemNetConfig::new(4, 6).init::<B>(&Default::default());
        let out = model.create_model(inputs(vec![1.0, 0.0], false)).unwrap();
        assert!(out.loss.is_none());
    }

    #[test]
    fn test_requires_input_weights() {
        let model = LstmMemNetConfig::new(4, 6).init::<B>(&Default::default());
        let mut missing = inputs(vec![1.0], true);
        missing.input_weights = None;
        assert!(matches!(
            model.create_model(missing),
            Err(ShapeError::MissingInput { input: "input_weights", .. })
        ));
    }
}
