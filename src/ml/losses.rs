// ============================================================
// Layer 5 — Label Losses
// ============================================================
// A label loss turns (predictions, dense labels), both
// [batch, num_classes], into a scalar. It is only used when the
// model does not return a loss of its own.
//
//   CrossEntropyLoss  multi-label binary cross entropy on probabilities
//   HingeLoss         max(0, 1 − sign(label)·prediction)
//   SoftmaxLoss       softmax cross entropy against normalised labels
//
// All three sum over classes and average over the batch.

use burn::prelude::*;
use burn::tensor::activation::softmax;

use crate::application::registry::{resolve, Namespace};
use crate::error::ConfigError;

pub trait LabelLoss {
    fn calculate_loss<B: Backend>(&self, predictions: Tensor<B, 2>, labels: Tensor<B, 2>) -> Tensor<B, 1>;
}

// ─── CrossEntropyLoss ────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossEntropyLoss;

impl CrossEntropyLoss {
    const EPSILON: f64 = 1e-5;
}

impl LabelLoss for CrossEntropyLoss {
    fn calculate_loss<B: Backend>(&self, predictions: Tensor<B, 2>, labels: Tensor<B, 2>) -> Tensor<B, 1> {
        // −[y·log(p + ε) + (1 − y)·log(1 − p + ε)]
        let positive = labels.clone() * (predictions.clone() + Self::EPSILON).log();
        let negative = (labels.neg() + 1.0) * (predictions.neg() + 1.0 + Self::EPSILON).log();
        (positive + negative).neg().sum_dim(1).mean()
    }
}

// ─── HingeLoss ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy)]
pub struct HingeLoss {
    pub margin: f64,
}

impl Default for HingeLoss {
    fn default() -> Self {
        Self { margin: 1.0 }
    }
}

impl LabelLoss for HingeLoss {
    fn calculate_loss<B: Backend>(&self, predictions: Tensor<B, 2>, labels: Tensor<B, 2>) -> Tensor<B, 1> {
        // labels {0, 1} → signs {−1, +1}
        let signs = labels.mul_scalar(2.0).sub_scalar(1.0);
        (signs * predictions)
            .neg()
            .add_scalar(self.margin)
            .clamp_min(0.0)
            .sum_dim(1)
            .mean()
    }
}

// ─── SoftmaxLoss ─────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftmaxLoss;

impl SoftmaxLoss {
    const EPSILON: f64 = 1e-7;
}

impl LabelLoss for SoftmaxLoss {
    fn calculate_loss<B: Backend>(&self, predictions: Tensor<B, 2>, labels: Tensor<B, 2>) -> Tensor<B, 1> {
        let row_sums = labels.clone().sum_dim(1).clamp_min(Self::EPSILON);
        let targets = labels / row_sums;
        let log_probs = (softmax(predictions, 1) + Self::EPSILON).log();
        (targets * log_probs).sum_dim(1).neg().mean()
    }
}

/// Cross entropy against labels pulled towards the uniform
/// distribution by `smoothing`.
pub fn smoothed_cross_entropy<B: Backend>(
    predictions: Tensor<B, 2>,
    labels:      Tensor<B, 2>,
    smoothing:   f64,
) -> Tensor<B, 1> {
    let num_classes = labels.dims()[1].max(1) as f64;
    let smoothed = labels
        .mul_scalar(1.0 - smoothing)
        .add_scalar(smoothing / num_classes);
    CrossEntropyLoss.calculate_loss(predictions, smoothed)
}

// ─── Registry ────────────────────────────────────────────────────────────────
/// Tagged union over the registered losses, resolved by name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LossFn {
    CrossEntropy,
    Hinge,
    Softmax,
}

impl LabelLoss for LossFn {
    fn calculate_loss<B: Backend>(&self, predictions: Tensor<B, 2>, labels: Tensor<B, 2>) -> Tensor<B, 1> {
        match self {
            LossFn::CrossEntropy => CrossEntropyLoss.calculate_loss(predictions, labels),
            LossFn::Hinge        => HingeLoss::default().calculate_loss(predictions, labels),
            LossFn::Softmax      => SoftmaxLoss.calculate_loss(predictions, labels),
        }
    }
}

pub type LossFactory = fn() -> LossFn;

fn cross_entropy() -> LossFn { LossFn::CrossEntropy }
fn hinge() -> LossFn { LossFn::Hinge }
fn softmax_loss() -> LossFn { LossFn::Softmax }

pub static LOSSES: Namespace<LossFactory> = Namespace::new(
    "losses",
    &[
        ("CrossEntropyLoss", cross_entropy as LossFactory),
        ("HingeLoss",        hinge as LossFactory),
        ("SoftmaxLoss",      softmax_loss as LossFactory),
    ],
);

pub fn resolve_loss(name: &str) -> Result<LossFn, ConfigError> {
    resolve("label loss", name, &[&LOSSES]).map(|factory| factory())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::backend::InferBackend;

    type B = InferBackend;

    fn tensor(values: &[f32], cols: usize) -> Tensor<B, 2> {
        Tensor::<B, 1>::from_floats(values, &Default::default()).reshape([values.len() / cols, cols])
    }

    fn scalar(t: Tensor<B, 1>) -> f32 {
        t.into_scalar().elem::<f32>()
    }

    #[test]
    fn test_cross_entropy_known_value() {
        let preds = tensor(&[0.9, 0.2], 2);
        let labels = tensor(&[1.0, 0.0], 2);
        let expected = -((0.9f32 + 1e-5).ln() + (1.0f32 - 0.2 + 1e-5).ln());
        let loss = scalar(CrossEntropyLoss.calculate_loss(preds, labels));
        assert!((loss - expected).abs() < 1e-4, "{loss} vs {expected}");
    }

    #[test]
    fn test_hinge_is_zero_beyond_margin() {
        let preds = tensor(&[2.0, -3.0], 2);
        let labels = tensor(&[1.0, 0.0], 2);
        assert_eq!(scalar(HingeLoss::default().calculate_loss(preds, labels)), 0.0);

        let preds = tensor(&[0.5, 0.5], 2);
        let labels = tensor(&[1.0, 0.0], 2);
        // (1 − 0.5) + (1 + 0.5)
        let loss = scalar(HingeLoss::default().calculate_loss(preds, labels));
        assert!((loss - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_softmax_loss_uniform_logits() {
        let preds = tensor(&[0.0, 0.0, 0.0, 0.0], 4);
        let labels = tensor(&[1.0, 1.0, 0.0, 0.0], 4);
        // targets 0.5 / 0.5, every class has probability 0.25
        let loss = scalar(SoftmaxLoss.calculate_loss(preds, labels));
        assert!((loss - 4.0f32.ln()).abs() < 1e-4);
    }

    #[test]
    fn test_loss_is_batch_mean() {
        let preds = tensor(&[0.5, 0.5, 0.5, 0.5], 2);
        let labels = tensor(&[1.0, 0.0, 1.0, 0.0], 2);
        let one_row = scalar(HingeLoss::default().calculate_loss(
            tensor(&[0.5, 0.5], 2),
            tensor(&[1.0, 0.0], 2),
        ));
        let two_rows = scalar(HingeLoss::default().calculate_loss(preds, labels));
        assert!((one_row - two_rows).abs() < 1e-6);
    }

    #[test]
    fn test_resolve_loss_by_name() {
        assert_eq!(resolve_loss("HingeLoss").unwrap(), LossFn::Hinge);
        assert!(matches!(
            resolve_loss("FocalLoss"),
            Err(ConfigError::UnknownName { kind: "label loss", .. })
        ));
    }
}
