// ============================================================
// Layer 5 — Output Bundles
// ============================================================
// The stage decides which named outputs the run loop receives:
//
//   train      global_step, train_op (+ train_op1 when the model runs
//              two optimizers), loss, predictions, dense_labels,
//              global_norm
//   eval       video_id, predictions, dense_labels, loss, feats?
//   inference  video_id, predictions
//
// Train bundles hold host-side scalars; eval and inference bundles
// keep their tensors so the consumers can pull exactly what they need.

use burn::prelude::*;

use crate::error::ShapeError;
use crate::ml::assembly::ForwardPass;

// ─── Keys ─────────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKey {
    GlobalStep,
    TrainOp,
    TrainOp1,
    Loss,
    Predictions,
    DenseLabels,
    GlobalNorm,
    VideoId,
    Feats,
}

impl OutputKey {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputKey::GlobalStep  => "global_step",
            OutputKey::TrainOp     => "train_op",
            OutputKey::TrainOp1    => "train_op1",
            OutputKey::Loss        => "loss",
            OutputKey::Predictions => "predictions",
            OutputKey::DenseLabels => "dense_labels",
            OutputKey::GlobalNorm  => "global_norm",
            OutputKey::VideoId     => "video_id",
            OutputKey::Feats       => "feats",
        }
    }
}

// ─── Step Counters ────────────────────────────────────────────────────────────
/// Which of the two update steps a training iteration runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainSlot {
    Primary,
    Secondary,
}

impl TrainSlot {
    pub fn key(self) -> OutputKey {
        match self {
            TrainSlot::Primary   => OutputKey::TrainOp,
            TrainSlot::Secondary => OutputKey::TrainOp1,
        }
    }
}

/// Separate counters for the two update steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlobalSteps {
    pub primary:   u64,
    pub secondary: u64,
}

impl GlobalSteps {
    /// Single-optimizer models always take the primary step. Dual
    /// schedules alternate, starting with the primary one.
    pub fn next_slot(&self, dual: bool) -> TrainSlot {
        if dual && self.primary > self.secondary {
            TrainSlot::Secondary
        } else {
            TrainSlot::Primary
        }
    }

    /// Counters after `total` steps of a schedule that started from zero.
    pub fn resume(total: u64, dual: bool) -> Self {
        if dual {
            Self { primary: total.div_ceil(2), secondary: total / 2 }
        } else {
            Self { primary: total, secondary: 0 }
        }
    }

    pub fn advance(&mut self, slot: TrainSlot) {
        match slot {
            TrainSlot::Primary   => self.primary += 1,
            TrainSlot::Secondary => self.secondary += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.primary + self.secondary
    }
}

// ─── Bundles ──────────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct TrainBundle<B: Backend> {
    pub global_step:  GlobalSteps,
    /// Update step taken this iteration
    pub train_op:     TrainSlot,
    pub loss:         f32,
    pub predictions:  Tensor<B, 2>,
    pub dense_labels: Tensor<B, 2>,
    /// L2 norm over the gradients of every trainable parameter
    pub global_norm:  f32,
}

#[derive(Debug, Clone)]
pub struct EvalBundle<B: Backend> {
    pub video_id:     Vec<String>,
    pub predictions:  Tensor<B, 2>,
    pub dense_labels: Tensor<B, 2>,
    pub loss:         f32,
    pub feats:        Option<Tensor<B, 2>>,
}

#[derive(Debug, Clone)]
pub struct InferenceBundle<B: Backend> {
    pub video_id:    Vec<String>,
    pub predictions: Tensor<B, 2>,
}

impl<B: Backend> TrainBundle<B> {
    pub fn keys(&self) -> Vec<OutputKey> {
        vec![
            OutputKey::GlobalStep,
            self.train_op.key(),
            OutputKey::Loss,
            OutputKey::Predictions,
            OutputKey::DenseLabels,
            OutputKey::GlobalNorm,
        ]
    }
}

impl<B: Backend> EvalBundle<B> {
    pub fn keys(&self) -> Vec<OutputKey> {
        let mut keys = vec![
            OutputKey::VideoId,
            OutputKey::Predictions,
            OutputKey::DenseLabels,
            OutputKey::Loss,
        ];
        if self.feats.is_some() {
            keys.push(OutputKey::Feats);
        }
        keys
    }
}

impl<B: Backend> InferenceBundle<B> {
    pub fn keys(&self) -> Vec<OutputKey> {
        vec![OutputKey::VideoId, OutputKey::Predictions]
    }
}

impl<B: Backend> ForwardPass<B> {
    pub fn into_eval_bundle(self, model: &str) -> Result<EvalBundle<B>, ShapeError> {
        let missing = |input| ShapeError::MissingInput { model: model.to_string(), input };
        let dense_labels = self.dense_labels.ok_or_else(|| missing("labels"))?;
        let loss = self.loss.ok_or_else(|| missing("loss"))?;
        Ok(EvalBundle {
            video_id:    self.video_ids,
            predictions: self.predictions,
            dense_labels,
            loss:        loss.into_scalar().elem::<f32>(),
            feats:       self.feats,
        })
    }

    pub fn into_inference_bundle(self) -> InferenceBundle<B> {
        InferenceBundle { video_id: self.video_ids, predictions: self.predictions }
    }
}
