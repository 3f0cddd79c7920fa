// ============================================================
// Layer 5 — Evaluation Loop
// ============================================================
// Loads the latest checkpoint and makes one ordered pass over the
// eval shards, accumulating:
//
//   loss        mean of the per-batch losses
//   hit@1       fraction of videos whose top prediction is a true label
//   PERR        precision at equal recall: with k true labels, the
//               precision of the top k predictions
//   GAP@k       average precision over the pooled top-k predictions of
//               every video, against all true labels
//
// One row is appended to metrics.csv. If the model exports `feats`,
// they are streamed to eval_feats.jsonl.

use anyhow::Result;
use burn::prelude::*;

use crate::data::batcher::VideoBatcher;
use crate::infra::exports::FeatureWriter;
use crate::infra::metrics::{EvalMetrics, MetricsLogger};
use crate::ml::models::{ModelVisitor, VideoModel};
use crate::ml::run::{host_matrix, RunContext};

// ─── Metric Calculators ───────────────────────────────────────────────────────
/// (label, confidence) of the `k` most confident classes, best first.
/// Ties keep the lower label first.
pub fn top_k(row: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut ranked: Vec<(usize, f32)> = row.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.truncate(k);
    ranked
}

pub fn hit_at_one(predictions: &[f32], labels: &[f32]) -> f64 {
    match top_k(predictions, 1).first() {
        Some(&(label, _)) if labels[label] > 0.0 => 1.0,
        _ => 0.0,
    }
}

/// Videos without any true label score 0.
pub fn precision_at_equal_recall(predictions: &[f32], labels: &[f32]) -> f64 {
    let positives = labels.iter().filter(|&&l| l > 0.0).count();
    if positives == 0 {
        return 0.0;
    }
    let hits = top_k(predictions, positives)
        .iter()
        .filter(|(label, _)| labels[*label] > 0.0)
        .count();
    hits as f64 / positives as f64
}

/// Average precision over pooled (confidence, is_positive) pairs.
#[derive(Debug, Default)]
pub struct GapCalculator {
    scored:    Vec<(f32, bool)>,
    positives: usize,
}

impl GapCalculator {
    pub fn accumulate(&mut self, predictions: &[f32], labels: &[f32], top: usize) {
        self.positives += labels.iter().filter(|&&l| l > 0.0).count();
        self.scored.extend(
            top_k(predictions, top)
                .into_iter()
                .map(|(label, confidence)| (confidence, labels[label] > 0.0)),
        );
    }

    pub fn peek(&self) -> f64 {
        if self.positives == 0 {
            return 0.0;
        }
        let mut scored = self.scored.clone();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut true_positives = 0usize;
        let mut precision_sum = 0.0f64;
        for (rank, (_, positive)) in scored.iter().enumerate() {
            if *positive {
                true_positives += 1;
                precision_sum += true_positives as f64 / (rank + 1) as f64;
            }
        }
        precision_sum / self.positives as f64
    }
}

/// Running totals for one evaluation pass.
#[derive(Debug)]
pub struct EvaluationAccumulator {
    top_k:    usize,
    examples: usize,
    batches:  usize,
    loss_sum: f64,
    hit_sum:  f64,
    perr_sum: f64,
    gap:      GapCalculator,
}

impl EvaluationAccumulator {
    pub fn new(top_k: usize) -> Self {
        Self {
            top_k,
            examples: 0,
            batches:  0,
            loss_sum: 0.0,
            hit_sum:  0.0,
            perr_sum: 0.0,
            gap:      GapCalculator::default(),
        }
    }

    /// `predictions` and `labels` are row-major [batch, classes].
    pub fn accumulate(&mut self, predictions: &[f32], labels: &[f32], classes: usize, loss: f32) {
        for (p, l) in predictions.chunks(classes).zip(labels.chunks(classes)) {
            self.hit_sum += hit_at_one(p, l);
            self.perr_sum += precision_at_equal_recall(p, l);
            self.gap.accumulate(p, l, self.top_k);
            self.examples += 1;
        }
        self.loss_sum += loss as f64;
        self.batches += 1;
    }

    pub fn examples(&self) -> usize {
        self.examples
    }

    pub fn finish(&self, step: u64) -> EvalMetrics {
        let per_video = |sum: f64| if self.examples > 0 { sum / self.examples as f64 } else { 0.0 };
        EvalMetrics {
            step,
            examples:   self.examples,
            loss:       if self.batches > 0 { self.loss_sum / self.batches as f64 } else { f64::NAN },
            hit_at_one: per_video(self.hit_sum),
            perr:       per_video(self.perr_sum),
            gap:        self.gap.peek(),
        }
    }
}

// ─── Run Loop ─────────────────────────────────────────────────────────────────
pub fn run_evaluation<B: Backend>(ctx: RunContext<'_>, device: &B::Device) -> Result<EvalMetrics> {
    let spec = ctx.spec;
    let width = ctx.feature_width;
    spec.build::<B, _>(width, device, EvalStage { ctx, device: device.clone() })
}

struct EvalStage<'a, B: Backend> {
    ctx:    RunContext<'a>,
    device: B::Device,
}

impl<B: Backend> ModelVisitor<B> for EvalStage<'_, B> {
    type Output = Result<EvalMetrics>;

    fn visit<M: VideoModel<B>>(self, model: M) -> Self::Output {
        evaluation_loop(self.ctx, model, &self.device)
    }
}

fn evaluation_loop<B: Backend, M: VideoModel<B>>(
    ctx:    RunContext<'_>,
    model:  M,
    device: &B::Device,
) -> Result<EvalMetrics> {
    let (model, step) = ctx.checkpoints.load_latest::<B, _>(model, device)?;
    if let Some(trained) = ctx.checkpoints.load_config()? {
        if trained.model_name != ctx.config.model_name {
            tracing::warn!(
                "Checkpoint was trained with '{}' but this run evaluates '{}'",
                trained.model_name,
                ctx.config.model_name
            );
        }
    }
    if ctx.spec.card.var_moving_average_decay > 0.0 {
        tracing::info!(
            "Model uses moving average decay {}; restoring raw weights",
            ctx.spec.card.var_moving_average_decay
        );
    }

    let batcher = VideoBatcher::<B>::new(device.clone(), ctx.keep);
    let mut acc = EvaluationAccumulator::new(ctx.config.top_k);
    let mut feats_out: Option<FeatureWriter> = None;

    for (index, examples) in ctx.batches.enumerate() {
        let batch = batcher.batch(examples?)?;
        let bundle = ctx
            .assembler
            .forward(&model, batch)?
            .into_eval_bundle(ctx.assembler.model_name())?;
        if index == 0 {
            let keys: Vec<_> = bundle.keys().into_iter().map(|k| k.as_str()).collect();
            tracing::debug!("eval bundle keys: {:?}", keys);
        }

        let (predictions, classes) = host_matrix(bundle.predictions)?;
        let (labels, _) = host_matrix(bundle.dense_labels)?;
        acc.accumulate(&predictions, &labels, classes, bundle.loss);

        if let Some(feats) = bundle.feats {
            if feats_out.is_none() {
                let path = ctx.checkpoints.dir().join("eval_feats.jsonl");
                feats_out = Some(FeatureWriter::create(path)?);
            }
            let (values, dim) = host_matrix(feats)?;
            if let Some(writer) = feats_out.as_mut() {
                for (video_id, row) in bundle.video_id.iter().zip(values.chunks(dim.max(1))) {
                    writer.write(video_id, row)?;
                }
            }
        }

        if (index as u64 + 1) % ctx.config.log_every_steps == 0 {
            tracing::info!("evaluated {} batches, {} examples", index + 1, acc.examples());
        }
    }

    if let Some(writer) = feats_out {
        writer.finish()?;
    }

    let metrics = acc.finish(step);
    MetricsLogger::<EvalMetrics>::new(ctx.checkpoints.dir())?.log(&metrics)?;
    tracing::info!(
        "step {} | examples={} | loss={:.4} | hit@1={:.4} | perr={:.4} | gap={:.4}",
        metrics.step,
        metrics.examples,
        metrics.loss,
        metrics.hit_at_one,
        metrics.perr,
        metrics.gap,
    );
    Ok(metrics)
}
