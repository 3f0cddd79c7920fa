// ============================================================
// Layer 5 — Training Loop
// ============================================================
// One step per batch until the input runs out or max_steps is hit:
//
//   batch ──▶ assembler.forward ──▶ loss ──▶ backward
//         ──▶ optimizer step (primary, or secondary on alternate
//             steps for dual-optimizer models)
//         ──▶ TrainBundle (loss, predictions, labels, global_norm)
//
// Learning rate is a staircase exponential decay per update slot:
//
//   lr = base × decay ^ floor(slot_step × batch_size / decay_examples)
//
// Checkpoints are written every checkpoint_every_steps and once at
// the end. If the checkpoint directory already holds weights the run
// resumes from them; otherwise a model with a warm-start source is
// initialised from that.
//
// Key Burn 0.20 points:
//   - Training runs on an AutodiffBackend
//   - global_norm walks the model with a ModuleVisitor and sums the
//     squared gradient of every parameter found in GradientsParams
//   - tensor.inner() drops to the inner backend for the bundle

use std::time::Instant;

use anyhow::{anyhow, Result};
use burn::{
    module::{AutodiffModule, ModuleVisitor, Param},
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::data::batcher::VideoBatcher;
use crate::infra::checkpoint::CheckpointManager;
use crate::infra::metrics::{MetricsLogger, TrainMetrics};
use crate::ml::bundle::{GlobalSteps, TrainBundle, TrainSlot};
use crate::ml::evaluator::hit_at_one;
use crate::ml::models::{TrainableModelVisitor, VideoModel};
use crate::ml::optimizers::{OptimizerKind, OptimizerVisitor};
use crate::ml::run::{host_matrix, RunContext};

/// What a finished training run reports back.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainSummary {
    pub steps:           GlobalSteps,
    pub examples:        u64,
    pub final_loss:      Option<f32>,
    /// Step of the last checkpoint written, if any
    pub last_checkpoint: Option<u64>,
}

pub fn learning_rate(
    base:           f64,
    decay:          f64,
    slot_step:      u64,
    batch_size:     usize,
    decay_examples: u64,
) -> f64 {
    let stairs = slot_step.saturating_mul(batch_size as u64) / decay_examples;
    base * decay.powf(stairs as f64)
}

pub fn run_training<B: AutodiffBackend>(
    ctx:       RunContext<'_>,
    optimizer: OptimizerKind,
    device:    &B::Device,
) -> Result<TrainSummary> {
    let spec = ctx.spec;
    let width = ctx.feature_width;
    spec.build_trainable::<B, _>(width, device, ModelStage { ctx, optimizer, device: device.clone() })
}

// ─── Visitors ─────────────────────────────────────────────────────────────────
// Model type first, then optimizer type: both are only known here.

struct ModelStage<'a, B: AutodiffBackend> {
    ctx:       RunContext<'a>,
    optimizer: OptimizerKind,
    device:    B::Device,
}

impl<B: AutodiffBackend> TrainableModelVisitor<B> for ModelStage<'_, B> {
    type Output = Result<TrainSummary>;

    fn visit<M: VideoModel<B> + AutodiffModule<B>>(self, model: M) -> Self::Output {
        tracing::info!("Using optimizer {}", self.optimizer.as_str());
        self.optimizer.init::<M, B, _>(OptimizerStage {
            ctx:    self.ctx,
            model,
            device: self.device,
        })
    }
}

struct OptimizerStage<'a, B: AutodiffBackend, M> {
    ctx:    RunContext<'a>,
    model:  M,
    device: B::Device,
}

impl<B, M> OptimizerVisitor<M, B> for OptimizerStage<'_, B, M>
where
    B: AutodiffBackend,
    M: VideoModel<B> + AutodiffModule<B>,
{
    type Output = Result<TrainSummary>;

    fn visit<O, F>(self, make: F) -> Self::Output
    where
        O: Optimizer<M, B>,
        F: Fn() -> O,
    {
        train_loop(self.ctx, self.model, make, &self.device)
    }
}

// ─── Gradient Norm ────────────────────────────────────────────────────────────
struct SquaredGradients<'a> {
    grads: &'a GradientsParams,
    sum:   f64,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for SquaredGradients<'_> {
    fn visit_float<const D: usize>(&mut self, param: &Param<Tensor<B, D>>) {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(param.id) {
            self.sum += grad.powf_scalar(2.0).sum().into_scalar().elem::<f64>();
        }
    }
}

/// L2 norm over all parameter gradients; parameters without one count as zero.
pub fn gradient_norm<B: AutodiffBackend, M: AutodiffModule<B>>(model: &M, grads: &GradientsParams) -> f32 {
    let mut visitor = SquaredGradients { grads, sum: 0.0 };
    model.visit(&mut visitor);
    visitor.sum.sqrt() as f32
}

// ─── Loop ─────────────────────────────────────────────────────────────────────
fn restore<B: Backend, M: Module<B>>(
    ctx:    &RunContext<'_>,
    model:  M,
    dual:   bool,
    device: &B::Device,
) -> Result<(M, GlobalSteps)> {
    if let Some(step) = ctx.checkpoints.latest_step()? {
        tracing::info!("Resuming from step {} in '{}'", step, ctx.checkpoints.dir().display());
        let model = ctx.checkpoints.load_step::<B, _>(model, step, device)?;
        return Ok((model, GlobalSteps::resume(step, dual)));
    }

    let Some(init) = ctx.spec.get_train_init_fn() else {
        return Ok((model, GlobalSteps::default()));
    };
    let source = CheckpointManager::open(&init.checkpoint_dir);
    let (model, step) = source.load_latest::<B, _>(model, device)?;
    tracing::info!("Warm start from '{}' (step {})", init.checkpoint_dir.display(), step);
    Ok((model, GlobalSteps::default()))
}

fn train_loop<B, M, O, F>(ctx: RunContext<'_>, model: M, make: F, device: &B::Device) -> Result<TrainSummary>
where
    B: AutodiffBackend,
    M: VideoModel<B> + AutodiffModule<B>,
    O: Optimizer<M, B>,
    F: Fn() -> O,
{
    let card = &ctx.spec.card;
    let cfg = ctx.config;
    let dual = card.secondary_learning_rate.is_some();

    let mut primary = make();
    let mut secondary = if dual { Some(make()) } else { None };

    let (mut model, mut steps) = restore(&ctx, model, dual, device)?;
    if card.var_moving_average_decay > 0.0 {
        tracing::info!(
            "Saver keeps moving averages with decay {}",
            card.var_moving_average_decay
        );
    }
    ctx.checkpoints.save_config(cfg)?;

    let batcher = VideoBatcher::<B>::new(device.clone(), ctx.keep);
    let metrics = MetricsLogger::<TrainMetrics>::new(ctx.checkpoints.dir())?;
    let start_step = steps.total();

    let mut examples = 0u64;
    let mut final_loss = None;
    let mut last_checkpoint = None;
    let mut window_start = Instant::now();
    let mut window_examples = 0u64;

    for items in ctx.batches {
        if cfg.max_steps.is_some_and(|max| steps.total() >= max) {
            tracing::info!("Reached max_steps {}", steps.total());
            break;
        }

        let batch = batcher.batch(items?)?;
        let batch_len = batch.len() as u64;

        let pass = ctx.assembler.forward(&model, batch)?;
        let name = ctx.assembler.model_name();
        let loss = pass.loss.ok_or_else(|| anyhow!("model '{name}' produced no training loss"))?;
        let labels = pass
            .dense_labels
            .ok_or_else(|| anyhow!("training batch for '{name}' carries no labels"))?;
        let loss_value = loss.clone().into_scalar().elem::<f32>();

        let slot = steps.next_slot(dual);
        let (base, slot_step) = match slot {
            TrainSlot::Primary => (card.base_learning_rate, steps.primary),
            TrainSlot::Secondary => (
                card.secondary_learning_rate.unwrap_or(card.base_learning_rate),
                steps.secondary,
            ),
        };
        let lr = learning_rate(
            base,
            cfg.learning_rate_decay,
            slot_step,
            cfg.batch_size,
            cfg.learning_rate_decay_examples,
        );

        let grads = GradientsParams::from_grads(loss.backward(), &model);
        let global_norm = gradient_norm::<B, M>(&model, &grads);
        model = match (slot, secondary.as_mut()) {
            (TrainSlot::Secondary, Some(optim)) => optim.step(lr, model, grads),
            _ => primary.step(lr, model, grads),
        };
        steps.advance(slot);

        let bundle = TrainBundle {
            global_step:  steps,
            train_op:     slot,
            loss:         loss_value,
            predictions:  pass.predictions.inner(),
            dense_labels: labels.inner(),
            global_norm,
        };
        if steps.total() == start_step + 1 {
            let keys: Vec<_> = bundle.keys().into_iter().map(|k| k.as_str()).collect();
            tracing::debug!("train bundle keys: {:?}", keys);
        }

        examples += batch_len;
        window_examples += batch_len;
        final_loss = Some(bundle.loss);
        let step = bundle.global_step.total();

        if step % cfg.log_every_steps == 0 {
            let (predictions, classes) = host_matrix(bundle.predictions)?;
            let (labels, _) = host_matrix(bundle.dense_labels)?;
            let hits: f64 = predictions
                .chunks(classes.max(1))
                .zip(labels.chunks(classes.max(1)))
                .map(|(p, l)| hit_at_one(p, l))
                .sum();
            let elapsed = window_start.elapsed().as_secs_f64().max(1e-9);
            let row = TrainMetrics {
                step,
                loss:             bundle.loss as f64,
                hit_at_one:       hits / batch_len.max(1) as f64,
                global_norm:      bundle.global_norm as f64,
                learning_rate:    lr,
                examples_per_sec: window_examples as f64 / elapsed,
            };
            tracing::info!(
                "step {:>6} | {} | loss={:.4} | hit@1={:.3} | norm={:.4} | lr={:.6} | {:.1} ex/s",
                row.step,
                bundle.train_op.key().as_str(),
                row.loss,
                row.hit_at_one,
                row.global_norm,
                row.learning_rate,
                row.examples_per_sec,
            );
            metrics.log(&row)?;
            window_start = Instant::now();
            window_examples = 0;
        }

        if step % cfg.checkpoint_every_steps == 0 {
            ctx.checkpoints.save_model::<B, _>(&model, step)?;
            last_checkpoint = Some(step);
            tracing::info!("Checkpoint saved for step {}", step);
        }
    }

    let total = steps.total();
    if total > start_step && last_checkpoint != Some(total) {
        ctx.checkpoints.save_model::<B, _>(&model, total)?;
        last_checkpoint = Some(total);
        tracing::info!("Final checkpoint saved for step {}", total);
    }

    tracing::info!(
        "Training complete: {} steps, {} examples, metrics in '{}'",
        total,
        examples,
        metrics.csv_path().display()
    );
    Ok(TrainSummary { steps, examples, final_loss, last_checkpoint })
}
