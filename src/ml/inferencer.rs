// ============================================================
// Layer 5 — Inferencer
// ============================================================
// Loads the latest checkpoint, runs every test video through the
// model in file order and writes predictions.csv:
//
//   VideoId,LabelConfidencePairs
//   vid1,12 0.981234 7 0.402100 …      (top_k pairs, best first)
//
// Labels are never read in this stage, so unlabeled shards work.

use anyhow::Result;
use burn::prelude::*;

use crate::data::batcher::VideoBatcher;
use crate::infra::exports::PredictionWriter;
use crate::ml::evaluator::top_k;
use crate::ml::models::{ModelVisitor, VideoModel};
use crate::ml::run::{host_matrix, RunContext};

/// Returns the number of videos written.
pub fn run_inference<B: Backend>(ctx: RunContext<'_>, device: &B::Device) -> Result<usize> {
    let spec = ctx.spec;
    let width = ctx.feature_width;
    spec.build::<B, _>(width, device, InferenceStage { ctx, device: device.clone() })
}

struct InferenceStage<'a, B: Backend> {
    ctx:    RunContext<'a>,
    device: B::Device,
}

impl<B: Backend> ModelVisitor<B> for InferenceStage<'_, B> {
    type Output = Result<usize>;

    fn visit<M: VideoModel<B>>(self, model: M) -> Self::Output {
        let ctx = self.ctx;
        let (model, step) = ctx.checkpoints.load_latest::<B, _>(model, &self.device)?;
        tracing::info!("Running inference with '{}' from step {}", ctx.spec.name, step);

        let batcher = VideoBatcher::<B>::new(self.device.clone(), ctx.keep);
        let mut writer = PredictionWriter::create(ctx.checkpoints.dir().join("predictions.csv"))?;

        for (index, examples) in ctx.batches.enumerate() {
            let batch = batcher.batch(examples?)?;
            let bundle = ctx.assembler.forward(&model, batch)?.into_inference_bundle();

            let (predictions, classes) = host_matrix(bundle.predictions)?;
            for (video_id, row) in bundle.video_id.iter().zip(predictions.chunks(classes.max(1))) {
                writer.write_row(video_id, &top_k(row, ctx.config.top_k))?;
            }

            if (index as u64 + 1) % ctx.config.log_every_steps == 0 {
                tracing::info!("predicted {} batches", index + 1);
            }
        }

        writer.finish()
    }
}
