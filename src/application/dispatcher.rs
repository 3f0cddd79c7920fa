// ============================================================
// Layer 2 — Stage Dispatcher
// ============================================================
// The stage is fixed for the whole run. It picks the backend and
// the run loop:
//
//   train      Autodiff backend, trainer, checkpoint dir created
//   eval       plain backend, evaluator, checkpoint dir must exist
//   inference  plain backend, inferencer, checkpoint dir must exist

use anyhow::{Context, Result};

use crate::application::experiment::{Experiment, ExperimentRequest};
use crate::domain::stage::Stage;
use crate::infra::checkpoint::CheckpointManager;
use crate::infra::metrics::EvalMetrics;
use crate::ml::backend::{default_device, InferBackend, TrainBackend};
use crate::ml::evaluator::run_evaluation;
use crate::ml::inferencer::run_inference;
use crate::ml::trainer::{run_training, TrainSummary};

#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Trained(TrainSummary),
    Evaluated(EvalMetrics),
    Predicted { videos: usize },
}

pub fn dispatch(request: &ExperimentRequest) -> Result<StageOutcome> {
    let experiment = Experiment::resolve(request)?;
    run_stage(&experiment)
}

pub fn run_stage(experiment: &Experiment) -> Result<StageOutcome> {
    let device = default_device();
    let dir = &experiment.model_ckpt_path;

    match experiment.config.stage {
        Stage::Train => {
            let checkpoints = CheckpointManager::new(dir)?;
            let ctx = experiment.context(&checkpoints, experiment.batches()?);
            run_training::<TrainBackend>(ctx, experiment.optimizer, &device)
                .context("training failed")
                .map(StageOutcome::Trained)
        }
        Stage::Eval => {
            let checkpoints = CheckpointManager::open(dir);
            let ctx = experiment.context(&checkpoints, experiment.batches()?);
            run_evaluation::<InferBackend>(ctx, &device)
                .context("evaluation failed")
                .map(StageOutcome::Evaluated)
        }
        Stage::Inference => {
            let checkpoints = CheckpointManager::open(dir);
            let ctx = experiment.context(&checkpoints, experiment.batches()?);
            run_inference::<InferBackend>(ctx, &device)
                .context("inference failed")
                .map(|videos| StageOutcome::Predicted { videos })
        }
    }
}
