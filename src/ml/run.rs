// ============================================================
// Layer 5 — Run Context
// ============================================================
// What every run loop receives from the application layer once
// the experiment is resolved: the model spec, the assembler bound
// to it, the batch stream, and the checkpoint directory.

use anyhow::{anyhow, Result};
use burn::prelude::*;

use crate::data::pipeline::BatchStream;
use crate::domain::config::ExperimentConfig;
use crate::domain::traits::OptionalInputs;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::assembly::GraphAssembler;
use crate::ml::models::ModelSpec;

pub struct RunContext<'a> {
    pub spec:          &'a ModelSpec,
    pub assembler:     &'a GraphAssembler,
    pub config:        &'a ExperimentConfig,
    pub checkpoints:   &'a CheckpointManager,
    pub batches:       BatchStream,
    /// Optional tensors the batcher keeps
    pub keep:          OptionalInputs,
    pub feature_width: usize,
}

/// Copy a [rows, cols] tensor to the host, row-major.
pub fn host_matrix<B: Backend>(tensor: Tensor<B, 2>) -> Result<(Vec<f32>, usize)> {
    let [_, cols] = tensor.dims();
    let values = tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| anyhow!("cannot read tensor data: {e:?}"))?;
    Ok((values, cols))
}
