// ============================================================
// Layer 2 — Experiment Resolution
// ============================================================
// Turns a request (stage, checkpoint path, config name, overrides)
// into everything a run loop needs, in order:
//
//   Step 1: Resolve the named config for the stage, apply overrides
//   Step 2: Resolve model, label loss and optimizer by name
//   Step 3: Select the reader for the declared feature layout
//   Step 4: Check model requirements against the reader
//   Step 5: Build the input pipeline (glob is expanded here)
//
// Every lookup and compatibility failure surfaces before the first
// batch is decoded.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::application::config_registry::resolve_config;
use crate::data::pipeline::{build_batches, BatchStream, PipelineConfig};
use crate::data::readers::select_reader;
use crate::domain::config::{ConfigOverrides, ExperimentConfig};
use crate::domain::stage::Stage;
use crate::domain::traits::{OptionalInputs, Reader};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::assembly::GraphAssembler;
use crate::ml::losses::resolve_loss;
use crate::ml::models::{resolve_model, ModelSpec};
use crate::ml::optimizers::{resolve_optimizer, OptimizerKind};
use crate::ml::run::RunContext;

/// What the CLI asks for.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentRequest {
    pub stage:           Stage,
    pub model_ckpt_path: PathBuf,
    pub config_name:     String,
    pub overrides:       ConfigOverrides,
    /// Checkpoint directory to warm-start a fresh training run from
    pub train_init_dir:  Option<PathBuf>,
}

/// A fully resolved run, ready to dispatch.
pub struct Experiment {
    pub config:          ExperimentConfig,
    pub spec:            ModelSpec,
    pub optimizer:       OptimizerKind,
    pub reader:          Arc<dyn Reader>,
    pub assembler:       GraphAssembler,
    /// Optional tensors that reach the model
    pub keep:            OptionalInputs,
    pub feature_width:   usize,
    pub model_ckpt_path: PathBuf,
}

impl Experiment {
    pub fn resolve(request: &ExperimentRequest) -> Result<Self> {
        let config = resolve_config(&request.config_name, request.stage)
            .with_context(|| format!("resolving config '{}'", request.config_name))?
            .with_overrides(&request.overrides);
        config
            .validate()
            .with_context(|| format!("config '{}' after overrides", config.name))?;

        let mut spec = resolve_model(&config.model_name)?;
        if let Some(dir) = &request.train_init_dir {
            spec = spec.with_train_init(dir);
        }
        Self::assemble(config, spec, &request.model_ckpt_path)
    }

    /// Steps 2-4 for an already resolved config and model spec.
    pub fn assemble(
        config:          ExperimentConfig,
        spec:            ModelSpec,
        model_ckpt_path: impl Into<PathBuf>,
    ) -> Result<Self> {
        let loss = resolve_loss(&config.label_loss)?;
        let optimizer = resolve_optimizer(spec.card.optimizer_name)?;
        let layout = config.feature_descriptor()?;

        let reader = select_reader(
            config.input_feat_type,
            config.label_vocab_size,
            &layout,
            spec.card.num_max_labels,
            config.max_frames,
            config.stage,
        );
        let keep = if config.use_hdfs {
            tracing::info!("HDFS input: only ids, features and dense labels are used");
            OptionalInputs::NONE
        } else {
            reader.provides()
        };

        let assembler = GraphAssembler::new(&spec, loss, &config, keep)
            .with_context(|| format!("model '{}' cannot run on {} input", spec.name, config.input_feat_type))?;

        tracing::info!(
            "Experiment: {} | stage={} | model={} | loss={} | optimizer={}",
            config.name,
            config.stage,
            spec.name,
            config.label_loss,
            optimizer.as_str(),
        );

        Ok(Self {
            feature_width:   layout.total_width(),
            model_ckpt_path: model_ckpt_path.into(),
            config,
            spec,
            optimizer,
            reader,
            assembler,
            keep,
        })
    }

    pub fn batches(&self) -> Result<BatchStream> {
        let pipeline = PipelineConfig::from_experiment(&self.config);
        tracing::info!(
            "Input: '{}' with {} readers, batch {}, queue capacity {}",
            pipeline.pattern,
            pipeline.num_readers,
            pipeline.batch_size,
            pipeline.capacity(),
        );
        build_batches(&pipeline, Arc::clone(&self.reader)).context("building the input pipeline")
    }

    pub fn context<'a>(&'a self, checkpoints: &'a CheckpointManager, batches: BatchStream) -> RunContext<'a> {
        RunContext {
            spec:          &self.spec,
            assembler:     &self.assembler,
            config:        &self.config,
            checkpoints,
            batches,
            keep:          self.keep,
            feature_width: self.feature_width,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, InputError, ShapeError};

    fn request(config_name: &str, stage: Stage) -> ExperimentRequest {
        ExperimentRequest {
            stage,
            model_ckpt_path: PathBuf::from("unused"),
            config_name:     config_name.to_string(),
            overrides:       ConfigOverrides::default(),
            train_init_dir:  None,
        }
    }

    #[test]
    fn test_unknown_config_fails_before_io() {
        let err = Experiment::resolve(&request("NopeConfig", Stage::Train)).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::UnknownName { .. })
        ));
    }

    #[test]
    fn test_memnet_on_vlad_input_is_rejected() {
        let mut config = resolve_config("VladConfig", Stage::Train).unwrap();
        config.model_name = "LstmMemNet".into();
        let spec = resolve_model("LstmMemNet").unwrap();
        let err = Experiment::assemble(config, spec, "unused").err().unwrap();
        assert!(matches!(
            err.downcast_ref::<ShapeError>(),
            Some(ShapeError::MissingInput { input: "sparse_labels", .. })
        ));
    }

    #[test]
    fn test_hdfs_input_strips_optional_tensors() {
        let mut config = resolve_config("BaseConfig", Stage::Eval).unwrap();
        config.use_hdfs = true;
        let spec = resolve_model("LogisticModel").unwrap();
        let experiment = Experiment::assemble(config, spec, "unused").unwrap();
        assert_eq!(experiment.keep, OptionalInputs::NONE);
        assert_eq!(experiment.feature_width, 1152);
    }

    #[test]
    fn test_empty_glob_is_reported_eagerly() {
        let dir = tempfile::tempdir().unwrap();
        let mut req = request("BaseConfig", Stage::Eval);
        req.overrides.data_pattern = Some(dir.path().join("*.jsonl").display().to_string());

        let experiment = Experiment::resolve(&req).unwrap();
        let err = experiment.batches().err().unwrap();
        assert!(matches!(
            err.downcast_ref::<InputError>(),
            Some(InputError::NoInputFiles { .. })
        ));
    }
}
