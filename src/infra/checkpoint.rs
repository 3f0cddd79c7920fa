// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores model weights with a full-precision
// NamedMpkFileRecorder, so a reload gives back bit-identical weights.
//
// What gets saved:
//   1. Model weights (.mpk file)  — one file per saved step
//   2. latest_step.json            — which step was last saved
//   3. run_config.json             — the resolved ExperimentConfig
//
// The config is saved so that eval and inference runs against the
// same directory can be checked against the training run that
// produced the weights.
//
// File naming convention:
//   <model_ckpt_path>/
//     model_step_100.mpk
//     model_step_200.mpk
//     latest_step.json
//     run_config.json
//
// Records are backend-independent, so weights saved
// from the autodiff training backend load into the plain inference
// backend.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
};

use crate::domain::config::ExperimentConfig;

const LATEST_FILE: &str = "latest_step.json";
const CONFIG_FILE: &str = "run_config.json";

type WeightsRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// Open an existing directory without creating it, for read-only stages.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn weights_path(&self, step: u64) -> PathBuf {
        // The recorder adds the extension
        self.dir.join(format!("model_step_{step}"))
    }

    /// Save weights for `step` and move the latest pointer to it.
    pub fn save_model<B: Backend, M: Module<B>>(&self, model: &M, step: u64) -> Result<()> {
        let path = self.weights_path(step);

        WeightsRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        let latest_path = self.dir.join(LATEST_FILE);
        fs::write(&latest_path, serde_json::to_string(&step)?)
            .with_context(|| format!("Failed to write {LATEST_FILE}"))?;

        tracing::debug!("Saved checkpoint: step {}", step);
        Ok(())
    }

    /// Load the weights saved at `step` into an already built model.
    pub fn load_step<B: Backend, M: Module<B>>(&self, model: M, step: u64, device: &B::Device) -> Result<M> {
        let path = self.weights_path(step);
        let record = WeightsRecorder::new()
            .load(path.clone(), device)
            .with_context(|| format!("Cannot load checkpoint '{}'", path.display()))?;
        Ok(model.load_record(record))
    }

    /// Load the most recent weights. Fails if nothing was saved yet.
    pub fn load_latest<B: Backend, M: Module<B>>(&self, model: M, device: &B::Device) -> Result<(M, u64)> {
        let step = self.latest_step()?.with_context(|| {
            format!(
                "No checkpoint in '{}'. Have you run the train stage first?",
                self.dir.display()
            )
        })?;
        tracing::info!("Loading checkpoint from step {}", step);
        Ok((self.load_step::<B, M>(model, step, device)?, step))
    }

    /// Step of the last saved checkpoint, if any.
    pub fn latest_step(&self) -> Result<Option<u64>> {
        let path = self.dir.join(LATEST_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let s = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read '{}'", path.display()))?;
        Ok(Some(serde_json::from_str::<u64>(&s)?))
    }

    pub fn save_config(&self, cfg: &ExperimentConfig) -> Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved run config to '{}'", path.display());
        Ok(())
    }

    /// The config of the training run, if one was saved here.
    pub fn load_config(&self) -> Result<Option<ExperimentConfig>> {
        let path = self.dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read config from '{}'", path.display()))?;
        Ok(Some(serde_json::from_str(&json)?))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::config_registry::resolve_config;
    use crate::domain::stage::Stage;
    use crate::ml::backend::InferBackend;
    use crate::ml::bundle::{GlobalSteps, TrainSlot};
    use crate::ml::models::video_level::{LogisticModel, LogisticModelConfig};

    type B = InferBackend;

    #[test]
    fn test_latest_step_absent_before_first_save() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path().join("run")).unwrap();
        assert_eq!(ckpt.latest_step().unwrap(), None);
        assert!(ckpt.load_config().unwrap().is_none());

        let model = LogisticModelConfig::new(3, 2).init::<B>(&Default::default());
        let err = ckpt.load_latest::<B, _>(model, &Default::default()).unwrap_err();
        assert!(err.to_string().contains("No checkpoint"));
    }

    #[test]
    fn test_save_then_load_restores_weights() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        let device = Default::default();

        let saved = LogisticModelConfig::new(3, 2).init::<B>(&device);
        ckpt.save_model::<B, _>(&saved, 10).unwrap();
        ckpt.save_model::<B, _>(&saved, 20).unwrap();
        assert_eq!(ckpt.latest_step().unwrap(), Some(20));

        let fresh = LogisticModelConfig::new(3, 2).init::<B>(&device);
        let (loaded, step) = ckpt.load_latest::<B, _>(fresh, &device).unwrap();
        assert_eq!(step, 20);

        let expected = saved.linear.weight.val().into_data().to_vec::<f32>().unwrap();
        let actual = loaded.linear.weight.val().into_data().to_vec::<f32>().unwrap();
        assert_eq!(expected, actual);
    }

    #[test]
    fn test_resume_picks_up_step_and_exact_weights() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let trained = LogisticModelConfig::new(4, 3).init::<B>(&device);
        CheckpointManager::new(dir.path()).unwrap().save_model::<B, _>(&trained, 7).unwrap();

        // A later run opens the same directory with a freshly initialised model
        let ckpt = CheckpointManager::open(dir.path());
        let step = ckpt.latest_step().unwrap().unwrap();
        let fresh = LogisticModelConfig::new(4, 3).init::<B>(&device);
        let restored = ckpt.load_step::<B, _>(fresh, step, &device).unwrap();

        let steps = GlobalSteps::resume(step, true);
        assert_eq!(steps.total(), 7);
        assert_eq!(steps.next_slot(true), TrainSlot::Secondary);

        let params = |m: &LogisticModel<B>| {
            let mut all = m.linear.weight.val().into_data().to_vec::<f32>().unwrap();
            all.extend(m.linear.bias.as_ref().unwrap().val().into_data().to_vec::<f32>().unwrap());
            all
        };
        assert_eq!(params(&trained), params(&restored));
    }

    #[test]
    fn test_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        let cfg = resolve_config("MoeConfig", Stage::Train).unwrap();
        ckpt.save_config(&cfg).unwrap();
        assert_eq!(ckpt.load_config().unwrap(), Some(cfg));
    }
}
