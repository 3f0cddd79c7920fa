// ============================================================
// Layer 2 — Config Registry
// ============================================================
// Named experiment configurations. Each builder takes the stage and
// returns a fresh ExperimentConfig:
//
//   train      data/train/*.jsonl, shuffled, unlimited epochs
//   eval       data/validate/*.jsonl, one ordered pass
//   inference  data/test/*.jsonl, one ordered pass
//
// A name that is not registered is an error. There is no default
// configuration to fall back to.

use crate::application::registry::{resolve, Namespace};
use crate::domain::config::{ExperimentConfig, FeatureType};
use crate::domain::stage::Stage;
use crate::error::ConfigError;

pub type ConfigBuilder = fn(Stage) -> ExperimentConfig;

const YT8M_VOCAB: usize = 4716;

/// Settings shared by every registered configuration.
fn common(name: &str, stage: Stage, model_name: &str, feat_type: FeatureType) -> ExperimentConfig {
    let (data_pattern, batch_size, num_readers, num_epochs) = match stage {
        Stage::Train     => ("data/train/*.jsonl", 1024, 8, None),
        Stage::Eval      => ("data/validate/*.jsonl", 1024, 4, Some(1)),
        Stage::Inference => ("data/test/*.jsonl", 8192, 1, Some(1)),
    };

    ExperimentConfig {
        name:            name.to_string(),
        stage,
        model_name:      model_name.to_string(),
        label_loss:      "CrossEntropyLoss".to_string(),
        input_feat_type: feat_type,
        feature_names:   "mean_rgb,mean_audio".to_string(),
        feature_sizes:   "1024,128".to_string(),
        data_pattern:    data_pattern.to_string(),
        batch_size,
        num_readers,
        num_epochs,
        label_smoothing: 0.0,
        use_hdfs:        false,

        label_vocab_size: YT8M_VOCAB,
        max_frames:       300,
        seed:             42,

        learning_rate_decay:          0.95,
        learning_rate_decay_examples: 4_000_000,
        max_steps:                    None,
        checkpoint_every_steps:       1000,
        log_every_steps:              10,
        top_k:                        20,
    }
}

fn base_config(stage: Stage) -> ExperimentConfig {
    common("BaseConfig", stage, "LogisticModel", FeatureType::Video)
}

fn moe_config(stage: Stage) -> ExperimentConfig {
    common("MoeConfig", stage, "MoeModel", FeatureType::Video)
}

fn frame_config(stage: Stage) -> ExperimentConfig {
    ExperimentConfig {
        feature_names: "rgb,audio".to_string(),
        ..common("FrameConfig", stage, "FrameLevelLogisticModel", FeatureType::Frame)
    }
}

fn memnet_config(stage: Stage) -> ExperimentConfig {
    let mut config = common("MemNetConfig", stage, "LstmMemNet", FeatureType::Frame);
    config.feature_names = "rgb,audio".to_string();
    if stage == Stage::Train {
        config.batch_size = 128;
    }
    config
}

fn vlad_config(stage: Stage) -> ExperimentConfig {
    ExperimentConfig {
        feature_names: "rgb_vlad,audio_vlad".to_string(),
        feature_sizes: "2048,512".to_string(),
        ..common("VladConfig", stage, "MoeModel", FeatureType::Vlad)
    }
}

fn score_config(stage: Stage) -> ExperimentConfig {
    ExperimentConfig {
        feature_names: "scores".to_string(),
        feature_sizes: YT8M_VOCAB.to_string(),
        label_loss:    "HingeLoss".to_string(),
        ..common("ScoreConfig", stage, "LogisticModel", FeatureType::Score)
    }
}

fn fixed_width_config(stage: Stage) -> ExperimentConfig {
    ExperimentConfig {
        feature_names: "rgb,audio".to_string(),
        max_frames:    55,
        ..common("FixedWidthConfig", stage, "LstmMemNet", FeatureType::FixedWidth)
    }
}

pub static BASE_CONFIGS: Namespace<ConfigBuilder> = Namespace::new(
    "base_config",
    &[
        ("BaseConfig",       base_config as ConfigBuilder),
        ("MoeConfig",        moe_config as ConfigBuilder),
        ("FrameConfig",      frame_config as ConfigBuilder),
        ("MemNetConfig",     memnet_config as ConfigBuilder),
        ("VladConfig",       vlad_config as ConfigBuilder),
        ("ScoreConfig",      score_config as ConfigBuilder),
        ("FixedWidthConfig", fixed_width_config as ConfigBuilder),
    ],
);

/// Build the named configuration for `stage`. Pure: nothing is read
/// from disk and repeated calls return equal values.
pub fn resolve_config(name: &str, stage: Stage) -> Result<ExperimentConfig, ConfigError> {
    let builder = resolve("config", name, &[&BASE_CONFIGS])?;
    let config = builder(stage);
    config.validate()?;
    Ok(config)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_config_resolves_for_every_stage() {
        for name in BASE_CONFIGS.names() {
            for stage in Stage::ALL {
                let config = resolve_config(name, stage).unwrap();
                assert_eq!(config.name, name);
                assert_eq!(config.stage, stage);
                let layout = config.feature_descriptor().unwrap();
                assert_eq!(layout.names().len(), layout.sizes().len());
                assert!(layout.sizes().iter().all(|&s| s > 0), "{name}");
            }
        }
    }

    #[test]
    fn test_resolution_is_pure() {
        assert_eq!(
            resolve_config("MemNetConfig", Stage::Train).unwrap(),
            resolve_config("MemNetConfig", Stage::Train).unwrap()
        );
    }

    #[test]
    fn test_stage_picks_pass_shape() {
        let train = resolve_config("BaseConfig", Stage::Train).unwrap();
        let eval = resolve_config("BaseConfig", Stage::Eval).unwrap();
        assert_eq!(train.num_epochs, None);
        assert_eq!(eval.num_epochs, Some(1));
        assert_ne!(train.data_pattern, eval.data_pattern);
    }

    #[test]
    fn test_unknown_config_has_no_default() {
        let err = resolve_config("DefaultConfig", Stage::Train).unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownName {
                kind:     "config",
                name:     "DefaultConfig".into(),
                searched: vec!["base_config".into()],
            }
        );
    }
}
