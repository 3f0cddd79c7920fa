// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Two subcommands:
//   run   — resolve a config and execute one stage
//   list  — print every registered name
//
// clap's derive macros generate help text, missing-argument errors
// and the string → Stage / usize conversions.
//
// Reference: Rust Book §12 (Building a CLI Program)

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::application::experiment::ExperimentRequest;
use crate::domain::config::{ConfigOverrides, FeatureType};
use crate::domain::stage::Stage;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one stage (train, eval or inference) of an experiment
    Run(RunArgs),

    /// List registered configs, models, losses and optimizers
    List,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// train | eval | inference
    #[arg(long)]
    pub stage: Stage,

    /// Checkpoint directory: written by train, read by eval and inference
    #[arg(long, default_value = "checkpoints")]
    pub model_ckpt_path: PathBuf,

    /// Registered configuration to run
    #[arg(long, default_value = "BaseConfig")]
    pub config_name: String,

    /// Glob over the input shards, replacing the config's pattern
    #[arg(long)]
    pub data_pattern: Option<String>,

    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Number of parallel decode workers
    #[arg(long)]
    pub num_readers: Option<usize>,

    /// Passes over the input before it is exhausted
    #[arg(long)]
    pub num_epochs: Option<usize>,

    /// Stop training after this many update steps
    #[arg(long)]
    pub max_steps: Option<u64>,

    /// Record layout: frame | video | vlad | score | fixed-width (alias 555)
    #[arg(long)]
    pub input_feat_type: Option<FeatureType>,

    /// Comma-separated feature channel names
    #[arg(long)]
    pub feature_names: Option<String>,

    /// Comma-separated feature channel widths, parallel to --feature-names
    #[arg(long)]
    pub feature_sizes: Option<String>,

    /// Warm-start a fresh training run from this checkpoint directory
    #[arg(long)]
    pub train_init_dir: Option<PathBuf>,
}

/// The application layer never sees clap types.
impl From<RunArgs> for ExperimentRequest {
    fn from(a: RunArgs) -> Self {
        ExperimentRequest {
            stage:           a.stage,
            model_ckpt_path: a.model_ckpt_path,
            config_name:     a.config_name,
            overrides: ConfigOverrides {
                data_pattern:    a.data_pattern,
                batch_size:      a.batch_size,
                num_readers:     a.num_readers,
                num_epochs:      a.num_epochs,
                max_steps:       a.max_steps,
                input_feat_type: a.input_feat_type,
                feature_names:   a.feature_names,
                feature_sizes:   a.feature_sizes,
            },
            train_init_dir:  a.train_init_dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cli::Cli;

    #[test]
    fn test_run_args_become_request() {
        let cli = Cli::try_parse_from([
            "yt8m-harness", "run", "--stage", "eval", "--config-name", "MoeConfig", "--batch-size", "64",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else { panic!("expected run") };
        let request = ExperimentRequest::from(args);

        assert_eq!(request.stage, Stage::Eval);
        assert_eq!(request.config_name, "MoeConfig");
        assert_eq!(request.model_ckpt_path, PathBuf::from("checkpoints"));
        assert_eq!(request.overrides.batch_size, Some(64));
        assert_eq!(request.overrides.data_pattern, None);
        assert_eq!(request.train_init_dir, None);
    }

    #[test]
    fn test_unknown_stage_is_rejected_by_parser() {
        assert!(Cli::try_parse_from(["yt8m-harness", "run", "--stage", "predict"]).is_err());
    }

    #[test]
    fn test_feature_type_override_accepts_alias_and_rejects_unknown() {
        let cli = Cli::try_parse_from([
            "yt8m-harness", "run", "--stage", "train", "--input-feat-type", "555",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else { panic!("expected run") };
        assert_eq!(args.input_feat_type, Some(FeatureType::FixedWidth));

        assert!(Cli::try_parse_from([
            "yt8m-harness", "run", "--stage", "train", "--input-feat-type", "audio",
        ])
        .is_err());
    }
}
