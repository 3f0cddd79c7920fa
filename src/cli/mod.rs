// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses the command line with `clap` and delegates to Layer 2.
//
//   run  --stage {train,eval,inference} --model-ckpt-path PATH
//        --config-name NAME [overrides]
//   list
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, RunArgs};

use crate::application::config_registry::BASE_CONFIGS;
use crate::application::dispatcher::{dispatch, StageOutcome};
use crate::application::experiment::ExperimentRequest;
use crate::domain::stage::Stage;
use crate::ml::losses::LOSSES;
use crate::ml::models::MODEL_NAMESPACES;
use crate::ml::optimizers::OPTIMIZERS;

#[derive(Parser, Debug)]
#[command(
    name = "yt8m-harness",
    version = "0.1.0",
    about = "Train, evaluate and run video-classification models over sharded feature records."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Run(args) => run_stage(args),
            Commands::List      => {
                list_registries();
                Ok(())
            }
        }
    }
}

fn run_stage(args: RunArgs) -> Result<()> {
    let request = ExperimentRequest::from(args);
    tracing::info!(
        "Starting {} with '{}' in '{}'",
        request.stage,
        request.config_name,
        request.model_ckpt_path.display()
    );

    match dispatch(&request)? {
        StageOutcome::Trained(summary) => println!(
            "Training complete: {} steps, {} examples, final loss {}, last checkpoint {}.",
            summary.steps.total(),
            summary.examples,
            summary.final_loss.map_or("n/a".to_string(), |l| format!("{l:.4}")),
            summary.last_checkpoint.map_or("none".to_string(), |s| format!("step {s}")),
        ),
        StageOutcome::Evaluated(m) => println!(
            "Evaluation of step {}: {} videos | loss={:.4} | hit@1={:.4} | perr={:.4} | gap={:.4}",
            m.step, m.examples, m.loss, m.hit_at_one, m.perr, m.gap,
        ),
        StageOutcome::Predicted { videos } => println!(
            "Wrote predictions for {videos} videos to '{}'.",
            request.model_ckpt_path.join("predictions.csv").display(),
        ),
    }
    Ok(())
}

fn list_registries() {
    println!("stages: {}", Stage::ALL.map(Stage::as_str).join(", "));
    println!("configs ({}): {}", BASE_CONFIGS.name(), BASE_CONFIGS.names().collect::<Vec<_>>().join(", "));
    for ns in MODEL_NAMESPACES {
        println!("models ({}): {}", ns.name(), ns.names().collect::<Vec<_>>().join(", "));
    }
    println!("losses ({}): {}", LOSSES.name(), LOSSES.names().collect::<Vec<_>>().join(", "));
    println!("optimizers ({}): {}", OPTIMIZERS.name(), OPTIMIZERS.names().collect::<Vec<_>>().join(", "));
}
