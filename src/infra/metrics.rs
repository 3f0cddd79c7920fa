// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Appends metric rows to CSV files in the checkpoint directory.
//
//   train_metrics.csv  one row every log_every_steps training steps
//   metrics.csv        one row per evaluation run
//
// Example metrics.csv:
//   step,examples,loss,hit_at_one,perr,gap
//   200,1500,7.412300,0.612000,0.488100,0.503400
//
// The header is only written when the file is new, so repeated
// runs against the same directory extend one log.

use std::{
    fs::{self, OpenOptions},
    io::Write,
    marker::PhantomData,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// A metrics record that knows its own CSV layout.
pub trait CsvRow {
    const FILE_NAME: &'static str;
    const HEADER: &'static str;

    fn to_row(&self) -> String;
}

/// Periodic training statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainMetrics {
    pub step:             u64,
    pub loss:             f64,
    pub hit_at_one:       f64,
    pub global_norm:      f64,
    pub learning_rate:    f64,
    pub examples_per_sec: f64,
}

impl CsvRow for TrainMetrics {
    const FILE_NAME: &'static str = "train_metrics.csv";
    const HEADER: &'static str = "step,loss,hit_at_one,global_norm,learning_rate,examples_per_sec";

    fn to_row(&self) -> String {
        format!(
            "{},{:.6},{:.6},{:.6},{:.8},{:.2}",
            self.step,
            self.loss,
            self.hit_at_one,
            self.global_norm,
            self.learning_rate,
            self.examples_per_sec,
        )
    }
}

/// Aggregate quality of one evaluation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalMetrics {
    /// Checkpoint step the weights came from
    pub step:       u64,
    pub examples:   usize,
    /// Mean per-batch loss
    pub loss:       f64,
    pub hit_at_one: f64,
    /// Precision at equal recall rate
    pub perr:       f64,
    /// Global average precision over the top-k predictions per video
    pub gap:        f64,
}

impl CsvRow for EvalMetrics {
    const FILE_NAME: &'static str = "metrics.csv";
    const HEADER: &'static str = "step,examples,loss,hit_at_one,perr,gap";

    fn to_row(&self) -> String {
        format!(
            "{},{},{:.6},{:.6},{:.6},{:.6}",
            self.step, self.examples, self.loss, self.hit_at_one, self.perr, self.gap,
        )
    }
}

pub struct MetricsLogger<R: CsvRow> {
    csv_path: PathBuf,
    _row:     PhantomData<R>,
}

impl<R: CsvRow> MetricsLogger<R> {
    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let csv_path = dir.join(R::FILE_NAME);

        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "{}", R::HEADER)?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path, _row: PhantomData })
    }

    pub fn log(&self, row: &R) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot append to '{}'", self.csv_path.display()))?;
        writeln!(f, "{}", row.to_row())?;
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn eval_row(step: u64) -> EvalMetrics {
        EvalMetrics { step, examples: 90, loss: 0.5, hit_at_one: 0.25, perr: 0.125, gap: 0.0625 }
    }

    #[test]
    fn test_header_written_once_across_loggers() {
        let dir = tempfile::tempdir().unwrap();
        MetricsLogger::<EvalMetrics>::new(dir.path()).unwrap().log(&eval_row(1)).unwrap();
        MetricsLogger::<EvalMetrics>::new(dir.path()).unwrap().log(&eval_row(2)).unwrap();

        let text = fs::read_to_string(dir.path().join("metrics.csv")).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(
            lines,
            [
                "step,examples,loss,hit_at_one,perr,gap",
                "1,90,0.500000,0.250000,0.125000,0.062500",
                "2,90,0.500000,0.250000,0.125000,0.062500",
            ]
        );
    }

    #[test]
    fn test_train_metrics_have_their_own_file() {
        let dir = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::<TrainMetrics>::new(dir.path()).unwrap();
        logger
            .log(&TrainMetrics {
                step:             5,
                loss:             1.0,
                hit_at_one:       0.5,
                global_norm:      2.0,
                learning_rate:    0.01,
                examples_per_sec: 123.456,
            })
            .unwrap();
        assert!(logger.csv_path().ends_with("train_metrics.csv"));
        let text = fs::read_to_string(logger.csv_path()).unwrap();
        assert_eq!(text.lines().nth(1), Some("5,1.000000,0.500000,2.000000,0.01000000,123.46"));
    }
}
