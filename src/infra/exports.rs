// ============================================================
// Layer 6 — Prediction and Feature Exports
// ============================================================
// Per-video outputs written while a stage runs:
//
//   predictions.csv    VideoId,LabelConfidencePairs
//                      vid1,12 0.981234 7 0.402100 …
//                      (ids with commas, quotes or newlines are quoted)
//   eval_feats.jsonl   {"video_id":"vid1","feats":[…]}
//
// Both writers are buffered and must be finished to flush.

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

pub const PREDICTIONS_HEADER: &str = "VideoId,LabelConfidencePairs";

// ─── PredictionWriter ─────────────────────────────────────────────────────────
pub struct PredictionWriter {
    path: PathBuf,
    out:  BufWriter<File>,
    rows: usize,
}

impl PredictionWriter {
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::create(&path)
            .with_context(|| format!("Cannot create '{}'", path.display()))?;
        let mut out = BufWriter::new(file);
        writeln!(out, "{PREDICTIONS_HEADER}")?;
        Ok(Self { path, out, rows: 0 })
    }

    /// `top` is (label, confidence), most confident first.
    pub fn write_row(&mut self, video_id: &str, top: &[(usize, f32)]) -> Result<()> {
        let pairs: Vec<String> = top
            .iter()
            .map(|(label, confidence)| format!("{label} {confidence:.6}"))
            .collect();
        writeln!(self.out, "{},{}", csv_field(video_id), pairs.join(" "))?;
        self.rows += 1;
        Ok(())
    }

    /// Flush and return the number of rows written.
    pub fn finish(mut self) -> Result<usize> {
        self.out
            .flush()
            .with_context(|| format!("Cannot flush '{}'", self.path.display()))?;
        tracing::info!("Wrote {} predictions to '{}'", self.rows, self.path.display());
        Ok(self.rows)
    }
}

/// RFC 4180 quoting: wrap in quotes and double any embedded quote.
fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

// ─── FeatureWriter ────────────────────────────────────────────────────────────
#[derive(Serialize)]
struct FeatureLine<'a> {
    video_id: &'a str,
    feats:    &'a [f32],
}

pub struct FeatureWriter {
    path: PathBuf,
    out:  BufWriter<File>,
}

impl FeatureWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)
            .with_context(|| format!("Cannot create '{}'", path.display()))?;
        Ok(Self { path, out: BufWriter::new(file) })
    }

    pub fn write(&mut self, video_id: &str, feats: &[f32]) -> Result<()> {
        serde_json::to_writer(&mut self.out, &FeatureLine { video_id, feats })?;
        writeln!(self.out)?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.out
            .flush()
            .with_context(|| format!("Cannot flush '{}'", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prediction_csv_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predictions.csv");
        let mut writer = PredictionWriter::create(&path).unwrap();
        writer.write_row("vid1", &[(12, 0.9812345), (7, 0.4021)]).unwrap();
        writer.write_row("vid2", &[(0, 1.0)]).unwrap();
        assert_eq!(writer.finish().unwrap(), 2);

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "VideoId,LabelConfidencePairs\nvid1,12 0.981234 7 0.402100\nvid2,0 1.000000\n"
        );
    }

    #[test]
    fn test_video_ids_with_separators_are_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predictions.csv");
        let mut writer = PredictionWriter::create(&path).unwrap();
        writer.write_row("a,b", &[(3, 0.5)]).unwrap();
        writer.write_row(r#"say "hi""#, &[(1, 0.25)]).unwrap();
        writer.write_row("plain", &[(2, 1.0)]).unwrap();
        writer.finish().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let rows: Vec<&str> = text.lines().skip(1).collect();
        assert_eq!(
            rows,
            [r#""a,b",3 0.500000"#, r#""say ""hi""",1 0.250000"#, "plain,2 1.000000"]
        );
    }

    #[test]
    fn test_feature_lines_are_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eval_feats.jsonl");
        let mut writer = FeatureWriter::create(&path).unwrap();
        writer.write("a", &[0.5, 1.0]).unwrap();
        writer.finish().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let line: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(line["video_id"], "a");
        assert_eq!(line["feats"], serde_json::json!([0.5, 1.0]));
    }
}
