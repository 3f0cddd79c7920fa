// ============================================================
// Layer 4 — Record Format
// ============================================================
// Shards are JSON-lines files, one video per line:
//
//   {"id": "vid_0001",
//    "labels": [3, 17],
//    "features": {"mean_rgb": [...1024], "mean_audio": [...128]},
//    "frames":   {"rgb": [[...1024], ...], "audio": [[...128], ...]},
//    "label_weights": [...]}
//
// Which maps a reader looks at depends on its variant: video-level
// readers read `features`, frame-level readers read `frames`. Blank
// lines are skipped. Every other malformed line is a decode error
// carrying the file and the 1-based line number.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Deserialize;

use crate::domain::example::Example;
use crate::domain::features::FeatureDescriptor;
use crate::domain::traits::ExampleStream;
use crate::error::InputError;

#[derive(Debug, Clone, Deserialize)]
pub struct RawRecord {
    #[serde(alias = "video_id")]
    pub id:            String,
    #[serde(default)]
    pub labels:        Option<Vec<i64>>,
    #[serde(default)]
    pub features:      BTreeMap<String, Vec<f32>>,
    #[serde(default)]
    pub frames:        BTreeMap<String, Vec<Vec<f32>>>,
    #[serde(default)]
    pub label_weights: Option<Vec<f32>>,
}

impl RawRecord {
    /// Concatenate the named aggregated features in descriptor order.
    pub fn concat_features(&self, layout: &FeatureDescriptor) -> Result<Vec<f32>, String> {
        let mut row = Vec::with_capacity(layout.total_width());
        for (name, size) in layout.channels() {
            let values = self
                .features
                .get(name)
                .ok_or_else(|| format!("missing feature '{name}'"))?;
            if values.len() != size {
                return Err(format!(
                    "feature '{name}' has width {}, expected {size}",
                    values.len()
                ));
            }
            row.extend_from_slice(values);
        }
        Ok(row)
    }

    /// Per-frame rows, each the concatenation of every named channel.
    /// All channels must cover the same number of frames.
    pub fn frame_rows(&self, layout: &FeatureDescriptor) -> Result<Vec<Vec<f32>>, String> {
        let mut channels = Vec::with_capacity(layout.names().len());
        for (name, size) in layout.channels() {
            let frames = self
                .frames
                .get(name)
                .ok_or_else(|| format!("missing frame feature '{name}'"))?;
            if let Some((i, bad)) = frames.iter().enumerate().find(|(_, f)| f.len() != size) {
                return Err(format!(
                    "frame {i} of '{name}' has width {}, expected {size}",
                    bad.len()
                ));
            }
            channels.push((name, frames));
        }

        let num_frames = channels.first().map(|(_, f)| f.len()).unwrap_or(0);
        if num_frames == 0 {
            return Err("record has no frames".into());
        }
        if let Some((name, frames)) = channels.iter().find(|(_, f)| f.len() != num_frames) {
            return Err(format!(
                "frame feature '{name}' has {} frames, expected {num_frames}",
                frames.len()
            ));
        }

        let rows = (0..num_frames)
            .map(|t| {
                let mut row = Vec::with_capacity(layout.total_width());
                for (_, frames) in &channels {
                    row.extend_from_slice(&frames[t]);
                }
                row
            })
            .collect();
        Ok(rows)
    }
}

// ─── Labels ──────────────────────────────────────────────────────────────────
/// How a reader turns a record's label list into tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelSpec {
    /// Width of the dense multi-hot vector
    pub num_classes:    usize,
    /// Length of the padded sparse label list
    pub num_max_labels: usize,
    /// false for inference: labels are ignored entirely
    pub active:         bool,
}

/// Dense multi-hot labels plus the padded sparse list.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedLabels {
    pub dense:  Vec<f32>,
    pub sparse: Vec<i64>,
}

impl LabelSpec {
    /// None when labels are inactive; an error when they are required
    /// but absent or out of range.
    pub fn encode(&self, record: &RawRecord) -> Result<Option<EncodedLabels>, String> {
        if !self.active {
            return Ok(None);
        }
        let labels = record
            .labels
            .as_ref()
            .ok_or_else(|| "record has no labels".to_string())?;

        let mut dense = vec![0.0f32; self.num_classes];
        for &label in labels {
            let idx = usize::try_from(label)
                .ok()
                .filter(|&i| i < self.num_classes)
                .ok_or_else(|| {
                    format!("label {label} outside vocabulary of {}", self.num_classes)
                })?;
            dense[idx] = 1.0;
        }

        // Short lists repeat their last label so every row has the same length
        let pad = labels.last().copied().unwrap_or(0);
        let sparse = labels
            .iter()
            .copied()
            .chain(std::iter::repeat(pad))
            .take(self.num_max_labels)
            .collect();

        Ok(Some(EncodedLabels { dense, sparse }))
    }
}

// ─── Shard Streaming ─────────────────────────────────────────────────────────
/// Open one JSON-lines shard and decode it lazily with `decode`.
pub fn read_records<'a, F>(path: &Path, mut decode: F) -> Result<ExampleStream<'a>, InputError>
where
    F: FnMut(RawRecord) -> Result<Example, String> + 'a,
{
    let file = File::open(path).map_err(|source| InputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let path = path.to_path_buf();

    let stream = BufReader::new(file)
        .lines()
        .enumerate()
        .filter_map(move |(idx, line)| {
            let line = match line {
                Ok(line) => line,
                Err(source) => return Some(Err(InputError::Io { path: path.clone(), source })),
            };
            if line.trim().is_empty() {
                return None;
            }
            let decoded = serde_json::from_str::<RawRecord>(&line)
                .map_err(|e| e.to_string())
                .and_then(&mut decode);
            Some(decoded.map_err(|reason| InputError::Decode {
                path: path.clone(),
                line: idx + 1,
                reason,
            }))
        });

    Ok(Box::new(stream))
}
