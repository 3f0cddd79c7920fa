// ============================================================
// Layer 4 — Reader Selection
// ============================================================
// One Reader variant per declared input layout:
//
//   video        → AggregatedFeatureReader   one step of pooled features
//   frame        → FrameFeatureReader        max_frames steps, zero-padded
//   vlad         → VladFeatureReader         one step, dense labels only
//   score        → ScoreFeatureReader        one step, per-class weights
//   fixed-width  → FixedWidthFeatureReader   max_frames resampled steps
//
// Exactly one reader exists per run. It is shared by every decode
// worker, so readers hold only immutable settings.

use std::path::Path;
use std::sync::Arc;

use crate::data::record::{read_records, LabelSpec, RawRecord};
use crate::domain::config::FeatureType;
use crate::domain::example::Example;
use crate::domain::features::FeatureDescriptor;
use crate::domain::stage::Stage;
use crate::domain::traits::{ExampleStream, OptionalInputs, Reader};
use crate::error::InputError;

/// Build the reader for `feat_type`.
///
/// `num_classes` is the width of the decoded dense label vector; the
/// graph assembler slices it down to the model's class count later.
pub fn select_reader(
    feat_type:      FeatureType,
    num_classes:    usize,
    layout:         &FeatureDescriptor,
    num_max_labels: usize,
    max_frames:     usize,
    stage:          Stage,
) -> Arc<dyn Reader> {
    let labels = LabelSpec {
        num_classes,
        num_max_labels,
        active: stage.requires_labels(),
    };
    let layout = layout.clone();

    tracing::info!(
        "Reader: {} over [{}] (width {}), {} label classes",
        feat_type,
        layout.names().join(", "),
        layout.total_width(),
        num_classes,
    );

    match feat_type {
        FeatureType::Video      => Arc::new(AggregatedFeatureReader { layout, labels }),
        FeatureType::Frame      => Arc::new(FrameFeatureReader { layout, labels, max_frames }),
        FeatureType::Vlad       => Arc::new(VladFeatureReader { layout, labels }),
        FeatureType::Score      => Arc::new(ScoreFeatureReader { layout, labels }),
        FeatureType::FixedWidth => Arc::new(FixedWidthFeatureReader { layout, labels, max_frames }),
    }
}

fn single_step(video_id: String, features: Vec<f32>) -> Example {
    Example {
        video_id,
        features,
        steps:         1,
        dense_labels:  None,
        sparse_labels: None,
        num_frames:    None,
        label_weights: None,
        input_weights: None,
    }
}

// ─── AggregatedFeatureReader ─────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct AggregatedFeatureReader {
    layout: FeatureDescriptor,
    labels: LabelSpec,
}

impl AggregatedFeatureReader {
    fn decode(&self, record: RawRecord) -> Result<Example, String> {
        let features = record.concat_features(&self.layout)?;
        let labels = self.labels.encode(&record)?;
        let mut example = single_step(record.id, features);
        example.num_frames = Some(1);
        if let Some(labels) = labels {
            example.dense_labels = Some(labels.dense);
            example.sparse_labels = Some(labels.sparse);
        }
        Ok(example)
    }
}

impl Reader for AggregatedFeatureReader {
    fn feature_type(&self) -> FeatureType {
        FeatureType::Video
    }

    fn provides(&self) -> OptionalInputs {
        OptionalInputs {
            sparse_labels: self.labels.active,
            num_frames:    true,
            ..OptionalInputs::NONE
        }
    }

    fn prepare_reader<'a>(&'a self, source: &Path) -> Result<ExampleStream<'a>, InputError> {
        read_records(source, move |record| self.decode(record))
    }
}

// ─── FrameFeatureReader ──────────────────────────────────────────────────────
/// Truncates long videos and zero-pads short ones to `max_frames`.
#[derive(Debug, Clone)]
pub struct FrameFeatureReader {
    layout:     FeatureDescriptor,
    labels:     LabelSpec,
    max_frames: usize,
}

impl FrameFeatureReader {
    fn decode(&self, record: RawRecord) -> Result<Example, String> {
        let rows = record.frame_rows(&self.layout)?;
        let labels = self.labels.encode(&record)?;

        let width = self.layout.total_width();
        let real = rows.len().min(self.max_frames);
        let mut features = Vec::with_capacity(self.max_frames * width);
        for row in rows.iter().take(real) {
            features.extend_from_slice(row);
        }
        features.resize(self.max_frames * width, 0.0);

        let mut mask = vec![1.0f32; real];
        mask.resize(self.max_frames, 0.0);

        Ok(Example {
            video_id:      record.id,
            features,
            steps:         self.max_frames,
            dense_labels:  labels.as_ref().map(|l| l.dense.clone()),
            sparse_labels: labels.map(|l| l.sparse),
            num_frames:    Some(real),
            label_weights: None,
            input_weights: Some(mask),
        })
    }
}

impl Reader for FrameFeatureReader {
    fn feature_type(&self) -> FeatureType {
        FeatureType::Frame
    }

    fn provides(&self) -> OptionalInputs {
        OptionalInputs {
            sparse_labels: self.labels.active,
            num_frames:    true,
            label_weights: false,
            input_weights: true,
        }
    }

    fn prepare_reader<'a>(&'a self, source: &Path) -> Result<ExampleStream<'a>, InputError> {
        read_records(source, move |record| self.decode(record))
    }
}

// ─── VladFeatureReader ───────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct VladFeatureReader {
    layout: FeatureDescriptor,
    labels: LabelSpec,
}

impl VladFeatureReader {
    fn decode(&self, record: RawRecord) -> Result<Example, String> {
        let features = record.concat_features(&self.layout)?;
        let labels = self.labels.encode(&record)?;
        let mut example = single_step(record.id, features);
        example.dense_labels = labels.map(|l| l.dense);
        Ok(example)
    }
}

impl Reader for VladFeatureReader {
    fn feature_type(&self) -> FeatureType {
        FeatureType::Vlad
    }

    fn provides(&self) -> OptionalInputs {
        OptionalInputs::NONE
    }

    fn prepare_reader<'a>(&'a self, source: &Path) -> Result<ExampleStream<'a>, InputError> {
        read_records(source, move |record| self.decode(record))
    }
}

// ─── ScoreFeatureReader ──────────────────────────────────────────────────────
/// Reads score vectors of earlier models. Records may carry per-class
/// label weights; without them every class weighs 1.
#[derive(Debug, Clone)]
pub struct ScoreFeatureReader {
    layout: FeatureDescriptor,
    labels: LabelSpec,
}

impl ScoreFeatureReader {
    fn decode(&self, record: RawRecord) -> Result<Example, String> {
        let features = record.concat_features(&self.layout)?;
        let labels = self.labels.encode(&record)?;
        let mut example = single_step(record.id.clone(), features);
        example.num_frames = Some(1);

        if let Some(labels) = labels {
            let weights = match &record.label_weights {
                Some(w) if w.len() != self.labels.num_classes => {
                    return Err(format!(
                        "label_weights has width {}, expected {}",
                        w.len(),
                        self.labels.num_classes
                    ));
                }
                Some(w) => w.clone(),
                None => vec![1.0; self.labels.num_classes],
            };
            example.dense_labels = Some(labels.dense);
            example.sparse_labels = Some(labels.sparse);
            example.label_weights = Some(weights);
        }
        Ok(example)
    }
}

impl Reader for ScoreFeatureReader {
    fn feature_type(&self) -> FeatureType {
        FeatureType::Score
    }

    fn provides(&self) -> OptionalInputs {
        OptionalInputs {
            sparse_labels: self.labels.active,
            num_frames:    true,
            label_weights: self.labels.active,
            input_weights: false,
        }
    }

    fn prepare_reader<'a>(&'a self, source: &Path) -> Result<ExampleStream<'a>, InputError> {
        read_records(source, move |record| self.decode(record))
    }
}

// ─── FixedWidthFeatureReader ─────────────────────────────────────────────────
/// Resamples every video to exactly `max_frames` steps: step i takes
/// frame floor(i * n / max_frames). Short videos repeat frames, long
/// ones skip them.
#[derive(Debug, Clone)]
pub struct FixedWidthFeatureReader {
    layout:     FeatureDescriptor,
    labels:     LabelSpec,
    max_frames: usize,
}

impl FixedWidthFeatureReader {
    fn decode(&self, record: RawRecord) -> Result<Example, String> {
        let rows = record.frame_rows(&self.layout)?;
        let labels = self.labels.encode(&record)?;

        let n = rows.len();
        let mut features = Vec::with_capacity(self.max_frames * self.layout.total_width());
        for i in 0..self.max_frames {
            features.extend_from_slice(&rows[i * n / self.max_frames]);
        }

        Ok(Example {
            video_id:      record.id,
            features,
            steps:         self.max_frames,
            dense_labels:  labels.as_ref().map(|l| l.dense.clone()),
            sparse_labels: labels.map(|l| l.sparse),
            num_frames:    Some(self.max_frames),
            label_weights: None,
            input_weights: Some(vec![1.0; self.max_frames]),
        })
    }
}

impl Reader for FixedWidthFeatureReader {
    fn feature_type(&self) -> FeatureType {
        FeatureType::FixedWidth
    }

    fn provides(&self) -> OptionalInputs {
        OptionalInputs {
            sparse_labels: self.labels.active,
            num_frames:    true,
            label_weights: false,
            input_weights: true,
        }
    }

    fn prepare_reader<'a>(&'a self, source: &Path) -> Result<ExampleStream<'a>, InputError> {
        read_records(source, move |record| self.decode(record))
    }
}
