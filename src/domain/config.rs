// ============================================================
// Layer 3 — Experiment Configuration
// ============================================================
// Every setting a run needs, as one serialisable struct. A named
// builder in the config registry creates it for a given stage. CLI
// overrides are folded in, it is validated, and from then on it is
// only ever read.
//
// The resolved config is written next to the checkpoints so that
// eval and inference runs can be compared against the training run
// that produced them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::features::FeatureDescriptor;
use crate::domain::stage::Stage;
use crate::error::ConfigError;

// ─── FeatureType ─────────────────────────────────────────────────────────────
/// Declared layout of the input records; picks the reader variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeatureType {
    Frame,
    Video,
    Vlad,
    Score,
    #[serde(alias = "555")]
    FixedWidth,
}

impl FeatureType {
    pub fn as_str(self) -> &'static str {
        match self {
            FeatureType::Frame      => "frame",
            FeatureType::Video      => "video",
            FeatureType::Vlad       => "vlad",
            FeatureType::Score      => "score",
            FeatureType::FixedWidth => "fixed-width",
        }
    }
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "frame"               => Ok(FeatureType::Frame),
            "video"               => Ok(FeatureType::Video),
            "vlad"                => Ok(FeatureType::Vlad),
            "score"               => Ok(FeatureType::Score),
            "fixed-width" | "555" => Ok(FeatureType::FixedWidth),
            other => Err(ConfigError::UnknownFeatureType(other.to_string())),
        }
    }
}

// ─── ExperimentConfig ────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Registry name this config was resolved from
    pub name:            String,
    pub stage:           Stage,
    pub model_name:      String,
    pub label_loss:      String,
    pub input_feat_type: FeatureType,
    /// Comma-separated channel names, e.g. "mean_rgb,mean_audio"
    pub feature_names:   String,
    /// Comma-separated channel widths, e.g. "1024,128"
    pub feature_sizes:   String,
    /// Glob over the record shards for this stage
    pub data_pattern:    String,
    pub batch_size:      usize,
    pub num_readers:     usize,
    /// None cycles over the shards forever
    pub num_epochs:      Option<usize>,
    pub label_smoothing: f64,
    /// Inputs come from a mounted bulk store that only carries ids,
    /// features and dense labels
    pub use_hdfs:        bool,

    /// Width of the dense label vector the readers decode
    pub label_vocab_size: usize,
    /// Frame-level padding / resampling width
    pub max_frames:       usize,
    pub seed:             u64,

    pub learning_rate_decay:          f64,
    pub learning_rate_decay_examples: u64,
    pub max_steps:                    Option<u64>,
    pub checkpoint_every_steps:       u64,
    pub log_every_steps:              u64,
    /// Labels kept per video in eval GAP and exported predictions
    pub top_k:                        usize,
}

impl ExperimentConfig {
    pub fn feature_descriptor(&self) -> Result<FeatureDescriptor, ConfigError> {
        FeatureDescriptor::parse(&self.feature_names, &self.feature_sizes)
    }

    /// Fold command-line overrides in before the config is frozen.
    pub fn with_overrides(mut self, overrides: &ConfigOverrides) -> Self {
        if let Some(pattern) = &overrides.data_pattern {
            self.data_pattern = pattern.clone();
        }
        if let Some(batch_size) = overrides.batch_size {
            self.batch_size = batch_size;
        }
        if let Some(num_readers) = overrides.num_readers {
            self.num_readers = num_readers;
        }
        if let Some(num_epochs) = overrides.num_epochs {
            self.num_epochs = Some(num_epochs);
        }
        if let Some(max_steps) = overrides.max_steps {
            self.max_steps = Some(max_steps);
        }
        if let Some(feat_type) = overrides.input_feat_type {
            self.input_feat_type = feat_type;
        }
        if let Some(names) = &overrides.feature_names {
            self.feature_names = names.clone();
        }
        if let Some(sizes) = &overrides.feature_sizes {
            self.feature_sizes = sizes.clone();
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: &str) -> ConfigError {
            ConfigError::InvalidValue { field, reason: reason.to_string() }
        }

        self.feature_descriptor()?;

        if self.batch_size == 0 {
            return Err(invalid("batch_size", "must be at least 1"));
        }
        if self.num_readers == 0 {
            return Err(invalid("num_readers", "must be at least 1"));
        }
        if self.num_epochs == Some(0) {
            return Err(invalid("num_epochs", "must be at least 1 when set"));
        }
        if !(0.0..1.0).contains(&self.label_smoothing) {
            return Err(invalid("label_smoothing", "must lie in [0, 1)"));
        }
        if self.label_vocab_size == 0 {
            return Err(invalid("label_vocab_size", "must be at least 1"));
        }
        if self.max_frames == 0 {
            return Err(invalid("max_frames", "must be at least 1"));
        }
        if self.learning_rate_decay <= 0.0 || self.learning_rate_decay_examples == 0 {
            return Err(invalid(
                "learning_rate_decay",
                "decay factor and decay interval must be positive",
            ));
        }
        if self.checkpoint_every_steps == 0 || self.log_every_steps == 0 {
            return Err(invalid("checkpoint_every_steps", "step intervals must be positive"));
        }
        if self.top_k == 0 {
            return Err(invalid("top_k", "must be at least 1"));
        }
        if self.data_pattern.trim().is_empty() {
            return Err(invalid("data_pattern", "must not be empty"));
        }
        Ok(())
    }
}

/// Command-line values that replace registry defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub data_pattern:    Option<String>,
    pub batch_size:      Option<usize>,
    pub num_readers:     Option<usize>,
    pub num_epochs:      Option<usize>,
    pub max_steps:       Option<u64>,
    pub input_feat_type: Option<FeatureType>,
    pub feature_names:   Option<String>,
    pub feature_sizes:   Option<String>,
}
