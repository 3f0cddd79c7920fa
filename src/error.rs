// ============================================================
// Error Taxonomy
// ============================================================
// Three families of failure, all fatal for the run:
//
//   ConfigError — a name, stage or setting that cannot be resolved
//   InputError  — the shard set or a record inside it is unusable
//   ShapeError  — the model and the batches it would be fed disagree
//
// Lower layers return these typed errors. The application and CLI
// layers carry them in anyhow with extra context before exiting,
// so callers can still downcast to the family that failed.

use std::path::PathBuf;

use thiserror::Error;

/// Startup-time configuration failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("no {kind} named '{name}' in namespaces [{}]", searched.join(", "))]
    UnknownName {
        kind:     &'static str,
        name:     String,
        searched: Vec<String>,
    },

    #[error("unknown input feature type '{0}' (expected frame, video, vlad, score or fixed-width)")]
    UnknownFeatureType(String),

    #[error("unknown stage '{0}' (expected train, eval or inference)")]
    UnknownStage(String),

    #[error("feature_names lists {names} entries but feature_sizes lists {sizes}")]
    FeatureArity { names: usize, sizes: usize },

    #[error("feature '{name}' has size '{size}', expected a positive integer")]
    BadFeatureSize { name: String, size: String },

    #[error("invalid setting {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Failures while locating or decoding input shards.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("unable to find files, data_pattern='{pattern}'")]
    NoInputFiles { pattern: String },

    #[error("malformed data_pattern '{pattern}': {source}")]
    BadPattern {
        pattern: String,
        #[source]
        source:  glob::PatternError,
    },

    #[error("cannot read shard {path}: {source}")]
    Io {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed record at {path}:{line}: {reason}")]
    Decode {
        path:   PathBuf,
        line:   usize,
        reason: String,
    },

    #[error("cannot start decode worker: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Disagreements between the configured model and its inputs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ShapeError {
    #[error("model '{model}' requires {input}, which the selected reader does not supply")]
    MissingInput {
        model: String,
        input: &'static str,
    },

    #[error("label vector of width {label_width} cannot be sliced to {num_classes} classes")]
    LabelWidth {
        num_classes: usize,
        label_width: usize,
    },

    #[error("example '{video_id}' disagrees with the rest of its batch: {reason}")]
    InconsistentBatch { video_id: String, reason: String },

    #[error("cannot build a batch from zero examples")]
    EmptyBatch,

    #[error("model '{model}' predicts {outputs} classes but the vocabulary has {vocab_size}")]
    VocabMismatch {
        model:      String,
        vocab_size: usize,
        outputs:    usize,
    },
}
