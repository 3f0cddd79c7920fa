// ============================================================
// Layer 5 — Model Capability Interface
// ============================================================
// Every architecture implements VideoModel: one call that maps the
// fixed keyword bundle (ModelInputs) to predictions plus an optional
// loss and optional features.
//
// What the driver needs to know about an architecture *before*
// building it (class count, optimizer, required inputs…) lives in
// its ModelCard. A ModelSpec pairs the card with an Architecture tag.
// Specs are what the registry hands out; the burn module itself is
// only built once the backend is known, through a visitor so the
// training and evaluation loops stay statically dispatched.

use std::path::PathBuf;

use burn::module::AutodiffModule;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use crate::application::registry::{resolve, Namespace};
use crate::domain::traits::OptionalInputs;
use crate::error::{ConfigError, ShapeError};

/// Logistic regression and mixture of experts over pooled features
pub mod video_level;

/// Logistic regression over frame averages
pub mod frame_level;

/// Attention over a memory of weighted frames
pub mod memnet;

use frame_level::FrameLevelLogisticModelConfig;
use memnet::LstmMemNetConfig;
use video_level::{LogisticModelConfig, MoeModelConfig};

// ─── Inputs / Outputs ─────────────────────────────────────────────────────────
/// The keyword contract every model is invoked with.
#[derive(Debug, Clone)]
pub struct ModelInputs<B: Backend> {
    /// [batch, steps, width], L2-normalised if the card asks for it
    pub model_input:     Tensor<B, 3>,
    pub num_frames:      Option<Tensor<B, 1, Int>>,
    pub vocab_size:      usize,
    /// Already sliced to the model's class count
    pub dense_labels:    Option<Tensor<B, 2>>,
    pub sparse_labels:   Option<Tensor<B, 2, Int>>,
    pub label_weights:   Option<Tensor<B, 2>>,
    pub is_training:     bool,
    pub label_smoothing: f64,
    pub input_weights:   Option<Tensor<B, 2>>,
    pub feature_sizes:   Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct ModelOutputs<B: Backend> {
    /// [batch, num_classes]
    pub predictions: Tensor<B, 2>,
    /// Model-supplied loss; the driver falls back to the label loss
    pub loss:        Option<Tensor<B, 1>>,
    /// [batch, feature_dim] embeddings exported by eval
    pub feats:       Option<Tensor<B, 2>>,
}

pub trait VideoModel<B: Backend>: Module<B> {
    fn create_model(&self, inputs: ModelInputs<B>) -> Result<ModelOutputs<B>, ShapeError>;
}

/// Average over the step axis: [batch, steps, width] → [batch, width].
pub(crate) fn pool_steps<B: Backend>(x: Tensor<B, 3>) -> Tensor<B, 2> {
    let [batch, _, width] = x.dims();
    x.mean_dim(1).reshape([batch, width])
}

pub(crate) fn check_vocab<B: Backend>(
    predictions: &Tensor<B, 2>,
    vocab_size:  usize,
    model:       &str,
) -> Result<(), ShapeError> {
    let outputs = predictions.dims()[1];
    if outputs != vocab_size {
        return Err(ShapeError::VocabMismatch { model: model.to_string(), vocab_size, outputs });
    }
    Ok(())
}

pub(crate) fn required<T>(value: Option<T>, model: &str, input: &'static str) -> Result<T, ShapeError> {
    value.ok_or_else(|| ShapeError::MissingInput { model: model.to_string(), input })
}

// ─── ModelCard ────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq)]
pub struct ModelCard {
    pub num_classes:              usize,
    pub num_max_labels:           usize,
    pub normalize_input:          bool,
    pub optimizer_name:           &'static str,
    pub var_moving_average_decay: f64,
    pub base_learning_rate:       f64,
    /// Set for dual-optimizer schedules that alternate two update steps
    pub secondary_learning_rate:  Option<f64>,
    /// Optional batch tensors the architecture cannot run without
    pub requires:                 OptionalInputs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    Logistic,
    MixtureOfExperts,
    FrameLevelLogistic,
    LstmMemNet,
}

/// Where a warm start loads its initial weights from.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainInit {
    pub checkpoint_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    pub name:         &'static str,
    pub architecture: Architecture,
    pub card:         ModelCard,
    pub train_init:   Option<TrainInit>,
}

/// Gets the concrete module once it is built.
pub trait ModelVisitor<B: Backend> {
    type Output;
    fn visit<M: VideoModel<B>>(self, model: M) -> Self::Output;
}

/// Like ModelVisitor, for loops that also take optimizer steps.
pub trait TrainableModelVisitor<B: AutodiffBackend> {
    type Output;
    fn visit<M: VideoModel<B> + AutodiffModule<B>>(self, model: M) -> Self::Output;
}

/// Builds the module named by `$spec.architecture` and hands it to `$visitor`.
macro_rules! visit_architecture {
    ($spec:expr, $backend:ty, $width:expr, $device:expr, $visitor:expr) => {{
        let classes = $spec.card.num_classes;
        match $spec.architecture {
            Architecture::Logistic => $visitor.visit(
                LogisticModelConfig::new($width, classes).init::<$backend>($device),
            ),
            Architecture::MixtureOfExperts => $visitor.visit(
                MoeModelConfig::new($width, classes).init::<$backend>($device),
            ),
            Architecture::FrameLevelLogistic => $visitor.visit(
                FrameLevelLogisticModelConfig::new($width, classes).init::<$backend>($device),
            ),
            Architecture::LstmMemNet => $visitor.visit(
                LstmMemNetConfig::new($width, classes).init::<$backend>($device),
            ),
        }
    }};
}

impl ModelSpec {
    pub fn get_train_init_fn(&self) -> Option<&TrainInit> {
        self.train_init.as_ref()
    }

    pub fn with_train_init(mut self, checkpoint_dir: impl Into<PathBuf>) -> Self {
        self.train_init = Some(TrainInit { checkpoint_dir: checkpoint_dir.into() });
        self
    }

    pub fn build<B: Backend, V: ModelVisitor<B>>(
        &self,
        feature_width: usize,
        device:        &B::Device,
        visitor:       V,
    ) -> V::Output {
        visit_architecture!(self, B, feature_width, device, visitor)
    }

    /// Same as `build`, for visitors that need to train the module.
    pub fn build_trainable<B: AutodiffBackend, V: TrainableModelVisitor<B>>(
        &self,
        feature_width: usize,
        device:        &B::Device,
        visitor:       V,
    ) -> V::Output {
        visit_architecture!(self, B, feature_width, device, visitor)
    }
}

// ─── Registry ─────────────────────────────────────────────────────────────────
pub type ModelFactory = fn() -> ModelSpec;

const YT8M_CLASSES: usize = 4716;

fn logistic_model() -> ModelSpec {
    ModelSpec {
        name:         "LogisticModel",
        architecture: Architecture::Logistic,
        card: ModelCard {
            num_classes:              YT8M_CLASSES,
            num_max_labels:           1,
            normalize_input:          true,
            optimizer_name:           "AdamOptimizer",
            var_moving_average_decay: 0.0,
            base_learning_rate:       0.01,
            secondary_learning_rate:  None,
            requires:                 OptionalInputs::NONE,
        },
        train_init: None,
    }
}

fn moe_model() -> ModelSpec {
    ModelSpec {
        name:         "MoeModel",
        architecture: Architecture::MixtureOfExperts,
        card: ModelCard {
            num_classes:              YT8M_CLASSES,
            num_max_labels:           1,
            normalize_input:          true,
            optimizer_name:           "AdamOptimizer",
            var_moving_average_decay: 0.0,
            base_learning_rate:       0.01,
            secondary_learning_rate:  None,
            requires:                 OptionalInputs::NONE,
        },
        train_init: None,
    }
}

fn frame_level_logistic_model() -> ModelSpec {
    ModelSpec {
        name:         "FrameLevelLogisticModel",
        architecture: Architecture::FrameLevelLogistic,
        card: ModelCard {
            num_classes:              YT8M_CLASSES,
            num_max_labels:           1,
            normalize_input:          false,
            optimizer_name:           "AdamOptimizer",
            var_moving_average_decay: 0.0,
            base_learning_rate:       0.01,
            secondary_learning_rate:  None,
            requires:                 OptionalInputs { num_frames: true, ..OptionalInputs::NONE },
        },
        train_init: None,
    }
}

fn lstm_memnet() -> ModelSpec {
    ModelSpec {
        name:         "LstmMemNet",
        architecture: Architecture::LstmMemNet,
        card: ModelCard {
            num_classes:              YT8M_CLASSES,
            num_max_labels:           1,
            normalize_input:          false,
            optimizer_name:           "AdamOptimizer",
            var_moving_average_decay: 0.9997,
            base_learning_rate:       3e-4,
            secondary_learning_rate:  Some(3e-5),
            requires: OptionalInputs {
                sparse_labels: true,
                num_frames:    true,
                label_weights: false,
                input_weights: true,
            },
        },
        train_init: None,
    }
}

pub static VIDEO_LEVEL_MODELS: Namespace<ModelFactory> = Namespace::new(
    "video_level_models",
    &[
        ("LogisticModel", logistic_model as ModelFactory),
        ("MoeModel",      moe_model as ModelFactory),
    ],
);

pub static FRAME_LEVEL_MODELS: Namespace<ModelFactory> = Namespace::new(
    "frame_level_models",
    &[("FrameLevelLogisticModel", frame_level_logistic_model as ModelFactory)],
);

pub static MEMNET_MODELS: Namespace<ModelFactory> = Namespace::new(
    "memnet_models",
    &[("LstmMemNet", lstm_memnet as ModelFactory)],
);

/// Search order for model names. Earlier namespaces win.
pub static MODEL_NAMESPACES: [&Namespace<ModelFactory>; 3] =
    [&FRAME_LEVEL_MODELS, &VIDEO_LEVEL_MODELS, &MEMNET_MODELS];

pub fn resolve_model(name: &str) -> Result<ModelSpec, ConfigError> {
    resolve("model", name, &MODEL_NAMESPACES).map(|factory| factory())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::backend::{InferBackend, TrainBackend};

    type B = InferBackend;

    struct OutputWidth {
        batch: usize,
        steps: usize,
        width: usize,
    }

    impl ModelVisitor<B> for OutputWidth {
        type Output = Result<[usize; 2], ShapeError>;

        fn visit<M: VideoModel<B>>(self, model: M) -> Self::Output {
            let device = Default::default();
            let inputs = ModelInputs {
                model_input:     Tensor::<B, 3>::ones([self.batch, self.steps, self.width], &device),
                num_frames:      Some(Tensor::<B, 1, Int>::ones([self.batch], &device)),
                vocab_size:      5,
                dense_labels:    None,
                sparse_labels:   Some(Tensor::<B, 2, Int>::zeros([self.batch, 1], &device)),
                label_weights:   None,
                is_training:     false,
                label_smoothing: 0.0,
                input_weights:   Some(Tensor::<B, 2>::ones([self.batch, self.steps], &device)),
                feature_sizes:   vec![self.width],
            };
            model.create_model(inputs).map(|out| out.predictions.dims())
        }
    }

    struct ParamCount;

    impl ModelVisitor<B> for ParamCount {
        type Output = usize;

        fn visit<M: VideoModel<B>>(self, model: M) -> usize {
            model.num_params()
        }
    }

    impl TrainableModelVisitor<TrainBackend> for ParamCount {
        type Output = usize;

        fn visit<M: VideoModel<TrainBackend> + AutodiffModule<TrainBackend>>(self, model: M) -> usize {
            model.num_params()
        }
    }

    fn small(mut spec: ModelSpec) -> ModelSpec {
        spec.card.num_classes = 5;
        spec
    }

    #[test]
    fn test_every_registered_model_predicts_num_classes() {
        for ns in MODEL_NAMESPACES {
            for name in ns.names() {
                let spec = small(resolve_model(name).unwrap());
                let dims = spec
                    .build::<B, _>(3, &Default::default(), OutputWidth { batch: 2, steps: 4, width: 3 })
                    .unwrap();
                assert_eq!(dims, [2, 5], "{name}");
            }
        }
    }

    #[test]
    fn test_trainable_build_matches_inference_build() {
        for name in ["LogisticModel", "MoeModel", "FrameLevelLogisticModel", "LstmMemNet"] {
            let spec = small(resolve_model(name).unwrap());
            let plain = spec.build::<B, _>(3, &Default::default(), ParamCount);
            let trainable = spec.build_trainable::<TrainBackend, _>(3, &Default::default(), ParamCount);
            assert!(plain > 0, "{name}");
            assert_eq!(plain, trainable, "{name}");
        }
    }

    #[test]
    fn test_unknown_model_lists_namespaces() {
        let err = resolve_model("TransformerModel").unwrap_err();
        assert_eq!(
            err.to_string(),
            "no model named 'TransformerModel' in namespaces \
             [frame_level_models, video_level_models, memnet_models]"
        );
    }

    #[test]
    fn test_builtin_models_have_no_warm_start() {
        let spec = resolve_model("LogisticModel").unwrap();
        assert!(spec.get_train_init_fn().is_none());
        let spec = spec.with_train_init("ckpt/base");
        assert_eq!(spec.get_train_init_fn().unwrap().checkpoint_dir, PathBuf::from("ckpt/base"));
    }
}
