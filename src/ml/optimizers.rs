// ============================================================
// Layer 5 — Optimizers
// ============================================================
// A model card names its optimizer ("AdamOptimizer", …). The name
// resolves to an OptimizerKind, a constructor handle. The trainer
// builds the concrete optimizer once the model type is known, which
// is why construction goes through a visitor: each burn optimizer
// has its own type, and the training loop is generic over it.
//
//   Adam    m = β1·m + (1−β1)·g ; v = β2·v + (1−β2)·g² ; θ −= lr·m/(√v+ε)
//   SGD     θ −= lr·g
//   RMSProp v = ρ·v + (1−ρ)·g² ; θ −= lr·g/(√v+ε)
//   AdaGrad v += g² ; θ −= lr·g/(√v+ε)

use burn::module::AutodiffModule;
use burn::optim::{AdaGradConfig, AdamConfig, Optimizer, RmsPropConfig, SgdConfig};
use burn::tensor::backend::AutodiffBackend;

use crate::application::registry::{resolve, Namespace};
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerKind {
    Adam,
    GradientDescent,
    RmsProp,
    Adagrad,
}

/// Receives a factory for the concrete optimizer type.
pub trait OptimizerVisitor<M, B>
where
    M: AutodiffModule<B>,
    B: AutodiffBackend,
{
    type Output;

    fn visit<O, F>(self, make: F) -> Self::Output
    where
        O: Optimizer<M, B>,
        F: Fn() -> O;
}

impl OptimizerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OptimizerKind::Adam            => "AdamOptimizer",
            OptimizerKind::GradientDescent => "GradientDescentOptimizer",
            OptimizerKind::RmsProp         => "RMSPropOptimizer",
            OptimizerKind::Adagrad         => "AdagradOptimizer",
        }
    }

    pub fn init<M, B, V>(self, visitor: V) -> V::Output
    where
        M: AutodiffModule<B>,
        B: AutodiffBackend,
        V: OptimizerVisitor<M, B>,
    {
        match self {
            OptimizerKind::Adam => visitor.visit(|| AdamConfig::new().with_epsilon(1e-8).init()),
            OptimizerKind::GradientDescent => visitor.visit(|| SgdConfig::new().init()),
            OptimizerKind::RmsProp => visitor.visit(|| RmsPropConfig::new().init()),
            OptimizerKind::Adagrad => visitor.visit(|| AdaGradConfig::new().init()),
        }
    }
}

pub static OPTIMIZERS: Namespace<OptimizerKind> = Namespace::new(
    "optimizers",
    &[
        ("AdamOptimizer",            OptimizerKind::Adam),
        ("GradientDescentOptimizer", OptimizerKind::GradientDescent),
        ("RMSPropOptimizer",         OptimizerKind::RmsProp),
        ("AdagradOptimizer",         OptimizerKind::Adagrad),
    ],
);

pub fn resolve_optimizer(name: &str) -> Result<OptimizerKind, ConfigError> {
    resolve("optimizer", name, &[&OPTIMIZERS])
}
