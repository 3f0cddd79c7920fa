// ============================================================
// Layer 3 — Stage
// ============================================================
// A run is exactly one of train / eval / inference. The stage is
// chosen once at startup and decides:
//   - whether the input pipeline shuffles
//   - whether records must carry labels
//   - which output bundle the run loop receives

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Train,
    Eval,
    Inference,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Train, Stage::Eval, Stage::Inference];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Train     => "train",
            Stage::Eval      => "eval",
            Stage::Inference => "inference",
        }
    }

    /// Models run in training mode only here.
    pub fn is_training(self) -> bool {
        matches!(self, Stage::Train)
    }

    /// Train and eval compute a loss, so every record needs labels.
    pub fn requires_labels(self) -> bool {
        !matches!(self, Stage::Inference)
    }

    pub fn shuffles_input(self) -> bool {
        self.is_training()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train"     => Ok(Stage::Train),
            "eval"      => Ok(Stage::Eval),
            "inference" => Ok(Stage::Inference),
            other       => Err(ConfigError::UnknownStage(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trips_display() {
        for stage in Stage::ALL {
            assert_eq!(stage.as_str().parse::<Stage>().unwrap(), stage);
        }
    }

    #[test]
    fn test_unknown_stage_is_config_error() {
        let err = "predict".parse::<Stage>().unwrap_err();
        assert_eq!(err, ConfigError::UnknownStage("predict".into()));
    }

    #[test]
    fn test_only_inference_skips_labels() {
        assert!(Stage::Train.requires_labels());
        assert!(Stage::Eval.requires_labels());
        assert!(!Stage::Inference.requires_labels());
        assert!(Stage::Train.shuffles_input());
        assert!(!Stage::Eval.shuffles_input());
    }
}
