// ============================================================
// Layer 3 — Feature Descriptor
// ============================================================
// Configurations name their feature channels as two parallel
// comma-separated strings:
//
//   feature_names = "mean_rgb,mean_audio"
//   feature_sizes = "1024,128"
//
// The descriptor parses them once and guarantees that both lists have
// the same length and that every size is a positive integer. Readers
// concatenate channels in descriptor order, so the total model input
// width is the sum of the sizes.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureDescriptor {
    names: Vec<String>,
    sizes: Vec<usize>,
}

impl FeatureDescriptor {
    /// Parse the comma-separated name and size lists from a configuration.
    pub fn parse(feature_names: &str, feature_sizes: &str) -> Result<Self, ConfigError> {
        let names: Vec<String> = split_list(feature_names)
            .map(str::to_string)
            .collect();
        let raw_sizes: Vec<&str> = split_list(feature_sizes).collect();

        if names.len() != raw_sizes.len() {
            return Err(ConfigError::FeatureArity {
                names: names.len(),
                sizes: raw_sizes.len(),
            });
        }

        let sizes = names
            .iter()
            .zip(&raw_sizes)
            .map(|(name, raw)| match raw.parse::<usize>() {
                Ok(size) if size > 0 => Ok(size),
                _ => Err(ConfigError::BadFeatureSize {
                    name: name.clone(),
                    size: raw.to_string(),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(names, sizes)
    }

    pub fn new(names: Vec<String>, sizes: Vec<usize>) -> Result<Self, ConfigError> {
        if names.len() != sizes.len() {
            return Err(ConfigError::FeatureArity {
                names: names.len(),
                sizes: sizes.len(),
            });
        }
        if names.is_empty() {
            return Err(ConfigError::InvalidValue {
                field:  "feature_names",
                reason: "at least one feature channel is required".into(),
            });
        }
        if let Some((name, _)) = names.iter().zip(&sizes).find(|(_, size)| **size == 0) {
            return Err(ConfigError::BadFeatureSize {
                name: name.clone(),
                size: "0".into(),
            });
        }
        Ok(Self { names, sizes })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// Width of one concatenated feature row.
    pub fn total_width(&self) -> usize {
        self.sizes.iter().sum()
    }

    /// (name, size) pairs in concatenation order.
    pub fn channels(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.names.iter().map(String::as_str).zip(self.sizes.iter().copied())
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}
