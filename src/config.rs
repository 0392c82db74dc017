//! Pipeline configuration
//!
//! Everything one training run needs, loadable from TOML. Omitted keys fall
//! back to the defaults below, so a config file only lists what it changes.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::model::config::{ArchitectureDescriptor, BatchNormSpec, TrainingConfig};
use crate::utils::error::{CropError, Result};

/// Read a TOML file into any deserializable config type
pub fn load_toml_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let content = fs::read_to_string(path).map_err(|e| {
        CropError::InvalidConfiguration(format!("failed to read config {}: {e}", path.display()))
    })?;

    toml::from_str(&content).map_err(|e| {
        CropError::InvalidConfiguration(format!("failed to parse config {}: {e}", path.display()))
    })
}

/// Adjustments to the standard architecture that keep its tensor shapes
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ArchitectureOverrides {
    /// L2 coefficient for every hidden kernel
    pub l2: Option<f64>,
    /// Dropout rate for every hidden block
    pub dropout: Option<f64>,
    pub batch_norm_momentum: Option<f64>,
    pub batch_norm_epsilon: Option<f64>,
}

impl ArchitectureOverrides {
    /// Standard architecture for `num_classes` with the overrides applied
    pub fn descriptor(&self, num_classes: usize) -> ArchitectureDescriptor {
        let defaults = BatchNormSpec::default();
        let batch_norm = BatchNormSpec {
            momentum: self.batch_norm_momentum.unwrap_or(defaults.momentum),
            epsilon: self.batch_norm_epsilon.unwrap_or(defaults.epsilon),
        };
        let mut descriptor = ArchitectureDescriptor::crop_classifier(num_classes).with_batch_norm(batch_norm);

        for layer in &mut descriptor.hidden {
            if let Some(l2) = self.l2 {
                layer.l2 = l2;
            }
            if let Some(dropout) = self.dropout {
                layer.dropout = dropout;
            }
        }

        descriptor
    }
}

/// Settings for a full train-evaluate-package run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Training table (CSV with N,P,K,temperature,humidity,label)
    pub data_path: PathBuf,

    /// Where the model artifact is written
    pub artifact_path: PathBuf,

    /// Where the training report is written
    pub report_path: PathBuf,

    /// Fraction of records held out for the final evaluation
    pub test_fraction: f64,

    /// Seed of the held-out split
    pub split_seed: u64,

    pub architecture: ArchitectureOverrides,

    pub training: TrainingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data/Crop_recommendation.csv"),
            artifact_path: PathBuf::from("output/crop_model.json"),
            report_path: PathBuf::from("output/training_report.json"),
            test_fraction: 0.2,
            split_seed: 42,
            architecture: ArchitectureOverrides::default(),
            training: TrainingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: Self = load_toml_config(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    /// Validate everything that can be checked before the data is read
    pub fn validate(&self) -> Result<()> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(CropError::InvalidConfiguration(format!(
                "test_fraction must be in (0, 1), got {}",
                self.test_fraction
            )));
        }
        if self.artifact_path == self.report_path {
            return Err(CropError::InvalidConfiguration(
                "artifact_path and report_path must differ".to_string(),
            ));
        }

        // Class count is unknown here; any positive value checks the rest
        self.architecture.descriptor(1).validate()?;
        self.training.validate()
    }
}
