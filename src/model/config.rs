//! Model Configuration Module
//!
//! The architecture descriptor that is persisted with every artifact, and the
//! training hyperparameters.

use serde::{Deserialize, Serialize};

use crate::utils::error::{CropError, Result};
use crate::NUM_FEATURES;

/// Supported hidden-layer activations
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActivationType {
    #[default]
    Relu,
}

/// Supported output activations
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputActivation {
    #[default]
    Softmax,
}

/// Batch normalization settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BatchNormSpec {
    /// Weight of the current batch in the running statistics
    pub momentum: f64,
    pub epsilon: f64,
}

impl Default for BatchNormSpec {
    fn default() -> Self {
        // Keras defaults: momentum 0.99 on the running value, epsilon 1e-3
        Self {
            momentum: 0.01,
            epsilon: 1e-3,
        }
    }
}

/// One hidden block: Linear -> activation -> BatchNorm -> Dropout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HiddenLayerSpec {
    pub units: usize,
    #[serde(default)]
    pub activation: ActivationType,
    /// L2 penalty coefficient on the kernel
    pub l2: f64,
    #[serde(default)]
    pub batch_norm: BatchNormSpec,
    /// Dropout rate during training
    pub dropout: f64,
}

impl HiddenLayerSpec {
    pub fn new(units: usize) -> Self {
        Self {
            units,
            activation: ActivationType::Relu,
            l2: 0.01,
            batch_norm: BatchNormSpec::default(),
            dropout: 0.5,
        }
    }
}

/// Name and shape of one learnable (or running-statistic) tensor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParameterShape {
    pub name: String,
    pub shape: Vec<usize>,
}

impl ParameterShape {
    pub fn new(name: impl Into<String>, shape: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            shape,
        }
    }
}

impl std::fmt::Display for ParameterShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{:?}", self.name, self.shape)
    }
}

/// Full description of the classifier, persisted inside every artifact
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArchitectureDescriptor {
    pub input_features: usize,
    pub hidden: Vec<HiddenLayerSpec>,
    pub num_classes: usize,
    #[serde(default)]
    pub output_activation: OutputActivation,
}

impl ArchitectureDescriptor {
    /// The standard crop classifier: 5 -> 128 -> 64 -> C
    pub fn crop_classifier(num_classes: usize) -> Self {
        Self {
            input_features: NUM_FEATURES,
            hidden: vec![HiddenLayerSpec::new(128), HiddenLayerSpec::new(64)],
            num_classes,
            output_activation: OutputActivation::Softmax,
        }
    }

    /// Set the batch norm settings of every hidden block
    pub fn with_batch_norm(mut self, batch_norm: BatchNormSpec) -> Self {
        for layer in &mut self.hidden {
            layer.batch_norm = batch_norm;
        }
        self
    }

    /// Validate the descriptor
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(CropError::InvalidConfiguration(msg));

        if self.input_features != NUM_FEATURES {
            return invalid(format!(
                "input_features must be {}, got {}",
                NUM_FEATURES, self.input_features
            ));
        }
        if self.num_classes == 0 {
            return invalid("num_classes must be greater than 0".to_string());
        }
        if self.hidden.is_empty() {
            return invalid("at least one hidden layer is required".to_string());
        }

        for (i, layer) in self.hidden.iter().enumerate() {
            if layer.units == 0 {
                return invalid(format!("hidden layer {} has zero units", i));
            }
            if !(0.0..1.0).contains(&layer.dropout) {
                return invalid(format!("hidden layer {} dropout must be in [0, 1)", i));
            }
            if !(layer.l2 >= 0.0 && layer.l2.is_finite()) {
                return invalid(format!("hidden layer {} l2 must be non-negative", i));
            }
            let bn = layer.batch_norm;
            if !(bn.momentum > 0.0 && bn.momentum <= 1.0) || !(bn.epsilon > 0.0) {
                return invalid(format!("hidden layer {} batch norm settings are invalid", i));
            }
        }

        Ok(())
    }

    /// Shapes of every tensor the model records, in module order
    pub fn parameter_shapes(&self) -> Vec<ParameterShape> {
        let mut shapes = Vec::new();
        let mut fan_in = self.input_features;

        for (i, layer) in self.hidden.iter().enumerate() {
            let units = layer.units;
            shapes.push(ParameterShape::new(format!("blocks.{i}.linear.weight"), vec![fan_in, units]));
            shapes.push(ParameterShape::new(format!("blocks.{i}.linear.bias"), vec![units]));
            shapes.push(ParameterShape::new(format!("blocks.{i}.norm.gamma"), vec![units]));
            shapes.push(ParameterShape::new(format!("blocks.{i}.norm.beta"), vec![units]));
            shapes.push(ParameterShape::new(format!("blocks.{i}.norm.running_mean"), vec![units]));
            shapes.push(ParameterShape::new(format!("blocks.{i}.norm.running_var"), vec![units]));
            fan_in = units;
        }

        shapes.push(ParameterShape::new("output.weight", vec![fan_in, self.num_classes]));
        shapes.push(ParameterShape::new("output.bias", vec![self.num_classes]));
        shapes
    }

    /// Number of learnable scalars (running statistics excluded)
    pub fn num_trainable_params(&self) -> usize {
        self.parameter_shapes()
            .iter()
            .filter(|p| !p.name.contains("running_"))
            .map(|p| p.shape.iter().product::<usize>())
            .sum()
    }

    /// L2 coefficients of the hidden blocks, in order
    pub fn l2_coefficients(&self) -> Vec<f64> {
        self.hidden.iter().map(|layer| layer.l2).collect()
    }
}

/// Early stopping on validation loss
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EarlyStoppingConfig {
    pub enabled: bool,
    /// Epochs without improvement before stopping
    pub patience: usize,
    /// Minimum decrease that counts as an improvement
    pub min_delta: f64,
}

impl Default for EarlyStoppingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            patience: 10,
            min_delta: 0.0,
        }
    }
}

/// Learning rate reduction when validation loss plateaus
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LrReductionConfig {
    pub enabled: bool,
    /// Multiplier applied on a plateau
    pub factor: f64,
    /// Epochs without improvement before reducing
    pub patience: usize,
    /// Lower bound of the learning rate
    pub min_lr: f64,
    /// Minimum decrease that counts as an improvement
    pub min_delta: f64,
}

impl Default for LrReductionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            factor: 0.2,
            patience: 5,
            min_lr: 1e-5,
            min_delta: 1e-4,
        }
    }
}

/// Training configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainingConfig {
    /// Base learning rate for Adam
    pub learning_rate: f64,

    /// Batch size for training
    pub batch_size: usize,

    /// Maximum number of epochs
    pub epochs: usize,

    /// Tail fraction of the train set held out for validation
    pub validation_fraction: f64,

    /// Seed for per-epoch shuffling
    pub shuffle_seed: u64,

    pub early_stopping: EarlyStoppingConfig,

    pub lr_reduction: LrReductionConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            batch_size: 16,
            epochs: 100,
            validation_fraction: 0.2,
            shuffle_seed: 42,
            early_stopping: EarlyStoppingConfig::default(),
            lr_reduction: LrReductionConfig::default(),
        }
    }
}

impl TrainingConfig {
    /// A short run for debugging
    pub fn debug() -> Self {
        Self {
            epochs: 5,
            ..Self::default()
        }
    }

    /// Validate the hyperparameters that do not depend on the data
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(CropError::InvalidConfiguration(msg.to_string()));

        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return invalid("learning_rate must be positive and finite");
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be greater than 0");
        }
        if self.epochs == 0 {
            return invalid("epochs must be greater than 0");
        }
        if !(self.validation_fraction > 0.0 && self.validation_fraction < 1.0) {
            return invalid("validation_fraction must be in (0, 1)");
        }
        if self.early_stopping.enabled && self.early_stopping.patience == 0 {
            return invalid("early_stopping.patience must be greater than 0");
        }
        if !(self.early_stopping.min_delta >= 0.0) {
            return invalid("early_stopping.min_delta must be non-negative");
        }

        let lr = &self.lr_reduction;
        if lr.enabled {
            if !(lr.factor > 0.0 && lr.factor < 1.0) {
                return invalid("lr_reduction.factor must be in (0, 1)");
            }
            if lr.patience == 0 {
                return invalid("lr_reduction.patience must be greater than 0");
            }
            if !(lr.min_lr >= 0.0) || !(lr.min_delta >= 0.0) {
                return invalid("lr_reduction.min_lr and min_delta must be non-negative");
            }
        }

        Ok(())
    }
}
