//! Model module: the dense crop classifier and its configuration

pub mod classifier;
pub mod config;

// Re-export main types for convenience
pub use classifier::{CropClassifier, DenseBlock};
pub use config::{ArchitectureDescriptor, HiddenLayerSpec, ParameterShape, TrainingConfig};
