//! # Crop Recommender
//!
//! A Rust library that recommends a crop from five soil and climate
//! measurements (N, P, K, temperature, humidity) using a small feedforward
//! classifier built with the Burn framework.
//!
//! ## Modules
//!
//! - `dataset`: CSV loading, label encoding, splitting and ideal growing ranges
//! - `model`: Dense classifier architecture and its configuration
//! - `training`: Training loop with early stopping and learning rate reduction
//! - `evaluation`: Confusion matrix, per-class metrics and ROC/AUC
//! - `artifact`: Versioned model artifacts and architecture migration
//! - `inference`: Prediction service backed by a loaded artifact
//! - `config`: TOML pipeline configuration
//! - `utils`: Logging, metrics and error types
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use crop_recommender::backend::{default_device, DefaultBackend};
//! use crop_recommender::inference::InferenceService;
//!
//! let service = InferenceService::<DefaultBackend>::load("output/crop_model.json", &default_device())?;
//! let crop = service.predict_crop(90.0, 42.0, 43.0, 20.8, 82.0)?;
//! ```

pub mod artifact;
pub mod backend;
pub mod config;
pub mod dataset;
pub mod evaluation;
pub mod inference;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use artifact::{migrate, ModelArtifact};
pub use config::PipelineConfig;
pub use dataset::encoding::{EncodedDataset, LabelEncoding};
pub use dataset::ideal::{FeatureRange, IdealConditions};
pub use dataset::split::{split, Split};
pub use dataset::{CropFeatures, Record};
pub use evaluation::{EvaluationReport, Evaluator};
pub use inference::{InferenceService, Prediction};
pub use model::config::{ArchitectureDescriptor, TrainingConfig};
pub use model::CropClassifier;
pub use training::supervised::{run_training, TrainingReport};
pub use training::trainer::{TrainedModel, Trainer};
pub use utils::error::{CropError, Result};

/// Input feature names, in the column order the model consumes them
pub const FEATURE_NAMES: [&str; NUM_FEATURES] = ["N", "P", "K", "temperature", "humidity"];

/// Number of input features
pub const NUM_FEATURES: usize = 5;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
