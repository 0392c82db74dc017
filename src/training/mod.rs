//! Training module
//!
//! This module provides:
//! - The training loop with Adam, L2 penalty and tail validation
//! - Early stopping with best-weight restoration
//! - Learning rate reduction on plateau
//! - The end-to-end pipeline that writes the artifact and report

pub mod early_stopping;
pub mod scheduler;
pub mod supervised;
pub mod trainer;

// Re-export main types for convenience
pub use early_stopping::EarlyStopping;
pub use scheduler::{LearningRateScheduler, LrReduction, SchedulerType};
pub use supervised::{run_training, TrainingOutcome, TrainingReport};
pub use trainer::{validation_loss, TrainedModel, Trainer};

// Re-export TrainingConfig from model::config where it's defined
pub use crate::model::config::TrainingConfig;
