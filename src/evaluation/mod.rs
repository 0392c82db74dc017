//! Evaluation module: held-out metrics and ROC analysis

pub mod evaluator;
pub mod roc;

pub use evaluator::{EvaluationReport, Evaluator};
pub use roc::RocCurve;
