//! Inference module: serving predictions from a trained artifact

pub mod service;

pub use service::{features_from_json, ErrorResponse, InferenceService, Prediction, PredictionResponse};
