//! Dataset module: records, label encoding, splitting and Burn integration
//!
//! The training table has one row per field observation: five numeric
//! measurements and the crop that grew well under them.

pub mod burn_dataset;
pub mod encoding;
pub mod ideal;
pub mod loader;
pub mod split;

use serde::{Deserialize, Serialize};

pub use burn_dataset::{features_tensor, tensor_to_vec, CropBatch, CropBatcher, CropItem};
pub use encoding::{EncodedDataset, EncodedRecord, LabelEncoding};
pub use ideal::{FeatureRange, IdealConditions};
pub use loader::{load_csv, read_records};
pub use split::{split, split_tail, Split};

use crate::NUM_FEATURES;

/// The five soil and climate measurements the classifier consumes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropFeatures {
    /// Nitrogen content
    #[serde(rename = "N")]
    pub n: f64,
    /// Phosphorus content
    #[serde(rename = "P")]
    pub p: f64,
    /// Potassium content
    #[serde(rename = "K")]
    pub k: f64,
    /// Temperature in degrees Celsius
    pub temperature: f64,
    /// Relative humidity in percent
    pub humidity: f64,
}

impl CropFeatures {
    pub fn new(n: f64, p: f64, k: f64, temperature: f64, humidity: f64) -> Self {
        Self {
            n,
            p,
            k,
            temperature,
            humidity,
        }
    }

    /// Values in `FEATURE_NAMES` order
    pub fn to_array(&self) -> [f64; NUM_FEATURES] {
        [self.n, self.p, self.k, self.temperature, self.humidity]
    }

    /// Values as model input
    pub fn to_f32_array(&self) -> [f32; NUM_FEATURES] {
        self.to_array().map(|v| v as f32)
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

/// One training example: measurements plus the crop label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub features: CropFeatures,
    pub label: String,
}

impl Record {
    pub fn new(features: CropFeatures, label: impl Into<String>) -> Self {
        Self {
            features,
            label: label.into(),
        }
    }
}
