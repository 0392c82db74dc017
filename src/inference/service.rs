//! Inference service
//!
//! Wraps a loaded artifact: the inference-mode model plus the label encoding
//! it was trained with. Every call takes `&self`; nothing a request does can
//! change the loaded parameters, so one service can be shared by any number
//! of callers.

use std::path::Path;
use std::time::Instant;

use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::artifact::{ArtifactMetadata, ModelArtifact};
use crate::dataset::{features_tensor, tensor_to_vec, CropFeatures, IdealConditions, LabelEncoding};
use crate::model::config::ArchitectureDescriptor;
use crate::model::CropClassifier;
use crate::utils::error::{CropError, InputContext, Result};
use crate::utils::metrics::argmax;
use crate::FEATURE_NAMES;

/// Result of a single prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Recommended crop
    pub crop: String,
    pub class_index: usize,
    /// Probability of the recommended crop
    pub confidence: f32,
    /// Full distribution, indexed like the label encoding
    pub probabilities: Vec<f32>,
    pub inference_time_ms: f64,
}

impl Prediction {
    /// The `k` most likely crops, best first
    pub fn top_k(&self, encoding: &LabelEncoding, k: usize) -> Vec<(String, f32)> {
        let mut indexed: Vec<(usize, f32)> = self.probabilities.iter().copied().enumerate().collect();
        indexed.sort_by(|a, b| b.1.total_cmp(&a.1));

        indexed
            .into_iter()
            .take(k)
            .filter_map(|(i, p)| encoding.decode(i).ok().map(|name| (name.to_string(), p)))
            .collect()
    }

    pub fn to_response(&self) -> PredictionResponse {
        PredictionResponse {
            recommended_crop: self.crop.clone(),
        }
    }
}

/// Wire shape of a successful prediction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionResponse {
    #[serde(rename = "recommendedCrop")]
    pub recommended_crop: String,
}

/// Wire shape of a failed request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl From<&CropError> for ErrorResponse {
    fn from(err: &CropError) -> Self {
        Self {
            error: err.to_string(),
        }
    }
}

/// Parse the five features from a JSON request body
///
/// Values may be numbers or numeric strings. A missing key, any other value
/// type, or a non-finite number is `InvalidInput`.
pub fn features_from_json(body: &Value) -> Result<CropFeatures> {
    let object = body.as_object().context("request body must be a JSON object")?;

    let mut values = [0.0f64; 5];
    for (slot, name) in values.iter_mut().zip(FEATURE_NAMES) {
        let value = object
            .get(name)
            .with_context(|| format!("missing feature '{}'", name))?;

        let number = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .with_context(|| format!("feature '{}' is not numeric: {}", name, value))?;

        if !number.is_finite() {
            return Err(CropError::InvalidInput(format!("feature '{}' is not finite", name)));
        }
        *slot = number;
    }

    let [n, p, k, temperature, humidity] = values;
    Ok(CropFeatures::new(n, p, k, temperature, humidity))
}

/// Prediction service backed by one artifact
#[derive(Debug)]
pub struct InferenceService<B: Backend> {
    model: CropClassifier<B>,
    encoding: LabelEncoding,
    architecture: ArchitectureDescriptor,
    metadata: ArtifactMetadata,
    ideal_conditions: Option<IdealConditions>,
    device: B::Device,
}

impl<B: Backend> InferenceService<B> {
    /// Load an artifact from disk, expecting the standard crop architecture
    pub fn load<P: AsRef<Path>>(path: P, device: &B::Device) -> Result<Self> {
        let artifact = ModelArtifact::load(path)?;
        Self::from_artifact(&artifact, device)
    }

    /// Build from an artifact already in memory
    pub fn from_artifact(artifact: &ModelArtifact, device: &B::Device) -> Result<Self> {
        let expected = ArchitectureDescriptor::crop_classifier(artifact.encoding.len());
        let model = artifact.into_model::<B>(&expected, device)?;

        Ok(Self {
            model,
            encoding: artifact.encoding.clone(),
            architecture: artifact.architecture.clone(),
            metadata: artifact.metadata.clone(),
            ideal_conditions: None,
            device: device.clone(),
        })
    }

    /// Attach reference ranges, computed once by the caller
    pub fn with_ideal_conditions(mut self, ideal_conditions: IdealConditions) -> Self {
        self.ideal_conditions = Some(ideal_conditions);
        self
    }

    /// Predict the best crop for one set of measurements
    pub fn predict(&self, features: &CropFeatures) -> Result<Prediction> {
        if !features.is_finite() {
            return Err(CropError::InvalidInput(
                "all features must be finite numbers".to_string(),
            ));
        }

        let start = Instant::now();
        let input = features_tensor::<B>(features.to_f32_array(), &self.device);
        let probabilities = tensor_to_vec(self.model.forward_softmax(input))?;

        let class_index = argmax(&probabilities);
        let crop = self.encoding.decode(class_index)?.to_string();
        let confidence = probabilities.get(class_index).copied().unwrap_or(0.0);

        debug!("Predicted {} ({:.3}) for {:?}", crop, confidence, features);

        Ok(Prediction {
            crop,
            class_index,
            confidence,
            probabilities,
            inference_time_ms: start.elapsed().as_secs_f64() * 1000.0,
        })
    }

    /// Crop name for raw measurements
    pub fn predict_crop(&self, n: f64, p: f64, k: f64, temperature: f64, humidity: f64) -> Result<String> {
        self.predict(&CropFeatures::new(n, p, k, temperature, humidity))
            .map(|prediction| prediction.crop)
    }

    /// Predict from a JSON request body such as `{"N": 90, "P": "42", ...}`
    pub fn predict_json(&self, body: &Value) -> Result<Prediction> {
        let features = features_from_json(body)?;
        self.predict(&features)
    }

    /// Cached per-crop feature ranges, if attached
    pub fn ideal_conditions(&self) -> Option<&IdealConditions> {
        self.ideal_conditions.as_ref()
    }

    pub fn encoding(&self) -> &LabelEncoding {
        &self.encoding
    }

    pub fn architecture(&self) -> &ArchitectureDescriptor {
        &self.architecture
    }

    pub fn metadata(&self) -> &ArtifactMetadata {
        &self.metadata
    }

    pub fn model(&self) -> &CropClassifier<B> {
        &self.model
    }
}
