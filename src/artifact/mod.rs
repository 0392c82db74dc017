//! Versioned model artifacts
//!
//! An artifact is one JSON document holding the architecture descriptor, the
//! label encoding, and the Burn record of the trained parameters (full
//! precision, bincode, base64). It is written atomically and never modified
//! afterwards; architecture changes go through [`migrate`].

use std::fs;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use burn::{
    module::Module,
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::backend::Backend,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::LabelEncoding;
use crate::model::config::{ArchitectureDescriptor, ParameterShape};
use crate::model::CropClassifier;
use crate::utils::error::{CropError, Result};

/// Current artifact format; bump on any incompatible layout change
pub const FORMAT_VERSION: u32 = 1;

type ParameterRecorder = BinBytesRecorder<FullPrecisionSettings>;

/// Provenance of an artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub created_at: DateTime<Utc>,
    /// Version of this crate that wrote the artifact
    pub library_version: String,
    pub best_epoch: Option<usize>,
    pub best_val_loss: Option<f64>,
    pub training_samples: Option<usize>,
    /// Format version of the artifact this one was migrated from
    pub migrated_from: Option<u32>,
}

impl Default for ArtifactMetadata {
    fn default() -> Self {
        Self {
            created_at: Utc::now(),
            library_version: crate::VERSION.to_string(),
            best_epoch: None,
            best_val_loss: None,
            training_samples: None,
            migrated_from: None,
        }
    }
}

/// Trained classifier packaged with everything needed to serve it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub architecture: ArchitectureDescriptor,
    pub encoding: LabelEncoding,
    /// Shapes of the recorded tensors, in module order
    pub parameter_shapes: Vec<ParameterShape>,
    /// Base64 of the binary parameter record
    parameters: String,
    pub metadata: ArtifactMetadata,
}

impl ModelArtifact {
    /// Package a trained model
    pub fn from_model<B: Backend>(
        model: &CropClassifier<B>,
        architecture: &ArchitectureDescriptor,
        encoding: &LabelEncoding,
        metadata: ArtifactMetadata,
    ) -> Result<Self> {
        architecture.validate()?;
        if architecture.num_classes != encoding.len() {
            return Err(CropError::ArchitectureMismatch(format!(
                "architecture has {} outputs but the encoding has {} classes",
                architecture.num_classes,
                encoding.len()
            )));
        }

        let parameter_shapes = model.parameter_shapes();
        check_shapes(&parameter_shapes, &architecture.parameter_shapes())?;

        Ok(Self {
            format_version: FORMAT_VERSION,
            architecture: architecture.clone(),
            encoding: encoding.clone(),
            parameter_shapes,
            parameters: encode_parameters(model)?,
            metadata,
        })
    }

    /// Write the artifact, replacing any existing file atomically
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;
        let tmp = temp_path(path);
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;

        info!("Model artifact saved to {}", path.display());
        Ok(())
    }

    /// Read and verify an artifact of the current format version
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let artifact = Self::load_unchecked(path)?;
        artifact.verify()?;
        Ok(artifact)
    }

    /// Read an artifact without any compatibility checks, e.g. for migration
    pub fn load_unchecked<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)?;
        let artifact: Self = serde_json::from_str(&json)?;
        debug!(
            "Read artifact {} (format v{})",
            path.display(),
            artifact.format_version
        );
        Ok(artifact)
    }

    /// Check format version and internal consistency
    pub fn verify(&self) -> Result<()> {
        if self.format_version != FORMAT_VERSION {
            return Err(CropError::ArchitectureMismatch(format!(
                "artifact format v{} is not the supported v{}; migrate it first",
                self.format_version, FORMAT_VERSION
            )));
        }

        self.architecture
            .validate()
            .map_err(|e| CropError::ArchitectureMismatch(e.to_string()))?;
        self.encoding
            .validate()
            .map_err(|e| CropError::ArchitectureMismatch(e.to_string()))?;

        if self.architecture.num_classes != self.encoding.len() {
            return Err(CropError::ArchitectureMismatch(format!(
                "architecture has {} outputs but the encoding has {} classes",
                self.architecture.num_classes,
                self.encoding.len()
            )));
        }

        check_shapes(&self.parameter_shapes, &self.architecture.parameter_shapes())
    }

    /// Rebuild the model, requiring the stored architecture to be
    /// shape-compatible with `expected`
    pub fn into_model<B: Backend>(
        &self,
        expected: &ArchitectureDescriptor,
        device: &B::Device,
    ) -> Result<CropClassifier<B>> {
        check_compatible(&self.architecture, expected)?;
        self.model(device)
    }

    /// Rebuild the model exactly as stored
    pub fn model<B: Backend>(&self, device: &B::Device) -> Result<CropClassifier<B>> {
        let model = decode_parameters(&self.parameters, &self.architecture, device)?;
        check_shapes(&model.parameter_shapes(), &self.architecture.parameter_shapes())?;
        Ok(model)
    }
}

/// Re-wrap the parameters of `old` in `new_architecture`
///
/// Every tensor must map one-to-one onto a tensor of identical shape in the
/// new architecture; otherwise nothing is converted.
pub fn migrate<B: Backend>(
    old: &ModelArtifact,
    new_architecture: &ArchitectureDescriptor,
    device: &B::Device,
) -> Result<ModelArtifact> {
    new_architecture
        .validate()
        .map_err(|e| CropError::ArchitectureMismatch(e.to_string()))?;

    let old_shapes: Vec<&Vec<usize>> = old.parameter_shapes.iter().map(|p| &p.shape).collect();
    let new_shapes = new_architecture.parameter_shapes();
    let new_shapes: Vec<&Vec<usize>> = new_shapes.iter().map(|p| &p.shape).collect();
    if old_shapes != new_shapes {
        return Err(CropError::ArchitectureMismatch(format!(
            "cannot map {} stored tensors onto {} tensors of the new architecture one-to-one",
            old_shapes.len(),
            new_shapes.len()
        )));
    }
    if new_architecture.num_classes != old.encoding.len() {
        return Err(CropError::ArchitectureMismatch(format!(
            "new architecture has {} outputs but the encoding has {} classes",
            new_architecture.num_classes,
            old.encoding.len()
        )));
    }

    let model: CropClassifier<B> = decode_parameters(&old.parameters, new_architecture, device)?;

    let metadata = ArtifactMetadata {
        created_at: Utc::now(),
        library_version: crate::VERSION.to_string(),
        migrated_from: Some(old.format_version),
        ..old.metadata.clone()
    };

    let migrated = ModelArtifact::from_model(&model, new_architecture, &old.encoding, metadata)?;
    info!(
        "Migrated artifact from format v{} to v{}",
        old.format_version, migrated.format_version
    );
    Ok(migrated)
}

fn encode_parameters<B: Backend>(model: &CropClassifier<B>) -> Result<String> {
    let bytes = <ParameterRecorder as Recorder<B>>::record(
        &ParameterRecorder::default(),
        model.clone().into_record(),
        (),
    )
    .map_err(|e| CropError::Serialization(format!("failed to record parameters: {:?}", e)))?;

    Ok(STANDARD.encode(bytes))
}

fn decode_parameters<B: Backend>(
    encoded: &str,
    architecture: &ArchitectureDescriptor,
    device: &B::Device,
) -> Result<CropClassifier<B>> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| CropError::Serialization(format!("invalid parameter encoding: {}", e)))?;

    let record: <CropClassifier<B> as Module<B>>::Record =
        <ParameterRecorder as Recorder<B>>::load(&ParameterRecorder::default(), bytes, device)
            .map_err(|e| {
                CropError::ArchitectureMismatch(format!(
                    "parameters do not fit the architecture: {:?}",
                    e
                ))
            })?;

    Ok(CropClassifier::new(architecture, device).load_record(record))
}

fn check_shapes(actual: &[ParameterShape], expected: &[ParameterShape]) -> Result<()> {
    if actual.len() != expected.len() {
        return Err(CropError::ArchitectureMismatch(format!(
            "expected {} parameter tensors, found {}",
            expected.len(),
            actual.len()
        )));
    }

    match actual.iter().zip(expected).find(|(a, e)| a != e) {
        Some((a, e)) => Err(CropError::ArchitectureMismatch(format!(
            "parameter {} does not match expected {}",
            a, e
        ))),
        None => Ok(()),
    }
}

fn check_compatible(stored: &ArchitectureDescriptor, expected: &ArchitectureDescriptor) -> Result<()> {
    check_shapes(&stored.parameter_shapes(), &expected.parameter_shapes())?;

    let activations = |d: &ArchitectureDescriptor| {
        (
            d.hidden.iter().map(|l| l.activation).collect::<Vec<_>>(),
            d.output_activation,
        )
    };
    if activations(stored) != activations(expected) {
        return Err(CropError::ArchitectureMismatch(
            "stored activations differ from the expected architecture".to_string(),
        ));
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
