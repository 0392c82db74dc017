//! End-to-end supervised pipeline
//!
//! load CSV -> fit encoding -> ideal ranges -> held-out split -> train ->
//! evaluate -> write artifact and training report.

use std::fs;
use std::path::Path;
use std::time::Instant;

use burn::tensor::backend::AutodiffBackend;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::trainer::Trainer;
use crate::artifact::{ArtifactMetadata, ModelArtifact};
use crate::config::PipelineConfig;
use crate::dataset::{load_csv, split, EncodedDataset, IdealConditions, LabelEncoding};
use crate::evaluation::{EvaluationReport, Evaluator};
use crate::model::CropClassifier;
use crate::utils::error::Result;
use crate::utils::metrics::TrainingHistory;

/// Everything learned about one training run, persisted next to the artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub created_at: DateTime<Utc>,
    pub library_version: String,
    pub config: PipelineConfig,
    pub classes: Vec<String>,
    /// Records in the train partition (fit + validation)
    pub training_samples: usize,
    /// Records in the held-out partition
    pub evaluation_samples: usize,
    pub history: TrainingHistory,
    /// 0-indexed epoch whose parameters were kept
    pub best_epoch: usize,
    pub best_val_loss: f64,
    pub stopped_early: bool,
    pub final_lr: f64,
    pub duration_secs: f64,
    /// Metrics on the held-out partition
    pub evaluation: EvaluationReport,
}

impl TrainingReport {
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("Training report saved to {}", path.display());
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Products of [`run_training`]
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub artifact: ModelArtifact,
    pub report: TrainingReport,
    /// Per-crop ranges over the full table
    pub ideal_conditions: IdealConditions,
}

/// Run the whole pipeline described by `config`
///
/// The artifact and report are only written once training and evaluation
/// have both succeeded.
pub fn run_training<B>(config: &PipelineConfig, device: &B::Device) -> Result<TrainingOutcome>
where
    B: AutodiffBackend,
{
    config.validate()?;
    let start = Instant::now();

    let records = load_csv(&config.data_path)?;
    let encoding = LabelEncoding::fit(&records)?;
    let ideal_conditions = IdealConditions::from_records(&records);
    let dataset = EncodedDataset::encode(&records, &encoding)?;
    info!(
        "{} records, {} crops: {}",
        dataset.len(),
        encoding.len(),
        encoding.classes().join(", ")
    );
    debug!("Ideal ranges computed for {} crops", ideal_conditions.len());
    for (crop, count) in encoding.classes().iter().zip(dataset.class_counts()) {
        debug!("  {}: {} records", crop, count);
    }

    let partition = split(&dataset, config.test_fraction, config.split_seed)?;
    let descriptor = config.architecture.descriptor(encoding.len());
    descriptor.validate()?;

    let model = CropClassifier::<B>::new(&descriptor, device);
    let trainer = Trainer::<B>::new(config.training.clone(), device.clone());
    let trained = trainer.train(model, &descriptor, &partition.train)?;

    let evaluation = Evaluator::default().evaluate(&trained.model, &partition.eval, device)?;

    let metadata = ArtifactMetadata {
        best_epoch: Some(trained.best_epoch),
        best_val_loss: Some(trained.best_val_loss),
        training_samples: Some(partition.train.len()),
        ..ArtifactMetadata::default()
    };
    let artifact = ModelArtifact::from_model(&trained.model, &descriptor, &encoding, metadata)?;

    let report = TrainingReport {
        created_at: Utc::now(),
        library_version: crate::VERSION.to_string(),
        config: config.clone(),
        classes: encoding.classes().to_vec(),
        training_samples: partition.train.len(),
        evaluation_samples: partition.eval.len(),
        history: trained.history,
        best_epoch: trained.best_epoch,
        best_val_loss: trained.best_val_loss,
        stopped_early: trained.stopped_early,
        final_lr: trained.final_lr,
        duration_secs: start.elapsed().as_secs_f64(),
        evaluation,
    };

    artifact.save(&config.artifact_path)?;
    report.save(&config.report_path)?;

    Ok(TrainingOutcome {
        artifact,
        report,
        ideal_conditions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DefaultBackend, TrainingBackend};
    use crate::config::ArchitectureOverrides;
    use crate::dataset::test_support::synthetic_records;
    use crate::dataset::{CropFeatures, Record};
    use crate::inference::InferenceService;
    use crate::model::config::TrainingConfig;
    use crate::utils::error::CropError;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_csv(dir: &Path, records: &[Record]) -> PathBuf {
        let path = dir.join("crops.csv");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "N,P,K,temperature,humidity,ph,rainfall,label").unwrap();
        for r in records {
            let f = r.features;
            writeln!(
                file,
                "{},{},{},{},{},6.5,200.0,{}",
                f.n, f.p, f.k, f.temperature, f.humidity, r.label
            )
            .unwrap();
        }
        path
    }

    fn config(dir: &Path, data_path: PathBuf) -> PipelineConfig {
        PipelineConfig {
            data_path,
            artifact_path: dir.join("out/crop_model.json"),
            report_path: dir.join("out/training_report.json"),
            architecture: ArchitectureOverrides {
                batch_norm_momentum: Some(0.1),
                ..Default::default()
            },
            training: TrainingConfig {
                learning_rate: 0.01,
                epochs: 30,
                ..TrainingConfig::default()
            },
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_pipeline_recommends_rice() {
        let dir = TempDir::new().unwrap();
        let records = synthetic_records(40, 11);
        let config = config(dir.path(), write_csv(dir.path(), &records));

        let outcome = run_training::<TrainingBackend>(&config, &Default::default()).unwrap();

        assert_eq!(outcome.report.training_samples, 128);
        assert_eq!(outcome.report.evaluation_samples, 32);
        assert_eq!(outcome.report.evaluation.total_samples, 32);
        assert!(outcome.report.evaluation.accuracy > 0.8);
        assert_eq!(outcome.ideal_conditions.len(), 4);

        let service = InferenceService::<DefaultBackend>::load(&config.artifact_path, &Default::default())
            .unwrap()
            .with_ideal_conditions(outcome.ideal_conditions.clone());
        let crop = service.predict_crop(90.0, 42.0, 43.0, 20.8, 82.0).unwrap();
        assert_eq!(crop, "rice");

        let rice_n = service.ideal_conditions().unwrap().range("rice", "N").unwrap();
        assert!(rice_n.min >= 60.0 && rice_n.max <= 99.0);

        let reloaded = TrainingReport::load(&config.report_path).unwrap();
        assert_eq!(reloaded.classes, vec!["chickpea", "kidneybeans", "maize", "rice"]);
        assert_eq!(reloaded.best_epoch, outcome.report.best_epoch);
        assert_eq!(reloaded.evaluation.accuracy, outcome.report.evaluation.accuracy);
    }

    #[test]
    fn test_bad_config_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let records: Vec<Record> = (0..10)
            .map(|i| {
                let crop = if i % 2 == 0 { "maize" } else { "rice" };
                Record::new(CropFeatures::new(80.0, 40.0, 20.0, 22.0, 70.0), crop)
            })
            .collect();
        let mut config = config(dir.path(), write_csv(dir.path(), &records));
        config.training.batch_size = 64;

        let result = run_training::<TrainingBackend>(&config, &Default::default());
        assert!(matches!(result, Err(CropError::InvalidConfiguration(_))));
        assert!(!config.artifact_path.exists());
        assert!(!config.report_path.exists());
    }

    #[test]
    fn test_missing_data_file() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path(), dir.path().join("missing.csv"));

        let result = run_training::<TrainingBackend>(&config, &Default::default());
        assert!(matches!(result, Err(CropError::Dataset(_))));
    }
}
