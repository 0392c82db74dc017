//! Held-out evaluation
//!
//! Class probabilities for the evaluation set are computed once, in
//! inference mode, and every metric (confusion matrix, per-class scores,
//! ROC/AUC, loss) is derived from that single pass.

use std::fs::File;
use std::path::Path;

use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::roc::RocCurve;
use crate::dataset::{tensor_to_vec, CropBatcher, EncodedDataset};
use crate::model::CropClassifier;
use crate::utils::error::{CropError, Result};
use crate::utils::metrics::{argmax, ClassMetrics, ConfusionMatrix};

/// Probability floor used for the cross-entropy of the report
const PROBABILITY_EPSILON: f64 = 1e-7;

/// Everything measured on the held-out set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub total_samples: usize,
    pub correct_predictions: usize,
    pub accuracy: f64,
    /// Mean categorical cross-entropy of the predicted probabilities
    pub loss: f64,
    pub macro_precision: f64,
    pub macro_recall: f64,
    pub macro_f1: f64,
    /// F1 weighted by class support
    pub weighted_f1: f64,
    /// Mean AUC over classes where it is defined
    pub macro_auc: Option<f64>,
    pub class_names: Vec<String>,
    pub confusion_matrix: ConfusionMatrix,
    pub per_class: Vec<ClassMetrics>,
    pub roc_curves: Vec<RocCurve>,
}

impl EvaluationReport {
    /// Build a report from row-major probabilities `[n, C]` and true labels
    pub fn from_probabilities(
        probabilities: &[f32],
        labels: &[usize],
        class_names: &[String],
    ) -> Result<Self> {
        let num_classes = class_names.len();
        let total_samples = labels.len();

        if total_samples == 0 {
            return Err(CropError::InvalidConfiguration(
                "cannot evaluate an empty dataset".to_string(),
            ));
        }
        if num_classes == 0 || probabilities.len() != total_samples * num_classes {
            return Err(CropError::Model(format!(
                "expected {} x {} probabilities, got {}",
                total_samples,
                num_classes,
                probabilities.len()
            )));
        }

        let rows: Vec<&[f32]> = probabilities.chunks(num_classes).collect();
        let predictions: Vec<usize> = rows.iter().map(|row| argmax(row)).collect();

        let confusion_matrix = ConfusionMatrix::from_predictions(&predictions, labels, num_classes);
        let correct_predictions = confusion_matrix.correct();

        let per_class: Vec<ClassMetrics> = (0..num_classes)
            .map(|c| ClassMetrics::from_confusion_matrix(&confusion_matrix, c).with_name(&class_names[c]))
            .collect();

        let roc_curves: Vec<RocCurve> = (0..num_classes)
            .map(|c| {
                let scores: Vec<f32> = rows.iter().map(|row| row[c]).collect();
                RocCurve::one_vs_rest(c, &scores, labels).with_name(&class_names[c])
            })
            .collect();

        let loss = rows
            .iter()
            .zip(labels)
            .map(|(row, &label)| {
                let p = row.get(label).copied().unwrap_or(0.0) as f64;
                -p.clamp(PROBABILITY_EPSILON, 1.0).ln()
            })
            .sum::<f64>()
            / total_samples as f64;

        let n = num_classes as f64;
        let macro_precision = per_class.iter().map(|m| m.precision).sum::<f64>() / n;
        let macro_recall = per_class.iter().map(|m| m.recall).sum::<f64>() / n;
        let macro_f1 = per_class.iter().map(|m| m.f1).sum::<f64>() / n;
        let weighted_f1 = per_class
            .iter()
            .map(|m| m.f1 * m.support as f64)
            .sum::<f64>()
            / total_samples as f64;

        let aucs: Vec<f64> = roc_curves.iter().filter_map(|r| r.auc).collect();
        let macro_auc = if aucs.is_empty() {
            None
        } else {
            Some(aucs.iter().sum::<f64>() / aucs.len() as f64)
        };

        Ok(Self {
            total_samples,
            correct_predictions,
            accuracy: confusion_matrix.accuracy(),
            loss,
            macro_precision,
            macro_recall,
            macro_f1,
            weighted_f1,
            macro_auc,
            class_names: class_names.to_vec(),
            confusion_matrix,
            per_class,
            roc_curves,
        })
    }

    /// Classification report in the familiar precision/recall/F1 table layout
    pub fn display(&self) -> String {
        let width = self
            .class_names
            .iter()
            .map(|n| n.len())
            .max()
            .unwrap_or(0)
            .max(12);

        let mut output = format!(
            "{:>width$} {:>10} {:>10} {:>10} {:>10} {:>8}\n",
            "",
            "precision",
            "recall",
            "f1-score",
            "support",
            "auc",
            width = width
        );
        output.push('\n');

        for (metrics, roc) in self.per_class.iter().zip(&self.roc_curves) {
            let name = metrics.class_name.as_deref().unwrap_or("?");
            let auc = roc.auc.map_or_else(|| "-".to_string(), |a| format!("{:.4}", a));
            output.push_str(&format!(
                "{:>width$} {:>10.4} {:>10.4} {:>10.4} {:>10} {:>8}\n",
                name,
                metrics.precision,
                metrics.recall,
                metrics.f1,
                metrics.support,
                auc,
                width = width
            ));
        }

        output.push('\n');
        output.push_str(&format!(
            "{:>width$} {:>10} {:>10} {:>10.4} {:>10}\n",
            "accuracy",
            "",
            "",
            self.accuracy,
            self.total_samples,
            width = width
        ));
        output.push_str(&format!(
            "{:>width$} {:>10.4} {:>10.4} {:>10.4} {:>10}\n",
            "macro avg",
            self.macro_precision,
            self.macro_recall,
            self.macro_f1,
            self.total_samples,
            width = width
        ));
        output.push_str(&format!("\nTest loss: {:.4}\n", self.loss));

        output
    }

    /// Write the confusion matrix as CSV, one row per true class
    pub fn export_confusion_matrix<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut writer = csv::Writer::from_writer(File::create(path)?);

        let mut header = vec!["actual\\predicted".to_string()];
        header.extend(self.class_names.iter().cloned());
        writer.write_record(&header)?;

        for (row, name) in self.class_names.iter().enumerate() {
            let mut record = vec![name.clone()];
            record.extend((0..self.class_names.len()).map(|col| self.confusion_matrix.get(row, col).to_string()));
            writer.write_record(&record)?;
        }

        writer.flush()?;
        info!("Confusion matrix exported to {}", path.display());
        Ok(())
    }

    /// Write every ROC point as `class,fpr,tpr,threshold` CSV rows
    pub fn export_roc_curves<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut writer = csv::Writer::from_writer(File::create(path)?);
        writer.write_record(["class", "fpr", "tpr", "threshold"])?;

        for curve in &self.roc_curves {
            let name = curve.class_name.clone().unwrap_or_else(|| curve.class_idx.to_string());
            for ((fpr, tpr), threshold) in curve.fpr.iter().zip(&curve.tpr).zip(&curve.thresholds) {
                writer.write_record([
                    name.clone(),
                    fpr.to_string(),
                    tpr.to_string(),
                    threshold.to_string(),
                ])?;
            }
        }

        writer.flush()?;
        info!("ROC curves exported to {}", path.display());
        Ok(())
    }
}

impl std::fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// Evaluates a trained classifier on a held-out set
#[derive(Debug, Clone)]
pub struct Evaluator {
    batch_size: usize,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self { batch_size: 256 }
    }
}

impl Evaluator {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    /// Row-major class probabilities `[n, C]` for every record, in order
    pub fn predict_proba<B: Backend>(
        &self,
        model: &CropClassifier<B>,
        dataset: &EncodedDataset,
        device: &B::Device,
    ) -> Result<Vec<f32>> {
        let batcher = CropBatcher::<B>::new(device.clone());
        let order: Vec<usize> = (0..dataset.len()).collect();
        let mut probabilities = Vec::with_capacity(dataset.len() * model.num_classes());

        for batch in batcher.batches(dataset, &order, self.batch_size) {
            probabilities.extend(tensor_to_vec(model.forward_softmax(batch.features))?);
        }

        Ok(probabilities)
    }

    /// Evaluate an inference-mode model on `eval_set`
    pub fn evaluate<B: Backend>(
        &self,
        model: &CropClassifier<B>,
        eval_set: &EncodedDataset,
        device: &B::Device,
    ) -> Result<EvaluationReport> {
        if eval_set.is_empty() {
            return Err(CropError::InvalidConfiguration(
                "cannot evaluate an empty dataset".to_string(),
            ));
        }
        if model.num_classes() != eval_set.num_classes() {
            return Err(CropError::ArchitectureMismatch(format!(
                "model predicts {} classes but the evaluation encoding has {}",
                model.num_classes(),
                eval_set.num_classes()
            )));
        }

        let probabilities = self.predict_proba(model, eval_set, device)?;
        let report = EvaluationReport::from_probabilities(
            &probabilities,
            &eval_set.labels(),
            eval_set.encoding().classes(),
        )?;

        info!(
            "Evaluated {} records: accuracy {:.2}%, macro F1 {:.4}, loss {:.4}",
            report.total_samples,
            report.accuracy * 100.0,
            report.macro_f1,
            report.loss
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend;
    use crate::dataset::test_support::synthetic_records;
    use crate::dataset::LabelEncoding;
    use crate::model::ArchitectureDescriptor;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("crop{}", i)).collect()
    }

    #[test]
    fn test_report_from_probabilities() {
        #[rustfmt::skip]
        let probabilities = [
            0.8, 0.1, 0.1,
            0.2, 0.7, 0.1,
            0.1, 0.6, 0.3,
            0.1, 0.2, 0.7,
        ];
        let labels = [0, 1, 2, 2];
        let report = EvaluationReport::from_probabilities(&probabilities, &labels, &names(3)).unwrap();

        assert_eq!(report.total_samples, 4);
        assert_eq!(report.correct_predictions, 3);
        assert_eq!(report.accuracy, 0.75);
        assert_eq!(report.confusion_matrix.get(2, 1), 1);
        assert_eq!(report.confusion_matrix.row_sums(), vec![1, 1, 2]);
        assert_eq!(report.per_class[1].class_name.as_deref(), Some("crop1"));
        assert_eq!(report.per_class[1].precision, 0.5);
        assert_eq!(report.per_class[2].recall, 0.5);
        assert_eq!(report.roc_curves.len(), 3);
        assert!(report.macro_auc.is_some());

        let expected_loss = -(0.8f64.ln() + 0.7f64.ln() + 0.3f64.ln() + 0.7f64.ln()) / 4.0;
        assert!((report.loss - expected_loss).abs() < 1e-6);
    }

    #[test]
    fn test_metrics_are_bounded() {
        let probabilities = [0.9, 0.1, 0.9, 0.1, 0.4, 0.6];
        let labels = [1, 1, 0];
        let report = EvaluationReport::from_probabilities(&probabilities, &labels, &names(2)).unwrap();

        for m in &report.per_class {
            for v in [m.precision, m.recall, m.f1] {
                assert!((0.0..=1.0).contains(&v));
            }
            assert_eq!(m.f1 == 0.0, m.precision + m.recall == 0.0);
        }
    }

    #[test]
    fn test_shape_mismatch() {
        let result = EvaluationReport::from_probabilities(&[0.5, 0.5, 1.0], &[0, 1], &names(2));
        assert!(matches!(result, Err(CropError::Model(_))));
    }

    #[test]
    fn test_empty_eval_set() {
        let result = EvaluationReport::from_probabilities(&[], &[], &names(2));
        assert!(matches!(result, Err(CropError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_evaluate_untrained_model() {
        let records = synthetic_records(6, 4);
        let encoding = LabelEncoding::fit(&records).unwrap();
        let data = EncodedDataset::encode(&records, &encoding).unwrap();
        let device = Default::default();
        let model = CropClassifier::<DefaultBackend>::new(
            &ArchitectureDescriptor::crop_classifier(data.num_classes()),
            &device,
        );

        let evaluator = Evaluator::new(5);
        let probabilities = evaluator.predict_proba(&model, &data, &device).unwrap();
        assert_eq!(probabilities.len(), data.len() * data.num_classes());

        let report = evaluator.evaluate(&model, &data, &device).unwrap();
        assert_eq!(report.confusion_matrix.row_sums(), data.class_counts());
        assert_eq!(report.class_names, encoding.classes());
    }

    #[test]
    fn test_exports() {
        let report =
            EvaluationReport::from_probabilities(&[0.9, 0.1, 0.2, 0.8], &[0, 1], &names(2)).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let cm_path = dir.path().join("confusion.csv");
        report.export_confusion_matrix(&cm_path).unwrap();
        let text = std::fs::read_to_string(&cm_path).unwrap();
        assert!(text.starts_with("actual\\predicted,crop0,crop1"));
        assert!(text.contains("crop0,1,0"));

        let roc_path = dir.path().join("roc.csv");
        report.export_roc_curves(&roc_path).unwrap();
        let text = std::fs::read_to_string(&roc_path).unwrap();
        assert!(text.starts_with("class,fpr,tpr,threshold"));
    }

    #[test]
    fn test_display() {
        let report =
            EvaluationReport::from_probabilities(&[0.9, 0.1, 0.2, 0.8], &[0, 1], &names(2)).unwrap();
        let text = report.display();
        assert!(text.contains("precision"));
        assert!(text.contains("macro avg"));
        assert!(text.contains("crop1"));
    }
}
