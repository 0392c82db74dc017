//! Classification metrics
//!
//! Confusion matrix and per-class precision/recall/F1, plus the per-epoch
//! history recorded by the trainer.

use serde::{Deserialize, Serialize};

/// Per-class metrics derived from a confusion matrix
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    /// Class index
    pub class_idx: usize,

    /// Crop name (if available)
    pub class_name: Option<String>,

    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub true_negatives: usize,

    /// Precision = TP / (TP + FP)
    pub precision: f64,

    /// Recall = TP / (TP + FN)
    pub recall: f64,

    /// Harmonic mean of precision and recall, 0 when both are 0
    pub f1: f64,

    /// Number of actual samples of this class
    pub support: usize,
}

impl ClassMetrics {
    /// Calculate metrics for a class from confusion matrix
    pub fn from_confusion_matrix(cm: &ConfusionMatrix, class_idx: usize) -> Self {
        let true_positives = cm.get(class_idx, class_idx);

        // Predicted as this class but actually another one
        let false_positives: usize = (0..cm.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| cm.get(i, class_idx))
            .sum();

        // Actually this class but predicted as another one
        let false_negatives: usize = (0..cm.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| cm.get(class_idx, i))
            .sum();

        let true_negatives = cm.total() - true_positives - false_positives - false_negatives;
        let support = true_positives + false_negatives;

        let precision = ratio(true_positives, true_positives + false_positives);
        let recall = ratio(true_positives, support);

        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            class_idx,
            class_name: None,
            true_positives,
            false_positives,
            false_negatives,
            true_negatives,
            precision,
            recall,
            f1,
            support,
        }
    }

    /// Set the class name
    pub fn with_name(mut self, name: &str) -> Self {
        self.class_name = Some(name.to_string());
        self
    }
}

/// Index of the largest value, first one on ties
pub fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best_i, best_v), (i, &v)| {
            if v > best_v {
                (i, v)
            } else {
                (best_i, best_v)
            }
        })
        .0
}

fn ratio(num: usize, den: usize) -> f64 {
    if den > 0 {
        num as f64 / den as f64
    } else {
        0.0
    }
}

/// Confusion Matrix for multi-class classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Number of classes
    pub num_classes: usize,

    /// Row-major counts (row = actual, column = predicted)
    pub matrix: Vec<usize>,
}

impl Default for ConfusionMatrix {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ConfusionMatrix {
    /// Create a new empty confusion matrix
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            matrix: vec![0; num_classes * num_classes],
        }
    }

    /// Create confusion matrix from predictions and ground truth
    pub fn from_predictions(predictions: &[usize], ground_truth: &[usize], num_classes: usize) -> Self {
        let mut cm = Self::new(num_classes);

        for (&pred, &actual) in predictions.iter().zip(ground_truth.iter()) {
            cm.add(actual, pred);
        }

        cm
    }

    /// Add a single prediction to the matrix
    pub fn add(&mut self, actual: usize, predicted: usize) {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted] += 1;
        }
    }

    /// Get the count at (actual, predicted)
    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted]
        } else {
            0
        }
    }

    pub fn total(&self) -> usize {
        self.matrix.iter().sum()
    }

    /// Diagonal sum
    pub fn correct(&self) -> usize {
        (0..self.num_classes).map(|i| self.get(i, i)).sum()
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.correct(), self.total())
    }

    /// Row sums (actual class counts)
    pub fn row_sums(&self) -> Vec<usize> {
        (0..self.num_classes)
            .map(|row| (0..self.num_classes).map(|col| self.get(row, col)).sum())
            .collect()
    }

    /// Column sums (predicted class counts)
    pub fn col_sums(&self) -> Vec<usize> {
        (0..self.num_classes)
            .map(|col| (0..self.num_classes).map(|row| self.get(row, col)).sum())
            .collect()
    }

    /// Render the matrix as a text table with the given class names
    pub fn display(&self, class_names: &[String]) -> String {
        let width = class_names
            .iter()
            .map(|n| n.len())
            .max()
            .unwrap_or(0)
            .max(6);

        let mut output = format!("{:>width$} |", "actual", width = width);
        for col in 0..self.num_classes {
            let name = class_names.get(col).map(String::as_str).unwrap_or("?");
            output.push_str(&format!(" {:>width$}", name, width = width));
        }
        output.push_str(&format!(" | {:>width$}\n", "total", width = width));

        for (row, row_total) in self.row_sums().into_iter().enumerate() {
            let name = class_names.get(row).map(String::as_str).unwrap_or("?");
            output.push_str(&format!("{:>width$} |", name, width = width));
            for col in 0..self.num_classes {
                output.push_str(&format!(" {:>width$}", self.get(row, col), width = width));
            }
            output.push_str(&format!(" | {:>width$}\n", row_total, width = width));
        }

        output.push_str(&format!("{:>width$} |", "total", width = width));
        for col_total in self.col_sums() {
            output.push_str(&format!(" {:>width$}", col_total, width = width));
        }
        output.push_str(&format!(" | {:>width$}\n", self.total(), width = width));

        output
    }
}

/// Metrics recorded at the end of one training epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// 0-indexed epoch
    pub epoch: usize,
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
    pub learning_rate: f64,
}

/// Per-epoch training history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochMetrics>,
}

impl TrainingHistory {
    pub fn add_epoch(&mut self, metrics: EpochMetrics) {
        self.epochs.push(metrics);
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    /// Epoch with the lowest validation loss
    pub fn best_epoch(&self) -> Option<&EpochMetrics> {
        self.epochs
            .iter()
            .min_by(|a, b| a.val_loss.total_cmp(&b.val_loss))
    }

    pub fn final_epoch(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confusion_matrix() {
        let predictions = vec![0, 1, 2, 0, 1, 2];
        let ground_truth = vec![0, 1, 1, 0, 2, 2];

        let cm = ConfusionMatrix::from_predictions(&predictions, &ground_truth, 3);

        assert_eq!(cm.get(0, 0), 2);
        assert_eq!(cm.get(1, 1), 1);
        assert_eq!(cm.get(1, 2), 1);
        assert_eq!(cm.get(2, 1), 1);
        assert_eq!(cm.get(2, 2), 1);
        assert_eq!(cm.total(), 6);
        assert_eq!(cm.correct(), 4);
        assert_eq!(cm.row_sums(), vec![2, 2, 2]);
        assert_eq!(cm.col_sums(), vec![2, 2, 2]);
    }

    #[test]
    fn test_class_metrics() {
        let predictions = vec![0, 0, 0, 1, 1];
        let ground_truth = vec![0, 0, 1, 1, 1];
        let cm = ConfusionMatrix::from_predictions(&predictions, &ground_truth, 2);

        let class0 = ClassMetrics::from_confusion_matrix(&cm, 0);
        assert_eq!(class0.true_positives, 2);
        assert_eq!(class0.false_positives, 1);
        assert_eq!(class0.false_negatives, 0);
        assert_eq!(class0.true_negatives, 2);
        assert!((class0.precision - 2.0 / 3.0).abs() < 1e-9);
        assert!((class0.recall - 1.0).abs() < 1e-9);
        assert!((class0.f1 - 0.8).abs() < 1e-9);
        assert_eq!(class0.support, 2);
    }

    #[test]
    fn test_f1_zero_when_never_predicted() {
        let cm = ConfusionMatrix::from_predictions(&[0, 0], &[1, 0], 2);
        let class1 = ClassMetrics::from_confusion_matrix(&cm, 1);
        assert_eq!(class1.precision, 0.0);
        assert_eq!(class1.recall, 0.0);
        assert_eq!(class1.f1, 0.0);
    }

    #[test]
    fn test_argmax() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), 1);
        assert_eq!(argmax(&[0.5, 0.5]), 0);
        assert_eq!(argmax(&[]), 0);
    }

    #[test]
    fn test_out_of_range_ignored() {
        let mut cm = ConfusionMatrix::new(2);
        cm.add(5, 0);
        assert_eq!(cm.total(), 0);
    }

    #[test]
    fn test_history_best_epoch() {
        let mut history = TrainingHistory::default();
        for (epoch, val_loss) in [0.9, 0.4, 0.6].into_iter().enumerate() {
            history.add_epoch(EpochMetrics {
                epoch,
                train_loss: 1.0,
                train_accuracy: 0.5,
                val_loss,
                val_accuracy: 0.5,
                learning_rate: 1e-3,
            });
        }
        assert_eq!(history.best_epoch().map(|e| e.epoch), Some(1));
        assert_eq!(history.final_epoch().map(|e| e.epoch), Some(2));
    }

    #[test]
    fn test_display_contains_names() {
        let cm = ConfusionMatrix::from_predictions(&[0, 1], &[0, 1], 2);
        let text = cm.display(&["maize".to_string(), "rice".to_string()]);
        assert!(text.contains("maize"));
        assert!(text.contains("rice"));
    }

    #[test]
    fn test_display_totals() {
        // actual: maize, maize, rice; predicted: maize, rice, rice
        let cm = ConfusionMatrix::from_predictions(&[0, 1, 1], &[0, 0, 1], 2);
        let text = cm.display(&["maize".to_string(), "rice".to_string()]);
        let lines: Vec<&str> = text.lines().collect();

        let maize_row: Vec<&str> = lines[1].split_whitespace().collect();
        assert_eq!(maize_row, ["maize", "|", "1", "1", "|", "2"]);
        let totals: Vec<&str> = lines[3].split_whitespace().collect();
        assert_eq!(totals, ["total", "|", "1", "2", "|", "3"]);
    }
}
