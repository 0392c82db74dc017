//! One-vs-rest ROC curves
//!
//! Each class is scored as a binary problem using its predicted probability.
//! Points are emitted at every distinct score, highest first, with a leading
//! (0, 0) point whose threshold is `max_score + 1`.

use serde::{Deserialize, Serialize};

/// ROC curve of one class against all others
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocCurve {
    pub class_idx: usize,
    pub class_name: Option<String>,
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
    pub thresholds: Vec<f64>,
    /// Area under the curve; `None` when the class has no positives or no
    /// negatives in the evaluated set
    pub auc: Option<f64>,
}

impl RocCurve {
    /// Build the curve for `class_idx` from per-sample scores and labels
    pub fn one_vs_rest(class_idx: usize, scores: &[f32], labels: &[usize]) -> Self {
        let positives: Vec<bool> = labels.iter().map(|&l| l == class_idx).collect();
        let (fpr, tpr, thresholds) = roc_curve(scores, &positives);

        let has_both = positives.iter().any(|&p| p) && positives.iter().any(|&p| !p);
        let auc = if has_both { Some(auc(&fpr, &tpr)) } else { None };

        Self {
            class_idx,
            class_name: None,
            fpr,
            tpr,
            thresholds,
            auc,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.class_name = Some(name.to_string());
        self
    }
}

/// (fpr, tpr, thresholds) for binary labels
///
/// Rates are 0 throughout when a side has no samples.
pub fn roc_curve(scores: &[f32], positives: &[bool]) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let mut order: Vec<usize> = (0..scores.len().min(positives.len())).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut fpr = vec![0.0];
    let mut tpr = vec![0.0];
    let max_score = order.first().map(|&i| scores[i] as f64).unwrap_or(0.0);
    let mut thresholds = vec![max_score + 1.0];

    let mut tps = 0usize;
    let mut fps = 0usize;
    let mut points: Vec<(usize, usize, f64)> = Vec::new();

    for (pos, &i) in order.iter().enumerate() {
        if positives[i] {
            tps += 1;
        } else {
            fps += 1;
        }

        // Emit a point at the last sample of each run of equal scores
        let last_of_run = order
            .get(pos + 1)
            .map_or(true, |&next| scores[next] != scores[i]);
        if last_of_run {
            points.push((fps, tps, scores[i] as f64));
        }
    }

    let total_pos = tps;
    let total_neg = fps;

    for (fp, tp, threshold) in points {
        fpr.push(rate(fp, total_neg));
        tpr.push(rate(tp, total_pos));
        thresholds.push(threshold);
    }

    (fpr, tpr, thresholds)
}

fn rate(count: usize, total: usize) -> f64 {
    if total > 0 {
        count as f64 / total as f64
    } else {
        0.0
    }
}

/// Trapezoidal area under a curve with non-decreasing x
pub fn auc(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| (xs[1] - xs[0]) * (ys[1] + ys[0]) / 2.0)
        .sum()
}
