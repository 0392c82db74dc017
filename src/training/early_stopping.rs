//! Early stopping on validation loss
//!
//! Tracks the best loss seen so far together with a snapshot of whatever
//! produced it (the inference-mode model during training), so the caller can
//! restore the best epoch instead of the last one.

use crate::model::config::EarlyStoppingConfig;

/// Best-epoch tracker with patience
#[derive(Debug, Clone)]
pub struct EarlyStopping<T> {
    enabled: bool,
    patience: usize,
    min_delta: f64,
    wait: usize,
    best_loss: f64,
    best_epoch: Option<usize>,
    best: Option<T>,
}

impl<T> EarlyStopping<T> {
    pub fn new(config: &EarlyStoppingConfig) -> Self {
        Self {
            enabled: config.enabled,
            patience: config.patience,
            min_delta: config.min_delta,
            wait: 0,
            best_loss: f64::INFINITY,
            best_epoch: None,
            best: None,
        }
    }

    /// Record the loss of `epoch`; `snapshot` is only called on improvement.
    ///
    /// Returns `true` when training should stop.
    pub fn observe<F: FnOnce() -> T>(&mut self, epoch: usize, loss: f64, snapshot: F) -> bool {
        if loss < self.best_loss - self.min_delta {
            self.best_loss = loss;
            self.best_epoch = Some(epoch);
            self.best = Some(snapshot());
            self.wait = 0;
            return false;
        }

        self.wait += 1;
        self.enabled && self.wait >= self.patience
    }

    pub fn best_loss(&self) -> f64 {
        self.best_loss
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    /// Epochs since the last improvement
    pub fn wait(&self) -> usize {
        self.wait
    }

    /// Consume the tracker, yielding (best epoch, best loss, snapshot)
    pub fn into_best(self) -> Option<(usize, f64, T)> {
        let epoch = self.best_epoch?;
        self.best.map(|snapshot| (epoch, self.best_loss, snapshot))
    }
}
