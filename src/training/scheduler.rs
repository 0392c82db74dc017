//! Learning rate scheduling
//!
//! The trainer uses reduce-on-plateau keyed on validation loss: after
//! `patience` epochs without an improvement larger than `min_delta`, the
//! learning rate is multiplied by `factor`, never going below `min_lr`.

use serde::{Deserialize, Serialize};

use crate::model::config::LrReductionConfig;

/// Learning rate scheduler type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum SchedulerType {
    /// Constant learning rate (no scheduling)
    #[default]
    Constant,

    /// Reduce on plateau: reduce LR when the monitored loss stops improving
    ReduceLROnPlateau {
        factor: f64,
        patience: usize,
        min_delta: f64,
        min_lr: f64,
    },
}

impl From<&LrReductionConfig> for SchedulerType {
    fn from(config: &LrReductionConfig) -> Self {
        if config.enabled {
            SchedulerType::ReduceLROnPlateau {
                factor: config.factor,
                patience: config.patience,
                min_delta: config.min_delta,
                min_lr: config.min_lr,
            }
        } else {
            SchedulerType::Constant
        }
    }
}

/// A learning rate change made by the scheduler
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LrReduction {
    pub old_lr: f64,
    pub new_lr: f64,
}

/// Learning rate scheduler
#[derive(Debug, Clone)]
pub struct LearningRateScheduler {
    scheduler_type: SchedulerType,
    current_lr: f64,

    // For ReduceLROnPlateau
    best_metric: Option<f64>,
    patience_counter: usize,
}

impl LearningRateScheduler {
    pub fn new(scheduler_type: SchedulerType, base_lr: f64) -> Self {
        Self {
            scheduler_type,
            current_lr: base_lr,
            best_metric: None,
            patience_counter: 0,
        }
    }

    /// Get the current learning rate
    pub fn get_lr(&self) -> f64 {
        self.current_lr
    }

    /// Step at the end of an epoch with the monitored loss
    ///
    /// Returns the change when the learning rate was reduced.
    pub fn step_with_metric(&mut self, metric: f64) -> Option<LrReduction> {
        let SchedulerType::ReduceLROnPlateau {
            factor,
            patience,
            min_delta,
            min_lr,
        } = self.scheduler_type
        else {
            return None;
        };

        let improved = match self.best_metric {
            Some(best) => metric < best - min_delta,
            None => true,
        };

        if improved {
            self.best_metric = Some(metric);
            self.patience_counter = 0;
            return None;
        }

        self.patience_counter += 1;
        if self.patience_counter < patience || self.current_lr <= min_lr {
            return None;
        }

        let old_lr = self.current_lr;
        self.current_lr = (old_lr * factor).max(min_lr);
        self.patience_counter = 0;

        Some(LrReduction {
            old_lr,
            new_lr: self.current_lr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plateau() -> LearningRateScheduler {
        LearningRateScheduler::new(SchedulerType::from(&LrReductionConfig::default()), 0.001)
    }

    #[test]
    fn test_constant_scheduler() {
        let mut scheduler = LearningRateScheduler::new(SchedulerType::Constant, 0.001);
        for _ in 0..20 {
            assert!(scheduler.step_with_metric(1.0).is_none());
        }
        assert_eq!(scheduler.get_lr(), 0.001);
    }

    #[test]
    fn test_reduces_after_patience() {
        let mut scheduler = plateau();
        scheduler.step_with_metric(1.0);

        for _ in 0..4 {
            assert!(scheduler.step_with_metric(1.0).is_none());
        }
        let reduction = scheduler.step_with_metric(1.0).expect("fifth flat epoch reduces");
        assert_eq!(reduction.old_lr, 0.001);
        assert!((reduction.new_lr - 0.0002).abs() < 1e-12);

        // Counter restarts after a reduction
        for _ in 0..4 {
            assert!(scheduler.step_with_metric(1.0).is_none());
        }
        assert!(scheduler.step_with_metric(1.0).is_some());
    }

    #[test]
    fn test_small_improvement_does_not_count() {
        let mut scheduler = plateau();
        scheduler.step_with_metric(1.0);
        for i in 1..=5 {
            // Improvements below min_delta (1e-4)
            scheduler.step_with_metric(1.0 - i as f64 * 1e-5);
        }
        assert!(scheduler.get_lr() < 0.001);
    }

    #[test]
    fn test_improvement_resets_counter() {
        let mut scheduler = plateau();
        scheduler.step_with_metric(1.0);
        for _ in 0..4 {
            scheduler.step_with_metric(1.0);
        }
        scheduler.step_with_metric(0.5);
        for _ in 0..4 {
            assert!(scheduler.step_with_metric(0.5).is_none());
        }
        assert_eq!(scheduler.get_lr(), 0.001);
    }

    #[test]
    fn test_floor_at_min_lr() {
        let mut scheduler = plateau();
        scheduler.step_with_metric(1.0);
        for _ in 0..100 {
            scheduler.step_with_metric(2.0);
        }
        assert_eq!(scheduler.get_lr(), 1e-5);
    }

    #[test]
    fn test_disabled_config_is_constant() {
        let config = LrReductionConfig {
            enabled: false,
            ..LrReductionConfig::default()
        };
        assert_eq!(SchedulerType::from(&config), SchedulerType::Constant);
    }
}
