//! Training loop for the crop classifier
//!
//! - Adam over sparse categorical cross-entropy plus the L2 kernel penalty
//! - per-epoch shuffled mini-batches of the fit partition
//! - the tail of the train set held out as validation, scored in inference mode
//! - early stopping and learning rate reduction keyed on validation loss
//!
//! The returned model always carries the parameters of the epoch with the
//! lowest validation loss.

use burn::{
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Tensor,
    },
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use super::early_stopping::EarlyStopping;
use super::scheduler::{LearningRateScheduler, SchedulerType};
use crate::dataset::{split_tail, tensor_to_vec, CropBatch, CropBatcher, EncodedDataset};
use crate::model::config::{ArchitectureDescriptor, TrainingConfig};
use crate::model::CropClassifier;
use crate::utils::error::{CropError, Result};
use crate::utils::logging::TrainingLogger;
use crate::utils::metrics::{argmax, EpochMetrics, TrainingHistory};

/// Outcome of a training run
#[derive(Debug)]
pub struct TrainedModel<B: Backend> {
    /// Inference-mode model with the best epoch's parameters
    pub model: CropClassifier<B>,
    pub history: TrainingHistory,
    /// 0-indexed epoch whose parameters were kept
    pub best_epoch: usize,
    pub best_val_loss: f64,
    pub stopped_early: bool,
    pub final_lr: f64,
    /// Records that produced gradients
    pub fit_samples: usize,
    /// Records held out for the control policies
    pub validation_samples: usize,
}

/// Trainer for the crop classifier on an autodiff backend
pub struct Trainer<B: AutodiffBackend> {
    pub config: TrainingConfig,
    device: B::Device,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(config: TrainingConfig, device: B::Device) -> Self {
        Self { config, device }
    }

    /// Train `model`, built from `descriptor`, on `train_set`
    pub fn train(
        &self,
        model: CropClassifier<B>,
        descriptor: &ArchitectureDescriptor,
        train_set: &EncodedDataset,
    ) -> Result<TrainedModel<B::InnerBackend>> {
        let config = &self.config;
        config.validate()?;
        descriptor.validate()?;

        if descriptor.num_classes != train_set.num_classes()
            || model.num_classes() != descriptor.num_classes
        {
            return Err(CropError::InvalidConfiguration(format!(
                "model has {} classes but the dataset encoding has {}",
                model.num_classes(),
                train_set.num_classes()
            )));
        }
        if config.batch_size > train_set.len() {
            return Err(CropError::InvalidConfiguration(format!(
                "batch_size {} exceeds the {} training records",
                config.batch_size,
                train_set.len()
            )));
        }

        let partition = split_tail(train_set, config.validation_fraction)?;
        let fit_set = partition.train;
        let val_set = partition.eval;
        let l2 = descriptor.l2_coefficients();

        info!(
            "Training on {} records, validating on {} ({} classes, batch size {})",
            fit_set.len(),
            val_set.len(),
            descriptor.num_classes,
            config.batch_size
        );

        let batcher = CropBatcher::<B>::new(self.device.clone());
        let val_batcher = CropBatcher::<B::InnerBackend>::new(self.device.clone());
        let val_order: Vec<usize> = (0..val_set.len()).collect();
        let val_batches = val_batcher.batches(&val_set, &val_order, config.batch_size);

        let mut optimizer = AdamConfig::new()
            .with_epsilon(1e-7)
            .init::<B, CropClassifier<B>>();
        let mut scheduler = LearningRateScheduler::new(
            SchedulerType::from(&config.lr_reduction),
            config.learning_rate,
        );
        let mut early_stopping = EarlyStopping::new(&config.early_stopping);
        let mut history = TrainingHistory::default();
        let mut logger = TrainingLogger::new(config.epochs);

        let mut rng = ChaCha8Rng::seed_from_u64(config.shuffle_seed);
        let mut order: Vec<usize> = (0..fit_set.len()).collect();
        let mut model = model;
        let mut stopped_early = false;

        for epoch in 0..config.epochs {
            logger.start_epoch(epoch);
            let lr = scheduler.get_lr();

            order.shuffle(&mut rng);
            let batches = batcher.batches(&fit_set, &order, config.batch_size);

            let mut loss_sum = 0.0;
            let mut correct = 0usize;

            for batch in batches {
                let n = batch.len();
                let logits = model.forward(batch.features.clone());

                let mut loss = CrossEntropyLossConfig::new()
                    .init(&logits.device())
                    .forward(logits.clone(), batch.targets.clone());
                if let Some(penalty) = model.l2_penalty(&l2) {
                    loss = loss + penalty;
                }

                let loss_value: f64 = loss.clone().into_scalar().elem();
                if !loss_value.is_finite() {
                    return Err(CropError::NumericDivergence {
                        epoch: epoch + 1,
                        loss: loss_value,
                    });
                }

                loss_sum += loss_value * n as f64;
                correct += count_correct(&batch, logits, descriptor.num_classes)?;

                let grads = loss.backward();
                let grads = GradientsParams::from_grads(grads, &model);
                model = optimizer.step(lr, model, grads);
            }

            let train_loss = loss_sum / fit_set.len() as f64;
            let train_accuracy = correct as f64 / fit_set.len() as f64;

            let valid_model = model.valid();
            let (val_loss, val_accuracy) = score_batches(&valid_model, &val_batches, &l2)?;
            if !val_loss.is_finite() {
                return Err(CropError::NumericDivergence {
                    epoch: epoch + 1,
                    loss: val_loss,
                });
            }

            logger.end_epoch(train_loss, train_accuracy, val_loss, val_accuracy, lr);
            history.add_epoch(EpochMetrics {
                epoch,
                train_loss,
                train_accuracy,
                val_loss,
                val_accuracy,
                learning_rate: lr,
            });

            let previous_best = early_stopping.best_loss();
            let stop = early_stopping.observe(epoch, val_loss, || valid_model.clone());
            if early_stopping.best_loss() < previous_best {
                logger.log_new_best(val_loss);
            }

            if let Some(reduction) = scheduler.step_with_metric(val_loss) {
                logger.log_lr_reduced(reduction.old_lr, reduction.new_lr);
            }

            if stop {
                let best_epoch = early_stopping.best_epoch().unwrap_or(epoch);
                logger.log_early_stop(early_stopping.wait(), best_epoch);
                stopped_early = true;
                break;
            }
        }

        let epochs_run = history.len();
        let (best_epoch, best_val_loss, best_model) = early_stopping
            .into_best()
            .ok_or_else(|| CropError::Model("no epoch produced a finite validation loss".to_string()))?;

        logger.log_complete(epochs_run, best_val_loss);
        debug!("Keeping parameters from epoch {}", best_epoch + 1);

        Ok(TrainedModel {
            model: best_model,
            history,
            best_epoch,
            best_val_loss,
            stopped_early,
            final_lr: scheduler.get_lr(),
            fit_samples: fit_set.len(),
            validation_samples: val_set.len(),
        })
    }
}

fn count_correct<B: Backend>(
    batch: &CropBatch<B>,
    logits: Tensor<B, 2>,
    num_classes: usize,
) -> Result<usize> {
    let scores = tensor_to_vec(logits)?;
    let targets = batch
        .targets
        .clone()
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| CropError::Model(format!("failed to read targets: {:?}", e)))?;

    Ok(scores
        .chunks(num_classes)
        .zip(targets)
        .filter(|(row, target)| argmax(row) as i64 == *target)
        .count())
}

/// Mean cross-entropy (plus L2 penalty) and accuracy over pre-built batches
fn score_batches<B: Backend>(
    model: &CropClassifier<B>,
    batches: &[CropBatch<B>],
    l2: &[f64],
) -> Result<(f64, f64)> {
    let mut loss_sum = 0.0;
    let mut correct = 0usize;
    let mut total = 0usize;

    for batch in batches {
        let n = batch.len();
        let logits = model.forward(batch.features.clone());
        let loss = CrossEntropyLossConfig::new()
            .init(&logits.device())
            .forward(logits.clone(), batch.targets.clone());
        let loss_value: f64 = loss.into_scalar().elem();

        loss_sum += loss_value * n as f64;
        correct += count_correct(batch, logits, model.num_classes())?;
        total += n;
    }

    if total == 0 {
        return Err(CropError::InvalidConfiguration(
            "cannot score an empty dataset".to_string(),
        ));
    }

    let penalty: f64 = match model.l2_penalty(l2) {
        Some(penalty) => penalty.into_scalar().elem(),
        None => 0.0,
    };

    Ok((loss_sum / total as f64 + penalty, correct as f64 / total as f64))
}

/// Regularized loss and accuracy of an inference-mode model on `dataset`
pub fn validation_loss<B: Backend>(
    model: &CropClassifier<B>,
    dataset: &EncodedDataset,
    l2: &[f64],
    batch_size: usize,
    device: &B::Device,
) -> Result<(f64, f64)> {
    let batcher = CropBatcher::<B>::new(device.clone());
    let order: Vec<usize> = (0..dataset.len()).collect();
    let batches = batcher.batches(dataset, &order, batch_size);
    score_batches(model, &batches, l2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DefaultBackend, TrainingBackend};
    use crate::dataset::test_support::synthetic_records;
    use crate::dataset::{CropFeatures, EncodedDataset, LabelEncoding, Record};
    use crate::model::config::{BatchNormSpec, EarlyStoppingConfig, LrReductionConfig};

    fn dataset(per_class: usize) -> EncodedDataset {
        let records = synthetic_records(per_class, 5);
        let encoding = LabelEncoding::fit(&records).unwrap();
        EncodedDataset::encode(&records, &encoding).unwrap()
    }

    fn descriptor(num_classes: usize) -> ArchitectureDescriptor {
        // Faster running statistics so short test runs converge
        ArchitectureDescriptor::crop_classifier(num_classes).with_batch_norm(BatchNormSpec {
            momentum: 0.1,
            epsilon: 1e-3,
        })
    }

    fn quick_config(epochs: usize) -> TrainingConfig {
        TrainingConfig {
            learning_rate: 0.01,
            epochs,
            ..TrainingConfig::default()
        }
    }

    fn trainer(config: TrainingConfig) -> Trainer<TrainingBackend> {
        Trainer::new(config, Default::default())
    }

    fn model(descriptor: &ArchitectureDescriptor) -> CropClassifier<TrainingBackend> {
        CropClassifier::new(descriptor, &Default::default())
    }

    #[test]
    fn test_batch_size_exceeds_train_set() {
        let data = dataset(2); // 8 records
        let descriptor = descriptor(data.num_classes());
        let config = TrainingConfig {
            batch_size: 9,
            ..quick_config(1)
        };

        let result = trainer(config).train(model(&descriptor), &descriptor, &data);
        assert!(matches!(result, Err(CropError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_invalid_hyperparameters() {
        let data = dataset(10);
        let descriptor = descriptor(data.num_classes());
        let config = TrainingConfig {
            learning_rate: -1.0,
            ..quick_config(1)
        };

        let result = trainer(config).train(model(&descriptor), &descriptor, &data);
        assert!(matches!(result, Err(CropError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_class_count_mismatch() {
        let data = dataset(10);
        let descriptor = descriptor(data.num_classes() + 1);

        let result = trainer(quick_config(1)).train(model(&descriptor), &descriptor, &data);
        assert!(matches!(result, Err(CropError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_non_finite_loss_aborts() {
        let mut records = synthetic_records(10, 5);
        for record in records.iter_mut().take(20) {
            record.features = CropFeatures::new(f64::NAN, 1.0, 1.0, 1.0, 1.0);
        }
        let encoding = LabelEncoding::fit(&records).unwrap();
        let data = EncodedDataset::encode(&records, &encoding).unwrap();
        let descriptor = descriptor(data.num_classes());

        let result = trainer(quick_config(3)).train(model(&descriptor), &descriptor, &data);
        assert!(matches!(
            result,
            Err(CropError::NumericDivergence { epoch: 1, .. })
        ));
    }

    #[test]
    fn test_training_learns_and_keeps_best_epoch() {
        let data = dataset(40);
        let descriptor = descriptor(data.num_classes());

        let trained = trainer(quick_config(30))
            .train(model(&descriptor), &descriptor, &data)
            .unwrap();

        assert_eq!(trained.fit_samples + trained.validation_samples, data.len());
        assert_eq!(trained.validation_samples, 32);
        assert!(!trained.history.is_empty());

        let best = trained.history.best_epoch().unwrap();
        assert_eq!(best.epoch, trained.best_epoch);
        assert_eq!(best.val_loss, trained.best_val_loss);

        // The returned parameters reproduce the best epoch's validation loss
        let val_set = split_tail(&data, 0.2).unwrap().eval;
        let (loss, accuracy) = validation_loss::<DefaultBackend>(
            &trained.model,
            &val_set,
            &descriptor.l2_coefficients(),
            16,
            &Default::default(),
        )
        .unwrap();
        assert!((loss - trained.best_val_loss).abs() < 1e-4);
        assert!(accuracy > 0.9, "validation accuracy {}", accuracy);
    }

    #[test]
    fn test_early_stop_restores_best_epoch() {
        let data = dataset(10);
        let descriptor = descriptor(data.num_classes());
        let patience = 2;
        // No later epoch can beat the first by this margin
        let config = TrainingConfig {
            early_stopping: EarlyStoppingConfig {
                enabled: true,
                patience,
                min_delta: 1e6,
            },
            lr_reduction: LrReductionConfig {
                enabled: false,
                ..LrReductionConfig::default()
            },
            ..quick_config(20)
        };

        let trained = trainer(config)
            .train(model(&descriptor), &descriptor, &data)
            .unwrap();

        assert!(trained.stopped_early);
        assert_eq!(trained.best_epoch, 0);
        assert_eq!(trained.history.len(), patience + 1);
        assert!(trained.history.len() <= trained.best_epoch + patience + 1);
        assert_eq!(trained.history.epochs[0].val_loss, trained.best_val_loss);

        let val_set = split_tail(&data, 0.2).unwrap().eval;
        let (loss, _) = validation_loss::<DefaultBackend>(
            &trained.model,
            &val_set,
            &descriptor.l2_coefficients(),
            16,
            &Default::default(),
        )
        .unwrap();
        assert!((loss - trained.best_val_loss).abs() < 1e-4);
    }

    #[test]
    fn test_short_run_records_every_epoch() {
        let records: Vec<Record> = (0..20)
            .map(|i| {
                let label = if i % 2 == 0 { "maize" } else { "rice" };
                let humidity = if i % 2 == 0 { 60.0 } else { 82.0 };
                Record::new(CropFeatures::new(80.0, 40.0, 20.0, 22.0, humidity), label)
            })
            .collect();
        let encoding = LabelEncoding::fit(&records).unwrap();
        let data = EncodedDataset::encode(&records, &encoding).unwrap();
        let descriptor = descriptor(2);
        let config = TrainingConfig {
            batch_size: 4,
            ..quick_config(2)
        };

        let trained = trainer(config)
            .train(model(&descriptor), &descriptor, &data)
            .unwrap();
        assert_eq!(trained.history.len(), 2);
        assert!(!trained.stopped_early);
        assert!(trained.final_lr <= 0.01);
    }
}
