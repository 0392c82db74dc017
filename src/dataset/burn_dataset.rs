//! Burn Dataset Integration
//!
//! Implements Burn's `Dataset` for the encoded crop table and a `Batcher`
//! that stacks rows into `[batch, 5]` feature tensors with class targets.

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;

use super::encoding::{EncodedDataset, EncodedRecord};
use crate::utils::error::{CropError, Result};
use crate::NUM_FEATURES;

/// A single encoded crop row ready for Burn
pub type CropItem = EncodedRecord;

impl Dataset<CropItem> for EncodedDataset {
    fn get(&self, index: usize) -> Option<CropItem> {
        self.records().get(index).copied()
    }

    fn len(&self) -> usize {
        self.records().len()
    }
}

/// Batch of crop rows
#[derive(Clone, Debug)]
pub struct CropBatch<B: Backend> {
    /// Features with shape [batch_size, 5]
    pub features: Tensor<B, 2>,
    /// Class indices with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> CropBatch<B> {
    pub fn len(&self) -> usize {
        self.targets.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Batcher for crop rows on a fixed device
#[derive(Clone, Debug)]
pub struct CropBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> CropBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    /// Batch `items` on the batcher's own device
    pub fn batch_on_device(&self, items: Vec<CropItem>) -> CropBatch<B> {
        self.batch(items, &self.device)
    }

    /// Split `dataset` into consecutive batches following `order`
    pub fn batches(&self, dataset: &EncodedDataset, order: &[usize], batch_size: usize) -> Vec<CropBatch<B>> {
        order
            .chunks(batch_size.max(1))
            .map(|chunk| {
                let items = chunk.iter().filter_map(|&i| dataset.get(i)).collect();
                self.batch_on_device(items)
            })
            .collect()
    }
}

impl<B: Backend> Batcher<B, CropItem, CropBatch<B>> for CropBatcher<B> {
    fn batch(&self, items: Vec<CropItem>, device: &B::Device) -> CropBatch<B> {
        let batch_size = items.len();

        let features_data: Vec<f32> = items.iter().flat_map(|item| item.features).collect();
        let features = Tensor::<B, 2>::from_floats(
            TensorData::new(features_data, [batch_size, NUM_FEATURES]),
            device,
        );

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        CropBatch { features, targets }
    }
}

/// Single-row feature tensor for inference
pub fn features_tensor<B: Backend>(features: [f32; NUM_FEATURES], device: &B::Device) -> Tensor<B, 2> {
    Tensor::<B, 2>::from_floats(TensorData::new(features.to_vec(), [1, NUM_FEATURES]), device)
}

/// Copy a float tensor to the host as row-major `f32` values
pub fn tensor_to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| CropError::Model(format!("failed to read tensor data: {:?}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend;
    use crate::dataset::encoding::LabelEncoding;
    use crate::dataset::test_support::synthetic_records;

    type TestBackend = DefaultBackend;

    fn dataset() -> EncodedDataset {
        let records = synthetic_records(5, 2);
        let encoding = LabelEncoding::fit(&records).unwrap();
        EncodedDataset::encode(&records, &encoding).unwrap()
    }

    #[test]
    fn test_dataset_trait() {
        let data = dataset();
        assert_eq!(Dataset::len(&data), 20);
        assert_eq!(Dataset::get(&data, 3), Some(data.records()[3]));
        assert!(Dataset::get(&data, 20).is_none());
    }

    #[test]
    fn test_batch_shapes() {
        let data = dataset();
        let batcher = CropBatcher::<TestBackend>::new(Default::default());
        let items: Vec<CropItem> = data.records()[..4].to_vec();

        let batch = batcher.batch_on_device(items.clone());
        assert_eq!(batch.features.dims(), [4, NUM_FEATURES]);
        assert_eq!(batch.len(), 4);

        let values = batch.features.into_data().to_vec::<f32>().unwrap();
        assert_eq!(&values[..NUM_FEATURES], &items[0].features);
    }

    #[test]
    fn test_batches_cover_order() {
        let data = dataset();
        let batcher = CropBatcher::<TestBackend>::new(Default::default());
        let order: Vec<usize> = (0..data.len()).rev().collect();

        let batches = batcher.batches(&data, &order, 16);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 16);
        assert_eq!(batches[1].len(), 4);
    }
}
