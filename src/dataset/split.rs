//! Train/evaluation partitioning
//!
//! The held-out split is a seeded random permutation: identical
//! (dataset, fraction, seed) always produce identical members. The held-out
//! size is `ceil(n * fraction)`, so a 20% split of 2200 rows holds out 440.
//!
//! `split_tail` is the unshuffled variant the trainer uses for its internal
//! validation set: the last `floor(n * fraction)` rows are held out.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use super::encoding::EncodedDataset;
use crate::utils::error::{CropError, Result};

/// Disjoint train and held-out partitions of one dataset
#[derive(Debug, Clone)]
pub struct Split {
    pub train: EncodedDataset,
    pub eval: EncodedDataset,
    /// Positions of the train rows in the source dataset
    pub train_indices: Vec<usize>,
    /// Positions of the held-out rows in the source dataset
    pub eval_indices: Vec<usize>,
}

fn validate_fraction(fraction: f64) -> Result<()> {
    if !(fraction > 0.0 && fraction < 1.0) {
        return Err(CropError::InvalidConfiguration(format!(
            "split fraction must be in (0, 1), got {}",
            fraction
        )));
    }
    Ok(())
}

/// Randomly hold out `fraction` of `dataset`
pub fn split(dataset: &EncodedDataset, fraction: f64, seed: u64) -> Result<Split> {
    validate_fraction(fraction)?;

    let n = dataset.len();
    if n < 2 {
        return Err(CropError::InvalidConfiguration(format!(
            "need at least 2 records to split, got {}",
            n
        )));
    }

    let eval_size = ((n as f64 * fraction).ceil() as usize).clamp(1, n - 1);

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut rng);

    let eval_indices = indices[..eval_size].to_vec();
    let train_indices = indices[eval_size..].to_vec();

    debug!(
        "Split {} records into {} train / {} eval (seed {})",
        n,
        train_indices.len(),
        eval_indices.len(),
        seed
    );

    Ok(Split {
        train: dataset.subset(&train_indices),
        eval: dataset.subset(&eval_indices),
        train_indices,
        eval_indices,
    })
}

/// Hold out the last `floor(n * fraction)` records without shuffling
pub fn split_tail(dataset: &EncodedDataset, fraction: f64) -> Result<Split> {
    validate_fraction(fraction)?;

    let n = dataset.len();
    let eval_size = (n as f64 * fraction).floor() as usize;
    if eval_size == 0 || eval_size == n {
        return Err(CropError::InvalidConfiguration(format!(
            "validation fraction {} of {} records leaves an empty partition",
            fraction, n
        )));
    }

    let train_indices: Vec<usize> = (0..n - eval_size).collect();
    let eval_indices: Vec<usize> = (n - eval_size..n).collect();

    Ok(Split {
        train: dataset.subset(&train_indices),
        eval: dataset.subset(&eval_indices),
        train_indices,
        eval_indices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::encoding::LabelEncoding;
    use crate::dataset::test_support::synthetic_records;
    use std::collections::HashSet;

    fn dataset(per_class: usize) -> EncodedDataset {
        let records = synthetic_records(per_class, 3);
        let encoding = LabelEncoding::fit(&records).unwrap();
        EncodedDataset::encode(&records, &encoding).unwrap()
    }

    #[test]
    fn test_split_sizes() {
        let data = dataset(25);
        let split = split(&data, 0.2, 42).unwrap();

        assert_eq!(split.eval.len(), 20);
        assert_eq!(split.train.len(), 80);
    }

    #[test]
    fn test_eval_size_rounds_up() {
        let data = dataset(3); // 12 records
        assert_eq!(split(&data, 0.25, 0).unwrap().eval.len(), 3);
        assert_eq!(split(&data, 0.2, 9).unwrap().eval.len(), 3); // ceil(2.4)
    }

    #[test]
    fn test_split_is_deterministic() {
        let data = dataset(10);
        let a = split(&data, 0.3, 42).unwrap();
        let b = split(&data, 0.3, 42).unwrap();

        assert_eq!(a.train_indices, b.train_indices);
        assert_eq!(a.eval_indices, b.eval_indices);

        let c = split(&data, 0.3, 43).unwrap();
        assert_ne!(a.eval_indices, c.eval_indices);
    }

    #[test]
    fn test_split_is_partition() {
        let data = dataset(10);
        let split = split(&data, 0.2, 42).unwrap();

        let train: HashSet<usize> = split.train_indices.iter().copied().collect();
        let eval: HashSet<usize> = split.eval_indices.iter().copied().collect();

        assert!(train.is_disjoint(&eval));
        let union: HashSet<usize> = train.union(&eval).copied().collect();
        assert_eq!(union, (0..data.len()).collect());

        for (pos, &i) in split.eval_indices.iter().enumerate() {
            assert_eq!(split.eval.records()[pos], data.records()[i]);
        }
    }

    #[test]
    fn test_invalid_fraction() {
        let data = dataset(2);
        for fraction in [0.0, 1.0, -0.1, 1.5, f64::NAN] {
            assert!(matches!(
                split(&data, fraction, 42),
                Err(CropError::InvalidConfiguration(_))
            ));
        }
    }

    #[test]
    fn test_too_small_dataset() {
        let data = dataset(1).subset(&[0]);
        assert!(matches!(
            split(&data, 0.5, 42),
            Err(CropError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_split_tail_takes_last_rows() {
        let data = dataset(5); // 20 records
        let split = split_tail(&data, 0.2).unwrap();

        assert_eq!(split.train_indices, (0..16).collect::<Vec<_>>());
        assert_eq!(split.eval_indices, (16..20).collect::<Vec<_>>());
        assert_eq!(split.eval.records()[0], data.records()[16]);
    }

    #[test]
    fn test_split_tail_empty_partition() {
        let data = dataset(1); // 4 records
        assert!(matches!(
            split_tail(&data, 0.2),
            Err(CropError::InvalidConfiguration(_))
        ));
    }
}
