//! Label encoding between crop names and dense class indices
//!
//! Classes are sorted lexicographically so that fitting the same table twice,
//! in any row order, yields identical indices. The encoding is fit once on
//! the full dataset and then travels with the model artifact.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::Record;
use crate::utils::error::{CropError, Result};
use crate::NUM_FEATURES;

/// Bidirectional crop name <-> class index mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoding {
    /// Crop names, index = class id, sorted ascending
    classes: Vec<String>,
}

impl LabelEncoding {
    /// Fit the encoding from every distinct label in `records`
    pub fn fit(records: &[Record]) -> Result<Self> {
        let classes: BTreeSet<&str> = records.iter().map(|r| r.label.as_str()).collect();

        if classes.is_empty() {
            return Err(CropError::InvalidConfiguration(
                "cannot fit a label encoding on an empty dataset".to_string(),
            ));
        }

        Ok(Self {
            classes: classes.into_iter().map(String::from).collect(),
        })
    }

    /// Check the invariants a deserialized encoding must still hold
    pub fn validate(&self) -> Result<()> {
        if self.classes.is_empty() {
            return Err(CropError::InvalidConfiguration(
                "label encoding needs at least one class".to_string(),
            ));
        }
        if self.classes.windows(2).any(|w| w[0] >= w[1]) {
            return Err(CropError::InvalidConfiguration(
                "label encoding classes must be sorted and unique".to_string(),
            ));
        }
        Ok(())
    }

    /// Class index for a crop name
    pub fn encode(&self, label: &str) -> Result<usize> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(label))
            .map_err(|_| CropError::UnknownLabel(label.to_string()))
    }

    /// Crop name for a class index
    pub fn decode(&self, index: usize) -> Result<&str> {
        self.classes
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| CropError::UnknownLabel(format!("class index {}", index)))
    }

    /// Encode one record into (features, class index)
    pub fn encode_record(&self, record: &Record) -> Result<EncodedRecord> {
        Ok(EncodedRecord {
            features: record.features.to_f32_array(),
            label: self.encode(&record.label)?,
        })
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Number of classes (C)
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// A record with its label replaced by a class index
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodedRecord {
    pub features: [f32; NUM_FEATURES],
    pub label: usize,
}

/// Ordered encoded records together with the encoding that produced them
#[derive(Debug, Clone)]
pub struct EncodedDataset {
    records: Vec<EncodedRecord>,
    encoding: LabelEncoding,
}

impl EncodedDataset {
    /// Encode a full table, failing on the first label the encoding lacks
    pub fn encode(records: &[Record], encoding: &LabelEncoding) -> Result<Self> {
        let records = records
            .iter()
            .map(|r| encoding.encode_record(r))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            records,
            encoding: encoding.clone(),
        })
    }

    /// Records at the given positions, in that order
    pub fn subset(&self, indices: &[usize]) -> Self {
        Self {
            records: indices
                .iter()
                .filter_map(|&i| self.records.get(i).copied())
                .collect(),
            encoding: self.encoding.clone(),
        }
    }

    pub fn records(&self) -> &[EncodedRecord] {
        &self.records
    }

    pub fn encoding(&self) -> &LabelEncoding {
        &self.encoding
    }

    pub fn num_classes(&self) -> usize {
        self.encoding.len()
    }

    pub fn labels(&self) -> Vec<usize> {
        self.records.iter().map(|r| r.label).collect()
    }

    /// Number of records per class index
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.encoding.len()];
        for record in &self.records {
            counts[record.label] += 1;
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::test_support::synthetic_records;
    use crate::dataset::CropFeatures;

    fn record(label: &str) -> Record {
        Record::new(CropFeatures::new(1.0, 2.0, 3.0, 4.0, 5.0), label)
    }

    #[test]
    fn test_fit_sorts_lexicographically() {
        let records = vec![record("rice"), record("maize"), record("apple"), record("rice")];
        let encoding = LabelEncoding::fit(&records).unwrap();

        assert_eq!(encoding.classes(), &["apple", "maize", "rice"]);
        assert_eq!(encoding.encode("apple").unwrap(), 0);
        assert_eq!(encoding.encode("rice").unwrap(), 2);
    }

    #[test]
    fn test_fit_is_order_independent() {
        let mut records = synthetic_records(3, 1);
        let first = LabelEncoding::fit(&records).unwrap();
        records.reverse();
        assert_eq!(first, LabelEncoding::fit(&records).unwrap());
    }

    #[test]
    fn test_round_trip_every_label() {
        let records = synthetic_records(5, 7);
        let encoding = LabelEncoding::fit(&records).unwrap();

        for r in &records {
            let index = encoding.encode(&r.label).unwrap();
            assert_eq!(encoding.decode(index).unwrap(), r.label);
        }
    }

    #[test]
    fn test_unknown_label() {
        let encoding = LabelEncoding::fit(&[record("rice")]).unwrap();
        assert!(matches!(encoding.encode("quinoa"), Err(CropError::UnknownLabel(_))));
        assert!(matches!(encoding.decode(1), Err(CropError::UnknownLabel(_))));
        assert!(matches!(
            EncodedDataset::encode(&[record("rice"), record("quinoa")], &encoding),
            Err(CropError::UnknownLabel(name)) if name == "quinoa"
        ));
    }

    #[test]
    fn test_empty_fit_is_invalid() {
        assert!(matches!(
            LabelEncoding::fit(&[]),
            Err(CropError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_deserialized_encoding_must_be_sorted() {
        let parse = |json: &str| serde_json::from_str::<LabelEncoding>(json).unwrap();
        assert!(parse(r#"{"classes": ["b", "a"]}"#).validate().is_err());
        assert!(parse(r#"{"classes": ["a", "a"]}"#).validate().is_err());
        assert!(parse(r#"{"classes": []}"#).validate().is_err());
        assert!(parse(r#"{"classes": ["a", "b"]}"#).validate().is_ok());
    }

    #[test]
    fn test_encoded_dataset() {
        let records = vec![record("rice"), record("maize"), record("rice")];
        let encoding = LabelEncoding::fit(&records).unwrap();
        let dataset = EncodedDataset::encode(&records, &encoding).unwrap();

        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.labels(), vec![1, 0, 1]);
        assert_eq!(dataset.class_counts(), vec![1, 2]);
        assert_eq!(dataset.records()[0].features, [1.0, 2.0, 3.0, 4.0, 5.0]);

        let subset = dataset.subset(&[2, 1]);
        assert_eq!(subset.labels(), vec![1, 0]);
    }

    #[test]
    fn test_serde_round_trip() {
        let encoding = LabelEncoding::fit(&[record("rice"), record("maize")]).unwrap();
        let json = serde_json::to_string(&encoding).unwrap();
        let restored: LabelEncoding = serde_json::from_str(&json).unwrap();
        assert_eq!(encoding, restored);
    }
}
