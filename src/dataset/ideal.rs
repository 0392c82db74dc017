//! Ideal growing conditions per crop
//!
//! For every crop, the observed (min, max) of each feature across its
//! records. Reference data for display only; training never reads it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{CropFeatures, Record};
use crate::{FEATURE_NAMES, NUM_FEATURES};

/// Observed closed interval of one feature
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureRange {
    pub min: f64,
    pub max: f64,
}

impl FeatureRange {
    fn point(value: f64) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    fn include(&mut self, value: f64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }
}

/// crop name -> feature name -> range
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdealConditions {
    ranges: BTreeMap<String, BTreeMap<String, FeatureRange>>,
}

impl IdealConditions {
    /// Group records by crop and reduce each feature to its range
    pub fn from_records(records: &[Record]) -> Self {
        let mut per_crop: BTreeMap<String, [FeatureRange; NUM_FEATURES]> = BTreeMap::new();

        for record in records {
            let values = record.features.to_array();
            match per_crop.get_mut(&record.label) {
                Some(ranges) => {
                    for (range, value) in ranges.iter_mut().zip(values) {
                        range.include(value);
                    }
                }
                None => {
                    per_crop.insert(record.label.clone(), values.map(FeatureRange::point));
                }
            }
        }

        let ranges = per_crop
            .into_iter()
            .map(|(crop, ranges)| {
                let by_name = FEATURE_NAMES
                    .iter()
                    .zip(ranges)
                    .map(|(name, range)| (name.to_string(), range))
                    .collect();
                (crop, by_name)
            })
            .collect();

        Self { ranges }
    }

    /// Ranges for one crop
    pub fn get(&self, crop: &str) -> Option<&BTreeMap<String, FeatureRange>> {
        self.ranges.get(crop)
    }

    /// Range of one feature for one crop
    pub fn range(&self, crop: &str, feature: &str) -> Option<FeatureRange> {
        self.ranges.get(crop)?.get(feature).copied()
    }

    /// Whether every feature lies inside the crop's observed ranges
    pub fn contains(&self, crop: &str, features: &CropFeatures) -> bool {
        match self.ranges.get(crop) {
            Some(ranges) => FEATURE_NAMES
                .iter()
                .zip(features.to_array())
                .all(|(name, v)| ranges.get(*name).is_some_and(|r| r.contains(v))),
            None => false,
        }
    }

    pub fn crops(&self) -> impl Iterator<Item = &str> {
        self.ranges.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}
