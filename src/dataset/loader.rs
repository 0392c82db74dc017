//! CSV loading for the crop table
//!
//! Expects a header row with at least `N,P,K,temperature,humidity,label`;
//! other columns (ph, rainfall, ...) are ignored.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use super::{CropFeatures, Record};
use crate::utils::error::{CropError, Result};

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "N")]
    n: f64,
    #[serde(rename = "P")]
    p: f64,
    #[serde(rename = "K")]
    k: f64,
    temperature: f64,
    humidity: f64,
    label: String,
}

/// Load every record from a CSV file
pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Record>> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| CropError::Dataset(format!("cannot open '{}': {}", path.display(), e)))?;

    let records = read_records(file)?;
    info!("Loaded {} records from {}", records.len(), path.display());
    Ok(records)
}

/// Parse records from any CSV reader
pub fn read_records<R: Read>(reader: R) -> Result<Vec<Record>> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut records = Vec::new();

    for (line, row) in csv_reader.deserialize::<CsvRow>().enumerate() {
        let row = row?;
        let features = CropFeatures::new(row.n, row.p, row.k, row.temperature, row.humidity);

        // Header is line 1
        if !features.is_finite() {
            return Err(CropError::Dataset(format!(
                "non-finite feature value on line {}",
                line + 2
            )));
        }
        if row.label.is_empty() {
            return Err(CropError::Dataset(format!("empty label on line {}", line + 2)));
        }

        records.push(Record::new(features, row.label));
    }

    if records.is_empty() {
        return Err(CropError::Dataset("dataset contains no records".to_string()));
    }

    debug!("Parsed {} CSV rows", records.len());
    Ok(records)
}
