//! Partition values and synthetic item attributes for the DynamoDB provider.

use std::fs;
use std::path::Path;

use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;
use tracing::info;

const DEFAULT_VALUES: &[&str] = &[
    "Argentina",
    "Australia",
    "Austria",
    "Belgium",
    "Brazil",
    "Canada",
    "Chile",
    "China",
    "Denmark",
    "Egypt",
    "Finland",
    "France",
    "Germany",
    "Greece",
    "India",
    "Indonesia",
    "Ireland",
    "Italy",
    "Japan",
    "Kenya",
    "Mexico",
    "Netherlands",
    "New Zealand",
    "Nigeria",
    "Norway",
    "Peru",
    "Poland",
    "Portugal",
    "South Africa",
    "Spain",
    "Sweden",
    "Switzerland",
    "Turkey",
    "United Kingdom",
    "United States",
    "Vietnam",
];

#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("Failed to read key values file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Key values file contains no values")]
    EmptyData,
}

/// Item attributes written alongside the partition value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemAttributes {
    pub population: u64,
    pub city_count: u32,
}

/// Uniformly random choice over a fixed list of partition key values.
#[derive(Debug, Clone)]
pub struct KeyValues {
    values: Vec<String>,
}

impl KeyValues {
    pub fn builtin() -> Self {
        Self {
            values: DEFAULT_VALUES.iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn from_values(values: Vec<String>) -> Result<Self, PayloadError> {
        let values: Vec<String> = values
            .into_iter()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
        if values.is_empty() {
            return Err(PayloadError::EmptyData);
        }
        Ok(Self { values })
    }

    /// Loads one value per line; blank lines are skipped.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, PayloadError> {
        let contents = fs::read_to_string(path.as_ref())?;
        let key_values = Self::from_values(contents.lines().map(str::to_string).collect())?;
        info!(
            path = %path.as_ref().display(),
            values = key_values.len(),
            "Loaded partition key values"
        );
        Ok(key_values)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn pick(&self) -> &str {
        // from_values rejects empty lists
        self.values
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or_default()
    }
}

impl Default for KeyValues {
    fn default() -> Self {
        Self::builtin()
    }
}

pub fn random_attributes() -> ItemAttributes {
    let mut rng = rand::thread_rng();
    ItemAttributes {
        population: rng.gen_range(500..=200_000_000),
        city_count: rng.gen_range(5..=1000),
    }
}
