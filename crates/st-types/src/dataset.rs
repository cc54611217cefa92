//! Fully labeled datasets used as simulation ground truth.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::StResult;
use crate::validation_error;

/// A dataset handle: where the reviewer finds it, plus its relevance labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    /// Source handed to the simulator untouched.
    pub source: PathBuf,
    /// Ground truth, 1 = relevant, 0 = irrelevant, indexed by item.
    pub labels: Vec<u8>,
}

impl Dataset {
    pub fn new(name: impl Into<String>, source: impl Into<PathBuf>, labels: Vec<u8>) -> StResult<Self> {
        let name = name.into();
        if let Some(bad) = labels.iter().find(|&&l| l > 1) {
            return Err(validation_error!("dataset {name}: label {bad} is not 0 or 1"));
        }
        Ok(Self {
            name,
            source: source.into(),
            labels,
        })
    }

    /// Read labels from a JSON array of 0/1 values.
    pub fn from_labels_file(
        name: impl Into<String>,
        source: impl Into<PathBuf>,
        labels_path: &Path,
    ) -> StResult<Self> {
        let content = std::fs::read_to_string(labels_path)?;
        let labels: Vec<u8> = serde_json::from_str(&content)?;
        Self::new(name, source, labels)
    }

    pub fn n_items(&self) -> usize {
        self.labels.len()
    }

    pub fn n_relevant(&self) -> usize {
        self.labels.iter().filter(|&&l| l == 1).count()
    }

    /// Indices of relevant items, ascending.
    pub fn relevant_indices(&self) -> Vec<usize> {
        self.indices_with(1)
    }

    /// Indices of irrelevant items, ascending.
    pub fn irrelevant_indices(&self) -> Vec<usize> {
        self.indices_with(0)
    }

    fn indices_with(&self, label: u8) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, &l)| l == label)
            .map(|(i, _)| i)
            .collect()
    }
}
