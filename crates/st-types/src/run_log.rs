//! Per-run event log written by one simulated review.
//!
//! A [`RunLog`] is an append-only list of [`QueryRecord`]s keyed by query
//! index. It is owned by a single simulation run while that run is alive and is
//! only read once the run has terminated.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::{LogError, StResult};

/// Current on-disk layout version of a run log.
pub const RUN_LOG_VERSION: u32 = 1;

/// How an item came to be labeled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelMethod {
    /// Seed label handed to the model before active querying starts.
    Initial,
    /// Label requested by the query strategy.
    Query,
}

/// Everything logged for one query step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    /// Item indices labeled at this step.
    pub label_idx: Vec<usize>,
    /// Labeling mechanism, parallel to `label_idx`.
    pub label_methods: Vec<LabelMethod>,
    /// Posterior relevance score per dataset item, if the model produced a
    /// new estimate at this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proba: Option<Vec<f64>>,
    /// Items still unlabeled after this step's labels were added.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_idx: Option<Vec<usize>>,
}

impl QueryRecord {
    pub fn new(label_idx: Vec<usize>, label_methods: Vec<LabelMethod>) -> Self {
        Self {
            label_idx,
            label_methods,
            proba: None,
            pool_idx: None,
        }
    }

    /// Seed step: every item labeled with [`LabelMethod::Initial`].
    pub fn initial(label_idx: Vec<usize>) -> Self {
        let methods = vec![LabelMethod::Initial; label_idx.len()];
        Self::new(label_idx, methods)
    }

    /// Query step: every item labeled with [`LabelMethod::Query`].
    pub fn query(label_idx: Vec<usize>) -> Self {
        let methods = vec![LabelMethod::Query; label_idx.len()];
        Self::new(label_idx, methods)
    }

    pub fn with_posterior(mut self, proba: Vec<f64>, pool_idx: Vec<usize>) -> Self {
        self.proba = Some(proba);
        self.pool_idx = Some(pool_idx);
        self
    }

    /// Pool and posterior together, or `None` when the step logged no
    /// estimate. Both halves must be present.
    pub fn posterior(&self) -> Option<(&[usize], &[f64])> {
        match (&self.pool_idx, &self.proba) {
            (Some(pool), Some(proba)) => Some((pool.as_slice(), proba.as_slice())),
            _ => None,
        }
    }

    /// Iterate `(item, method)` pairs.
    pub fn labeled(&self) -> impl Iterator<Item = (usize, LabelMethod)> + '_ {
        self.label_idx
            .iter()
            .copied()
            .zip(self.label_methods.iter().copied())
    }
}

/// Append-only record of one simulated review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLog {
    pub version: u32,
    queries: Vec<QueryRecord>,
}

impl RunLog {
    pub fn new() -> Self {
        Self {
            version: RUN_LOG_VERSION,
            queries: Vec::new(),
        }
    }

    /// Append the next query step. Returns the index it was stored under.
    pub fn push_query(&mut self, record: QueryRecord) -> usize {
        self.queries.push(record);
        self.queries.len() - 1
    }

    pub fn n_queries(&self) -> usize {
        self.queries.len()
    }

    pub fn query(&self, query_i: usize) -> StResult<&QueryRecord> {
        self.queries.get(query_i).ok_or_else(|| {
            LogError::QueryOutOfRange {
                query: query_i,
                n_queries: self.queries.len(),
            }
            .into()
        })
    }

    pub fn queries(&self) -> &[QueryRecord] {
        &self.queries
    }

    /// Check structural consistency of every record.
    pub fn validate(&self) -> StResult<()> {
        if self.version != RUN_LOG_VERSION {
            return Err(LogError::UnsupportedVersion {
                found: self.version,
                expected: RUN_LOG_VERSION,
            }
            .into());
        }
        for (query, record) in self.queries.iter().enumerate() {
            if record.label_idx.len() != record.label_methods.len() {
                return Err(LogError::LengthMismatch {
                    query,
                    n_idx: record.label_idx.len(),
                    n_methods: record.label_methods.len(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Read and validate a log from disk.
    pub fn load(path: &Path) -> StResult<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LogError::NotFound {
                    path: path.to_path_buf(),
                }
                .into())
            }
            Err(e) => return Err(e.into()),
        };
        let log: RunLog = serde_json::from_str(&content).map_err(|e| LogError::Malformed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        log.validate()?;
        Ok(log)
    }

    /// Write the log next to its final path and rename it into place, so a
    /// reader never sees a half-written file.
    pub fn save(&self, path: &Path) -> StResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl Default for RunLog {
    fn default() -> Self {
        Self::new()
    }
}
