//! Trial records and the persisted trial history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

use st_types::{CheckpointError, ParameterVector, StError, StResult};

/// Layout version of the checkpoint file. Bump when [`TrialRecord`] changes
/// incompatibly.
pub const CHECKPOINT_VERSION: u32 = 1;

/// Outcome flag reported alongside each loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStatus {
    Ok,
    Failed,
}

/// What an objective returns for one parameter vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub loss: f64,
    pub status: TrialStatus,
    /// Loss per dataset, before averaging.
    pub dataset_losses: BTreeMap<String, f64>,
}

impl Evaluation {
    pub fn ok(loss: f64) -> Self {
        Self {
            loss,
            status: TrialStatus::Ok,
            dataset_losses: BTreeMap::new(),
        }
    }
}

/// One evaluated parameter set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub id: Uuid,
    /// Position in the history, 0-indexed.
    pub trial_number: usize,
    pub parameters: ParameterVector,
    pub loss: f64,
    pub status: TrialStatus,
    pub dataset_losses: BTreeMap<String, f64>,
    pub created_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_seconds: f64,
}

impl TrialRecord {
    pub fn new(
        trial_number: usize,
        parameters: ParameterVector,
        evaluation: Evaluation,
        created_at: DateTime<Utc>,
    ) -> Self {
        let finished_at = Utc::now();
        let duration_seconds = (finished_at - created_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        // JSON cannot hold NaN or infinity; such losses are recorded as failed.
        let (loss, status) = if evaluation.loss.is_finite() {
            (evaluation.loss, evaluation.status)
        } else {
            (f64::MAX, TrialStatus::Failed)
        };
        Self {
            id: Uuid::new_v4(),
            trial_number,
            parameters,
            loss,
            status,
            dataset_losses: evaluation.dataset_losses,
            created_at,
            finished_at,
            duration_seconds,
        }
    }

    /// Whether this trial can compete for best.
    pub fn is_eligible(&self) -> bool {
        self.status == TrialStatus::Ok && self.loss.is_finite()
    }
}

/// Append-only, ordered list of trials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialHistory {
    pub version: u32,
    trials: Vec<TrialRecord>,
}

impl TrialHistory {
    pub fn new() -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            trials: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    pub fn trials(&self) -> &[TrialRecord] {
        &self.trials
    }

    pub fn last(&self) -> Option<&TrialRecord> {
        self.trials.last()
    }

    /// Append a trial; its trial number is forced to its position.
    pub fn push(&mut self, mut record: TrialRecord) -> &TrialRecord {
        record.trial_number = self.trials.len();
        self.trials.push(record);
        &self.trials[self.trials.len() - 1]
    }

    /// Index of the earliest trial with the lowest loss.
    pub fn best_index(&self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, trial) in self.trials.iter().enumerate() {
            if !trial.is_eligible() {
                continue;
            }
            match best {
                Some((_, loss)) if loss <= trial.loss => {}
                _ => best = Some((i, trial.loss)),
            }
        }
        best.map(|(i, _)| i)
    }

    pub fn best(&self) -> Option<&TrialRecord> {
        self.best_index().map(|i| &self.trials[i])
    }

    /// True when the most recent trial is the global best by identity.
    pub fn latest_is_best(&self) -> bool {
        !self.trials.is_empty() && self.best_index() == Some(self.trials.len() - 1)
    }

    /// Read a checkpoint written by [`TrialHistory::save`].
    pub fn load(path: &Path) -> StResult<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CheckpointError::NotFound {
                    path: path.to_path_buf(),
                }
                .into())
            }
            Err(e) => return Err(e.into()),
        };
        let history: TrialHistory =
            serde_json::from_str(&content).map_err(|e| CheckpointError::Corrupt {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        if history.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::UnsupportedVersion {
                found: history.version,
                expected: CHECKPOINT_VERSION,
            }
            .into());
        }
        Ok(history)
    }

    /// Load a checkpoint, falling back to an empty history when it is missing
    /// or unreadable.
    pub fn load_or_fresh(path: &Path) -> Self {
        match Self::load(path) {
            Ok(history) => {
                info!(path = %path.display(), trials = history.len(), "Resuming trial history");
                history
            }
            Err(StError::Checkpoint(CheckpointError::NotFound { .. })) => {
                info!(path = %path.display(), "No checkpoint found, starting fresh");
                Self::new()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable checkpoint, starting fresh");
                Self::new()
            }
        }
    }

    /// Write the full history to a sibling temp file and rename it over
    /// `path`.
    pub fn save(&self, path: &Path) -> StResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl Default for TrialHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use st_types::ParameterValue;
    use tempfile::tempdir;

    fn record(loss: f64) -> TrialRecord {
        let mut params = ParameterVector::new();
        params.insert("mdl_C".into(), ParameterValue::Float(loss * 10.0));
        TrialRecord::new(0, params, Evaluation::ok(loss), Utc::now())
    }

    #[test]
    fn push_assigns_trial_numbers() {
        let mut history = TrialHistory::new();
        history.push(record(0.5));
        let second = history.push(record(0.4));
        assert_eq!(second.trial_number, 1);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn best_trial_tracking_minimize() {
        let mut history = TrialHistory::new();
        assert!(history.best().is_none());
        assert!(!history.latest_is_best());

        history.push(record(0.15));
        assert!(history.latest_is_best());

        history.push(record(0.05));
        assert_eq!(history.best_index(), Some(1));
        assert!(history.latest_is_best());

        // Worse result should not replace
        history.push(record(0.30));
        assert_eq!(history.best_index(), Some(1));
        assert!(!history.latest_is_best());
    }

    #[test]
    fn ties_keep_the_earlier_trial() {
        let mut history = TrialHistory::new();
        history.push(record(0.2));
        history.push(record(0.2));
        assert_eq!(history.best_index(), Some(0));
        assert!(!history.latest_is_best());
    }

    #[test]
    fn failed_and_non_finite_trials_never_win() {
        let mut history = TrialHistory::new();
        history.push(record(0.9));
        let mut failed = record(0.0);
        failed.status = TrialStatus::Failed;
        history.push(failed);
        history.push(record(f64::NAN));
        assert_eq!(history.best_index(), Some(0));
    }

    #[test]
    fn checkpoint_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trials.json");
        let mut history = TrialHistory::new();
        history.push(record(0.3));
        history.push(record(0.1));
        history.save(&path).unwrap();

        let back = TrialHistory::load(&path).unwrap();
        assert_eq!(back, history);
        assert_eq!(back.best().unwrap().id, history.best().unwrap().id);
    }

    #[test]
    fn missing_or_corrupt_checkpoint_starts_fresh() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(matches!(
            TrialHistory::load(&missing),
            Err(StError::Checkpoint(CheckpointError::NotFound { .. }))
        ));
        assert!(TrialHistory::load_or_fresh(&missing).is_empty());

        let corrupt = dir.path().join("trials.json");
        std::fs::write(&corrupt, b"{\"version\": 1, \"trials\": [").unwrap();
        assert!(matches!(
            TrialHistory::load(&corrupt),
            Err(StError::Checkpoint(CheckpointError::Corrupt { .. }))
        ));
        assert!(TrialHistory::load_or_fresh(&corrupt).is_empty());
    }

    #[test]
    fn future_checkpoint_version_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trials.json");
        std::fs::write(&path, br#"{"version": 99, "trials": []}"#).unwrap();
        assert!(matches!(
            TrialHistory::load(&path),
            Err(StError::Checkpoint(CheckpointError::UnsupportedVersion { found: 99, .. }))
        ));
    }
}
