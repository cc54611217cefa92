//! Resumable sequential search loop.
//!
//! One iteration is: propose one parameter vector, evaluate it, append the
//! trial, persist the whole history, and snapshot the working log directory
//! when the new trial is the global best. An interrupted run therefore loses
//! at most the iteration that was in flight.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use st_types::{display_params, internal_error, ParameterVector, StResult};

use crate::search::SearchStrategy;
use crate::trial::{Evaluation, TrialHistory, TrialRecord};

/// Something that scores a parameter vector. Lower loss is better.
#[async_trait]
pub trait Objective: Send {
    async fn evaluate(&mut self, params: &ParameterVector) -> StResult<Evaluation>;
}

/// Paths and budget for a search run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Additional evaluations to run on top of any loaded history.
    pub n_iter: usize,
    /// Where the trial history is persisted after every iteration.
    pub checkpoint: PathBuf,
    /// Directory the objective writes run logs into.
    pub work_dir: PathBuf,
    /// Directory overwritten with a copy of `work_dir` on every new best.
    pub best_dir: PathBuf,
    /// Base seed for proposal randomness.
    pub seed: u64,
}

/// Lifecycle of a search run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchState {
    NotStarted,
    Loaded,
    Iterating,
    Done,
    Failed,
}

/// Aggregate status of a search run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchStatus {
    pub state: SearchState,
    pub trials_loaded: usize,
    pub trials_completed: usize,
    pub best_trial: Option<usize>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl SearchStatus {
    fn new() -> Self {
        Self {
            state: SearchState::NotStarted,
            trials_loaded: 0,
            trials_completed: 0,
            best_trial: None,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    fn mark_running(&mut self) {
        self.state = SearchState::Iterating;
        self.started_at = Some(Utc::now());
    }

    fn mark_completed(&mut self) {
        self.state = SearchState::Done;
        self.finished_at = Some(Utc::now());
    }

    fn mark_failed(&mut self, error: String) {
        self.state = SearchState::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }
}

/// Owns the strategy and the trial history for one search run.
pub struct SearchDriver {
    config: DriverConfig,
    strategy: Box<dyn SearchStrategy>,
    history: TrialHistory,
    status: SearchStatus,
}

impl SearchDriver {
    pub fn new(config: DriverConfig, strategy: Box<dyn SearchStrategy>) -> Self {
        Self {
            config,
            strategy,
            history: TrialHistory::new(),
            status: SearchStatus::new(),
        }
    }

    pub fn history(&self) -> &TrialHistory {
        &self.history
    }

    pub fn status(&self) -> &SearchStatus {
        &self.status
    }

    /// Load the checkpoint (or start fresh) and replay it into the strategy.
    pub fn resume(&mut self) {
        self.history = TrialHistory::load_or_fresh(&self.config.checkpoint);
        for trial in self.history.trials() {
            self.strategy.report(&trial.parameters, trial.loss);
        }
        self.status.trials_loaded = self.history.len();
        self.status.best_trial = self.history.best_index();
        self.status.state = SearchState::Loaded;
    }

    /// Randomness for the proposal of trial `trial_number`, independent of
    /// how many processes the search was split across.
    fn proposal_rng(&self, trial_number: usize) -> StdRng {
        StdRng::seed_from_u64(self.config.seed.wrapping_add(trial_number as u64))
    }

    /// Run one propose → evaluate → persist → maybe-snapshot iteration.
    pub async fn step<O>(&mut self, objective: &mut O) -> StResult<&TrialRecord>
    where
        O: Objective + ?Sized,
    {
        let trial_number = self.history.len();
        let mut rng = self.proposal_rng(trial_number);
        let params = self.strategy.suggest(&mut rng);
        debug!(
            trial = trial_number,
            strategy = self.strategy.name(),
            params = %display_params(&params),
            "Proposed parameters"
        );

        let created_at = Utc::now();
        let evaluation = objective.evaluate(&params).await?;
        let record = TrialRecord::new(trial_number, params, evaluation, created_at);
        self.strategy.report(&record.parameters, record.loss);
        self.history.push(record);

        self.history.save(&self.config.checkpoint)?;

        let best = self.history.best();
        info!(
            trial = trial_number,
            loss = self.history.trials()[trial_number].loss,
            best_loss = best.map(|b| b.loss),
            "Completed trial"
        );

        if self.history.latest_is_best() {
            info!(trial = trial_number, "New best trial, snapshotting run logs");
            snapshot_dir(&self.config.work_dir, &self.config.best_dir)?;
        }
        self.status.trials_completed += 1;
        self.status.best_trial = self.history.best_index();

        Ok(&self.history.trials()[trial_number])
    }

    /// Resume if needed, then run `n_iter` iterations.
    ///
    /// An evaluation error stops the run without retry; every trial finished
    /// before it is already on disk.
    pub async fn run<O>(&mut self, objective: &mut O) -> StResult<&TrialHistory>
    where
        O: Objective + ?Sized,
    {
        if self.status.state == SearchState::NotStarted {
            self.resume();
        }
        self.status.mark_running();
        info!(
            start = self.history.len(),
            iterations = self.config.n_iter,
            strategy = self.strategy.name(),
            "Starting search"
        );

        for _ in 0..self.config.n_iter {
            let outcome = self.step(objective).await.map(|_| ());
            if let Err(e) = outcome {
                warn!(error = %e, trial = self.history.len(), "Iteration failed, stopping search");
                self.status.mark_failed(e.to_string());
                return Err(e);
            }
        }

        self.status.mark_completed();
        Ok(&self.history)
    }
}

/// Replace `dst` with a recursive copy of `src`.
///
/// The copy is staged in a sibling directory and only renamed over `dst` once
/// complete; a failed copy leaves the previous `dst` untouched.
pub fn snapshot_dir(src: &Path, dst: &Path) -> StResult<()> {
    if !src.is_dir() {
        warn!(src = %src.display(), "Nothing to snapshot, work directory missing");
        return Ok(());
    }
    let name = dst
        .file_name()
        .ok_or_else(|| internal_error!("snapshot target {} has no file name", dst.display()))?;
    let mut staged_name = name.to_os_string();
    staged_name.push(".tmp");
    let staging = dst.with_file_name(staged_name);

    if staging.exists() {
        std::fs::remove_dir_all(&staging)?;
    }
    if let Err(e) = copy_tree(src, &staging) {
        if let Err(cleanup) = std::fs::remove_dir_all(&staging) {
            debug!(path = %staging.display(), error = %cleanup, "Could not remove partial snapshot");
        }
        return Err(e);
    }

    if dst.exists() {
        std::fs::remove_dir_all(dst)?;
    }
    std::fs::rename(&staging, dst)?;
    Ok(())
}

fn copy_tree(src: &Path, dst: &Path) -> StResult<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
