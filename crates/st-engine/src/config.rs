//! Optimization run configuration, read from a JSON file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use st_metrics::LossStrategy;
use st_optimizer::{DriverConfig, SearchSpace};
use st_types::{config_error, Dataset, StResult};

use crate::dispatcher::ReviewSettings;
use crate::objective::SeedPlan;
use crate::simulator::CommandSimulator;

/// Default seed for drawing seed-label sets.
pub const DEFAULT_SEED_LABEL_SEED: u64 = 81276149;

/// One dataset taking part in the optimization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub name: String,
    /// Handed to the simulator untouched.
    pub source: PathBuf,
    /// JSON array of 0/1 relevance labels, one per item.
    pub labels: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuneConfig {
    pub datasets: Vec<DatasetConfig>,
    pub review: ReviewSettings,

    /// Parallel simulation runs per dataset and parameter set.
    pub n_runs: usize,
    pub n_included: usize,
    pub n_excluded: usize,
    pub seed_label_seed: u64,

    pub loss: LossStrategy,

    /// "random" or "bayesian".
    pub strategy: String,
    pub exploration_weight: f64,
    pub search_seed: u64,
    pub search_space: SearchSpace,

    pub n_iter: usize,
    pub checkpoint: PathBuf,
    pub work_dir: PathBuf,
    pub best_dir: PathBuf,

    pub simulator: CommandSimulator,
}

impl Default for TuneConfig {
    fn default() -> Self {
        Self {
            datasets: Vec::new(),
            review: ReviewSettings::default(),
            n_runs: 8,
            n_included: 10,
            n_excluded: 10,
            seed_label_seed: DEFAULT_SEED_LABEL_SEED,
            loss: LossStrategy::default(),
            strategy: "bayesian".to_string(),
            exploration_weight: 0.3,
            search_seed: 0,
            search_space: SearchSpace::new(),
            n_iter: 20,
            checkpoint: PathBuf::from("trials.json"),
            work_dir: PathBuf::from("temp"),
            best_dir: PathBuf::from("best"),
            simulator: CommandSimulator::new("asreview-sim", Vec::new()),
        }
    }
}

impl TuneConfig {
    pub fn load(path: &Path) -> StResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| config_error!("cannot read {}: {e}", path.display()))?;
        let config: TuneConfig = serde_json::from_str(&content)
            .map_err(|e| config_error!("invalid config {}: {e}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> StResult<()> {
        if self.datasets.is_empty() {
            return Err(config_error!("no datasets configured"));
        }
        if self.n_runs == 0 {
            return Err(config_error!("n_runs must be at least 1"));
        }
        if !matches!(self.strategy.as_str(), "random" | "bayesian") {
            return Err(config_error!("unknown search strategy: {}", self.strategy));
        }
        if self.work_dir == self.best_dir {
            return Err(config_error!("work_dir and best_dir must differ"));
        }
        let mut names: Vec<&str> = self.datasets.iter().map(|d| d.name.as_str()).collect();
        names.sort_unstable();
        if names.windows(2).any(|w| w[0] == w[1]) {
            return Err(config_error!("dataset names must be unique"));
        }
        self.search_space.validate()
    }

    pub fn with_dataset(mut self, dataset: DatasetConfig) -> Self {
        self.datasets.push(dataset);
        self
    }

    pub fn with_n_iter(mut self, n: usize) -> Self {
        self.n_iter = n;
        self
    }

    pub fn with_checkpoint(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint = path.into();
        self
    }

    pub fn with_strategy(mut self, strategy: &str) -> Self {
        self.strategy = strategy.to_string();
        self
    }

    pub fn with_loss(mut self, loss: LossStrategy) -> Self {
        self.loss = loss;
        self
    }

    pub fn with_search_space(mut self, space: SearchSpace) -> Self {
        self.search_space = space;
        self
    }

    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            n_iter: self.n_iter,
            checkpoint: self.checkpoint.clone(),
            work_dir: self.work_dir.clone(),
            best_dir: self.best_dir.clone(),
            seed: self.search_seed,
        }
    }

    pub fn seed_plan(&self) -> SeedPlan {
        SeedPlan {
            n_runs: self.n_runs,
            n_included: self.n_included,
            n_excluded: self.n_excluded,
            seed: self.seed_label_seed,
        }
    }

    /// Read every dataset's ground-truth labels.
    pub fn load_datasets(&self) -> StResult<Vec<Dataset>> {
        self.datasets
            .iter()
            .map(|d| Dataset::from_labels_file(d.name.clone(), d.source.clone(), &d.labels))
            .collect()
    }
}
