//! The objective the search driver optimizes: mean loss over datasets.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use tracing::{debug, info};

use st_metrics::LossStrategy;
use st_optimizer::{Evaluation, Objective, TrialStatus};
use st_types::{display_params, validation_error, Dataset, ParameterVector, StResult};

use crate::dispatcher::{ReviewSettings, RunDispatcher};

/// Prefix routing a parameter to the model constructor.
pub const MODEL_PREFIX: &str = "mdl_";
/// Prefix routing a parameter to the balance strategy.
pub const BALANCE_PREFIX: &str = "bal_";

/// A flat parameter vector routed to its three destinations.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterSplit {
    /// Unprefixed keys: reviewer runtime overrides.
    pub runtime: ParameterVector,
    /// `mdl_` keys with the prefix stripped.
    pub model: ParameterVector,
    /// `bal_` keys with the prefix stripped.
    pub balance: ParameterVector,
}

impl ParameterSplit {
    /// Route every key by prefix. A key consisting only of a prefix is
    /// rejected.
    pub fn classify(params: &ParameterVector) -> StResult<Self> {
        let mut split = Self::default();
        for (key, value) in params {
            let (dest, name) = if let Some(name) = key.strip_prefix(MODEL_PREFIX) {
                (&mut split.model, name)
            } else if let Some(name) = key.strip_prefix(BALANCE_PREFIX) {
                (&mut split.balance, name)
            } else {
                (&mut split.runtime, key.as_str())
            };
            if name.is_empty() {
                return Err(validation_error!("parameter `{key}` has a prefix but no name"));
            }
            dest.insert(name.to_string(), value.clone());
        }
        Ok(split)
    }
}

/// Seed-label sets for every run on one dataset.
///
/// Drawn once at optimization start so every parameter set is evaluated on
/// the same seeds.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedSets {
    included: Vec<Vec<usize>>,
    excluded: Vec<Vec<usize>>,
}

impl SeedSets {
    /// Draw `n_runs` (included, excluded) pairs without replacement within
    /// each pair. Deterministic for a given `seed`.
    pub fn draw(
        dataset: &Dataset,
        n_runs: usize,
        n_included: usize,
        n_excluded: usize,
        seed: u64,
    ) -> StResult<Self> {
        let ones = dataset.relevant_indices();
        let zeros = dataset.irrelevant_indices();
        if n_included > ones.len() || n_excluded > zeros.len() {
            return Err(validation_error!(
                "dataset {} has {} relevant and {} irrelevant items, cannot seed {} + {}",
                dataset.name,
                ones.len(),
                zeros.len(),
                n_included,
                n_excluded
            ));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut included: Vec<Vec<usize>> = Vec::with_capacity(n_runs);
        let mut excluded: Vec<Vec<usize>> = Vec::with_capacity(n_runs);
        for _ in 0..n_runs {
            included.push(
                rand::seq::index::sample(&mut rng, ones.len(), n_included)
                    .iter()
                    .map(|i| ones[i])
                    .collect(),
            );
            excluded.push(
                rand::seq::index::sample(&mut rng, zeros.len(), n_excluded)
                    .iter()
                    .map(|i| zeros[i])
                    .collect(),
            );
        }
        Ok(Self { included, excluded })
    }

    pub fn len(&self) -> usize {
        self.included.len()
    }

    pub fn is_empty(&self) -> bool {
        self.included.is_empty()
    }

    /// (included, excluded) seed items of `run`.
    pub fn run(&self, run: usize) -> (&[usize], &[usize]) {
        (&self.included[run], &self.excluded[run])
    }
}

/// How seed-label sets are drawn for each dataset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeedPlan {
    pub n_runs: usize,
    pub n_included: usize,
    pub n_excluded: usize,
    pub seed: u64,
}

/// Evaluates a parameter vector on every dataset and averages the losses.
pub struct ObjectiveAggregator {
    datasets: Vec<(Dataset, SeedSets)>,
    dispatcher: RunDispatcher,
    settings: ReviewSettings,
    loss: LossStrategy,
}

impl ObjectiveAggregator {
    /// Precompute seed sets for every dataset.
    pub fn new(
        datasets: Vec<Dataset>,
        dispatcher: RunDispatcher,
        settings: ReviewSettings,
        loss: LossStrategy,
        plan: SeedPlan,
    ) -> StResult<Self> {
        if datasets.is_empty() {
            return Err(validation_error!("at least one dataset is required"));
        }
        let datasets = datasets
            .into_iter()
            .map(|ds| {
                let seeds =
                    SeedSets::draw(&ds, plan.n_runs, plan.n_included, plan.n_excluded, plan.seed)?;
                Ok((ds, seeds))
            })
            .collect::<StResult<Vec<_>>>()?;
        Ok(Self {
            datasets,
            dispatcher,
            settings,
            loss,
        })
    }

    pub fn seed_sets(&self, dataset: &str) -> Option<&SeedSets> {
        self.datasets
            .iter()
            .find(|(ds, _)| ds.name == dataset)
            .map(|(_, seeds)| seeds)
    }

    /// Mean loss over datasets, evaluated one dataset at a time.
    pub async fn evaluate_params(&self, params: &ParameterVector) -> StResult<Evaluation> {
        let split = ParameterSplit::classify(params)?;
        debug!(
            model = %display_params(&split.model),
            balance = %display_params(&split.balance),
            runtime = %display_params(&split.runtime),
            "Routed parameters"
        );

        let mut dataset_losses = BTreeMap::new();
        for (dataset, seeds) in &self.datasets {
            let runs = self
                .dispatcher
                .dispatch(dataset, &self.settings, &split, seeds)
                .await?;
            let loss = self.loss.evaluate(&runs);
            info!(
                dataset = %dataset.name,
                loss,
                missing_runs = runs.n_missing(),
                strategy = self.loss.name(),
                "Dataset evaluated"
            );
            dataset_losses.insert(dataset.name.clone(), loss);
        }

        let loss = dataset_losses.values().sum::<f64>() / dataset_losses.len() as f64;
        Ok(Evaluation {
            loss,
            status: TrialStatus::Ok,
            dataset_losses,
        })
    }
}

#[async_trait]
impl Objective for ObjectiveAggregator {
    async fn evaluate(&mut self, params: &ParameterVector) -> StResult<Evaluation> {
        self.evaluate_params(params).await
    }
}
