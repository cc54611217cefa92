//! Loss strategies collapsing a set of parallel runs into one scalar.
//!
//! Lower is always better. No strategy fails: when there is no usable data
//! (every run missing, nothing discovered) it returns its documented
//! worst-case value instead.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use st_types::RunLog;

use crate::curve::{avg_time_to_discovery, discovery_times, mean_false_neg, DiscoveryCurve};
use crate::metrics::{integrated_loss, mean_wss, time_to_discovery_spread};

/// All run logs produced for one (dataset, parameter set) evaluation.
#[derive(Debug, Clone, Default)]
pub struct RunSet {
    /// Ground-truth relevance labels of the dataset.
    pub labels: Vec<u8>,
    /// One slot per launched run; `None` when the run left no readable log.
    pub runs: Vec<Option<RunLog>>,
}

impl RunSet {
    pub fn new(labels: Vec<u8>, runs: Vec<Option<RunLog>>) -> Self {
        Self { labels, runs }
    }

    /// Logs of runs that completed.
    pub fn available(&self) -> impl Iterator<Item = &RunLog> {
        self.runs.iter().flatten()
    }

    pub fn n_missing(&self) -> usize {
        self.runs.iter().filter(|r| r.is_none()).count()
    }

    /// Discovery curve of every completed run.
    pub fn curves(&self) -> Vec<DiscoveryCurve> {
        self.runs
            .par_iter()
            .flatten()
            .map(|log| DiscoveryCurve::from_log(log, &self.labels))
            .collect()
    }

    /// Element-wise mean curve of the completed runs.
    pub fn mean_curve(&self) -> Option<DiscoveryCurve> {
        DiscoveryCurve::mean(&self.curves())
    }

    pub fn avg_time_to_discovery(&self) -> BTreeMap<usize, f64> {
        avg_time_to_discovery(self.available(), &self.labels)
    }

    pub fn mean_false_neg(&self, query_i: usize) -> Option<Vec<f64>> {
        mean_false_neg(self.available(), query_i, &self.labels)
    }

    /// Whether any completed run found a relevant item by querying.
    pub fn has_discoveries(&self) -> bool {
        self.available().any(|log| {
            discovery_times(log, &self.labels)
                .values()
                .any(Option::is_some)
        })
    }
}

fn default_moment() -> f64 {
    1.0
}

fn default_wss_targets() -> Vec<f64> {
    vec![0.95, 1.0]
}

/// Scoring strategy applied to each evaluated run set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LossStrategy {
    /// Power mean of normalized discovery times. Worst case `1.0`.
    Spread {
        #[serde(default = "default_moment")]
        moment: f64,
    },
    /// Negative area under the mean discovery curve. Worst case `0.0`.
    Integrated,
    /// Reviewed fraction to reach each recall target, averaged. Worst case
    /// `1.0`.
    Wss {
        #[serde(default = "default_wss_targets")]
        targets: Vec<f64>,
    },
}

impl Default for LossStrategy {
    fn default() -> Self {
        Self::Spread {
            moment: default_moment(),
        }
    }
}

impl LossStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Spread { .. } => "spread",
            Self::Integrated => "integrated",
            Self::Wss { .. } => "wss",
        }
    }

    /// Value reported when a run set carries no usable data.
    pub fn worst_case(&self) -> f64 {
        match self {
            Self::Spread { .. } => 1.0,
            Self::Integrated => 0.0,
            Self::Wss { .. } => 1.0,
        }
    }

    /// Score a run set. Always finite and never worse than
    /// [`LossStrategy::worst_case`].
    pub fn evaluate(&self, runs: &RunSet) -> f64 {
        let worst = self.worst_case();
        if !runs.has_discoveries() {
            return worst;
        }
        let value = match self {
            Self::Spread { moment } => time_to_discovery_spread(
                &runs.avg_time_to_discovery(),
                runs.labels.len(),
                *moment,
            ),
            Self::Integrated => runs.mean_curve().map(|c| integrated_loss(&c)),
            Self::Wss { targets } => runs
                .mean_curve()
                .and_then(|c| mean_wss(&c, targets)),
        };
        value
            .filter(|v| v.is_finite())
            .map_or(worst, |v| v.min(worst))
    }
}
