//! Discovery-curve extraction from a single run log.
//!
//! Seed-labeled items are not "discovered" by the model, so by default they
//! are left out of every curve and discovery time computed here.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use st_types::{LabelMethod, RunLog};

fn is_relevant(labels: &[u8], item: usize) -> bool {
    labels.get(item).copied().unwrap_or(0) == 1
}

/// Cumulative inclusion counts for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Inclusions {
    /// Relevant items found so far, one entry per non-seed labeled item.
    pub cumulative: Vec<usize>,
    /// Relevant items left to find once the seed labels are given.
    pub remaining_after_init: usize,
    /// Number of seed-labeled items (relevant or not).
    pub n_initial: usize,
}

/// Walk the log in label order and count relevant items as they are labeled.
pub fn find_inclusions(log: &RunLog, labels: &[u8], remove_initial: bool) -> Inclusions {
    let mut cumulative = Vec::new();
    let mut found = 0usize;
    let mut n_initial = 0usize;
    let mut n_initial_inc = 0usize;

    for record in log.queries() {
        for (item, method) in record.labeled() {
            let relevant = usize::from(is_relevant(labels, item));
            if method == LabelMethod::Initial && remove_initial {
                n_initial_inc += relevant;
                n_initial += 1;
            } else {
                found += relevant;
                cumulative.push(found);
            }
        }
    }

    let total = labels.iter().filter(|&&l| l == 1).count();
    let remaining_after_init = if remove_initial {
        total.saturating_sub(n_initial_inc)
    } else {
        total
    };

    Inclusions {
        cumulative,
        remaining_after_init,
        n_initial,
    }
}

/// Every labeled item in the order it was labeled, plus the seed count.
pub fn labeled_order(log: &RunLog) -> (Vec<usize>, usize) {
    let mut order = Vec::new();
    let mut n_initial = 0;
    for record in log.queries() {
        n_initial += record
            .label_methods
            .iter()
            .filter(|m| **m == LabelMethod::Initial)
            .count();
        order.extend_from_slice(&record.label_idx);
    }
    (order, n_initial)
}

fn score(proba: &[f64], item: usize) -> f64 {
    proba.get(item).copied().unwrap_or(f64::NEG_INFINITY)
}

/// Remaining pool at the last step that logged a posterior, most relevant
/// first. Empty when no step carries posterior data.
pub fn last_proba_order(log: &RunLog) -> Vec<usize> {
    let Some((pool, proba)) = log.queries().iter().rev().find_map(|r| r.posterior()) else {
        return Vec::new();
    };
    let mut order = pool.to_vec();
    order.sort_by(|a, b| score(proba, *b).total_cmp(&score(proba, *a)));
    order
}

/// Pool at `query_i` sorted least-relevant first.
///
/// `None` means the step logged no estimate (or does not exist), which is not
/// the same as an empty pool.
pub fn proba_order(log: &RunLog, query_i: usize) -> Option<Vec<usize>> {
    let (pool, proba) = log.query(query_i).ok()?.posterior()?;
    let mut order = pool.to_vec();
    order.sort_by(|a, b| score(proba, *a).total_cmp(&score(proba, *b)));
    Some(order)
}

/// Relevant items left undiscovered for every rank cut at `query_i`.
///
/// Element `j` is the number of relevant pool items that would be missed if
/// review stopped after the `j` highest-ranked items.
pub fn n_false_neg(log: &RunLog, query_i: usize, labels: &[u8]) -> Option<Vec<usize>> {
    let order = proba_order(log, query_i)?;
    let mut counts = Vec::with_capacity(order.len());
    let mut n_one = 0;
    for item in &order {
        if is_relevant(labels, *item) {
            n_one += 1;
        }
        counts.push(n_one);
    }
    counts.reverse();
    Some(counts)
}

/// Element-wise mean of [`n_false_neg`] over several runs.
///
/// Runs without posterior data at `query_i`, or whose pool length differs
/// from the first run that has data, are left out of the denominator.
pub fn mean_false_neg<'a, I>(logs: I, query_i: usize, labels: &[u8]) -> Option<Vec<f64>>
where
    I: IntoIterator<Item = &'a RunLog>,
{
    let mut sum: Option<Vec<f64>> = None;
    let mut n_runs = 0usize;

    for log in logs {
        let Some(counts) = n_false_neg(log, query_i, labels) else {
            continue;
        };
        match sum.as_mut() {
            None => sum = Some(counts.iter().map(|&c| c as f64).collect()),
            Some(acc) if acc.len() == counts.len() => {
                for (a, c) in acc.iter_mut().zip(&counts) {
                    *a += *c as f64;
                }
            }
            Some(acc) => {
                debug!(
                    query = query_i,
                    expected = acc.len(),
                    got = counts.len(),
                    "skipping run with mismatched pool size"
                );
                continue;
            }
        }
        n_runs += 1;
    }

    let mut mean = sum?;
    for v in &mut mean {
        *v /= n_runs as f64;
    }
    Some(mean)
}

/// For each allowed number of misses, the smallest rank cut at which the mean
/// false-negative count drops below it. Thresholds that are never reached get
/// the full pool length.
pub fn stopping_limits<'a, I>(
    logs: I,
    query_i: usize,
    labels: &[u8],
    allow_miss: &[f64],
) -> Option<Vec<usize>>
where
    I: IntoIterator<Item = &'a RunLog>,
{
    let num_left = mean_false_neg(logs, query_i, labels)?;
    Some(
        allow_miss
            .iter()
            .map(|&miss| {
                num_left
                    .iter()
                    .position(|&left| left < miss)
                    .unwrap_or(num_left.len())
            })
            .collect(),
    )
}

/// One point of a discovery curve, both coordinates as fractions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub reviewed: f64,
    pub recall: f64,
}

/// (reviewed fraction, recall fraction) trajectory of a simulated review.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DiscoveryCurve {
    points: Vec<CurvePoint>,
}

impl DiscoveryCurve {
    pub fn new(points: Vec<CurvePoint>) -> Self {
        Self { points }
    }

    /// Build the curve for one run, excluding seed-labeled items.
    ///
    /// Reviewed fraction is relative to the pool left after seeding; recall
    /// is relative to the relevant items left after seeding (0 when there are
    /// none left to find).
    pub fn from_log(log: &RunLog, labels: &[u8]) -> Self {
        let inc = find_inclusions(log, labels, true);
        let n_pool = labels.len().saturating_sub(inc.n_initial);
        if n_pool == 0 {
            return Self::default();
        }
        let points = inc
            .cumulative
            .iter()
            .enumerate()
            .map(|(k, &found)| CurvePoint {
                reviewed: (k + 1) as f64 / n_pool as f64,
                recall: if inc.remaining_after_init == 0 {
                    0.0
                } else {
                    found as f64 / inc.remaining_after_init as f64
                },
            })
            .collect();
        Self { points }
    }

    /// Element-wise mean over the common prefix of several runs' curves.
    pub fn mean(curves: &[DiscoveryCurve]) -> Option<Self> {
        let len = curves.iter().map(|c| c.points.len()).min()?;
        let n = curves.len() as f64;
        let points = (0..len)
            .map(|i| {
                let (x, y) = curves.iter().fold((0.0, 0.0), |(x, y), c| {
                    (x + c.points[i].reviewed, y + c.points[i].recall)
                });
                CurvePoint {
                    reviewed: x / n,
                    recall: y / n,
                }
            })
            .collect();
        Some(Self { points })
    }

    pub fn points(&self) -> &[CurvePoint] {
        &self.points
    }

    pub fn last(&self) -> Option<CurvePoint> {
        self.points.last().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points at which recall went up, i.e. a relevant item was found.
    pub fn discovery_points(&self) -> Vec<CurvePoint> {
        let mut prev = 0.0;
        self.points
            .iter()
            .filter(|p| {
                let up = p.recall > prev;
                prev = p.recall;
                up
            })
            .copied()
            .collect()
    }

    /// Recall reached once `reviewed` of the pool has been screened, treating
    /// the curve as a step function that starts at the origin.
    pub fn recall_at(&self, reviewed: f64) -> f64 {
        let n = self
            .points
            .partition_point(|p| p.reviewed <= reviewed + f64::EPSILON);
        if n == 0 {
            0.0
        } else {
            self.points[n - 1].recall
        }
    }
}

/// Query-driven labels needed to find each non-seed relevant item in one run.
///
/// `None` marks a relevant item the run never found. Relevant items used as
/// seeds in this run are absent from the map.
pub fn discovery_times(log: &RunLog, labels: &[u8]) -> BTreeMap<usize, Option<usize>> {
    let mut times: BTreeMap<usize, Option<usize>> = labels
        .iter()
        .enumerate()
        .filter(|(_, &l)| l == 1)
        .map(|(i, _)| (i, None))
        .collect();

    let mut n_queried = 0usize;
    for record in log.queries() {
        for (item, method) in record.labeled() {
            match method {
                LabelMethod::Initial => {
                    times.remove(&item);
                }
                LabelMethod::Query => {
                    n_queried += 1;
                    if let Some(slot) = times.get_mut(&item) {
                        if slot.is_none() {
                            *slot = Some(n_queried);
                        }
                    }
                }
            }
        }
    }
    times
}

/// Mean discovery time per relevant item over several runs.
///
/// A never-found item counts as the dataset size for that run. Items that were
/// seeds in every run do not appear.
pub fn avg_time_to_discovery<'a, I>(logs: I, labels: &[u8]) -> BTreeMap<usize, f64>
where
    I: IntoIterator<Item = &'a RunLog>,
{
    let worst = labels.len();
    let mut acc: BTreeMap<usize, (f64, usize)> = BTreeMap::new();
    for log in logs {
        for (item, time) in discovery_times(log, labels) {
            let entry = acc.entry(item).or_insert((0.0, 0));
            entry.0 += time.unwrap_or(worst) as f64;
            entry.1 += 1;
        }
    }
    acc.into_iter()
        .map(|(item, (sum, n))| (item, sum / n as f64))
        .collect()
}
