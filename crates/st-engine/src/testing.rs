//! In-process stand-in for the reviewer, used by the unit tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::Barrier;

use st_types::{internal_error, ParameterValue, QueryRecord, RunLog, StResult};

use crate::simulator::{SimulationRequest, Simulator};

/// Replays a review whose ordering is fully determined by the `delay` model
/// kwarg: that many irrelevant items are queried before any relevant one.
#[derive(Default)]
pub struct OracleSimulator {
    labels: HashMap<PathBuf, Vec<u8>>,
    pub fail_runs: Vec<u64>,
    pub panic_runs: Vec<u64>,
    pub barrier: Option<Arc<Barrier>>,
    pub seen: Mutex<Vec<SimulationRequest>>,
}

impl OracleSimulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dataset(mut self, source: impl Into<PathBuf>, labels: Vec<u8>) -> Self {
        self.labels.insert(source.into(), labels);
        self
    }

    pub fn requests(&self) -> Vec<SimulationRequest> {
        let mut seen = self.seen.lock().unwrap().clone();
        seen.sort_by_key(|r| r.seed);
        seen
    }
}

#[async_trait]
impl Simulator for OracleSimulator {
    async fn simulate(&self, request: &SimulationRequest) -> StResult<()> {
        self.seen.lock().unwrap().push(request.clone());
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        if self.panic_runs.contains(&request.seed) {
            panic!("reviewer crashed in run {}", request.seed);
        }
        if self.fail_runs.contains(&request.seed) {
            return Err(internal_error!("reviewer failed in run {}", request.seed));
        }

        let labels = self
            .labels
            .get(&request.dataset)
            .ok_or_else(|| internal_error!("unknown dataset {}", request.dataset.display()))?;
        let delay = match request.model_kwargs.get("delay") {
            Some(ParameterValue::Int(d)) => *d as usize,
            _ => 0,
        };

        let mut seeds = request.prior_included.clone();
        seeds.extend(&request.prior_excluded);
        let (relevant, irrelevant): (Vec<usize>, Vec<usize>) = (0..labels.len())
            .filter(|i| !seeds.contains(i))
            .partition(|&i| labels[i] == 1);
        let split = delay.min(irrelevant.len());
        let order: Vec<usize> = irrelevant[..split]
            .iter()
            .chain(&relevant)
            .chain(&irrelevant[split..])
            .copied()
            .collect();

        let proba: Vec<f64> = labels.iter().map(|&l| if l == 1 { 0.9 } else { 0.1 }).collect();
        let mut pool = order.clone();
        let mut log = RunLog::new();
        log.push_query(QueryRecord::initial(seeds).with_posterior(proba.clone(), pool.clone()));
        for item in order {
            pool.retain(|&p| p != item);
            log.push_query(QueryRecord::query(vec![item]).with_posterior(proba.clone(), pool.clone()));
        }
        log.save(&request.log_path)
    }
}
