//! Fan-out of independent simulated reviews for one dataset.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use st_metrics::RunSet;
use st_types::{internal_error, Dataset, RunLog, SimulationError, StResult};

use crate::objective::{ParameterSplit, SeedSets};
use crate::simulator::{SimulationRequest, Simulator};

/// Reviewer settings shared by every run of an optimization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewSettings {
    pub model: String,
    pub balance_strategy: String,
    pub query_strategy: String,
    pub n_instances: usize,
    pub n_papers: usize,
}

impl Default for ReviewSettings {
    fn default() -> Self {
        Self {
            model: "svm".to_string(),
            balance_strategy: "simple".to_string(),
            query_strategy: "rand_max".to_string(),
            n_instances: 50,
            n_papers: 520,
        }
    }
}

/// Launches one simulation per seed set, concurrently, and collects the logs.
pub struct RunDispatcher {
    simulator: Arc<dyn Simulator>,
    work_dir: PathBuf,
}

impl RunDispatcher {
    pub fn new(simulator: Arc<dyn Simulator>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            simulator,
            work_dir: work_dir.into(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Per-dataset directory holding that dataset's run logs.
    pub fn log_dir(&self, dataset: &Dataset) -> PathBuf {
        self.work_dir.join(&dataset.name)
    }

    pub fn log_path(&self, dataset: &Dataset, run: usize) -> PathBuf {
        self.log_dir(dataset).join(format!("results_{run}.json"))
    }

    /// Run every seed set through the simulator and wait for all of them.
    ///
    /// Runs are never retried or cancelled. A run that errors, panics or
    /// leaves an unreadable log shows up as `None` in the returned set.
    pub async fn dispatch(
        &self,
        dataset: &Dataset,
        settings: &ReviewSettings,
        split: &ParameterSplit,
        seeds: &SeedSets,
    ) -> StResult<RunSet> {
        tokio::fs::create_dir_all(self.log_dir(dataset)).await?;

        let mut handles = Vec::with_capacity(seeds.len());
        for run in 0..seeds.len() {
            let log_path = self.log_path(dataset, run);
            // A crashed run must read as missing, not as last iteration's log.
            match tokio::fs::remove_file(&log_path).await {
                Ok(()) => debug!(path = %log_path.display(), "Removed stale run log"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }

            let (included, excluded) = seeds.run(run);
            let request = SimulationRequest {
                dataset: dataset.source.clone(),
                model: settings.model.clone(),
                model_kwargs: split.model.clone(),
                balance_strategy: settings.balance_strategy.clone(),
                balance_kwargs: split.balance.clone(),
                query_strategy: settings.query_strategy.clone(),
                runtime_kwargs: split.runtime.clone(),
                n_instances: settings.n_instances,
                n_papers: settings.n_papers,
                log_path,
                prior_included: included.to_vec(),
                prior_excluded: excluded.to_vec(),
                seed: run as u64,
            };

            let simulator = Arc::clone(&self.simulator);
            handles.push(tokio::spawn(async move {
                simulator.simulate(&request).await
            }));
        }
        info!(
            dataset = %dataset.name,
            runs = handles.len(),
            simulator = self.simulator.name(),
            "Launched simulation runs"
        );

        let mut runs = Vec::with_capacity(handles.len());
        for (run, handle) in handles.into_iter().enumerate() {
            let outcome = match handle.await {
                Ok(result) => result,
                Err(join_error) => Err(SimulationError::Aborted {
                    run: run as u64,
                    message: join_error.to_string(),
                }
                .into()),
            };
            let log = match outcome {
                Ok(()) => match load_log(self.log_path(dataset, run)).await {
                    Ok(log) => Some(log),
                    Err(e) => {
                        warn!(dataset = %dataset.name, run, error = %e, "Run finished without a readable log");
                        None
                    }
                },
                Err(e) => {
                    warn!(dataset = %dataset.name, run, error = %e, "Simulation run failed");
                    None
                }
            };
            runs.push(log);
        }

        Ok(RunSet::new(dataset.labels.clone(), runs))
    }
}

/// Parse a finished run's log off the async workers.
async fn load_log(path: PathBuf) -> StResult<RunLog> {
    tokio::task::spawn_blocking(move || RunLog::load(&path))
        .await
        .map_err(|e| internal_error!("run log reader aborted: {e}"))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::OracleSimulator;
    use st_types::{ParameterValue, ParameterVector};
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::sync::Barrier;

    fn dataset() -> Dataset {
        let mut labels = vec![0u8; 20];
        for i in [2, 5, 11, 17] {
            labels[i] = 1;
        }
        Dataset::new("toy", "toy.csv", labels).unwrap()
    }

    fn split(delay: i64) -> ParameterSplit {
        let mut params = ParameterVector::new();
        params.insert("mdl_delay".into(), ParameterValue::Int(delay));
        params.insert("bal_a".into(), ParameterValue::Float(1.5));
        params.insert("n_instances".into(), ParameterValue::Int(1));
        ParameterSplit::classify(&params).unwrap()
    }

    #[tokio::test]
    async fn runs_execute_concurrently_with_their_own_seed_and_path() {
        let ds = dataset();
        let seeds = SeedSets::draw(&ds, 4, 1, 1, 81276149).unwrap();
        let mut sim = OracleSimulator::new().with_dataset("toy.csv", ds.labels.clone());
        // Every run waits for all the others: only passes if they overlap.
        sim.barrier = Some(Arc::new(Barrier::new(4)));
        let sim = Arc::new(sim);

        let dir = tempdir().unwrap();
        let dispatcher = RunDispatcher::new(sim.clone(), dir.path());
        let runs = tokio::time::timeout(
            Duration::from_secs(10),
            dispatcher.dispatch(&ds, &ReviewSettings::default(), &split(0), &seeds),
        )
        .await
        .expect("runs did not execute concurrently")
        .unwrap();

        assert_eq!(runs.runs.len(), 4);
        assert_eq!(runs.n_missing(), 0);

        let requests = sim.requests();
        for (i, req) in requests.iter().enumerate() {
            assert_eq!(req.seed, i as u64);
            assert_eq!(req.log_path, dir.path().join("toy").join(format!("results_{i}.json")));
            assert_eq!(req.prior_included, seeds.run(i).0);
            assert_eq!(req.model_kwargs.get("delay"), Some(&ParameterValue::Int(0)));
            assert_eq!(req.balance_kwargs.get("a"), Some(&ParameterValue::Float(1.5)));
            assert!(req.runtime_kwargs.contains_key("n_instances"));
        }
    }

    #[tokio::test]
    async fn failed_and_panicked_runs_are_missing() {
        let ds = dataset();
        let seeds = SeedSets::draw(&ds, 3, 1, 1, 7).unwrap();
        let mut sim = OracleSimulator::new().with_dataset("toy.csv", ds.labels.clone());
        sim.fail_runs = vec![1];
        sim.panic_runs = vec![2];

        let dir = tempdir().unwrap();
        let dispatcher = RunDispatcher::new(Arc::new(sim), dir.path());
        let runs = dispatcher
            .dispatch(&ds, &ReviewSettings::default(), &split(0), &seeds)
            .await
            .unwrap();

        assert!(runs.runs[0].is_some());
        assert!(runs.runs[1].is_none());
        assert!(runs.runs[2].is_none());
    }

    #[tokio::test]
    async fn stale_logs_from_previous_iteration_are_not_reused() {
        let ds = dataset();
        let seeds = SeedSets::draw(&ds, 2, 1, 1, 7).unwrap();
        let dir = tempdir().unwrap();

        let good = OracleSimulator::new().with_dataset("toy.csv", ds.labels.clone());
        let dispatcher = RunDispatcher::new(Arc::new(good), dir.path());
        dispatcher
            .dispatch(&ds, &ReviewSettings::default(), &split(0), &seeds)
            .await
            .unwrap();
        assert!(dispatcher.log_path(&ds, 1).exists());

        let mut flaky = OracleSimulator::new().with_dataset("toy.csv", ds.labels.clone());
        flaky.fail_runs = vec![1];
        let dispatcher = RunDispatcher::new(Arc::new(flaky), dir.path());
        let runs = dispatcher
            .dispatch(&ds, &ReviewSettings::default(), &split(0), &seeds)
            .await
            .unwrap();
        assert!(runs.runs[0].is_some());
        assert!(runs.runs[1].is_none());
        assert!(!dispatcher.log_path(&ds, 1).exists());
    }

    #[tokio::test]
    async fn load_log_reports_missing_and_reads_written_logs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results_0.json");
        assert!(matches!(
            load_log(path.clone()).await,
            Err(st_types::StError::Log(st_types::LogError::NotFound { .. }))
        ));

        let mut log = RunLog::new();
        log.push_query(st_types::QueryRecord::initial(vec![2, 0]));
        log.save(&path).unwrap();
        assert_eq!(load_log(path).await.unwrap(), log);
    }

    #[tokio::test]
    async fn logs_stay_on_disk_after_join() {
        let ds = dataset();
        let seeds = SeedSets::draw(&ds, 2, 1, 1, 7).unwrap();
        let dir = tempdir().unwrap();
        let sim = OracleSimulator::new().with_dataset("toy.csv", ds.labels.clone());
        let dispatcher = RunDispatcher::new(Arc::new(sim), dir.path());
        let runs = dispatcher
            .dispatch(&ds, &ReviewSettings::default(), &split(3), &seeds)
            .await
            .unwrap();

        for run in 0..2 {
            let on_disk = RunLog::load(&dispatcher.log_path(&ds, run)).unwrap();
            assert_eq!(Some(on_disk), runs.runs[run]);
        }
    }
}
