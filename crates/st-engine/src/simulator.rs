//! Contract with the external reviewer that performs one simulated review.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use st_types::{ParameterVector, SimulationError, StResult};

/// Everything one simulated review needs. Serialized as JSON for external
/// simulators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRequest {
    /// Dataset source as configured, passed through untouched.
    pub dataset: PathBuf,
    pub model: String,
    pub model_kwargs: ParameterVector,
    pub balance_strategy: String,
    pub balance_kwargs: ParameterVector,
    pub query_strategy: String,
    /// Unprefixed parameters, forwarded as reviewer runtime overrides.
    pub runtime_kwargs: ParameterVector,
    /// Items labeled per query.
    pub n_instances: usize,
    /// Review budget in items.
    pub n_papers: usize,
    /// Where the run must write its log.
    pub log_path: PathBuf,
    pub prior_included: Vec<usize>,
    pub prior_excluded: Vec<usize>,
    /// Random seed of this run; equal to the run index.
    pub seed: u64,
}

/// One simulated review. Implementations write a run log to
/// `request.log_path` as a side effect; on failure the path may be absent or
/// partially written.
#[async_trait]
pub trait Simulator: Send + Sync {
    async fn simulate(&self, request: &SimulationRequest) -> StResult<()>;

    fn name(&self) -> &str {
        "simulator"
    }
}

/// Runs each review as its own OS process.
///
/// The request is written to the child's stdin as JSON; a non-zero exit
/// status counts as a failed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSimulator {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSimulator {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn launch_error(&self, e: impl std::fmt::Display) -> SimulationError {
        SimulationError::LaunchFailed {
            program: self.program.clone(),
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl Simulator for CommandSimulator {
    async fn simulate(&self, request: &SimulationRequest) -> StResult<()> {
        let payload = serde_json::to_vec(request)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.launch_error(e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&payload)
                .await
                .map_err(|e| self.launch_error(e))?;
            // Dropping stdin closes the pipe so the child sees EOF.
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| self.launch_error(e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(run = request.seed, stderr = %stderr.trim(), "Simulator stderr");
            return Err(SimulationError::NonZeroExit {
                run: request.seed,
                status: output.status.to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.program
    }
}
