use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the screentune system
#[derive(Error, Debug)]
pub enum StError {
    #[error("Run log error: {0}")]
    Log(#[from] LogError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Simulation error: {0}")]
    Simulation(#[from] SimulationError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Run-log related errors
#[derive(Error, Debug)]
pub enum LogError {
    #[error("Run log not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Malformed run log {path}: {message}")]
    Malformed { path: PathBuf, message: String },

    #[error("Unsupported run log version {found}, expected {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Query index {query} out of range: log has {n_queries} queries")]
    QueryOutOfRange { query: usize, n_queries: usize },

    #[error("Query {query}: {n_idx} labeled items but {n_methods} label methods")]
    LengthMismatch {
        query: usize,
        n_idx: usize,
        n_methods: usize,
    },
}

/// Trial-history checkpoint errors
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Checkpoint not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Corrupt checkpoint {path}: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("Unsupported checkpoint version {found}, expected {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },
}

/// Errors raised while driving a simulated review run
#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("Failed to launch simulator `{program}`: {message}")]
    LaunchFailed { program: String, message: String },

    #[error("Simulator exited with status {status} for run {run}")]
    NonZeroExit { run: u64, status: String },

    #[error("Simulation run {run} panicked or was aborted: {message}")]
    Aborted { run: u64, message: String },
}

/// Result type alias for screentune operations
pub type StResult<T> = Result<T, StError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::StError::Validation(format!($($arg)*))
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::StError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::StError::Config(format!($($arg)*))
    };
}
