//! # st-optimizer
//!
//! Parameter search and the resumable optimization loop for screentune.
//!
//! Provides search space definitions, proposal strategies (random,
//! Bayesian), trial records with a versioned checkpoint, and the
//! [`SearchDriver`] that ties them to an [`Objective`].

mod driver;
mod search;
mod trial;

pub use driver::{
    snapshot_dir, DriverConfig, Objective, SearchDriver, SearchState, SearchStatus,
};
pub use search::{
    strategy_from_name, BayesianSearch, ParameterDef, ParameterKind, RandomSearch, SearchSpace,
    SearchStrategy,
};
pub use trial::{Evaluation, TrialHistory, TrialRecord, TrialStatus, CHECKPOINT_VERSION};
