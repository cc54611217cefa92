//! Discovery-curve statistics and loss functions for screentune.
//!
//! Provides:
//! - Extraction of discovery curves, discovery times and false-negative
//!   counts from single run logs
//! - Scalar metrics over those curves (spread, integrated area, WSS)
//! - Loss strategies that score a whole set of parallel runs

pub mod curve;
pub mod loss;
pub mod metrics;

#[cfg(test)]
mod fixtures;

pub use curve::{
    avg_time_to_discovery, discovery_times, find_inclusions, labeled_order, last_proba_order,
    mean_false_neg, n_false_neg, proba_order, stopping_limits, CurvePoint, DiscoveryCurve,
    Inclusions,
};
pub use loss::{LossStrategy, RunSet};
pub use metrics::{
    integrated_loss, mean_wss, time_to_discovery_spread, work_saved_at_sampling,
    INTEGRATION_BUCKETS, WSS_MAX_TARGET,
};
