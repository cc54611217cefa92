// screentune engine
// Runs parallel simulated reviews per parameter set and scores them

pub mod config;
pub mod dispatcher;
pub mod objective;
pub mod simulator;

#[cfg(test)]
mod testing;

pub use config::{DatasetConfig, TuneConfig, DEFAULT_SEED_LABEL_SEED};
pub use dispatcher::{ReviewSettings, RunDispatcher};
pub use objective::{
    ObjectiveAggregator, ParameterSplit, SeedPlan, SeedSets, BALANCE_PREFIX, MODEL_PREFIX,
};
pub use simulator::{CommandSimulator, SimulationRequest, Simulator};
