use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use st_engine::{ObjectiveAggregator, RunDispatcher, TuneConfig};
use st_optimizer::{strategy_from_name, SearchDriver};
use st_types::display_params;

#[derive(Parser, Debug)]
#[command(name = "st-tune")]
#[command(about = "Tune screening pipeline hyperparameters on simulated reviews")]
struct Args {
    /// Path to the JSON run configuration
    config: PathBuf,

    /// Additional iterations to run on top of the checkpoint
    #[arg(long)]
    iters: Option<usize>,

    /// Trial history checkpoint file
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Search strategy: random or bayesian
    #[arg(long)]
    strategy: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut config = TuneConfig::load(&args.config)?;
    if let Some(n) = args.iters {
        config = config.with_n_iter(n);
    }
    if let Some(path) = args.checkpoint {
        config = config.with_checkpoint(path);
    }
    if let Some(strategy) = args.strategy {
        config = config.with_strategy(&strategy);
    }
    config.validate()?;

    let datasets = config.load_datasets()?;
    info!(
        datasets = datasets.len(),
        runs = config.n_runs,
        loss = config.loss.name(),
        "Loaded configuration"
    );

    let dispatcher = RunDispatcher::new(Arc::new(config.simulator.clone()), &config.work_dir);
    let mut objective = ObjectiveAggregator::new(
        datasets,
        dispatcher,
        config.review.clone(),
        config.loss.clone(),
        config.seed_plan(),
    )?;
    let strategy = strategy_from_name(
        &config.strategy,
        config.search_space.clone(),
        config.exploration_weight,
    )?;

    let mut driver = SearchDriver::new(config.driver_config(), strategy);
    let history = driver.run(&mut objective).await?;

    match history.best() {
        Some(best) => {
            println!(
                "Best trial #{} of {}: loss {:.6}",
                best.trial_number,
                history.len(),
                best.loss
            );
            println!("  {}", display_params(&best.parameters));
            for (dataset, loss) in &best.dataset_losses {
                println!("  {dataset}: {loss:.6}");
            }
            println!("Run logs of the best trial: {}", config.best_dir.display());
        }
        None => println!("No successful trials recorded"),
    }
    Ok(())
}
