//! cube-odds command line
//!
//! Thin front-end over the library: history aggregation, live round lookup,
//! simulations, distribution curves and competition info.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio::runtime::Runtime;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cube_odds::distribution::curve;
use cube_odds::{
    CompetitionInfoLoader, CurveKind, DateWindow, EventId, HttpResultSource, LiveResultsResolver, NativeEngine,
    OddsConfig, OddsError, OddsResult, OrchestratorConfig, ResultAggregator, SimulationDataset,
    SimulationOrchestrator, SimulationParams,
};

#[derive(Parser, Debug)]
#[command(name = "cube-odds")]
#[command(about = "Forecast speedcubing competition results", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Aggregate competitors' historical solves
    History {
        /// Event id (333, 444, 333bf, ...)
        #[arg(short, long)]
        event: EventId,

        /// Window start (RFC 3339); defaults to the configured months back
        #[arg(long)]
        since: Option<DateTime<Utc>>,

        /// WCA ids
        #[arg(required = true)]
        competitors: Vec<String>,
    },

    /// Entered attempts of the final round of a running competition
    Live {
        /// Competition id
        competition: String,

        /// Event id
        #[arg(short, long)]
        event: EventId,

        /// WCA ids, one output row each
        #[arg(required = true)]
        competitors: Vec<String>,
    },

    /// Run a Monte Carlo forecast
    Simulate {
        /// Event id
        #[arg(short, long)]
        event: EventId,

        /// Number of simulated contests
        #[arg(short = 'n', long)]
        simulations: Option<u32>,

        /// Months of history to use
        #[arg(long)]
        months: Option<u32>,

        /// Recency half-life in days
        #[arg(long)]
        half_life: Option<f64>,

        /// Never draw modelled DNFs
        #[arg(long)]
        no_dnf: bool,

        /// Seed entered attempts from the live round of this competition
        #[arg(long)]
        live: Option<String>,

        /// RNG seed
        #[arg(long)]
        seed: Option<u64>,

        /// WCA ids
        #[arg(required = true)]
        competitors: Vec<String>,
    },

    /// Print an ex-Gaussian curve
    Curve {
        /// Gaussian mean
        #[arg(long)]
        mu: f64,

        /// Gaussian standard deviation
        #[arg(long)]
        sigma: f64,

        /// Exponential tail mean
        #[arg(long)]
        tau: f64,

        /// Domain start
        #[arg(long)]
        min: f64,

        /// Domain end
        #[arg(long)]
        max: f64,

        /// Density or cumulative
        #[arg(long, value_enum, default_value = "density")]
        kind: KindArg,
    },

    /// List registered competitors of an event, best first
    Competitors {
        /// Competition id
        competition: String,

        /// Event id
        #[arg(short, long)]
        event: EventId,
    },

    /// Fetch competition info into the cache directory
    Cache {
        /// Competition ids
        #[arg(required = true)]
        competitions: Vec<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KindArg {
    Density,
    Cumulative,
}

impl From<KindArg> for CurveKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Density => Self::Density,
            KindArg::Cumulative => Self::Cumulative,
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> OddsResult<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| OddsError::internal(e.to_string()))?;
    println!("{json}");
    Ok(())
}

fn fetch_runtime() -> OddsResult<Runtime> {
    Runtime::new().map_err(|e| OddsError::internal(format!("failed to start runtime: {e}")))
}

fn run(args: Args) -> OddsResult<()> {
    let config = match &args.config {
        Some(path) => OddsConfig::load(path)?,
        None => OddsConfig::default(),
    };
    let defaults = config.simulation.clone();

    match args.command {
        Command::History {
            event,
            since,
            competitors,
        } => {
            let window = match since {
                Some(start) => DateWindow::until_now(start)?,
                None => DateWindow::months_back(defaults.months_back),
            };
            let aggregator = ResultAggregator::new(Arc::new(HttpResultSource::from_config(&config)?));
            let histories = fetch_runtime()?.block_on(aggregator.aggregate_window(&competitors, event, &window))?;
            print_json(&histories)
        }
        Command::Live {
            competition,
            event,
            competitors,
        } => {
            let resolver = LiveResultsResolver::from_config(&config)?;
            let rows = fetch_runtime()?.block_on(resolver.fetch_live_results(&competition, event, &competitors))?;
            print_json(&rows)
        }
        Command::Simulate {
            event,
            simulations,
            months,
            half_life,
            no_dnf,
            live,
            seed,
            competitors,
        } => {
            let inputted_times = match live {
                Some(competition) => {
                    let resolver = LiveResultsResolver::from_config(&config)?;
                    fetch_runtime()?.block_on(resolver.fetch_live_results(&competition, event, &competitors))?
                }
                None => Vec::new(),
            };
            let dataset = SimulationDataset::new(
                competitors,
                event,
                DateWindow::months_back(months.unwrap_or(defaults.months_back)),
                half_life.unwrap_or(defaults.decay_half_life_days),
            );
            let mut params = SimulationParams::new(
                simulations.unwrap_or(defaults.num_simulations),
                defaults.include_dnf && !no_dnf,
            )
            .with_inputted_times(inputted_times);
            if let Some(seed) = seed {
                params = params.with_seed(seed);
            }

            let source = Arc::new(HttpResultSource::from_config(&config)?);
            let orchestrator =
                SimulationOrchestrator::new(NativeEngine::factory(source), OrchestratorConfig::from_config(&config));
            let results = orchestrator.run_simulation(&dataset, params)?;
            for result in &results {
                info!(
                    name = %result.name,
                    win_pct = result.win_probability(),
                    podium_pct = result.podium_probability(),
                    expected_rank = result.expected_rank(),
                    "forecast"
                );
            }
            print_json(&results)
        }
        Command::Curve {
            mu,
            sigma,
            tau,
            min,
            max,
            kind,
        } => print_json(&curve(mu, sigma, tau, min, max, kind.into())?),
        Command::Competitors { competition, event } => {
            let loader = CompetitionInfoLoader::from_config(&config)?;
            let info = fetch_runtime()?.block_on(loader.load(&competition))?;
            print_json(&info.competitors_for_event(event))
        }
        Command::Cache { competitions } => {
            let loader = CompetitionInfoLoader::from_config(&config)?;
            let runtime = fetch_runtime()?;
            for competition in &competitions {
                let path = runtime.block_on(loader.refresh_cache(competition))?;
                println!("{}", path.display());
            }
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "command failed");
            ExitCode::FAILURE
        }
    }
}
