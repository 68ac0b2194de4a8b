//! # cube-odds
//!
//! Forecasts for speedcubing competitions. The crate gathers competitors'
//! historical WCA results, resolves in-progress rounds from the live results
//! service, and drives a Monte Carlo engine that estimates each competitor's
//! chance to win, podium, or finish at any rank.
//!
//! ## Core Concepts
//!
//! - **ResultSource**: Upstream provider of per-competitor results and dated competition listings
//! - **ResultAggregator**: Concurrent fan-out that joins results to dates and filters them by window
//! - **LiveResultsResolver**: Entered attempts of the final round of a running competition
//! - **SimulationOrchestrator**: Owns the engine worker, skips reloads of an unchanged dataset
//! - **Distribution curves**: Ex-Gaussian density and cumulative curves for charts
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use cube_odds::{
//!     EventId, NativeEngine, OddsConfig, OrchestratorConfig, SimulationDataset, SimulationOrchestrator,
//!     SimulationParams, DateWindow, HttpResultSource,
//! };
//!
//! let config = OddsConfig::default();
//! let source = Arc::new(HttpResultSource::from_config(&config)?);
//! let orchestrator = SimulationOrchestrator::new(NativeEngine::factory(source), OrchestratorConfig::from_config(&config));
//!
//! let dataset = SimulationDataset::new(
//!     vec!["2015MCKE02".into(), "2016KOLA02".into()],
//!     EventId::Cube3,
//!     DateWindow::trailing_year(),
//!     180.0,
//! );
//! let results = orchestrator.run_simulation(&dataset, SimulationParams::new(10_000, true))?;
//! for result in &results {
//!     println!("{}: {:.1}% to win", result.name, result.win_probability());
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod competitor;
pub mod error;
pub mod event;
pub mod solve;
pub mod time;

// Configuration
pub mod config;

// Data providers
pub mod aggregate;
pub mod live;
pub mod source;
pub mod wcif;

// Forecasting
pub mod distribution;
pub mod engine;

// Re-export primary types at crate root for convenience
pub use aggregate::{AggregatedHistory, CompetitionDateIndex, CompetitorHistory, DatedResults, ResultAggregator};
pub use competitor::{CompetitionListing, Competitor, ListedCompetition, Round};
pub use config::{OddsConfig, SimulationDefaults};
pub use distribution::{CurveKind, CurvePoint};
pub use error::{FetchError, LiveResultsError, OddsError, OddsResult, OrchestratorError, ValidationError};
pub use event::{EventId, RoundFormat};
pub use live::{HttpLiveTransport, LiveResultsResolver, LiveTransport};
pub use source::{HttpResultSource, InMemorySource, ResultSource};
pub use time::DateWindow;
pub use wcif::{CompetitionInfo, CompetitionInfoLoader, RegisteredCompetitor};

pub use engine::{
    CompetitorModel, ErrorStage, NativeEngine, OrchestratorConfig, OrchestratorState, SimulationDataset,
    SimulationEngine, SimulationOrchestrator, SimulationParams, SimulationResult, WorkerMessage, WorkerResponse,
};
