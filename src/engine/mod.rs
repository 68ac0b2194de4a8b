//! Simulation engine contract and the data crossing the worker boundary.
//!
//! The orchestrator drives any [`SimulationEngine`] through three calls:
//! a one-time `initialize`, `load` of a [`SimulationDataset`], and any number
//! of `run`s with [`SimulationParams`]. [`NativeEngine`] is the bundled
//! implementation.

mod native;
mod protocol;
mod runtime;
mod stats;

pub use native::NativeEngine;
pub use protocol::{ErrorStage, RecalculatePayload, RunSimulationPayload, WorkerMessage, WorkerResponse};
pub use runtime::{EngineFactory, OrchestratorConfig, OrchestratorState, SimulationOrchestrator};
pub use stats::{CompetitorModel, WeightedSample};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{OddsResult, ValidationError};
use crate::event::EventId;
use crate::time::DateWindow;

/// A Monte Carlo engine driven by the orchestrator.
///
/// Engines are constructed and used on the worker thread only.
pub trait SimulationEngine {
    /// One-time bootstrap (runtimes, clients, lookup tables).
    fn initialize(&mut self) -> OddsResult<()>;

    /// Fetches and prepares the history of `dataset`, replacing any previous one.
    fn load(&mut self, dataset: &SimulationDataset) -> OddsResult<()>;

    /// Runs contests over the loaded dataset.
    ///
    /// `params.inputted_times` has already been normalized to one row per
    /// competitor and one column per attempt.
    fn run(&mut self, params: &SimulationParams) -> OddsResult<Vec<SimulationResult>>;
}

impl<E: SimulationEngine + ?Sized> SimulationEngine for Box<E> {
    fn initialize(&mut self) -> OddsResult<()> {
        (**self).initialize()
    }

    fn load(&mut self, dataset: &SimulationDataset) -> OddsResult<()> {
        (**self).load(dataset)
    }

    fn run(&mut self, params: &SimulationParams) -> OddsResult<Vec<SimulationResult>> {
        (**self).run(params)
    }
}

/// The arguments of a load: who, which event, which history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationDataset {
    /// Competitor WCA ids, in output order.
    pub competitor_ids: Vec<String>,
    /// Event to simulate.
    pub event: EventId,
    /// History window.
    pub window: DateWindow,
    /// Half-life of the recency weighting, in days.
    pub decay_half_life: f64,
}

/// Canonical identity of a dataset. Window bounds are reduced to dates since
/// competitions carry no time of day: two windows with the same bound dates
/// select the same history.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DatasetKey<'a> {
    competitor_ids: &'a [String],
    event: EventId,
    start: chrono::NaiveDate,
    end: chrono::NaiveDate,
    decay_half_life: u64,
}

impl SimulationDataset {
    /// Creates a dataset.
    #[must_use]
    pub fn new(competitor_ids: Vec<String>, event: EventId, window: DateWindow, decay_half_life: f64) -> Self {
        Self {
            competitor_ids,
            event,
            window,
            decay_half_life,
        }
    }

    /// Hex blake3 digest of the canonical serialization.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let key = DatasetKey {
            competitor_ids: &self.competitor_ids,
            event: self.event,
            start: self.window.start.date_naive(),
            end: self.window.end.date_naive(),
            decay_half_life: self.decay_half_life.to_bits(),
        };
        let bytes = serde_json::to_vec(&key).unwrap_or_default();
        blake3::hash(&bytes).to_hex().to_string()
    }

    /// Checks the dataset can be loaded.
    ///
    /// # Errors
    ///
    /// Empty competitor list, inverted window or non-positive half-life.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.competitor_ids.is_empty() {
            return Err(ValidationError::EmptyCompetitorList);
        }
        if self.window.start >= self.window.end {
            return Err(ValidationError::InvalidWindow {
                start: self.window.start,
                end: self.window.end,
            });
        }
        if !(self.decay_half_life.is_finite() && self.decay_half_life > 0.0) {
            return Err(ValidationError::InvalidConfig {
                reason: format!("decay half-life must be positive, got {}", self.decay_half_life),
            });
        }
        Ok(())
    }
}

/// Sampling parameters of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationParams {
    /// Number of simulated contests.
    pub num_simulations: u32,
    /// Whether modelled DNFs are drawn.
    #[serde(alias = "includeDNF")]
    pub include_dnf: bool,
    /// Entered results: `0` = simulate, negative = DNF, positive = fixed time.
    #[serde(default)]
    pub inputted_times: Vec<Vec<i32>>,
    /// RNG seed for reproducible runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl SimulationParams {
    /// Creates parameters with no entered results and a random seed.
    #[must_use]
    pub fn new(num_simulations: u32, include_dnf: bool) -> Self {
        Self {
            num_simulations,
            include_dnf,
            inputted_times: Vec::new(),
            seed: None,
        }
    }

    /// Sets the entered results.
    #[must_use]
    pub fn with_inputted_times(mut self, inputted_times: Vec<Vec<i32>>) -> Self {
        self.inputted_times = inputted_times;
        self
    }

    /// Fixes the RNG seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Validates entered results against the dataset shape.
///
/// An empty matrix means "nothing entered" and becomes all zeros.
///
/// # Errors
///
/// `ValidationError::InputtedTimesShape` if the row count differs from
/// `competitors` or any row length differs from `attempts`.
pub fn normalize_inputted_times(
    inputted_times: &[Vec<i32>],
    competitors: usize,
    attempts: usize,
) -> Result<Vec<Vec<i32>>, ValidationError> {
    if inputted_times.is_empty() {
        return Ok(vec![vec![0; attempts]; competitors]);
    }
    let shape_error = |reason: String| ValidationError::InputtedTimesShape {
        expected_rows: competitors,
        expected_columns: attempts,
        reason,
    };
    if inputted_times.len() != competitors {
        return Err(shape_error(format!("{} rows", inputted_times.len())));
    }
    if let Some((row, times)) = inputted_times.iter().enumerate().find(|(_, t)| t.len() != attempts) {
        return Err(shape_error(format!("{} attempts in row {row}", times.len())));
    }
    Ok(inputted_times.to_vec())
}

/// Per-competitor output of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    /// Display name.
    pub name: String,
    /// Number of valid historical solves behind the model.
    pub sample_size: u32,
    /// Contests won.
    pub win_count: u32,
    /// Contests finished in the top three.
    pub podium_count: u32,
    /// Sum of finishing ranks over all contests.
    pub total_rank: u64,
    /// Recency-weighted historical mean excluding DNFs (centiseconds).
    pub mean_excluding_dnf: f64,
    /// `rank_distribution[i]` = contests finished at rank `i + 1`.
    pub rank_distribution: Vec<u32>,
    /// Simulated singles, bucketed by tenths of a second.
    pub histogram_single: BTreeMap<i32, u64>,
    /// Simulated round results, bucketed by tenths of a second.
    pub histogram_average: BTreeMap<i32, u64>,
}

impl SimulationResult {
    /// Number of contests behind this result.
    #[must_use]
    pub fn simulations(&self) -> u64 {
        self.rank_distribution.iter().map(|&c| u64::from(c)).sum()
    }

    fn percent(&self, count: u64) -> f64 {
        match self.simulations() {
            0 => 0.0,
            #[allow(clippy::cast_precision_loss)]
            total => count as f64 * 100.0 / total as f64,
        }
    }

    /// Win probability in percent.
    #[must_use]
    pub fn win_probability(&self) -> f64 {
        self.percent(u64::from(self.win_count))
    }

    /// Podium probability in percent.
    #[must_use]
    pub fn podium_probability(&self) -> f64 {
        self.percent(u64::from(self.podium_count))
    }

    /// Mean finishing rank (1-based); 0 when nothing was simulated.
    #[must_use]
    pub fn expected_rank(&self) -> f64 {
        match self.simulations() {
            0 => 0.0,
            #[allow(clippy::cast_precision_loss)]
            total => self.total_rank as f64 / total as f64,
        }
    }

    /// Probability of each rank in percent, index 0 = rank 1.
    #[must_use]
    pub fn rank_probabilities(&self) -> Vec<f64> {
        self.rank_distribution
            .iter()
            .map(|&c| self.percent(u64::from(c)))
            .collect()
    }
}
