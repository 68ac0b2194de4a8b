//! Messages exchanged with the simulation worker.
//!
//! Both directions serialize as `{ "type": ..., "payload": ... }` with
//! SCREAMING_SNAKE_CASE type tags and camelCase payload fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::event::EventId;
use crate::time::DateWindow;

use super::{SimulationDataset, SimulationParams, SimulationResult};

/// Default history length when a request names no window.
const DEFAULT_MONTHS_BACK: u32 = 12;

/// Requests sent to the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// Construct and bootstrap the engine.
    Initialize {},

    /// Load a dataset, then run.
    RunSimulation(RunSimulationPayload),

    /// Run again over the loaded dataset.
    RecalculateSimulation(RecalculatePayload),
}

impl WorkerMessage {
    /// Type tag, for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Initialize {} => "INITIALIZE",
            Self::RunSimulation(_) => "RUN_SIMULATION",
            Self::RecalculateSimulation(_) => "RECALCULATE_SIMULATION",
        }
    }
}

/// Which step of a request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStage {
    /// Engine construction or bootstrap.
    Init,
    /// Dataset load.
    Load,
    /// Simulation run.
    Run,
    /// Recalculation requested before any successful load.
    NotLoaded,
}

/// Responses sent back by the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerResponse {
    /// The engine is ready.
    Initialized {},

    /// A run finished.
    SimulationComplete {
        /// Per-competitor results in dataset order.
        results: Vec<SimulationResult>,
    },

    /// A request failed.
    SimulationError {
        /// Human-readable reason.
        error: String,
        /// Failing step.
        stage: ErrorStage,
    },
}

impl WorkerResponse {
    pub(crate) fn error(stage: ErrorStage, error: impl ToString) -> Self {
        Self::SimulationError {
            error: error.to_string(),
            stage,
        }
    }
}

/// Payload of `RUN_SIMULATION`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSimulationPayload {
    /// Competitor WCA ids.
    pub competitor_list: Vec<String>,
    /// Event to simulate.
    pub event: EventId,
    /// Explicit window start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    /// Explicit window end, now when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    /// Legacy window: months of 31 days back from now.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month_cutoff: Option<u32>,
    /// Number of simulated contests.
    pub num_simulations: u32,
    /// Whether modelled DNFs are drawn.
    #[serde(alias = "includeDNF")]
    pub include_dnf: bool,
    /// Recency half-life in days.
    pub decay_half_life: f64,
    /// Entered results, one row per competitor.
    #[serde(default)]
    pub inputted_times: Vec<Vec<i32>>,
    /// RNG seed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl RunSimulationPayload {
    /// Builds the payload of an explicit dataset and parameters.
    #[must_use]
    pub fn new(dataset: &SimulationDataset, params: &SimulationParams) -> Self {
        Self {
            competitor_list: dataset.competitor_ids.clone(),
            event: dataset.event,
            start_date: Some(dataset.window.start),
            end_date: Some(dataset.window.end),
            month_cutoff: None,
            num_simulations: params.num_simulations,
            include_dnf: params.include_dnf,
            decay_half_life: dataset.decay_half_life,
            inputted_times: params.inputted_times.clone(),
            seed: params.seed,
        }
    }

    /// The history window: explicit `startDate` first, then `monthCutoff`,
    /// otherwise twelve months.
    ///
    /// # Errors
    ///
    /// `ValidationError::InvalidWindow` for an explicit inverted window.
    pub fn window(&self) -> Result<DateWindow, ValidationError> {
        match (self.start_date, self.month_cutoff) {
            (Some(start), _) => DateWindow::new(start, self.end_date.unwrap_or_else(Utc::now)),
            (None, Some(months)) => Ok(DateWindow::months_back(months)),
            (None, None) => Ok(DateWindow::months_back(DEFAULT_MONTHS_BACK)),
        }
    }

    /// Splits into the dataset to load and the parameters to run with.
    ///
    /// # Errors
    ///
    /// Window or dataset validation errors.
    pub fn into_parts(self) -> Result<(SimulationDataset, SimulationParams), ValidationError> {
        let window = self.window()?;
        let dataset = SimulationDataset::new(self.competitor_list, self.event, window, self.decay_half_life);
        dataset.validate()?;
        let params = SimulationParams {
            num_simulations: self.num_simulations,
            include_dnf: self.include_dnf,
            inputted_times: self.inputted_times,
            seed: self.seed,
        };
        Ok((dataset, params))
    }
}

/// Payload of `RECALCULATE_SIMULATION`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecalculatePayload {
    /// Number of simulated contests.
    pub num_simulations: u32,
    /// Whether modelled DNFs are drawn.
    #[serde(alias = "includeDNF")]
    pub include_dnf: bool,
    /// Entered results, one row per competitor.
    #[serde(default)]
    pub inputted_times: Vec<Vec<i32>>,
    /// RNG seed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl From<SimulationParams> for RecalculatePayload {
    fn from(params: SimulationParams) -> Self {
        Self {
            num_simulations: params.num_simulations,
            include_dnf: params.include_dnf,
            inputted_times: params.inputted_times,
            seed: params.seed,
        }
    }
}

impl From<RecalculatePayload> for SimulationParams {
    fn from(payload: RecalculatePayload) -> Self {
        Self {
            num_simulations: payload.num_simulations,
            include_dnf: payload.include_dnf,
            inputted_times: payload.inputted_times,
            seed: payload.seed,
        }
    }
}
