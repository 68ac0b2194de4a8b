//! Runtime configuration.
//!
//! Every field has a working default so `OddsConfig::default()` talks to the
//! public providers. A TOML file may override any subset of fields.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FetchError, OddsError, OddsResult, ValidationError};

/// Default values applied to simulation requests that do not specify them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationDefaults {
    /// Number of simulated contests.
    pub num_simulations: u32,
    /// Whether modelled DNFs take part in the simulation.
    pub include_dnf: bool,
    /// Half-life of the recency weighting, in days.
    pub decay_half_life_days: f64,
    /// History window length when none is given.
    pub months_back: u32,
}

impl Default for SimulationDefaults {
    fn default() -> Self {
        Self {
            num_simulations: 10_000,
            include_dnf: true,
            decay_half_life_days: 180.0,
            months_back: 12,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OddsConfig {
    /// Base URL of per-person result files (`{base}/{id}.json`).
    pub person_base_url: String,
    /// Base URL of yearly competition listings (`{base}/{year}.json`).
    pub competitions_base_url: String,
    /// Live results GraphQL endpoint.
    pub live_endpoint: String,
    /// Live results link endpoint that redirects to the live competition page.
    pub live_link_base: String,
    /// Base URL of the public competition info API (`{base}/{id}/wcif/public`).
    pub wcif_base_url: String,
    /// Per-request timeout applied by the HTTP transport.
    pub http_timeout_secs: u64,
    /// User agent sent with every request.
    pub user_agent: String,
    /// Directory holding cached competition info files.
    pub cache_dir: PathBuf,
    /// Competitions served from `cache_dir` instead of the public API.
    pub cached_competitions: Vec<String>,
    /// Maximum queued requests on the simulation worker.
    pub worker_queue_capacity: usize,
    /// Simulation request defaults.
    pub simulation: SimulationDefaults,
}

impl Default for OddsConfig {
    fn default() -> Self {
        Self {
            person_base_url:
                "https://raw.githubusercontent.com/robiningelbrecht/wca-rest-api/master/api/persons"
                    .to_string(),
            competitions_base_url:
                "https://raw.githubusercontent.com/robiningelbrecht/wca-rest-api/master/api/competitions"
                    .to_string(),
            live_endpoint: "https://live.worldcubeassociation.org/api".to_string(),
            live_link_base: "https://live.worldcubeassociation.org/link/competitions".to_string(),
            wcif_base_url: "https://api.worldcubeassociation.org/competitions".to_string(),
            http_timeout_secs: 30,
            user_agent: concat!("cube-odds/", env!("CARGO_PKG_VERSION")).to_string(),
            cache_dir: PathBuf::from("./wcif"),
            cached_competitions: Vec::new(),
            worker_queue_capacity: 16,
            simulation: SimulationDefaults::default(),
        }
    }
}

impl OddsConfig {
    /// Parses a TOML document; missing fields keep their defaults.
    pub fn from_toml_str(raw: &str) -> OddsResult<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| ValidationError::InvalidConfig {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> OddsResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| FetchError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&raw)
    }

    /// Checks the invariants the rest of the crate relies on.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let urls = [
            ("person_base_url", &self.person_base_url),
            ("competitions_base_url", &self.competitions_base_url),
            ("live_endpoint", &self.live_endpoint),
            ("live_link_base", &self.live_link_base),
            ("wcif_base_url", &self.wcif_base_url),
        ];
        for (field, value) in urls {
            if value.trim().is_empty() {
                return Err(ValidationError::InvalidConfig {
                    reason: format!("{field} cannot be empty"),
                });
            }
        }
        if self.http_timeout_secs == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "http_timeout_secs must be positive".to_string(),
            });
        }
        if self.worker_queue_capacity == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "worker_queue_capacity must be positive".to_string(),
            });
        }
        let half_life = self.simulation.decay_half_life_days;
        if !half_life.is_finite() || half_life <= 0.0 {
            return Err(ValidationError::InvalidConfig {
                reason: format!("decay_half_life_days must be positive, got {half_life}"),
            });
        }
        Ok(())
    }

    /// Transport timeout as a `Duration`.
    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Builds the shared HTTP client for all upstream providers.
    pub fn http_client(&self) -> OddsResult<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.http_timeout())
            .user_agent(self.user_agent.clone())
            .build()
            .map_err(|e| OddsError::internal(format!("failed to build HTTP client: {e}")))
    }
}
