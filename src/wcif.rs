//! Public competition info (WCIF) and the local competition cache.
//!
//! Competitions listed in `cached_competitions` are read from
//! `{cache_dir}/{id}.json`; everything else comes from the public API. Cache
//! files keep only the fields modelled here.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::OddsConfig;
use crate::error::{FetchError, OddsError, OddsResult};
use crate::event::{EventId, RoundFormat};
use crate::source::get_json;

/// An event held at the competition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitionEvent {
    /// WCA event id; may name events this crate does not simulate.
    pub id: String,
}

/// Competition schedule summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    /// First day, `YYYY-MM-DD`.
    #[serde(default)]
    pub start_date: String,
}

/// A personal record of one competitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalBest {
    /// WCA event id.
    pub event_id: String,
    /// Result value (centiseconds, or moves for fewest moves singles).
    pub best: i32,
    /// World ranking of the record.
    #[serde(default)]
    pub world_ranking: u32,
    /// `single` or `average`.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Registration details of a person.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Registration {
    /// Registration id on the WCA website.
    pub wca_registration_id: Option<u64>,
    /// Events the person registered for.
    pub event_ids: Vec<String>,
    /// Registration status (`accepted`, `pending`, ...).
    pub status: String,
    /// False for staff-only registrations.
    pub is_competing: bool,
}

/// A person in the competition info.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    /// Display name.
    pub name: String,
    /// WCA id; absent for first-timers.
    #[serde(default)]
    pub wca_id: Option<String>,
    /// ISO 3166-1 alpha-2 country code.
    #[serde(default)]
    pub country_iso2: String,
    /// Personal records.
    #[serde(default)]
    pub personal_bests: Vec<PersonalBest>,
    /// Registration; absent for non-registered staff.
    #[serde(default)]
    pub registration: Option<Registration>,
}

impl Person {
    /// Returns true if the person is an accepted competitor in `event`.
    #[must_use]
    pub fn competes_in(&self, event: EventId) -> bool {
        self.registration.as_ref().is_some_and(|reg| {
            reg.is_competing && reg.status == "accepted" && reg.event_ids.iter().any(|e| e == event.wca_id())
        })
    }

    /// The ranking record for `event`: the average for averaged formats, the
    /// single for best-of formats, falling back to whichever exists.
    #[must_use]
    pub fn ranking_best(&self, event: EventId) -> Option<&PersonalBest> {
        let preferred = match event.format() {
            RoundFormat::AverageOf5 | RoundFormat::MeanOf3 => "average",
            RoundFormat::BestOf3 => "single",
        };
        let records: Vec<&PersonalBest> = self
            .personal_bests
            .iter()
            .filter(|pb| pb.event_id == event.wca_id() && pb.best > 0)
            .collect();
        records
            .iter()
            .find(|pb| pb.kind.as_deref() == Some(preferred))
            .or_else(|| records.first())
            .copied()
    }
}

/// Public competition info.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetitionInfo {
    /// Competition name.
    pub name: String,
    /// Competition id.
    #[serde(default)]
    pub id: String,
    /// Held events.
    #[serde(default)]
    pub events: Vec<CompetitionEvent>,
    /// Schedule summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
    /// Registered people.
    #[serde(default)]
    pub persons: Vec<Person>,
}

/// A competitor entry ready to feed a simulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredCompetitor {
    /// WCA id.
    pub wca_id: String,
    /// Display name.
    pub name: String,
    /// Country code.
    pub country: String,
    /// Ranking record for the event, if any.
    pub personal_best: Option<i32>,
    /// World ranking of that record.
    pub world_ranking: Option<u32>,
}

impl CompetitionInfo {
    /// Supported events held at this competition, in WCA order.
    #[must_use]
    pub fn supported_events(&self) -> Vec<EventId> {
        EventId::ALL
            .into_iter()
            .filter(|event| self.events.iter().any(|e| e.id == event.wca_id()))
            .collect()
    }

    /// Accepted competitors of `event` with a WCA id, fastest personal best
    /// first; competitors without a record follow by name.
    #[must_use]
    pub fn competitors_for_event(&self, event: EventId) -> Vec<RegisteredCompetitor> {
        let mut competitors: Vec<RegisteredCompetitor> = self
            .persons
            .iter()
            .filter(|p| p.competes_in(event))
            .filter_map(|person| {
                let wca_id = person.wca_id.clone().filter(|id| !id.is_empty())?;
                let best = person.ranking_best(event);
                Some(RegisteredCompetitor {
                    wca_id,
                    name: person.name.clone(),
                    country: person.country_iso2.clone(),
                    personal_best: best.map(|pb| pb.best),
                    world_ranking: best.map(|pb| pb.world_ranking),
                })
            })
            .collect();

        competitors.sort_by(|a, b| match (a.personal_best, b.personal_best) {
            (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.name.cmp(&b.name)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.name.cmp(&b.name),
        });
        competitors
    }
}

/// Loads competition info from the local cache or the public API.
#[derive(Debug, Clone)]
pub struct CompetitionInfoLoader {
    client: Client,
    base_url: String,
    cache_dir: PathBuf,
    cached: HashSet<String>,
}

impl CompetitionInfoLoader {
    /// Creates a loader.
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        cache_dir: impl Into<PathBuf>,
        cached: impl IntoIterator<Item = String>,
    ) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client,
            base_url,
            cache_dir: cache_dir.into(),
            cached: cached.into_iter().collect(),
        }
    }

    /// Creates a loader from configuration.
    pub fn from_config(config: &OddsConfig) -> OddsResult<Self> {
        Ok(Self::new(
            config.http_client()?,
            config.wcif_base_url.clone(),
            config.cache_dir.clone(),
            config.cached_competitions.iter().cloned(),
        ))
    }

    /// Returns true if `competition_id` is served from the local cache.
    #[must_use]
    pub fn is_cached(&self, competition_id: &str) -> bool {
        self.cached.contains(competition_id)
    }

    /// Path of the cache file for `competition_id`.
    #[must_use]
    pub fn cache_path(&self, competition_id: &str) -> PathBuf {
        self.cache_dir.join(format!("{competition_id}.json"))
    }

    /// Loads the competition info.
    ///
    /// # Errors
    ///
    /// `FetchError::Io`/`Parse` for cache files, network errors otherwise.
    pub async fn load(&self, competition_id: &str) -> OddsResult<CompetitionInfo> {
        let mut info = if self.is_cached(competition_id) {
            debug!(competition_id, "reading competition info from cache");
            read_cache(&self.cache_path(competition_id))?
        } else {
            let url = format!("{}/{competition_id}/wcif/public", self.base_url);
            get_json(&self.client, &url).await?
        };
        if info.id.is_empty() {
            info.id = competition_id.to_string();
        }
        Ok(info)
    }

    /// Fetches from the public API and writes a trimmed cache file.
    pub async fn refresh_cache(&self, competition_id: &str) -> OddsResult<PathBuf> {
        let url = format!("{}/{competition_id}/wcif/public", self.base_url);
        let mut info: CompetitionInfo = get_json(&self.client, &url).await?;
        if info.id.is_empty() {
            info.id = competition_id.to_string();
        }
        write_cache(&info, &self.cache_dir)
    }
}

/// Reads a cache file.
pub fn read_cache(path: &Path) -> Result<CompetitionInfo, FetchError> {
    let raw = std::fs::read_to_string(path).map_err(|e| FetchError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    serde_json::from_str(&raw).map_err(|e| FetchError::Parse {
        url: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Writes `info` to `{dir}/{id}.json`, creating `dir` if needed.
///
/// Only modelled fields are written; unknown upstream fields are dropped on
/// deserialization.
pub fn write_cache(info: &CompetitionInfo, dir: &Path) -> OddsResult<PathBuf> {
    let io = |path: &Path, e: std::io::Error| FetchError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    };
    std::fs::create_dir_all(dir).map_err(|e| io(dir, e))?;

    let path = dir.join(format!("{}.json", info.id));
    let body = serde_json::to_string(info).map_err(|e| OddsError::internal(e.to_string()))?;
    std::fs::write(&path, body).map_err(|e| io(&path, e))?;
    info!(competition_id = %info.id, path = %path.display(), "cached competition info");
    Ok(path)
}
