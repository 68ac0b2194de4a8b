//! Upstream result history and competition listing shapes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::event::EventId;
use crate::solve::is_attempted;

/// One round of one event: the ordered attempts of a single competitor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawRound")]
pub struct Round {
    /// Attempt values in the order they were solved.
    pub solves: Vec<i32>,
}

/// Upstream encodes rounds either as objects with a `solves` array (plus
/// position/best/average metadata we ignore) or as bare attempt arrays.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawRound {
    Detailed {
        #[serde(default)]
        solves: Vec<i32>,
    },
    Bare(Vec<i32>),
}

impl From<RawRound> for Round {
    fn from(raw: RawRound) -> Self {
        match raw {
            RawRound::Detailed { solves } | RawRound::Bare(solves) => Self { solves },
        }
    }
}

impl Round {
    /// Creates a round from raw attempt values.
    #[must_use]
    pub fn new(solves: Vec<i32>) -> Self {
        Self { solves }
    }

    /// The first `limit` attempt slots with unattempted placeholders dropped.
    pub fn capped_attempts(&self, limit: usize) -> impl Iterator<Item = i32> + '_ {
        self.solves
            .iter()
            .take(limit)
            .copied()
            .filter(|&v| is_attempted(v))
    }
}

/// A competitor's full result history as published upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Competitor {
    /// WCA id, e.g. `2015MCKE02`.
    pub id: String,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// Country as published upstream (ISO code).
    #[serde(default, deserialize_with = "country_code")]
    pub country: String,

    /// competition id -> event id -> rounds.
    #[serde(default, rename = "results")]
    pub personal_results: BTreeMap<String, BTreeMap<String, Vec<Round>>>,
}

/// Some upstream files publish the country as an object (`{ "iso2": .. }`).
fn country_code<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => s,
        Some(serde_json::Value::Object(map)) => map
            .get("iso2")
            .or_else(|| map.get("id"))
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    })
}

impl Competitor {
    /// Creates an empty competitor record.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds one round of `event` at `competition_id` (builder style, used by fixtures).
    #[must_use]
    pub fn with_round(mut self, competition_id: &str, event: EventId, solves: Vec<i32>) -> Self {
        self.personal_results
            .entry(competition_id.to_string())
            .or_default()
            .entry(event.wca_id().to_string())
            .or_default()
            .push(Round::new(solves));
        self
    }

    /// Rounds of `event` at `competition_id`, if the competitor took part in it.
    #[must_use]
    pub fn rounds(&self, competition_id: &str, event: EventId) -> Option<&[Round]> {
        self.personal_results
            .get(competition_id)?
            .get(event.wca_id())
            .map(Vec::as_slice)
    }
}

/// Start/end dates of a listed competition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedDates {
    /// First day, `YYYY-MM-DD`.
    pub from: String,
}

/// A competition entry of a yearly listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedCompetition {
    /// Competition id.
    pub id: String,
    /// Dates of the competition.
    pub date: ListedDates,
}

impl ListedCompetition {
    /// Creates a listing entry starting on `from` (`YYYY-MM-DD`).
    #[must_use]
    pub fn new(id: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            date: ListedDates { from: from.into() },
        }
    }
}

/// A yearly competition listing file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitionListing {
    /// Listed competitions.
    #[serde(default)]
    pub items: Vec<ListedCompetition>,
}
