//! Live round results.
//!
//! Resolves a WCA competition id to the live service's own id, picks the last
//! round of the requested event and returns the attempts of the requested
//! competitors in caller order, padded to the round's attempt count.

mod transport;

pub use transport::{GraphQlRequest, HttpLiveTransport, LiveTransport};

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::OddsConfig;
use crate::error::{LiveResultsError, OddsResult};
use crate::event::EventId;

static LIVE_ID: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"/competitions/([^/?#]+)").ok());

const COMPETITION_QUERY: &str = r"query Competition($id: ID!) {
  competition(id: $id) {
    competitionEvents {
      event { id }
      rounds { id number }
    }
  }
}";

const ROUND_QUERY: &str = r"query Round($id: ID!) {
  round(id: $id) {
    format { numberOfAttempts }
    results { ...roundResult }
  }
}

fragment roundResult on Result {
  attempts { result }
  person { wcaId }
}";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompetitionData {
    #[serde(default)]
    competition_events: Vec<CompetitionEvent>,
}

#[derive(Debug, Deserialize)]
struct CompetitionEvent {
    event: EventRef,
    #[serde(default)]
    rounds: Vec<RoundRef>,
}

#[derive(Debug, Deserialize)]
struct EventRef {
    id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RoundRef {
    id: String,
    number: i64,
}

#[derive(Debug, Deserialize)]
struct RoundData {
    format: Option<RoundFormatData>,
    #[serde(default)]
    results: Option<Vec<RoundResult>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoundFormatData {
    number_of_attempts: usize,
}

#[derive(Debug, Deserialize)]
struct RoundResult {
    #[serde(default)]
    attempts: Option<Vec<Attempt>>,
    #[serde(default)]
    person: Option<PersonRef>,
}

#[derive(Debug, Deserialize)]
struct Attempt {
    result: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersonRef {
    wca_id: Option<String>,
}

/// Fetches live round results through a [`LiveTransport`].
pub struct LiveResultsResolver<T: LiveTransport + ?Sized> {
    transport: Arc<T>,
    link_base: String,
}

impl<T: LiveTransport + ?Sized> std::fmt::Debug for LiveResultsResolver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveResultsResolver")
            .field("link_base", &self.link_base)
            .finish_non_exhaustive()
    }
}

impl LiveResultsResolver<HttpLiveTransport> {
    /// Creates a resolver talking to the configured live service.
    pub fn from_config(config: &OddsConfig) -> OddsResult<Self> {
        let transport = HttpLiveTransport::from_config(config)?;
        Ok(Self::new(Arc::new(transport), config.live_link_base.clone()))
    }
}

impl<T: LiveTransport + ?Sized> LiveResultsResolver<T> {
    /// Creates a resolver; `link_base` is the redirecting link endpoint.
    pub fn new(transport: Arc<T>, link_base: impl Into<String>) -> Self {
        let mut link_base = link_base.into();
        while link_base.ends_with('/') {
            link_base.pop();
        }
        Self {
            transport,
            link_base,
        }
    }

    /// Attempts of the final round of `event`, one row per requested competitor.
    ///
    /// Rows have exactly the round's attempt count; competitors without a
    /// result get an all-zero row.
    ///
    /// # Errors
    ///
    /// `LiveResultsError::Resolution` when the live id cannot be derived,
    /// `NotFound` when the event has no rounds, `Data` for GraphQL errors or
    /// missing fields, and `FetchError` for transport failures.
    pub async fn fetch_live_results(
        &self,
        competition_id: &str,
        event: EventId,
        competitor_ids: &[String],
    ) -> OddsResult<Vec<Vec<i32>>> {
        let live_id = self.resolve_live_id(competition_id).await?;
        let final_round = self.final_round(competition_id, &live_id, event).await?;
        debug!(competition_id, live_id = %live_id, round = %final_round.id, "selected final round");

        let round = self.round_results(&final_round.id).await?;
        let rows = build_rows(&round.0, round.1, competitor_ids);
        info!(
            competition_id,
            event = %event,
            competitors = rows.len(),
            attempts = round.1,
            "fetched live results"
        );
        Ok(rows)
    }

    async fn resolve_live_id(&self, competition_id: &str) -> OddsResult<String> {
        let link = format!("{}/{competition_id}", self.link_base);
        let final_url = self.transport.resolve_link(&link).await?;

        let resolution = |reason: String| LiveResultsError::Resolution {
            competition_id: competition_id.to_string(),
            reason,
        };
        if final_url == link {
            return Err(resolution(format!("link {link} did not redirect")).into());
        }
        let id = LIVE_ID
            .as_ref()
            .and_then(|re| re.captures(&final_url))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| resolution(format!("no live id in redirected url {final_url}")))?;
        Ok(id)
    }

    async fn final_round(&self, competition_id: &str, live_id: &str, event: EventId) -> OddsResult<RoundRef> {
        let data = self.query("Competition", COMPETITION_QUERY, live_id).await?;
        let competition = data
            .get("competition")
            .filter(|c| !c.is_null())
            .cloned()
            .ok_or_else(|| data_error("Competition response has no competition"))?;
        let competition: CompetitionData = serde_json::from_value(competition)
            .map_err(|e| data_error(format!("unexpected Competition shape: {e}")))?;

        competition
            .competition_events
            .into_iter()
            .find(|ce| ce.event.id == event.wca_id())
            .and_then(|ce| ce.rounds.into_iter().max_by_key(|r| r.number))
            .ok_or_else(|| {
                LiveResultsError::NotFound {
                    competition_id: competition_id.to_string(),
                    event: event.wca_id().to_string(),
                }
                .into()
            })
    }

    async fn round_results(&self, round_id: &str) -> OddsResult<(HashMap<String, Vec<i32>>, usize)> {
        let data = self.query("Round", ROUND_QUERY, round_id).await?;
        let round = data
            .get("round")
            .filter(|r| !r.is_null())
            .cloned()
            .ok_or_else(|| data_error(format!("round '{round_id}' missing from response")))?;
        let round: RoundData = serde_json::from_value(round)
            .map_err(|e| data_error(format!("unexpected Round shape: {e}")))?;
        let attempts = round
            .format
            .ok_or_else(|| data_error(format!("round '{round_id}' has no format")))?
            .number_of_attempts;

        let by_person = round
            .results
            .unwrap_or_default()
            .into_iter()
            .filter_map(|result| {
                let wca_id = result.person?.wca_id?;
                let values = result.attempts?.into_iter().map(|a| a.result).collect();
                Some((wca_id, values))
            })
            .collect();
        Ok((by_person, attempts))
    }

    /// Runs one operation and returns its `data` object.
    async fn query(&self, operation: &str, query: &str, id: &str) -> OddsResult<Value> {
        let request = GraphQlRequest {
            operation_name: operation.to_string(),
            query: query.to_string(),
            variables: json!({ "id": id }),
        };
        let mut body = self.transport.graphql(&request).await?;

        if let Some(message) = graphql_errors(&body) {
            return Err(data_error(format!("GraphQL query '{operation}' failed: {message}")).into());
        }
        match body.get_mut("data").map(Value::take) {
            Some(data) if data.is_object() => Ok(data),
            _ => Err(data_error(format!("GraphQL query '{operation}' returned no data")).into()),
        }
    }
}

fn data_error(reason: impl Into<String>) -> LiveResultsError {
    LiveResultsError::Data { reason: reason.into() }
}

/// Joins the messages of a GraphQL `errors` member, which the live service
/// sends either as the standard array or as a single `{ detail }` object.
fn graphql_errors(body: &Value) -> Option<String> {
    match body.get("errors")? {
        Value::Array(errors) if !errors.is_empty() => Some(
            errors
                .iter()
                .map(|e| e.get("message").and_then(Value::as_str).unwrap_or("unknown error"))
                .collect::<Vec<_>>()
                .join("; "),
        ),
        Value::Object(error) => Some(
            error
                .get("detail")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        ),
        _ => None,
    }
}

fn build_rows(by_person: &HashMap<String, Vec<i32>>, attempts: usize, competitor_ids: &[String]) -> Vec<Vec<i32>> {
    competitor_ids
        .iter()
        .map(|id| {
            let recorded = by_person.get(id).map_or(&[][..], Vec::as_slice);
            (0..attempts).map(|i| recorded.get(i).copied().unwrap_or(0)).collect()
        })
        .collect()
}
