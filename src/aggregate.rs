//! Result aggregation.
//!
//! Joins each competitor's raw history against a competition-date index built
//! from the yearly listings, keeps only competitions inside the window that
//! contain the requested event, caps each round at the event's attempt count and
//! drops unattempted slots.
//!
//! Individual fetch failures degrade to missing data instead of failing the
//! whole aggregation.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::competitor::{Competitor, ListedCompetition};
use crate::error::{FetchError, OddsResult, ValidationError};
use crate::event::EventId;
use crate::source::ResultSource;
use crate::time::{parse_competition_date, DateWindow};

/// Competition id -> start date, merged from all fetched years.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompetitionDateIndex {
    dates: HashMap<String, NaiveDate>,
}

impl CompetitionDateIndex {
    /// Builds the index from listing entries; unparseable dates are skipped.
    #[must_use]
    pub fn from_listings<'a>(listings: impl IntoIterator<Item = &'a ListedCompetition>) -> Self {
        let dates = listings
            .into_iter()
            .filter_map(|comp| Some((comp.id.clone(), parse_competition_date(&comp.date.from)?)))
            .collect();
        Self { dates }
    }

    /// Start date of a competition.
    #[must_use]
    pub fn date_of(&self, competition_id: &str) -> Option<NaiveDate> {
        self.dates.get(competition_id).copied()
    }

    /// Number of indexed competitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    /// Returns true if no competition is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

/// The kept solves of one competitor at one competition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatedResults {
    /// Competition id.
    pub competition_id: String,
    /// Competition start date.
    pub date: NaiveDate,
    /// Capped, placeholder-free attempt values in round order.
    pub solves: Vec<i32>,
}

/// Windowed, event-filtered history of one competitor with competition dates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetitorHistory {
    /// WCA id.
    pub competitor_id: String,
    /// Display name (the id when the history could not be fetched).
    pub name: String,
    /// Country code, empty when unknown.
    pub country: String,
    /// Kept competitions ordered by (date, id).
    pub competitions: Vec<DatedResults>,
}

impl CompetitorHistory {
    fn absent(competitor_id: &str) -> Self {
        Self {
            competitor_id: competitor_id.to_string(),
            name: competitor_id.to_string(),
            country: String::new(),
            competitions: Vec::new(),
        }
    }

    /// Total kept solves.
    #[must_use]
    pub fn solve_count(&self) -> usize {
        self.competitions.iter().map(|c| c.solves.len()).sum()
    }

    /// Drops the dates, keeping the flattened solve sequence.
    #[must_use]
    pub fn flatten(&self) -> AggregatedHistory {
        AggregatedHistory {
            competitor_id: self.competitor_id.clone(),
            name: self.name.clone(),
            solves: self
                .competitions
                .iter()
                .flat_map(|c| c.solves.iter().copied())
                .collect(),
        }
    }
}

/// Flattened solve sequence of one competitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedHistory {
    /// WCA id.
    pub competitor_id: String,
    /// Display name.
    pub name: String,
    /// Valid solve values (times and penalties, never placeholders).
    pub solves: Vec<i32>,
}

/// Extracts the windowed, capped history of `event` from a raw competitor record.
#[must_use]
pub fn extract_history(
    competitor: &Competitor,
    event: EventId,
    window: &DateWindow,
    index: &CompetitionDateIndex,
) -> CompetitorHistory {
    let attempts = event.attempts();

    let mut competitions: Vec<DatedResults> = competitor
        .personal_results
        .iter()
        .filter_map(|(competition_id, events)| {
            let date = index.date_of(competition_id)?;
            if !window.contains_date(date) {
                return None;
            }
            let rounds = events.get(event.wca_id())?;
            let solves = rounds
                .iter()
                .flat_map(|round| round.capped_attempts(attempts))
                .collect();
            Some(DatedResults {
                competition_id: competition_id.clone(),
                date,
                solves,
            })
        })
        .collect();
    competitions.sort_by(|a, b| (a.date, &a.competition_id).cmp(&(b.date, &b.competition_id)));

    CompetitorHistory {
        competitor_id: competitor.id.clone(),
        name: competitor.name.clone(),
        country: competitor.country.clone(),
        competitions,
    }
}

/// Aggregates competitor histories from a [`ResultSource`].
#[derive(Debug)]
pub struct ResultAggregator<S: ResultSource + ?Sized> {
    source: Arc<S>,
}

impl<S: ResultSource + ?Sized> Clone for ResultAggregator<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
        }
    }
}

impl<S: ResultSource + ?Sized> ResultAggregator<S> {
    /// Create an aggregator over `source`.
    pub fn new(source: Arc<S>) -> Self {
        Self { source }
    }

    /// The underlying source.
    #[must_use]
    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Flattened histories from `window_start` until now.
    ///
    /// # Errors
    ///
    /// Validation errors for an empty competitor list or a start not in the past.
    /// Upstream failures never error; see [`Self::collect_histories`].
    pub async fn aggregate(
        &self,
        competitor_ids: &[String],
        event: EventId,
        window_start: DateTime<Utc>,
    ) -> OddsResult<Vec<AggregatedHistory>> {
        let window = DateWindow::until_now(window_start)?;
        self.aggregate_window(competitor_ids, event, &window).await
    }

    /// Flattened histories inside an explicit window.
    pub async fn aggregate_window(
        &self,
        competitor_ids: &[String],
        event: EventId,
        window: &DateWindow,
    ) -> OddsResult<Vec<AggregatedHistory>> {
        let histories = self.collect_histories(competitor_ids, event, window).await?;
        Ok(histories.iter().map(CompetitorHistory::flatten).collect())
    }

    /// Dated histories inside `window`, in `competitor_ids` order.
    ///
    /// Competitor and year fetches run concurrently. A failed competitor fetch
    /// yields an empty history named after its id; a failed year contributes no
    /// dates. When every competitor fetch or every year fetch fails the result is
    /// empty.
    pub async fn collect_histories(
        &self,
        competitor_ids: &[String],
        event: EventId,
        window: &DateWindow,
    ) -> OddsResult<Vec<CompetitorHistory>> {
        if competitor_ids.is_empty() {
            return Err(ValidationError::EmptyCompetitorList.into());
        }
        if window.start >= window.end {
            return Err(ValidationError::InvalidWindow {
                start: window.start,
                end: window.end,
            }
            .into());
        }

        let years: Vec<i32> = window.years().collect();
        let listing_fetches = join_all(years.iter().map(|&year| self.source.fetch_competitions(year)));
        let competitor_fetches = join_all(competitor_ids.iter().map(|id| self.source.fetch_competitor(id)));
        let (listings, competitors) = futures::join!(listing_fetches, competitor_fetches);

        let mut failed_years = 0usize;
        let mut listed = Vec::new();
        for (year, listing) in years.iter().zip(listings) {
            match listing {
                Ok(items) => listed.extend(items),
                Err(err) => {
                    failed_years += 1;
                    log_fetch_failure("year", &year.to_string(), &err);
                }
            }
        }
        if failed_years == years.len() {
            warn!(event = %event, "every competition listing fetch failed; no history available");
            return Ok(Vec::new());
        }
        let index = CompetitionDateIndex::from_listings(&listed);

        let mut failed_competitors = 0usize;
        let histories: Vec<CompetitorHistory> = competitor_ids
            .iter()
            .zip(competitors)
            .map(|(id, fetched)| match fetched {
                Ok(competitor) => {
                    let mut history = extract_history(&competitor, event, window, &index);
                    if history.competitor_id.is_empty() {
                        history.competitor_id.clone_from(id);
                    }
                    if history.name.is_empty() {
                        history.name.clone_from(id);
                    }
                    history
                }
                Err(err) => {
                    failed_competitors += 1;
                    log_fetch_failure("competitor", id, &err);
                    CompetitorHistory::absent(id)
                }
            })
            .collect();

        if failed_competitors == competitor_ids.len() {
            warn!(event = %event, "every competitor fetch failed; no history available");
            return Ok(Vec::new());
        }

        debug!(
            event = %event,
            competitors = histories.len(),
            indexed_competitions = index.len(),
            solves = histories.iter().map(CompetitorHistory::solve_count).sum::<usize>(),
            "aggregated result history"
        );
        Ok(histories)
    }
}

fn log_fetch_failure(kind: &'static str, key: &str, err: &FetchError) {
    warn!(kind, key, error = %err, "upstream fetch failed; treating as absent");
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Duration, TimeZone};

    use crate::source::InMemorySource;

    fn window_2024() -> DateWindow {
        DateWindow::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 12, 31, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    fn index() -> CompetitionDateIndex {
        CompetitionDateIndex::from_listings(&[
            ListedCompetition::new("Old2023", "2023-06-01"),
            ListedCompetition::new("Edge2024", "2024-01-01"),
            ListedCompetition::new("Spring2024", "2024-04-06"),
            ListedCompetition::new("Autumn2024", "2024-10-12"),
            ListedCompetition::new("Broken", "not-a-date"),
        ])
    }

    #[test]
    fn index_skips_unparseable_dates() {
        let index = index();
        assert_eq!(index.len(), 4);
        assert!(index.date_of("Broken").is_none());
    }

    #[test]
    fn extract_filters_window_event_and_placeholders() {
        let competitor = Competitor::new("X", "Person X")
            .with_round("Old2023", EventId::Cube3, vec![900, 910, 920, 930, 940])
            .with_round("Edge2024", EventId::Cube3, vec![800, 810, 820, 830, 840])
            .with_round("Autumn2024", EventId::Cube3, vec![700, 0, -1, 720, 0])
            .with_round("Spring2024", EventId::Cube3, vec![750, 760, 770, 780, 790, 999])
            .with_round("Spring2024", EventId::Cube2, vec![300, 310, 320, 330, 340])
            .with_round("Unlisted", EventId::Cube3, vec![100, 100, 100, 100, 100]);

        let history = extract_history(&competitor, EventId::Cube3, &window_2024(), &index());

        let ids: Vec<&str> = history.competitions.iter().map(|c| c.competition_id.as_str()).collect();
        assert_eq!(ids, vec!["Spring2024", "Autumn2024"]);
        assert_eq!(history.competitions[0].solves, vec![750, 760, 770, 780, 790]);
        assert_eq!(history.competitions[1].solves, vec![700, -1, 720]);
        assert_eq!(history.flatten().solves.len(), 8);
    }

    #[test]
    fn extract_caps_long_format_events_at_three() {
        let competitor = Competitor::new("X", "Person X")
            .with_round("Spring2024", EventId::Cube7, vec![30000, 31000, 32000, 0, 0]);
        let history = extract_history(&competitor, EventId::Cube7, &window_2024(), &index());
        assert_eq!(history.flatten().solves, vec![30000, 31000, 32000]);
    }

    #[tokio::test]
    async fn empty_competitor_list_is_rejected() {
        let aggregator = ResultAggregator::new(Arc::new(InMemorySource::new()));
        let err = aggregator
            .aggregate(&[], EventId::Cube3, Utc::now() - Duration::days(30))
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn future_window_start_is_rejected() {
        let aggregator = ResultAggregator::new(Arc::new(InMemorySource::new()));
        let err = aggregator
            .aggregate(&["X".to_string()], EventId::Cube3, Utc::now() + Duration::days(1))
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn fetches_every_year_of_the_window() {
        let source = Arc::new(InMemorySource::new());
        source.insert_competitor(Competitor::new("X", "Person X"));
        let aggregator = ResultAggregator::new(Arc::clone(&source));

        let window = DateWindow::new(
            Utc.with_ymd_and_hms(2021, 5, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
        )
        .unwrap();
        let out = aggregator
            .collect_histories(&["X".to_string()], EventId::Cube3, &window)
            .await
            .unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(source.listing_fetches(), 4);
        assert_eq!(source.competitor_fetches(), 1);
    }
}
