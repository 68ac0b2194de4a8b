//! In-memory result source.
//!
//! Thread-safe implementation of [`ResultSource`] for tests, benchmarks and
//! offline use. Failures can be injected per competitor and per year to
//! exercise the aggregator's degradation rules.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Datelike;

use crate::competitor::{Competitor, ListedCompetition};
use crate::error::FetchError;
use crate::time::parse_competition_date;

use super::traits::ResultSource;

fn lock_err(context: &'static str) -> FetchError {
    FetchError::Io {
        path: format!("memory://{context}"),
        message: "poisoned lock".to_string(),
    }
}

#[derive(Debug, Default)]
struct SourceState {
    competitors: HashMap<String, Competitor>,
    listings: HashMap<i32, Vec<ListedCompetition>>,
    failing_competitors: HashSet<String>,
    failing_years: HashSet<i32>,
}

/// In-memory [`ResultSource`].
///
/// Unknown competitors answer like a missing file (HTTP 404); unknown years
/// answer with an empty listing.
#[derive(Debug, Default)]
pub struct InMemorySource {
    state: RwLock<SourceState>,
    competitor_fetches: AtomicUsize,
    listing_fetches: AtomicUsize,
}

impl InMemorySource {
    /// Create an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a competitor history.
    pub fn insert_competitor(&self, competitor: Competitor) {
        if let Ok(mut state) = self.state.write() {
            state.competitors.insert(competitor.id.clone(), competitor);
        }
    }

    /// Register a competition; it is listed under the year of `from`.
    ///
    /// Entries with unparseable dates are listed under year 0 and never matched.
    pub fn insert_competition(&self, id: &str, from: &str) {
        let year = parse_competition_date(from).map_or(0, |d| d.year());
        if let Ok(mut state) = self.state.write() {
            state
                .listings
                .entry(year)
                .or_default()
                .push(ListedCompetition::new(id, from));
        }
    }

    /// Make every fetch of `competitor_id` fail at the transport level.
    pub fn fail_competitor(&self, competitor_id: &str) {
        if let Ok(mut state) = self.state.write() {
            state.failing_competitors.insert(competitor_id.to_string());
        }
    }

    /// Make every listing fetch of `year` fail at the transport level.
    pub fn fail_year(&self, year: i32) {
        if let Ok(mut state) = self.state.write() {
            state.failing_years.insert(year);
        }
    }

    /// Number of competitor fetches served so far.
    #[must_use]
    pub fn competitor_fetches(&self) -> usize {
        self.competitor_fetches.load(Ordering::Relaxed)
    }

    /// Number of listing fetches served so far.
    #[must_use]
    pub fn listing_fetches(&self) -> usize {
        self.listing_fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ResultSource for InMemorySource {
    async fn fetch_competitor(&self, competitor_id: &str) -> Result<Competitor, FetchError> {
        self.competitor_fetches.fetch_add(1, Ordering::Relaxed);
        let url = format!("memory://persons/{competitor_id}");
        let state = self.state.read().map_err(|_| lock_err("persons"))?;

        if state.failing_competitors.contains(competitor_id) {
            return Err(FetchError::Network {
                url,
                message: "injected failure".to_string(),
            });
        }
        state
            .competitors
            .get(competitor_id)
            .cloned()
            .ok_or(FetchError::Status { url, status: 404 })
    }

    async fn fetch_competitions(&self, year: i32) -> Result<Vec<ListedCompetition>, FetchError> {
        self.listing_fetches.fetch_add(1, Ordering::Relaxed);
        let state = self.state.read().map_err(|_| lock_err("competitions"))?;

        if state.failing_years.contains(&year) {
            return Err(FetchError::Network {
                url: format!("memory://competitions/{year}"),
                message: "injected failure".to_string(),
            });
        }
        Ok(state.listings.get(&year).cloned().unwrap_or_default())
    }
}
