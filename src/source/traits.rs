//! Abstract upstream source traits.
//!
//! These traits define the contract the result aggregator needs from an upstream
//! provider. By using traits, we enable:
//! - The public static JSON host for production
//! - In-memory sources for tests and offline use

use async_trait::async_trait;

use crate::competitor::{Competitor, ListedCompetition};
use crate::error::FetchError;

/// Source of per-competitor result history and yearly competition listings.
///
/// Implementations must not retry; retry policy belongs to the caller.
#[async_trait]
pub trait ResultSource: Send + Sync {
    /// Fetch the full result history of one competitor.
    async fn fetch_competitor(&self, competitor_id: &str) -> Result<Competitor, FetchError>;

    /// Fetch every competition listed for `year`.
    async fn fetch_competitions(&self, year: i32) -> Result<Vec<ListedCompetition>, FetchError>;
}

#[async_trait]
impl<S: ResultSource + ?Sized> ResultSource for std::sync::Arc<S> {
    async fn fetch_competitor(&self, competitor_id: &str) -> Result<Competitor, FetchError> {
        (**self).fetch_competitor(competitor_id).await
    }

    async fn fetch_competitions(&self, year: i32) -> Result<Vec<ListedCompetition>, FetchError> {
        (**self).fetch_competitions(year).await
    }
}
