//! HTTP source backed by the public static JSON host.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::competitor::{CompetitionListing, Competitor, ListedCompetition};
use crate::config::OddsConfig;
use crate::error::{FetchError, OddsResult};

use super::traits::ResultSource;

/// GET `url` and decode the JSON body.
///
/// Transport failures and non-2xx answers map to network errors, undecodable
/// bodies to parse errors.
pub(crate) async fn get_json<T: DeserializeOwned>(client: &Client, url: &str) -> Result<T, FetchError> {
    debug!(url, "fetching");
    let response = client.get(url).send().await.map_err(|e| FetchError::Network {
        url: url.to_string(),
        message: e.to_string(),
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let body = response.text().await.map_err(|e| FetchError::Network {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    serde_json::from_str(&body).map_err(|e| FetchError::Parse {
        url: url.to_string(),
        message: e.to_string(),
    })
}

/// Reads competitor histories and competition listings over HTTP.
#[derive(Debug, Clone)]
pub struct HttpResultSource {
    client: Client,
    person_base_url: String,
    competitions_base_url: String,
}

impl HttpResultSource {
    /// Creates a source with an existing client.
    #[must_use]
    pub fn new(client: Client, person_base_url: impl Into<String>, competitions_base_url: impl Into<String>) -> Self {
        Self {
            client,
            person_base_url: trim_base(person_base_url.into()),
            competitions_base_url: trim_base(competitions_base_url.into()),
        }
    }

    /// Creates a source from configuration.
    pub fn from_config(config: &OddsConfig) -> OddsResult<Self> {
        Ok(Self::new(
            config.http_client()?,
            config.person_base_url.clone(),
            config.competitions_base_url.clone(),
        ))
    }

    fn competitor_url(&self, competitor_id: &str) -> String {
        format!("{}/{}.json", self.person_base_url, competitor_id.trim())
    }

    fn listing_url(&self, year: i32) -> String {
        format!("{}/{year}.json", self.competitions_base_url)
    }
}

fn trim_base(mut base: String) -> String {
    while base.ends_with('/') {
        base.pop();
    }
    base
}

#[async_trait]
impl ResultSource for HttpResultSource {
    async fn fetch_competitor(&self, competitor_id: &str) -> Result<Competitor, FetchError> {
        let mut competitor: Competitor = get_json(&self.client, &self.competitor_url(competitor_id)).await?;
        if competitor.id.is_empty() {
            competitor.id = competitor_id.to_string();
        }
        Ok(competitor)
    }

    async fn fetch_competitions(&self, year: i32) -> Result<Vec<ListedCompetition>, FetchError> {
        let listing: CompetitionListing = get_json(&self.client, &self.listing_url(year)).await?;
        Ok(listing.items)
    }
}
