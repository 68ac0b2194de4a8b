//! Transport seam for the live results service.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::OddsConfig;
use crate::error::{FetchError, OddsResult};

/// A GraphQL POST body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQlRequest {
    /// Operation to execute (`Competition` or `Round`).
    pub operation_name: String,
    /// Query document.
    pub query: String,
    /// Query variables.
    pub variables: Value,
}

/// Raw access to the live results service.
///
/// Implementations must be thread-safe (`Send + Sync`).
#[async_trait]
pub trait LiveTransport: Send + Sync {
    /// GET `url` following redirects and return the final URL.
    async fn resolve_link(&self, url: &str) -> Result<String, FetchError>;

    /// Execute a GraphQL request and return the decoded response body.
    async fn graphql(&self, request: &GraphQlRequest) -> Result<Value, FetchError>;
}

/// [`LiveTransport`] over `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpLiveTransport {
    client: Client,
    endpoint: String,
}

impl HttpLiveTransport {
    /// Creates a transport posting GraphQL to `endpoint`.
    #[must_use]
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// Creates a transport from configuration.
    pub fn from_config(config: &OddsConfig) -> OddsResult<Self> {
        Ok(Self::new(config.http_client()?, config.live_endpoint.clone()))
    }
}

fn network(url: &str, err: &reqwest::Error) -> FetchError {
    FetchError::Network {
        url: url.to_string(),
        message: err.to_string(),
    }
}

#[async_trait]
impl LiveTransport for HttpLiveTransport {
    async fn resolve_link(&self, url: &str) -> Result<String, FetchError> {
        debug!(url, "resolving live link");
        let response = self.client.get(url).send().await.map_err(|e| network(url, &e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.url().to_string())
    }

    async fn graphql(&self, request: &GraphQlRequest) -> Result<Value, FetchError> {
        let url = self.endpoint.as_str();
        debug!(url, operation = %request.operation_name, "posting graphql");
        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| network(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.text().await.map_err(|e| network(url, &e))?;
        serde_json::from_str(&body).map_err(|e| FetchError::Parse {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}
