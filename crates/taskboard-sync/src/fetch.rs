//! HTTP snapshot fetch.

use std::time::Duration;

use taskboard_protocol::{parse_charts_body, ChartItem};

use crate::SyncError;

/// Configuration for the chart endpoint.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// `GET` target. Empty means "not configured".
    pub endpoint: String,
    pub request_timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl FetchConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Issues `GET` requests against the chart endpoint.
#[derive(Debug, Clone)]
pub struct SnapshotFetcher {
    config: FetchConfig,
    http: reqwest::Client,
}

impl SnapshotFetcher {
    pub fn new(config: FetchConfig) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("taskboard/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { config, http })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    /// Fetch and decode the current chart list.
    ///
    /// Accepts `{ "charts": [...] }` or a bare array. Fails when the endpoint
    /// is unset, the status is not 2xx, or the body is not valid JSON.
    pub async fn fetch(&self) -> Result<Vec<ChartItem>, SyncError> {
        let endpoint = self.config.endpoint.trim();
        if endpoint.is_empty() {
            return Err(SyncError::Fetch("endpoint not configured".into()));
        }

        let response = self.http.get(endpoint).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Fetch(format!("HTTP status {status}")));
        }

        let body = response.text().await?;
        parse_charts_body(&body).map_err(|e| SyncError::Fetch(format!("unparsable body: {e}")))
    }
}
