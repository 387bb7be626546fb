//! HTTP client for the tracking collector
//!
//! Posts tracking payloads as JSON. There is no retry logic: tracking is
//! best-effort and a failed send is reported to the caller once.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::config::CollectorConfig;
use crate::error::{Error, Result};

use super::events::TrackingEndpoint;

/// Placeholder used when the public IP cannot be determined
pub const UNKNOWN_IP: &str = "unknown";

/// Response from an IP lookup service
#[derive(Debug, Deserialize)]
struct IpResponse {
    ip: String,
}

/// HTTP client for the collector API
pub struct CollectorClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl CollectorClient {
    /// Create a new collector client from configuration
    ///
    /// Returns an error if the configuration is invalid or missing required fields.
    pub fn new(config: &CollectorConfig) -> Result<Self> {
        config.validate()?;

        let base_url = config
            .server_url
            .clone()
            .ok_or_else(|| Error::Config("collector.server_url is required".to_string()))?
            .trim_end_matches('/')
            .to_string();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    /// Full URL of an endpoint
    pub fn endpoint_url(&self, endpoint: TrackingEndpoint) -> String {
        format!("{}{}", self.base_url, endpoint.path())
    }

    /// Post one payload
    pub async fn post(
        &self,
        endpoint: TrackingEndpoint,
        payload: &Map<String, Value>,
    ) -> Result<()> {
        let url = self.endpoint_url(endpoint);

        let response = self
            .http_client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::Collector(format!("HTTP request failed: {}", e)))?;

        let status = response.status();

        if status.is_success() {
            Ok(())
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            Err(Error::Collector(format!(
                "API error ({}): {}",
                status, error_text
            )))
        }
    }

    /// Check if the collector can connect to the server
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/health", self.base_url);

        match self.http_client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    /// Look up the visitor's public IP from a JSON `{"ip": ...}` service.
    ///
    /// Falls back to [`UNKNOWN_IP`] on any failure.
    pub async fn public_ip(&self, lookup_url: &str) -> String {
        let result = async {
            let response = self.http_client.get(lookup_url).send().await?;
            response.json::<IpResponse>().await
        }
        .await;

        match result {
            Ok(body) => body.ip,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch IP address");
                UNKNOWN_IP.to_string()
            }
        }
    }
}
