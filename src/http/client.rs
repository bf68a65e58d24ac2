//! HTTP client for the RabbitMQ management API
//!
//! Publishes test case messages through the management API's exchange
//! publish endpoint and checks broker health.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::AppConfig;
use crate::executor::TaskExecutor;
use crate::models::{RawResponse, Task, TestCase};

pub const DEFAULT_HOST: &str = "http://localhost:15672";

/// base64 of `guest:guest`
pub const DEFAULT_AUTH: &str = "Z3Vlc3Q6Z3Vlc3Q=";

pub const DEFAULT_EXCHANGE: &str = "amq.default";

/// HTTP client errors
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Connection refused to {0}")]
    ConnectionRefused(String),

    #[error("Failed to encode payload: {0}")]
    Payload(String),
}

/// Client for one broker's management API
#[derive(Clone, Debug)]
pub struct RabbitClient {
    client: Client,
    host: String,
    auth: String,
    exchange: String,
    timeout_secs: u64,
}

impl RabbitClient {
    /// Create a client with custom timeout
    pub fn new(host: impl Into<String>, auth: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            host: host.into(),
            auth: auth.into(),
            exchange: DEFAULT_EXCHANGE.to_string(),
            timeout_secs,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self::new(&config.host, &config.auth, config.timeout_secs)?.exchange(&config.exchange))
    }

    /// Publish through a different exchange
    pub fn exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = exchange.into();
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn authorization(&self) -> String {
        format!("Basic {}", self.auth)
    }

    /// Build full URL
    fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.host.trim_end_matches('/'), path)
    }

    pub fn publish_url(&self) -> String {
        self.build_url(&format!("/api/exchanges/%2f/{}/publish", self.exchange))
    }

    pub fn overview_url(&self) -> String {
        self.build_url("/api/overview")
    }

    fn map_send_error(&self, url: &str, e: reqwest::Error) -> anyhow::Error {
        if e.is_timeout() {
            anyhow::anyhow!(HttpError::Timeout(self.timeout_secs))
        } else if e.is_connect() {
            anyhow::anyhow!(HttpError::ConnectionRefused(url.to_string()))
        } else {
            anyhow::anyhow!(HttpError::RequestFailed(e.to_string()))
        }
    }

    /// Publish one test case message
    pub async fn publish(&self, test_case: &TestCase) -> Result<RawResponse> {
        let url = self.publish_url();
        let body = publish_body(test_case)?;
        debug!("Publishing {} to {}", test_case.name, url);

        let mut request = self
            .client
            .post(&url)
            .header("Authorization", self.authorization())
            .header(CONTENT_TYPE, "application/json");

        for (key, value) in &test_case.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| self.map_send_error(&url, e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        debug!("Response for {}: {}", test_case.name, status);
        Ok(RawResponse::new(status, body))
    }

    /// Query the broker overview endpoint
    pub async fn health(&self) -> Result<HealthReport> {
        let url = self.overview_url();
        let start = std::time::Instant::now();

        let response = self
            .client
            .get(&url)
            .header("Authorization", self.authorization())
            .send()
            .await
            .map_err(|e| self.map_send_error(&url, e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        Ok(HealthReport {
            url,
            status_code: status,
            body,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[async_trait]
impl TaskExecutor for RabbitClient {
    type Payload = TestCase;

    async fn execute(&self, task: &Task<TestCase>) -> Result<RawResponse> {
        self.publish(&task.payload).await
    }
}

/// Request body expected by the exchange publish endpoint
pub fn publish_body(test_case: &TestCase) -> Result<Value> {
    let payload = serde_json::to_string(&test_case.json_pool)
        .map_err(|e| HttpError::Payload(e.to_string()))?;

    Ok(json!({
        "properties": {},
        "routing_key": test_case.route_key,
        "payload": payload,
        "payload_encoding": "string",
    }))
}

/// Result of a broker health check
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthReport {
    pub url: String,
    pub status_code: u16,
    pub body: String,
    pub duration_ms: u64,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}
