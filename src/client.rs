//! HTTP client for the sidecar RPC surface
//!
//! Non-2xx replies are not transport errors: the sidecar always answers with
//! an [`RpcResponse`] body, and callers decide what a 409 or 404 means for
//! them.

use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::definition::LabelValues;
use crate::protocol::{CreateHistogramParams, CreateParams, RpcResponse, UpdateParams, paths};

/// Client-side failure talking to the sidecar
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unexpected response from {url} (HTTP {status}): {body}")]
    InvalidResponse {
        url: String,
        status: u16,
        body: String,
    },
}

/// Typed client for one sidecar instance
#[derive(Debug, Clone)]
pub struct SidecarClient {
    base_url: String,
    http: Client,
}

impl SidecarClient {
    /// Create a client for the sidecar at `base_url` (e.g. `http://127.0.0.1:50051`)
    ///
    /// `timeout` bounds each request end to end.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ClientError::Build)?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call<B: Serialize>(&self, path: &str, body: &B) -> Result<RpcResponse, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|source| ClientError::Transport {
                url: url.clone(),
                source,
            })?;

        serde_json::from_str::<RpcResponse>(&text).map_err(|_| {
            tracing::debug!(url = %url, status, "Sidecar reply was not an RpcResponse");
            ClientError::InvalidResponse {
                url,
                status,
                body: text,
            }
        })
    }

    pub async fn create_counter(
        &self,
        name: &str,
        labels: &[&str],
        help: &str,
    ) -> Result<RpcResponse, ClientError> {
        self.call(paths::CREATE_COUNTER, &create_params(name, labels, help))
            .await
    }

    pub async fn create_gauge(
        &self,
        name: &str,
        labels: &[&str],
        help: &str,
    ) -> Result<RpcResponse, ClientError> {
        self.call(paths::CREATE_GAUGE, &create_params(name, labels, help))
            .await
    }

    pub async fn create_histogram(
        &self,
        name: &str,
        labels: &[&str],
        help: &str,
        buckets: &[f64],
    ) -> Result<RpcResponse, ClientError> {
        let body = CreateHistogramParams {
            name: name.to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            help: help.to_string(),
            buckets: buckets.to_vec(),
        };
        self.call(paths::CREATE_HISTOGRAM, &body).await
    }

    pub async fn counter_inc(
        &self,
        name: &str,
        label_values: &LabelValues,
    ) -> Result<RpcResponse, ClientError> {
        self.call(paths::COUNTER_INC, &update_params(name, label_values, 0.0))
            .await
    }

    pub async fn gauge_set(
        &self,
        name: &str,
        label_values: &LabelValues,
        value: f64,
    ) -> Result<RpcResponse, ClientError> {
        self.call(paths::GAUGE_SET, &update_params(name, label_values, value))
            .await
    }

    pub async fn histogram_observe(
        &self,
        name: &str,
        label_values: &LabelValues,
        value: f64,
    ) -> Result<RpcResponse, ClientError> {
        self.call(
            paths::HISTOGRAM_OBSERVE,
            &update_params(name, label_values, value),
        )
        .await
    }
}

fn create_params(name: &str, labels: &[&str], help: &str) -> CreateParams {
    CreateParams {
        name: name.to_string(),
        labels: labels.iter().map(|l| l.to_string()).collect(),
        help: help.to_string(),
    }
}

fn update_params(name: &str, label_values: &LabelValues, value: f64) -> UpdateParams {
    UpdateParams {
        name: name.to_string(),
        label_values: label_values.clone(),
        value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = SidecarClient::new("http://127.0.0.1:50051/", Duration::from_secs(1))
            .expect("client should build");
        assert_eq!(client.base_url(), "http://127.0.0.1:50051");
    }

    #[tokio::test]
    async fn test_unreachable_sidecar_is_transport_error() {
        // 192.0.2.0/24 is TEST-NET-1, reserved for documentation
        let client = SidecarClient::new("http://192.0.2.1:50051", Duration::from_millis(200))
            .expect("client should build");
        let err = client
            .counter_inc("hits", &LabelValues::new())
            .await
            .expect_err("request should fail");
        assert!(matches!(err, ClientError::Transport { .. }));
    }
}
