//! Request and response bodies of the RPC surface
//!
//! Shared by the server handlers and [`crate::client::SidecarClient`].
//! Every operation answers with a [`RpcResponse`] whose `status_code` is
//! also the HTTP status of the reply.

use serde::{Deserialize, Serialize};

use crate::definition::LabelValues;

/// RPC paths, relative to the server root
pub mod paths {
    pub const CREATE_COUNTER: &str = "/v1/create_counter";
    pub const CREATE_GAUGE: &str = "/v1/create_gauge";
    pub const CREATE_HISTOGRAM: &str = "/v1/create_histogram";
    pub const COUNTER_INC: &str = "/v1/counter_inc";
    pub const GAUGE_SET: &str = "/v1/gauge_set";
    pub const HISTOGRAM_OBSERVE: &str = "/v1/histogram_observe";
}

/// Body of `create_counter` and `create_gauge`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CreateParams {
    pub name: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub help: String,
}

/// Body of `create_histogram`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CreateHistogramParams {
    pub name: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub help: String,
    /// Strictly ascending upper bounds; empty selects default buckets
    #[serde(default)]
    pub buckets: Vec<f64>,
}

/// Body of every update operation
///
/// `value` is ignored by `counter_inc`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UpdateParams {
    pub name: String,
    #[serde(default)]
    pub label_values: LabelValues,
    #[serde(default)]
    pub value: f64,
}

/// Outcome of an RPC call
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RpcResponse {
    pub status_code: u16,
    #[serde(default)]
    pub message: String,
}

impl RpcResponse {
    pub fn ok() -> Self {
        Self {
            status_code: 200,
            message: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_params_defaults() {
        let params: UpdateParams =
            serde_json::from_str(r#"{"name": "hits"}"#).expect("should parse");
        assert_eq!(params.name, "hits");
        assert!(params.label_values.is_empty());
        assert_eq!(params.value, 0.0);
    }

    #[test]
    fn test_create_histogram_params_parse() {
        let params: CreateHistogramParams = serde_json::from_str(
            r#"{"name": "latency", "labels": ["route"], "help": "Latency", "buckets": [0.1, 1, 10]}"#,
        )
        .expect("should parse");
        assert_eq!(params.labels, vec!["route".to_string()]);
        assert_eq!(params.buckets, vec![0.1, 1.0, 10.0]);
    }

    #[test]
    fn test_name_is_required() {
        let result: Result<CreateParams, _> = serde_json::from_str(r#"{"labels": []}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_response_success_range() {
        assert!(RpcResponse::ok().is_success());
        let conflict = RpcResponse {
            status_code: 409,
            message: "exists".to_string(),
        };
        assert!(!conflict.is_success());
    }
}
