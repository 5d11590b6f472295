//! Error types for metrics-sidecar
//!
//! `RegistryError` is the outcome taxonomy of registry operations; the RPC
//! layer maps its [`ErrorKind`] to a status code. `AppError` covers
//! process-level failures (configuration, listeners, exposition) and
//! implements `IntoResponse` for Axum handlers.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;
use thiserror::Error;

use crate::definition::MetricKind;
use crate::identity::MetricIdentity;
use crate::instrument::InstrumentError;

/// Classification of a registry failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A create collided with an existing metric of any kind
    AlreadyExists,
    /// An update named a metric that was never created
    UnknownCollector,
    /// An update's label names disagree with the declared ones
    LabelMismatch,
    /// Malformed definition or request
    Validation,
    /// Instrument construction, sink registration or lock failure
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::UnknownCollector => "unknown_collector",
            ErrorKind::LabelMismatch => "label_mismatch",
            ErrorKind::Validation => "validation",
            ErrorKind::Internal => "internal",
        }
    }

    /// True for failures caused by the caller rather than the service
    pub fn is_client_error(&self) -> bool {
        !matches!(self, ErrorKind::Internal)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a registry operation
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("{kind} '{name}' cannot be created: identity {identity} is already registered as a {existing}")]
    AlreadyExists {
        identity: MetricIdentity,
        name: String,
        kind: MetricKind,
        existing: MetricKind,
    },

    #[error("{kind} '{name}' with labels {labels:?} is not registered (identity {identity})")]
    UnknownCollector {
        identity: MetricIdentity,
        name: String,
        kind: MetricKind,
        labels: Vec<String>,
    },

    #[error("labels {supplied:?} do not match {declared:?} declared by '{name}'")]
    LabelMismatch {
        name: String,
        declared: Vec<String>,
        supplied: Vec<String>,
    },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::UnknownCollector { .. } => ErrorKind::UnknownCollector,
            Self::LabelMismatch { .. } => ErrorKind::LabelMismatch,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<InstrumentError> for RegistryError {
    fn from(err: InstrumentError) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Process-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read configuration file {path}: {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration file {path}: {source}")]
    ConfigParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration in {path}: {reason}")]
    ConfigValidationFailed { path: String, reason: String },

    #[error("Failed to bind {listener} listener on {addr}: {source}")]
    Bind {
        listener: &'static str,
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to render metrics: {0}")]
    Exposition(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            Self::ConfigFileRead { .. }
            | Self::ConfigParseFailed { .. }
            | Self::ConfigValidationFailed { .. }
            | Self::Bind { .. } => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            Self::Exposition(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_error_kinds() {
        let identity = MetricIdentity::derive("hits", &["env"]);
        let already = RegistryError::AlreadyExists {
            identity: identity.clone(),
            name: "hits".to_string(),
            kind: MetricKind::Gauge,
            existing: MetricKind::Counter,
        };
        assert_eq!(already.kind(), ErrorKind::AlreadyExists);

        let unknown = RegistryError::UnknownCollector {
            identity,
            name: "hits".to_string(),
            kind: MetricKind::Counter,
            labels: vec!["env".to_string()],
        };
        assert_eq!(unknown.kind(), ErrorKind::UnknownCollector);

        assert_eq!(
            RegistryError::Validation("x".to_string()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            RegistryError::Internal("x".to_string()).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_already_exists_message_names_both_kinds() {
        let err = RegistryError::AlreadyExists {
            identity: MetricIdentity::derive("hits", &["env"]),
            name: "hits".to_string(),
            kind: MetricKind::Gauge,
            existing: MetricKind::Counter,
        };
        let msg = err.to_string();
        assert!(msg.contains("gauge 'hits'"), "got: {}", msg);
        assert!(msg.contains("already registered as a counter"), "got: {}", msg);
    }

    #[test]
    fn test_instrument_error_becomes_internal() {
        let err: RegistryError = InstrumentError::Construct("bad name".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.to_string().contains("bad name"));
    }

    #[test]
    fn test_only_internal_is_server_error() {
        assert!(ErrorKind::AlreadyExists.is_client_error());
        assert!(ErrorKind::UnknownCollector.is_client_error());
        assert!(ErrorKind::LabelMismatch.is_client_error());
        assert!(ErrorKind::Validation.is_client_error());
        assert!(!ErrorKind::Internal.is_client_error());
    }

    #[test]
    fn test_config_error_creates() {
        let err = AppError::Config("test error".to_string());
        assert_eq!(err.to_string(), "Configuration error: test error");
    }

    #[test]
    fn test_exposition_error_response_status() {
        let err = AppError::Exposition("encoder failed".to_string());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_internal_error_response_status() {
        let err = AppError::Internal("test".to_string());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
