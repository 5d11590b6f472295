//! RPC handlers
//!
//! Each handler moves its request onto the blocking pool, runs the registry
//! operation there, and waits at most the configured deadline for it. The
//! registry's [`ErrorKind`] is mapped to a status code by
//! [`status_for_kind`]; a missed deadline is reported as 504 so callers can
//! tell it apart from a registry failure.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::time::Duration;

use crate::error::{ErrorKind, RegistryError};
use crate::handlers::AppState;
use crate::protocol::{CreateHistogramParams, CreateParams, RpcResponse, UpdateParams};
use crate::registry::MetricRegistry;

/// Status code reported for each registry error kind
pub fn status_for_kind(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::AlreadyExists => StatusCode::CONFLICT,
        ErrorKind::UnknownCollector => StatusCode::NOT_FOUND,
        ErrorKind::LabelMismatch => StatusCode::BAD_REQUEST,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl RpcResponse {
    pub fn from_registry_error(err: &RegistryError) -> Self {
        Self {
            status_code: status_for_kind(err.kind()).as_u16(),
            message: err.to_string(),
        }
    }

    pub fn deadline_exceeded(deadline: Duration) -> Self {
        Self {
            status_code: StatusCode::GATEWAY_TIMEOUT.as_u16(),
            message: format!(
                "registry call did not complete within {} ms",
                deadline.as_millis()
            ),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status_code: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            message: message.into(),
        }
    }
}

impl IntoResponse for RpcResponse {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

/// Run `op` against the registry under the state's deadline
async fn call_registry<F>(state: &AppState, operation: &'static str, name: String, op: F) -> RpcResponse
where
    F: FnOnce(&MetricRegistry) -> Result<(), RegistryError> + Send + 'static,
{
    let registry = state.registry_handle();
    let deadline = state.deadline();
    // Keep registry logs inside the caller's `rpc` span
    let span = tracing::Span::current();
    let task = tokio::task::spawn_blocking(move || span.in_scope(|| op(&registry)));

    match tokio::time::timeout(deadline, task).await {
        Ok(Ok(Ok(()))) => {
            tracing::debug!(operation, metric = %name, "RPC succeeded");
            RpcResponse::ok()
        }
        Ok(Ok(Err(e))) => {
            let kind = e.kind();
            if kind.is_client_error() {
                tracing::debug!(operation, metric = %name, error_kind = %kind, error = %e, "RPC rejected");
            } else {
                tracing::error!(operation, metric = %name, error_kind = %kind, error = %e, "RPC failed");
            }
            RpcResponse::from_registry_error(&e)
        }
        Ok(Err(join_error)) => {
            tracing::error!(
                operation,
                metric = %name,
                error = %join_error,
                "Registry task did not complete"
            );
            RpcResponse::internal(format!("{} aborted: {}", operation, join_error))
        }
        Err(_) => {
            tracing::warn!(
                operation,
                metric = %name,
                deadline_ms = deadline.as_millis() as u64,
                "RPC deadline exceeded"
            );
            RpcResponse::deadline_exceeded(deadline)
        }
    }
}

/// `POST /v1/create_counter`
pub async fn create_counter(
    State(state): State<AppState>,
    Json(req): Json<CreateParams>,
) -> RpcResponse {
    let name = req.name.clone();
    call_registry(&state, "create_counter", name, move |registry| {
        registry.create_counter(req.name, req.labels, req.help)
    })
    .await
}

/// `POST /v1/create_gauge`
pub async fn create_gauge(
    State(state): State<AppState>,
    Json(req): Json<CreateParams>,
) -> RpcResponse {
    let name = req.name.clone();
    call_registry(&state, "create_gauge", name, move |registry| {
        registry.create_gauge(req.name, req.labels, req.help)
    })
    .await
}

/// `POST /v1/create_histogram`
pub async fn create_histogram(
    State(state): State<AppState>,
    Json(req): Json<CreateHistogramParams>,
) -> RpcResponse {
    let name = req.name.clone();
    call_registry(&state, "create_histogram", name, move |registry| {
        registry.create_histogram(req.name, req.labels, req.help, req.buckets)
    })
    .await
}

/// `POST /v1/counter_inc`
pub async fn counter_inc(
    State(state): State<AppState>,
    Json(req): Json<UpdateParams>,
) -> RpcResponse {
    let name = req.name.clone();
    call_registry(&state, "counter_inc", name, move |registry| {
        registry.counter_inc(&req.name, &req.label_values)
    })
    .await
}

/// `POST /v1/gauge_set`
pub async fn gauge_set(
    State(state): State<AppState>,
    Json(req): Json<UpdateParams>,
) -> RpcResponse {
    let name = req.name.clone();
    call_registry(&state, "gauge_set", name, move |registry| {
        registry.gauge_set(&req.name, &req.label_values, req.value)
    })
    .await
}

/// `POST /v1/histogram_observe`
pub async fn histogram_observe(
    State(state): State<AppState>,
    Json(req): Json<UpdateParams>,
) -> RpcResponse {
    let name = req.name.clone();
    call_registry(&state, "histogram_observe", name, move |registry| {
        registry.histogram_observe(&req.name, &req.label_values, req.value)
    })
    .await
}
