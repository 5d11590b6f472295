//! Prometheus scrape endpoint
//!
//! Served on its own listener so a slow scraper never competes with RPC
//! traffic. Each scrape renders every metric registered up to that moment.

use axum::{
    Router,
    extract::State,
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
    routing::get,
};
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::instrument::ExpositionSink;

/// Scrape handler
///
/// # Response
///
/// - `200 OK` with metrics in Prometheus text format
/// - `500 Internal Server Error` if rendering fails
///
/// # Example
///
/// ```bash
/// curl http://localhost:8080/metrics
/// # HELP active_requests Number of requests in flight
/// # TYPE active_requests gauge
/// active_requests{container_name="tarang"} 7
/// ```
pub async fn handler(State(sink): State<Arc<dyn ExpositionSink>>) -> AppResult<Response> {
    let body = sink.render().map_err(|e| {
        tracing::error!(
            error = %e,
            "Failed to render metrics for Prometheus scraping"
        );
        AppError::Exposition(e.to_string())
    })?;

    let mut response = body.into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(sink.content_type()),
    );
    Ok(response)
}

/// Router serving the scrape endpoint at `path`
pub fn router(sink: Arc<dyn ExpositionSink>, path: &str) -> Router {
    Router::new().route(path, get(handler)).with_state(sink)
}
