//! HTTP request handlers for the sidecar RPC surface

use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::middleware::request_id_middleware;
use crate::protocol::paths;
use crate::registry::MetricRegistry;

pub mod health;
pub mod rpc;

/// Application state shared across all handlers
///
/// All fields are Arc'd for cheap cloning across Axum handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    registry: Arc<MetricRegistry>,
}

impl AppState {
    pub fn new(config: Arc<Config>, registry: Arc<MetricRegistry>) -> Self {
        Self { config, registry }
    }

    /// Get reference to the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get reference to the metric registry
    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    /// Owned registry handle, for work moved off the async runtime
    pub fn registry_handle(&self) -> Arc<MetricRegistry> {
        Arc::clone(&self.registry)
    }

    /// Upper bound on a single registry call
    pub fn deadline(&self) -> Duration {
        self.config.rpc.deadline()
    }
}

/// Router serving the six RPC operations plus `/health`
pub fn rpc_router(state: AppState) -> Router {
    Router::new()
        .route(paths::CREATE_COUNTER, post(rpc::create_counter))
        .route(paths::CREATE_GAUGE, post(rpc::create_gauge))
        .route(paths::CREATE_HISTOGRAM, post(rpc::create_histogram))
        .route(paths::COUNTER_INC, post(rpc::counter_inc))
        .route(paths::GAUGE_SET, post(rpc::gauge_set))
        .route(paths::HISTOGRAM_OBSERVE, post(rpc::histogram_observe))
        .route("/health", get(health::handler))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
