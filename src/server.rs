//! Process wiring: registry construction and the two listeners

use std::sync::Arc;
use tokio::net::TcpListener;

use crate::backend::PrometheusBackend;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::exposition;
use crate::handlers::{self, AppState};
use crate::registry::MetricRegistry;

/// Build a registry backed by a fresh Prometheus registry
pub fn prometheus_registry() -> Arc<MetricRegistry> {
    let backend = Arc::new(PrometheusBackend::new());
    Arc::new(MetricRegistry::new(backend.clone(), backend))
}

async fn bind(listener: &'static str, addr: std::net::SocketAddr) -> AppResult<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| AppError::Bind {
            listener,
            addr,
            source,
        })
}

/// Serve RPC and scrape traffic until Ctrl-C
///
/// The scrape endpoint runs on a background task. If it stops for any
/// reason the RPC listener is shut down as well, since metrics nobody can
/// scrape are useless.
pub async fn run(config: Config) -> AppResult<()> {
    let config = Arc::new(config);
    let rpc_addr = config.server_addr()?;
    let exposition_addr = config.exposition_addr()?;

    let registry = prometheus_registry();
    let state = AppState::new(Arc::clone(&config), Arc::clone(&registry));

    let rpc_listener = bind("rpc", rpc_addr).await?;
    let exposition_listener = bind("exposition", exposition_addr).await?;

    let scrape_app = exposition::router(Arc::clone(registry.sink()), &config.exposition.path);
    let mut exposition_task = tokio::spawn(async move {
        axum::serve(exposition_listener, scrape_app).await
    });

    tracing::info!(
        "Metrics exposition available at http://{}{}",
        exposition_addr,
        config.exposition.path
    );
    tracing::info!(
        deadline_ms = config.rpc.deadline_ms(),
        "RPC server listening on {}",
        rpc_addr
    );

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let app = handlers::rpc_router(state);
    let rpc_server = axum::serve(rpc_listener, app).with_graceful_shutdown(async move {
        let _ = stop_rx.await;
    });
    let mut rpc_task = tokio::spawn(async move { rpc_server.await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
        result = &mut exposition_task => {
            match result {
                Ok(Ok(())) => tracing::warn!("Exposition server stopped, shutting down RPC server"),
                Ok(Err(e)) => tracing::error!(error = %e, "Exposition server failed, shutting down RPC server"),
                Err(e) => tracing::error!(error = %e, "Exposition task aborted, shutting down RPC server"),
            }
        }
        result = &mut rpc_task => {
            exposition_task.abort();
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(AppError::Internal(format!("RPC server failed: {}", e))),
                Err(e) => Err(AppError::Internal(format!("RPC task aborted: {}", e))),
            };
        }
    }

    let _ = stop_tx.send(());
    exposition_task.abort();
    match rpc_task.await {
        Ok(Ok(())) => {
            tracing::info!("RPC server stopped");
            Ok(())
        }
        Ok(Err(e)) => Err(AppError::Internal(format!("RPC server failed: {}", e))),
        Err(e) => Err(AppError::Internal(format!("RPC task aborted: {}", e))),
    }
}
