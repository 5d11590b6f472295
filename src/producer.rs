//! Demo producer
//!
//! Declares two metrics on a running sidecar and keeps them moving:
//!
//! - counter `num_requests{container_name, stage}`, incremented once per
//!   round with `stage="input"`
//! - gauge `active_requests{container_name}`, set to a random value in
//!   `0..15` every round
//!
//! A 409 on the creates is expected when the producer restarts against a
//! sidecar that already knows the metrics.

use rand::Rng;
use std::time::Duration;
use thiserror::Error;

use crate::client::{ClientError, SidecarClient};
use crate::definition::LabelValues;
use crate::protocol::RpcResponse;

pub const COUNTER_NAME: &str = "num_requests";
pub const GAUGE_NAME: &str = "active_requests";

/// Producer settings
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Value of the `container_name` label
    pub container: String,
    /// Delay between rounds
    pub interval: Duration,
    /// Number of rounds; `None` runs forever
    pub iterations: Option<u64>,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            container: "tarang".to_string(),
            interval: Duration::from_secs(1),
            iterations: None,
        }
    }
}

/// Failure of a producer run
#[derive(Error, Debug)]
pub enum ProducerError {
    #[error("producer interval must be greater than zero")]
    ZeroInterval,

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// What a producer run achieved
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProducerStats {
    pub rounds: u64,
    pub counter_increments: u64,
    pub gauge_sets: u64,
    /// Update replies with a non-2xx status
    pub rejected: u64,
}

/// Create both metrics, tolerating ones that already exist
pub async fn declare_metrics(client: &SidecarClient) -> Result<(), ClientError> {
    let counter = client
        .create_counter(
            COUNTER_NAME,
            &["container_name", "stage"],
            "Number of requests at various stages",
        )
        .await?;
    log_create(COUNTER_NAME, &counter);

    let gauge = client
        .create_gauge(
            GAUGE_NAME,
            &["container_name"],
            "Number of requests currently in flight",
        )
        .await?;
    log_create(GAUGE_NAME, &gauge);

    Ok(())
}

fn log_create(metric: &str, response: &RpcResponse) {
    match response.status_code {
        200 => tracing::info!(metric, "Metric declared"),
        409 => tracing::info!(metric, "Metric already declared"),
        status => tracing::warn!(
            metric,
            status,
            message = %response.message,
            "Metric declaration rejected"
        ),
    }
}

/// Run the producer until `config.iterations` rounds have completed
///
/// Each round sends its two updates concurrently. A zero interval and
/// transport failures abort the run; rejected updates are counted and
/// logged.
pub async fn run(
    client: &SidecarClient,
    config: &ProducerConfig,
) -> Result<ProducerStats, ProducerError> {
    if config.interval.is_zero() {
        return Err(ProducerError::ZeroInterval);
    }

    declare_metrics(client).await?;

    let mut counter_labels = LabelValues::new();
    counter_labels.insert("container_name".to_string(), config.container.clone());
    counter_labels.insert("stage".to_string(), "input".to_string());

    let mut gauge_labels = LabelValues::new();
    gauge_labels.insert("container_name".to_string(), config.container.clone());

    let mut stats = ProducerStats::default();
    let mut ticker = tokio::time::interval(config.interval);

    loop {
        if config.iterations.is_some_and(|limit| stats.rounds >= limit) {
            break;
        }
        ticker.tick().await;

        let value = f64::from(rand::rng().random_range(0..15u8));
        let (inc, set) = futures::future::join(
            client.counter_inc(COUNTER_NAME, &counter_labels),
            client.gauge_set(GAUGE_NAME, &gauge_labels, value),
        )
        .await;

        let inc = inc?;
        if inc.is_success() {
            stats.counter_increments += 1;
        } else {
            stats.rejected += 1;
            tracing::warn!(status = inc.status_code, message = %inc.message, "counter_inc rejected");
        }

        let set = set?;
        if set.is_success() {
            stats.gauge_sets += 1;
        } else {
            stats.rejected += 1;
            tracing::warn!(status = set.status_code, message = %set.message, "gauge_set rejected");
        }

        stats.rounds += 1;
        tracing::debug!(round = stats.rounds, gauge_value = value, "Producer round complete");
    }

    Ok(stats)
}
