//! metrics-sidecar - central Prometheus metrics for processes that do not
//! embed an instrumentation library
//!
//! Processes create and update counters, gauges and histograms over a small
//! JSON RPC surface; the sidecar owns all measurement state in a
//! [`registry::MetricRegistry`] and exposes it on a Prometheus scrape
//! endpoint.

pub mod backend;
pub mod cli;
pub mod client;
pub mod config;
pub mod definition;
pub mod error;
pub mod exposition;
pub mod handlers;
pub mod identity;
pub mod instrument;
pub mod middleware;
pub mod producer;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod telemetry;
