//! Command-line interface for metrics-sidecar
//!
//! Provides argument parsing and subcommand handling for the binary.

use clap::{Parser, Subcommand};

/// Central metrics sidecar for Prometheus
#[derive(Parser)]
#[command(name = "metrics-sidecar")]
#[command(version)]
#[command(about = "Central metrics sidecar for Prometheus")]
#[command(
    long_about = "metrics-sidecar lets other processes create and update Prometheus counters, \
    gauges and histograms over a small RPC interface, and exposes them on a scrape endpoint."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = crate::config::DEFAULT_CONFIG_PATH, global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Run a demo producer that feeds a running sidecar
    Produce {
        /// Base URL of the sidecar RPC listener
        #[arg(short, long, default_value = "http://127.0.0.1:50051")]
        address: String,

        /// Value of the `container_name` label
        #[arg(long, default_value = "tarang")]
        container: String,

        /// Delay between update rounds in milliseconds (at least 1)
        #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
        interval_ms: u64,

        /// Stop after this many rounds (runs until Ctrl-C if omitted)
        #[arg(long)]
        iterations: Option<u64>,
    },
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# metrics-sidecar Configuration
# =============================
#
# Every section is optional. Values shown are the defaults.

# ─────────────────────────────────────────────────────────────────────────────
# RPC LISTENER
# ─────────────────────────────────────────────────────────────────────────────

[server]
# IP address to bind to (0.0.0.0 for all interfaces, 127.0.0.1 for localhost only)
host = "0.0.0.0"

# Port serving the create/update RPC operations
port = 50051

# ─────────────────────────────────────────────────────────────────────────────
# SCRAPE ENDPOINT
# ─────────────────────────────────────────────────────────────────────────────

[exposition]
host = "0.0.0.0"

# Port Prometheus scrapes (must differ from server.port on the same host)
port = 8080

# HTTP path of the text exposition
path = "/metrics"

# ─────────────────────────────────────────────────────────────────────────────
# RPC LIMITS
# ─────────────────────────────────────────────────────────────────────────────

[rpc]
# Deadline for a single registry call in milliseconds (1 - 60000).
# Calls exceeding it are answered with status 504.
deadline_ms = 3000

# ─────────────────────────────────────────────────────────────────────────────
# OBSERVABILITY
# ─────────────────────────────────────────────────────────────────────────────

[observability]
# Log level: "trace", "debug", "info", "warn", "error"
# RUST_LOG overrides this when set.
log_level = "info"
"#
}
