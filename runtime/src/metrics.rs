//! Prometheus metrics for observability and monitoring.
//!
//! Metrics are recorded through the `metrics` facade at every store and
//! dispatcher boundary; they are no-ops until a recorder is installed.
//! [`MetricsServer`] installs the Prometheus recorder and renders the scrape
//! text. It does not open a listener; hosts expose [`MetricsServer::render`]
//! on their own HTTP surface. Recorded metrics cover:
//!
//! - Store dispatches and registrations
//! - Intent lifecycle (started, terminal outcome, latency)
//! - Transport retries
//!
//! # Example
//!
//! ```rust,no_run
//! use slate_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! if let Some(text) = server.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics recorder.
///
/// Holds the handle used to render the scrape text. `addr` is the address the
/// host intends to serve that text on; it is logged but never bound here.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Address the host serves [`render`](Self::render) output on (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Describe all metrics and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// Only one recorder can be installed per process. If one already is
    /// (e.g., in tests), this logs a warning and succeeds without a handle.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.000_01, 0.000_1, 0.001, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Address the host serves the rendered text on (not bound by this type).
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this instance did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Store
    describe_counter!(
        "slate_store_messages_total",
        "Lifecycle messages dispatched to the store, by phase"
    );
    describe_counter!(
        "slate_store_slice_updates_total",
        "Slice states replaced by reducers"
    );
    describe_histogram!(
        "slate_store_dispatch_duration_seconds",
        "Time spent running all slice reducers for one message"
    );
    describe_counter!(
        "slate_store_registrations_total",
        "Slice registrations, labelled inserted or replaced"
    );

    // Intents
    describe_counter!("slate_intents_started_total", "Intents dispatched");
    describe_counter!(
        "slate_intents_finished_total",
        "Intents that reached a terminal message, by outcome"
    );
    describe_histogram!(
        "slate_intent_duration_seconds",
        "Time from Started to the terminal message"
    );
    describe_gauge!("slate_intents_in_flight", "Intents awaiting a terminal message");

    // Retry
    describe_counter!("slate_retry_attempts_total", "Transport retry attempts");
    describe_counter!(
        "slate_retry_exhausted_total",
        "Transport calls that failed after exhausting retries"
    );
}

/// Store metrics recorder.
pub struct StoreMetrics;

impl StoreMetrics {
    /// Record one dispatched message.
    pub fn record_dispatch(phase: &'static str, changed: usize, duration: Duration) {
        counter!("slate_store_messages_total", "phase" => phase).increment(1);
        counter!("slate_store_slice_updates_total").increment(changed as u64);
        histogram!("slate_store_dispatch_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a slice registration.
    pub fn record_registration(replaced: bool) {
        let outcome = if replaced { "replaced" } else { "inserted" };
        counter!("slate_store_registrations_total", "outcome" => outcome).increment(1);
    }
}

/// Intent lifecycle metrics recorder.
pub struct IntentMetrics;

impl IntentMetrics {
    /// Record a dispatched intent.
    pub fn record_started(in_flight: usize) {
        counter!("slate_intents_started_total").increment(1);
        #[allow(clippy::cast_precision_loss)]
        gauge!("slate_intents_in_flight").set(in_flight as f64);
    }

    /// Record a terminal message.
    pub fn record_finished(phase: &'static str, duration: Duration, in_flight: usize) {
        counter!("slate_intents_finished_total", "outcome" => phase).increment(1);
        histogram!("slate_intent_duration_seconds").record(duration.as_secs_f64());
        #[allow(clippy::cast_precision_loss)]
        gauge!("slate_intents_in_flight").set(in_flight as f64);
    }
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record a retry attempt.
    pub fn record_attempt() {
        counter!("slate_retry_attempts_total").increment(1);
    }

    /// Record exhausted retries.
    pub fn record_exhausted() {
        counter!("slate_retry_exhausted_total").increment(1);
    }
}
