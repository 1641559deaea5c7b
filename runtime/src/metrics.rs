//! Prometheus metrics for the issuance lifecycle.
//!
//! Counters track every transition of the pending slot; the `issuer.pending`
//! gauge is 1 while a request is outstanding and 0 otherwise.
//!
//! # Example
//!
//! ```rust,no_run
//! use rwa_issuer_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Serve `server.render()` from the HTTP endpoint scraped by Prometheus
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Installs the global recorder; the scrape endpoint bound to `addr` renders
/// [`MetricsServer::render`].
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Describe the lifecycle metrics and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Install`] if the recorder cannot be installed.
    /// A recorder that is already installed (e.g., by another test) is not an error.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already installed, skipping");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!("issuer.requests.sent", "Oracle requests submitted (initial and retries)");
    describe_counter!("issuer.requests.fulfilled", "Requests fulfilled with a successful mint");
    describe_counter!("issuer.requests.retried", "Requests re-issued after a failure or timeout");
    describe_counter!("issuer.requests.failed", "Requests abandoned after exhausting retries");
    describe_counter!("issuer.requests.timed_out", "Requests detected as stale");
    describe_counter!("issuer.requests.cancelled", "Pending requests cancelled by the owner");
    describe_counter!(
        "issuer.callbacks.rejected",
        "Oracle callbacks rejected for not matching the pending request"
    );
    describe_counter!(
        "issuer.fulfillment.mint_failed",
        "Fulfillments whose mint side effect was rejected"
    );
    describe_gauge!("issuer.pending", "Whether a request occupies the pending slot (0/1)");
}

/// Lifecycle metrics recorder.
pub struct LifecycleMetrics;

impl LifecycleMetrics {
    /// Record a request submitted to the oracle network.
    pub fn record_sent() {
        counter!("issuer.requests.sent").increment(1);
    }

    /// Record a successful fulfillment.
    pub fn record_fulfilled() {
        counter!("issuer.requests.fulfilled").increment(1);
    }

    /// Record a retry.
    pub fn record_retried() {
        counter!("issuer.requests.retried").increment(1);
    }

    /// Record a terminal failure.
    pub fn record_failed() {
        counter!("issuer.requests.failed").increment(1);
    }

    /// Record a timeout detection.
    pub fn record_timed_out() {
        counter!("issuer.requests.timed_out").increment(1);
    }

    /// Record an owner cancellation.
    pub fn record_cancelled() {
        counter!("issuer.requests.cancelled").increment(1);
    }

    /// Record a rejected callback.
    pub fn record_callback_rejected() {
        counter!("issuer.callbacks.rejected").increment(1);
    }

    /// Record a rejected mint.
    pub fn record_mint_failed() {
        counter!("issuer.fulfillment.mint_failed").increment(1);
    }

    /// Record whether the pending slot is occupied.
    pub fn record_pending(occupied: bool) {
        gauge!("issuer.pending").set(if occupied { 1.0 } else { 0.0 });
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code

    use super::*;

    #[test]
    fn test_metrics_server_creation() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let server = MetricsServer::new(addr);
        assert!(server.handle().is_none());
        assert!(server.render().is_none());
    }

    #[test]
    fn test_lifecycle_metrics_render() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let mut server = MetricsServer::new(addr);
        server.start().unwrap();

        LifecycleMetrics::record_sent();
        LifecycleMetrics::record_retried();
        LifecycleMetrics::record_pending(true);

        // Another test may have installed the recorder first; metrics are
        // still recorded globally in that case.
        if let Some(rendered) = server.render() {
            assert!(rendered.contains("issuer_requests_sent"));
            assert!(rendered.contains("issuer_requests_retried"));
            assert!(rendered.contains("issuer_pending"));
        }
    }
}
