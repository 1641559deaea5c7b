//! Keeper-facing upkeep surface.
//!
//! An external scheduler polls [`UpkeepMonitor::check_ready`] and, when it
//! reports ready, calls [`UpkeepMonitor::perform_remediation`] with the
//! returned payload. The payload is the raw 32-byte id of the request that
//! was found stale, so remediation acts on exactly that request or not at all.

use crate::ledger::{LedgerState, RequestLedger, Slot};
use crate::retry::{RetryAction, RetryPolicy};
use chrono::{DateTime, Utc};
use rwa_issuer_core::{Clock, IssuerError, PendingRequest, RequestId, Result, UpkeepCheck};
use std::sync::Arc;

/// Encode a request id as an upkeep payload.
#[must_use]
pub fn encode_payload(request_id: &RequestId) -> Vec<u8> {
    request_id.as_bytes().to_vec()
}

/// Decode an upkeep payload.
///
/// # Errors
///
/// Returns [`IssuerError::InvalidPayload`] unless the payload is exactly 32 bytes.
pub fn decode_payload(payload: &[u8]) -> Result<RequestId> {
    <[u8; 32]>::try_from(payload)
        .map(RequestId::new)
        .map_err(|_| {
            IssuerError::InvalidPayload(format!("expected 32 bytes, got {}", payload.len()))
        })
}

/// Detects stale requests and triggers timeout retries.
pub struct UpkeepMonitor {
    ledger: RequestLedger,
    policy: Arc<RetryPolicy>,
    clock: Arc<dyn Clock>,
    timeout_secs: u64,
}

impl UpkeepMonitor {
    /// Create a monitor over `ledger` with the given staleness threshold.
    #[must_use]
    pub fn new(
        ledger: RequestLedger,
        policy: Arc<RetryPolicy>,
        clock: Arc<dyn Clock>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            ledger,
            policy,
            clock,
            timeout_secs,
        }
    }

    fn is_actionable(&self, pending: &PendingRequest, now: DateTime<Utc>) -> bool {
        pending.is_stale(now, self.timeout_secs) && pending.can_retry(self.policy.max_retries())
    }

    /// Read-only readiness check.
    ///
    /// Ready iff a request is waiting for a callback, it is stale, and it has
    /// retries left. Never ready while a send or mint is in flight.
    /// `_context` is accepted for keeper compatibility and ignored.
    pub async fn check_ready(&self, _context: &[u8]) -> UpkeepCheck {
        let state = self.ledger.read().await;
        let now = self.clock.now();

        match state.pending() {
            Some(pending) if self.is_actionable(pending, now) => UpkeepCheck {
                ready: true,
                payload: encode_payload(&pending.request_id),
            },
            _ => UpkeepCheck::idle(),
        }
    }

    /// Re-validate the check result and run the timeout retry.
    ///
    /// # Errors
    ///
    /// - [`IssuerError::InvalidPayload`] if the payload is malformed
    /// - [`IssuerError::StaleCheckResult`] if the request was cancelled,
    ///   fulfilled, retried, is in flight, is no longer stale, or has no
    ///   retries left
    /// - [`IssuerError::Oracle`] if the re-send fails
    #[tracing::instrument(skip(self, payload))]
    pub async fn perform_remediation(&self, payload: &[u8]) -> Result<RetryAction> {
        let request_id = decode_payload(payload)?;
        let state = self.ledger.write().await;

        self.revalidate(&state, &request_id).inspect_err(|e| {
            tracing::debug!(%request_id, error = %e, "Upkeep check result no longer holds");
        })?;

        self.policy.on_timeout(state).await
    }

    fn revalidate(&self, state: &LedgerState, request_id: &RequestId) -> Result<()> {
        let stale = |reason: &str| IssuerError::StaleCheckResult {
            reason: reason.to_string(),
        };

        let pending = match state.slot() {
            Slot::Empty => return Err(stale("no pending request")),
            Slot::Pending(pending) => pending,
            _ => return Err(stale("request is in flight")),
        };
        if pending.request_id != *request_id {
            return Err(stale("request id changed"));
        }
        if !pending.is_stale(self.clock.now(), self.timeout_secs) {
            return Err(stale("request has not timed out"));
        }
        if !pending.can_retry(self.policy.max_retries()) {
            return Err(stale("retries exhausted"));
        }
        Ok(())
    }
}
