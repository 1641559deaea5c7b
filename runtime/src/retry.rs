//! Bounded retry for failed and timed-out oracle requests.
//!
//! Both triggers (an error callback from the oracle, or a stale request found
//! by the upkeep monitor) go through the same decision: re-send the same order
//! under a new id while `retry_count < max_retries`, otherwise clear the slot
//! and report a terminal failure.
//!
//! Callers pass in the ledger's write guard. A give-up is applied under it;
//! a retry moves the slot to `Resending`, releases the guard for the network
//! call, then re-takes it to record the new id. A callback or keeper poll that
//! arrives meanwhile sees a request in flight, never a half-applied retry.

use crate::gateway::OracleGateway;
use crate::ledger::{LedgerGuard, RequestLedger};
use crate::metrics::LifecycleMetrics;
use rwa_issuer_core::{
    Clock, EventPublisher, IssuerError, IssuerEvent, PendingRequest, RequestId, Result,
};
use std::fmt;
use std::sync::Arc;

/// Why a request is being retried or abandoned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The oracle called back with an error payload
    OracleError(String),
    /// No callback arrived within the request timeout
    Timeout,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OracleError(reason) => f.write_str(reason),
            Self::Timeout => f.write_str("request timed out"),
        }
    }
}

/// Pure outcome of the retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-send the same order
    Retry,
    /// Retries exhausted; clear the slot
    GiveUp,
}

/// What the policy did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    /// The request was re-issued
    Retry {
        /// Id of the request that failed or timed out
        original_request_id: RequestId,
        /// Id assigned to the re-issued request
        new_request_id: RequestId,
        /// Retry count after this retry
        retry_count: u32,
    },
    /// Retries were exhausted and the slot was cleared
    GiveUp {
        /// Id of the abandoned request
        request_id: RequestId,
        /// Retries that had been performed
        retry_count: u32,
    },
}

/// Retry-or-give-up policy with a fixed ceiling.
pub struct RetryPolicy {
    max_retries: u32,
    ledger: RequestLedger,
    gateway: Arc<OracleGateway>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventPublisher>,
}

impl RetryPolicy {
    /// Create a policy that allows at most `max_retries` re-sends per request.
    #[must_use]
    pub fn new(
        max_retries: u32,
        ledger: RequestLedger,
        gateway: Arc<OracleGateway>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            max_retries,
            ledger,
            gateway,
            clock,
            events,
        }
    }

    /// The retry ceiling.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Decide without acting.
    #[must_use]
    pub const fn decide(&self, pending: &PendingRequest) -> RetryDecision {
        if pending.can_retry(self.max_retries) {
            RetryDecision::Retry
        } else {
            RetryDecision::GiveUp
        }
    }

    /// Handle an oracle-reported failure of the outstanding request.
    ///
    /// # Errors
    ///
    /// - [`IssuerError::NoPendingRequest`] if no request is waiting for a callback
    /// - [`IssuerError::Oracle`] if the re-send fails; the request is put back as it was
    /// - [`IssuerError::SendAbandoned`] if the slot was cancelled during the re-send
    #[tracing::instrument(skip(self, state, reason), fields(reason = %reason))]
    pub async fn on_failure(
        &self,
        mut state: LedgerGuard<'_>,
        reason: FailureReason,
    ) -> Result<RetryAction> {
        let pending = state.pending().cloned().ok_or(IssuerError::NoPendingRequest)?;

        match self.decide(&pending) {
            RetryDecision::Retry => self.retry(state, &pending).await,
            RetryDecision::GiveUp => Ok(self.give_up(&mut state, &pending, &reason)),
        }
    }

    /// Handle a stale outstanding request.
    ///
    /// Emits `RequestTimedOut`, then applies the same decision as
    /// [`RetryPolicy::on_failure`]. Staleness itself is checked by the caller.
    ///
    /// # Errors
    ///
    /// Same as [`RetryPolicy::on_failure`].
    #[tracing::instrument(skip(self, state))]
    pub async fn on_timeout(&self, state: LedgerGuard<'_>) -> Result<RetryAction> {
        let pending = state.pending().cloned().ok_or(IssuerError::NoPendingRequest)?;

        LifecycleMetrics::record_timed_out();
        tracing::warn!(
            request_id = %pending.request_id,
            retry_count = pending.retry_count,
            "Request timed out"
        );
        self.events.publish(IssuerEvent::RequestTimedOut {
            request_id: pending.request_id,
            retry_count: pending.retry_count,
        });

        self.on_failure(state, FailureReason::Timeout).await
    }

    async fn retry(
        &self,
        mut state: LedgerGuard<'_>,
        pending: &PendingRequest,
    ) -> Result<RetryAction> {
        let ticket = state.begin_resend()?;
        drop(state);

        let sent = self.gateway.send(&pending.order, &pending.params).await;

        let mut state = self.ledger.write().await;
        let new_request_id = match sent {
            Ok(id) => id,
            Err(e) => {
                state.abort_resend(ticket);
                tracing::error!(
                    request_id = %pending.request_id,
                    error = %e,
                    "Retry send failed, request left unchanged"
                );
                return Err(e);
            }
        };
        let retry_count = state
            .bump_retry(ticket, new_request_id, self.clock.now())
            .inspect_err(|e| {
                tracing::warn!(%new_request_id, error = %e, "Slot changed during re-send");
            })?
            .retry_count;
        drop(state);

        LifecycleMetrics::record_retried();
        tracing::info!(
            original_request_id = %pending.request_id,
            %new_request_id,
            retry_count,
            "Request retried"
        );
        self.events.publish(IssuerEvent::RequestRetried {
            original_request_id: pending.request_id,
            new_request_id,
            retry_count,
        });

        Ok(RetryAction::Retry {
            original_request_id: pending.request_id,
            new_request_id,
            retry_count,
        })
    }

    fn give_up(
        &self,
        state: &mut LedgerGuard<'_>,
        pending: &PendingRequest,
        reason: &FailureReason,
    ) -> RetryAction {
        state.clear();

        LifecycleMetrics::record_failed();
        tracing::error!(
            request_id = %pending.request_id,
            retry_count = pending.retry_count,
            %reason,
            "Retries exhausted, request abandoned"
        );
        self.events.publish(IssuerEvent::RequestFailed {
            request_id: pending.request_id,
            reason: reason.to_string(),
            retry_count: pending.retry_count,
        });

        RetryAction::GiveUp {
            request_id: pending.request_id,
            retry_count: pending.retry_count,
        }
    }
}
