//! Oracle gateway: request dispatch and callback validation.

use crate::ledger::LedgerState;
use crate::metrics::LifecycleMetrics;
use rwa_issuer_core::{
    ComputationSpec, EventPublisher, ExecutionParams, IssueOrder, IssuerError, IssuerEvent,
    OracleError, OracleNetwork, OracleRequest, OracleResponse, OracleSubmission, RequestId,
    Result,
};
use std::sync::Arc;
use std::time::Duration;

/// What a validated callback asks the issuer to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackVerdict {
    /// The oracle succeeded; mint with this metadata URI
    Fulfill {
        /// Decoded metadata URI
        token_uri: String,
    },
    /// The oracle reported an error; hand it to the retry policy
    Failed {
        /// Decoded error payload
        reason: String,
    },
}

/// Encodes issue orders into oracle requests and validates their callbacks.
pub struct OracleGateway {
    oracle: Arc<dyn OracleNetwork>,
    events: Arc<dyn EventPublisher>,
    computation: ComputationSpec,
    call_timeout: Duration,
}

impl OracleGateway {
    /// Create a gateway that runs `computation` for every request.
    ///
    /// A submission that has not completed after `call_timeout` is abandoned.
    #[must_use]
    pub fn new(
        oracle: Arc<dyn OracleNetwork>,
        events: Arc<dyn EventPublisher>,
        computation: ComputationSpec,
        call_timeout: Duration,
    ) -> Self {
        Self {
            oracle,
            events,
            computation,
            call_timeout,
        }
    }

    /// Encode and submit a request for `order`, returning the network-assigned id.
    ///
    /// Emits `RequestSent` on success. Nothing is recorded in the ledger here;
    /// callers must not hold the ledger lock while awaiting this.
    ///
    /// # Errors
    ///
    /// Returns [`IssuerError::Oracle`] if the payload cannot be encoded, the
    /// network refuses the submission, or it does not answer within the call
    /// timeout.
    #[tracing::instrument(
        skip(self, order, params),
        fields(
            recipient = %order.recipient,
            amount = order.amount,
            subscription_id = params.subscription_id
        )
    )]
    pub async fn send(&self, order: &IssueOrder, params: &ExecutionParams) -> Result<RequestId> {
        let payload = OracleRequest::for_order(&self.computation, order).encode()?;
        let submission = self.oracle.submit(OracleSubmission::new(payload, params));

        let request_id = tokio::time::timeout(self.call_timeout, submission)
            .await
            .unwrap_or_else(|_| {
                Err(OracleError::Unavailable(format!(
                    "submission timed out after {:?}",
                    self.call_timeout
                )))
            })
            .inspect_err(|e| tracing::warn!(error = %e, "Oracle submission failed"))?;

        LifecycleMetrics::record_sent();
        tracing::info!(%request_id, "Oracle request sent");
        self.events.publish(IssuerEvent::RequestSent { request_id });

        Ok(request_id)
    }

    /// Check a callback against the pending slot and decode it.
    ///
    /// Does not mutate state: a rejected callback leaves the slot untouched.
    ///
    /// # Errors
    ///
    /// - [`IssuerError::UnknownRequest`] if the id is not the outstanding request
    /// - [`IssuerError::InvalidResponse`] if a successful result is not a UTF-8 URI
    pub fn validate_callback(
        state: &LedgerState,
        response: &OracleResponse,
    ) -> Result<CallbackVerdict> {
        if !state.matches(&response.request_id) {
            LifecycleMetrics::record_callback_rejected();
            tracing::warn!(
                request_id = %response.request_id,
                pending = ?state.pending().map(|p| p.request_id.to_string()),
                "Rejected callback for unknown request"
            );
            return Err(IssuerError::UnknownRequest {
                request_id: response.request_id,
            });
        }

        if response.is_error() {
            return Ok(CallbackVerdict::Failed {
                reason: String::from_utf8_lossy(&response.error).into_owned(),
            });
        }

        Ok(CallbackVerdict::Fulfill {
            token_uri: decode_token_uri(&response.result)?,
        })
    }
}

fn decode_token_uri(result: &[u8]) -> Result<String> {
    if result.is_empty() {
        return Err(IssuerError::InvalidResponse("empty result".to_string()));
    }
    String::from_utf8(result.to_vec()).map_err(|e| IssuerError::InvalidResponse(e.to_string()))
}
