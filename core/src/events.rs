//! Observability events emitted over the request lifecycle.
//!
//! Events are fire-and-forget: publishing never fails from the caller's point
//! of view and never influences the state transition that produced it.
//! Off-chain monitors consume them to follow requests that were accepted
//! synchronously but resolved asynchronously.

use crate::types::{Address, RequestId, TokenId};
use serde::{Deserialize, Serialize};

/// Events describing what happened to the pending request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssuerEvent {
    /// `issue` accepted a new order
    IssueRequestInitiated {
        /// Recipient of the eventual mint
        recipient: Address,
        /// Amount to mint
        amount: u128,
        /// Billing subscription
        subscription_id: u64,
        /// Compute budget
        gas_limit: u32,
    },

    /// A request was submitted to the oracle network
    RequestSent {
        /// Network-assigned id
        request_id: RequestId,
    },

    /// The oracle result was consumed and the shares minted
    RequestFulfilled {
        /// Id of the fulfilled request
        request_id: RequestId,
        /// Token id that was minted
        token_id: TokenId,
        /// Metadata URI returned by the oracle
        token_uri: String,
    },

    /// A failed or stale request was re-issued under a new id
    RequestRetried {
        /// Id that failed or timed out
        original_request_id: RequestId,
        /// Id of the re-issued request
        new_request_id: RequestId,
        /// Retry count after this retry
        retry_count: u32,
    },

    /// Retries are exhausted; the slot was cleared (terminal for this request)
    RequestFailed {
        /// Id of the last attempt
        request_id: RequestId,
        /// Why the last attempt failed
        reason: String,
        /// Retries that had been performed
        retry_count: u32,
    },

    /// A request was detected as stale
    RequestTimedOut {
        /// Id of the stale request
        request_id: RequestId,
        /// Retries performed before the timeout
        retry_count: u32,
    },

    /// The owner abandoned the pending request
    RequestCancelled {
        /// Id of the abandoned request
        request_id: RequestId,
    },
}

impl IssuerEvent {
    /// Short event name, used as a log and metrics label.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::IssueRequestInitiated { .. } => "IssueRequestInitiated",
            Self::RequestSent { .. } => "RequestSent",
            Self::RequestFulfilled { .. } => "RequestFulfilled",
            Self::RequestRetried { .. } => "RequestRetry",
            Self::RequestFailed { .. } => "RequestFailed",
            Self::RequestTimedOut { .. } => "RequestTimedOut",
            Self::RequestCancelled { .. } => "RequestCancelled",
        }
    }
}

/// Sink for [`IssuerEvent`]s.
///
/// Implementations must not block: the controller publishes while holding
/// the pending-slot lock.
pub trait EventPublisher: Send + Sync {
    /// Publish an event. Delivery is best effort.
    fn publish(&self, event: IssuerEvent);
}

/// Publisher that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventPublisher;

impl EventPublisher for NoopEventPublisher {
    fn publish(&self, _event: IssuerEvent) {}
}
