//! # RWA Issuer Runtime
//!
//! Asynchronous request lifecycle for oracle-verified real-estate share
//! issuance.
//!
//! ## Core Components
//!
//! - **`RequestLedger`**: the single pending-request slot, guarded by a tokio `RwLock`
//! - **`OracleGateway`**: encodes and submits requests, validates callbacks
//! - **`RetryPolicy`**: retry-or-give-up for oracle failures and timeouts
//! - **`UpkeepMonitor`**: keeper-polled staleness check and remediation
//! - **`IssuanceController`**: the owner-facing and callback-facing surface
//!
//! At most one request is outstanding at any time. A callback is accepted only
//! if it carries the id currently held in the slot, so responses from
//! cancelled or retried attempts can never mutate state. Oracle submissions
//! and mints run outside the slot's lock, bounded by the configured call
//! timeout, so a stalled collaborator never blocks status queries or cancels.
//!
//! ## Example
//!
//! ```ignore
//! use rwa_issuer_runtime::{IssuanceController, IssuerEnvironment};
//! use rwa_issuer_core::{ExecutionParams, IssueOrder, IssuerConfig, OracleResponse};
//!
//! let controller = IssuanceController::new(IssuerConfig::from_env()?, environment)?;
//!
//! // Returns immediately with the network-assigned id
//! let request_id = controller
//!     .issue(owner, IssueOrder::new(recipient, 1_000), ExecutionParams::default())
//!     .await?;
//!
//! // Later, out of band
//! controller
//!     .on_callback(OracleResponse::success(request_id, b"ipfs://Qm...".to_vec()))
//!     .await?;
//! ```

use rwa_issuer_core::{Clock, EventPublisher, OracleNetwork, TokenLedger};
use std::sync::Arc;

/// Public issuance surface
pub mod controller;

/// Event publishers (broadcast, tracing)
pub mod events;

/// Oracle request dispatch and callback validation
pub mod gateway;

/// Keeper and callback-pump background drivers
pub mod keeper;

/// The single pending-request slot
pub mod ledger;

/// Prometheus metrics for observability
pub mod metrics;

/// Retry-or-give-up policy
pub mod retry;

/// Upkeep readiness check and remediation
pub mod upkeep;

pub use controller::{CallbackOutcome, IssuanceController};
pub use events::{BroadcastEventPublisher, TracingEventPublisher};
pub use gateway::{CallbackVerdict, OracleGateway};
pub use keeper::{DriverHandle, spawn_callback_pump, spawn_keeper};
pub use ledger::{LedgerGuard, LedgerState, RequestLedger, Slot, Ticket};
pub use retry::{FailureReason, RetryAction, RetryDecision, RetryPolicy};
pub use upkeep::UpkeepMonitor;

/// External collaborators injected into the controller.
#[derive(Clone)]
pub struct IssuerEnvironment {
    /// Source of the current time
    pub clock: Arc<dyn Clock>,
    /// Oracle network requests are submitted to
    pub oracle: Arc<dyn OracleNetwork>,
    /// Token ledger minted into on fulfillment
    pub token_ledger: Arc<dyn TokenLedger>,
    /// Sink for lifecycle events
    pub events: Arc<dyn EventPublisher>,
}

impl IssuerEnvironment {
    /// Bundle the collaborators.
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        oracle: Arc<dyn OracleNetwork>,
        token_ledger: Arc<dyn TokenLedger>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            clock,
            oracle,
            token_ledger,
            events,
        }
    }
}
