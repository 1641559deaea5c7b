//! Public issuance surface.
//!
//! [`IssuanceController`] binds the ledger, gateway, retry policy and upkeep
//! monitor into the externally callable operations. State transitions happen
//! under the ledger write guard; oracle sends and mints do not. While one of
//! those calls is outstanding the slot is marked in flight, so status queries
//! and cancellation never wait on the network.

use crate::IssuerEnvironment;
use crate::gateway::{CallbackVerdict, OracleGateway};
use crate::ledger::{LedgerGuard, RequestLedger, Slot};
use crate::metrics::LifecycleMetrics;
use crate::retry::{FailureReason, RetryAction, RetryPolicy};
use crate::upkeep::UpkeepMonitor;
use rwa_issuer_core::{
    Address, Clock, EventPublisher, ExecutionParams, IssueOrder, IssuerConfig, IssuerError,
    IssuerEvent, MintRequest, OracleResponse, PendingRequest, RequestId, RequestStatus, Result,
    TokenId, TokenLedger, TokenLedgerError, UpkeepCheck,
};
use std::sync::Arc;

/// Result of processing an oracle callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Shares were minted and the slot cleared
    Fulfilled {
        /// Id of the fulfilled request
        request_id: RequestId,
        /// Token id that was minted
        token_id: TokenId,
        /// Metadata URI attached to the mint
        token_uri: String,
    },
    /// The oracle reported an error and the retry policy acted on it
    Failed(RetryAction),
}

/// Entry point for issuing oracle-verified real-estate shares.
pub struct IssuanceController {
    config: IssuerConfig,
    ledger: RequestLedger,
    gateway: Arc<OracleGateway>,
    policy: Arc<RetryPolicy>,
    monitor: UpkeepMonitor,
    token_ledger: Arc<dyn TokenLedger>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventPublisher>,
}

impl IssuanceController {
    /// Build a controller from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`IssuerError::InvalidConfig`] if `config` fails validation.
    pub fn new(config: IssuerConfig, env: IssuerEnvironment) -> Result<Self> {
        config.validate()?;

        let ledger = RequestLedger::new();
        let gateway = Arc::new(OracleGateway::new(
            Arc::clone(&env.oracle),
            Arc::clone(&env.events),
            config.computation.clone(),
            config.call_timeout,
        ));
        let policy = Arc::new(RetryPolicy::new(
            config.max_retries,
            ledger.clone(),
            Arc::clone(&gateway),
            Arc::clone(&env.clock),
            Arc::clone(&env.events),
        ));
        let monitor = UpkeepMonitor::new(
            ledger.clone(),
            Arc::clone(&policy),
            Arc::clone(&env.clock),
            config.timeout_secs(),
        );

        tracing::info!(
            owner = %config.owner,
            issuer = %config.issuer_identity,
            max_retries = config.max_retries,
            timeout_secs = config.timeout_secs(),
            call_timeout_ms = u64::try_from(config.call_timeout.as_millis()).unwrap_or(u64::MAX),
            "Issuance controller initialised"
        );

        Ok(Self {
            config,
            ledger,
            gateway,
            policy,
            monitor,
            token_ledger: env.token_ledger,
            clock: env.clock,
            events: env.events,
        })
    }

    /// The configuration this controller was built with.
    #[must_use]
    pub const fn config(&self) -> &IssuerConfig {
        &self.config
    }

    fn authorize(&self, caller: Address) -> Result<()> {
        if caller == self.config.owner {
            Ok(())
        } else {
            tracing::warn!(%caller, "Unauthorized caller rejected");
            Err(IssuerError::Unauthorized { caller })
        }
    }

    /// Send a new issuance request to the oracle network.
    ///
    /// The slot is reserved before the send and released if it fails, so a
    /// concurrent `issue` is refused while this one is in flight.
    ///
    /// # Errors
    ///
    /// - [`IssuerError::Unauthorized`] if `caller` is not the owner
    /// - [`IssuerError::RequestInProgress`] if a request is already outstanding
    /// - [`IssuerError::SendInProgress`] if another issue is still being sent
    /// - [`IssuerError::Oracle`] if the network refuses the request or does not
    ///   answer within the call timeout (slot stays empty)
    /// - [`IssuerError::SendAbandoned`] if the reservation was cancelled while
    ///   the request was being sent
    #[tracing::instrument(
        skip(self, params),
        fields(%caller, recipient = %order.recipient, amount = order.amount)
    )]
    pub async fn issue(
        &self,
        caller: Address,
        order: IssueOrder,
        params: ExecutionParams,
    ) -> Result<RequestId> {
        self.authorize(caller)?;

        let ticket = self.ledger.write().await.reserve(order, params)?;
        let sent = self.gateway.send(&order, &params).await;

        let mut state = self.ledger.write().await;
        let request_id = match sent {
            Ok(id) => state.claim(ticket, id, self.clock.now()).inspect_err(|e| {
                tracing::warn!(error = %e, "Reservation cancelled during send");
            })?,
            Err(e) => {
                state.release(ticket);
                return Err(e);
            }
        };
        drop(state);

        tracing::info!(%request_id, "Issue request initiated");
        self.events.publish(IssuerEvent::IssueRequestInitiated {
            recipient: order.recipient,
            amount: order.amount,
            subscription_id: params.subscription_id,
            gas_limit: params.gas_limit,
        });

        Ok(request_id)
    }

    /// Abandon the outstanding request, if any.
    ///
    /// Idempotent: with an empty slot this succeeds and returns `None`. A late
    /// callback for the abandoned id is rejected as unknown. An initial send
    /// still in flight is abandoned too (returning `None`, as no id exists
    /// yet); whatever id the network later assigns is never recorded.
    ///
    /// # Errors
    ///
    /// - [`IssuerError::Unauthorized`] if `caller` is not the owner
    /// - [`IssuerError::MintInProgress`] if the request is being minted
    #[tracing::instrument(skip(self))]
    pub async fn cancel_pending_request(&self, caller: Address) -> Result<Option<RequestId>> {
        self.authorize(caller)?;

        let mut state = self.ledger.write().await;
        match state.slot() {
            Slot::Empty => return Ok(None),
            Slot::Fulfilling(pending) => {
                return Err(IssuerError::MintInProgress {
                    request_id: pending.request_id,
                });
            }
            Slot::Sending { .. } | Slot::Pending(_) | Slot::Resending(_) => {}
        }

        let cancelled = state.clear().into_request().map(|pending| pending.request_id);
        drop(state);

        LifecycleMetrics::record_cancelled();
        match cancelled {
            Some(request_id) => {
                tracing::info!(%request_id, "Pending request cancelled");
                self.events.publish(IssuerEvent::RequestCancelled { request_id });
            }
            None => tracing::info!("In-flight issue request abandoned"),
        }

        Ok(cancelled)
    }

    /// Process an asynchronous oracle response.
    ///
    /// # Errors
    ///
    /// - [`IssuerError::UnknownRequest`] if the id is not the request waiting
    ///   for a callback
    /// - [`IssuerError::InvalidResponse`] if a successful result cannot be decoded
    /// - [`IssuerError::Mint`] if the token ledger rejects the mint or does not
    ///   answer within the call timeout (slot stays pending)
    /// - [`IssuerError::Oracle`] if a retry re-send fails (slot unchanged)
    #[tracing::instrument(
        skip(self, response),
        fields(request_id = %response.request_id, is_error = response.is_error())
    )]
    pub async fn on_callback(&self, response: OracleResponse) -> Result<CallbackOutcome> {
        let state = self.ledger.write().await;

        match OracleGateway::validate_callback(&state, &response)? {
            CallbackVerdict::Fulfill { token_uri } => self.fulfill(state, token_uri).await,
            CallbackVerdict::Failed { reason } => {
                tracing::warn!(%reason, "Oracle reported failure");
                self.policy
                    .on_failure(state, FailureReason::OracleError(reason))
                    .await
                    .map(CallbackOutcome::Failed)
            }
        }
    }

    /// Mint for the verified outstanding request, then clear the slot.
    ///
    /// Fail-closed: if the mint is rejected or times out the request goes
    /// back to pending and the token id is not consumed.
    async fn fulfill(
        &self,
        mut state: LedgerGuard<'_>,
        token_uri: String,
    ) -> Result<CallbackOutcome> {
        let (ticket, pending, token_id) = state.begin_fulfill()?;
        drop(state);

        let mint = MintRequest {
            issuer: self.config.issuer_identity,
            to: pending.order.recipient,
            token_id,
            amount: pending.order.amount,
            token_uri: token_uri.clone(),
        };
        let call_timeout = self.config.call_timeout;
        let minted = tokio::time::timeout(call_timeout, self.token_ledger.mint(mint))
            .await
            .unwrap_or_else(|_| {
                Err(TokenLedgerError::Unavailable(format!(
                    "mint timed out after {call_timeout:?}"
                )))
            });

        self.ledger.write().await.finish_fulfill(ticket, minted.is_ok());

        if let Err(e) = minted {
            LifecycleMetrics::record_mint_failed();
            tracing::error!(
                request_id = %pending.request_id,
                token_id,
                error = %e,
                "Mint failed, request left pending"
            );
            return Err(e.into());
        }

        LifecycleMetrics::record_fulfilled();
        tracing::info!(
            request_id = %pending.request_id,
            token_id,
            recipient = %pending.order.recipient,
            amount = pending.order.amount,
            "Request fulfilled"
        );
        self.events.publish(IssuerEvent::RequestFulfilled {
            request_id: pending.request_id,
            token_id,
            token_uri: token_uri.clone(),
        });

        Ok(CallbackOutcome::Fulfilled {
            request_id: pending.request_id,
            token_id,
            token_uri,
        })
    }

    /// Force the timeout path for a stale request.
    ///
    /// Retries if retries remain, otherwise abandons the request with a
    /// terminal failure.
    ///
    /// # Errors
    ///
    /// - [`IssuerError::Unauthorized`] if `caller` is not the owner
    /// - [`IssuerError::NoPendingRequest`] if the slot is empty
    /// - [`IssuerError::SendInProgress`] if a send or re-send is in flight
    /// - [`IssuerError::MintInProgress`] if the request is being minted
    /// - [`IssuerError::RequestNotTimedOut`] if the request is not yet stale
    /// - [`IssuerError::Oracle`] if the re-send fails (slot unchanged)
    #[tracing::instrument(skip(self))]
    pub async fn retry_timed_out_request(&self, caller: Address) -> Result<RetryAction> {
        self.authorize(caller)?;

        let state = self.ledger.write().await;
        let pending = match state.slot() {
            Slot::Empty => return Err(IssuerError::NoPendingRequest),
            Slot::Sending { .. } | Slot::Resending(_) => return Err(IssuerError::SendInProgress),
            Slot::Fulfilling(pending) => {
                return Err(IssuerError::MintInProgress {
                    request_id: pending.request_id,
                });
            }
            Slot::Pending(pending) => pending,
        };

        let now = self.clock.now();
        let timeout_secs = self.config.timeout_secs();
        if !pending.is_stale(now, timeout_secs) {
            return Err(IssuerError::RequestNotTimedOut {
                seconds_remaining: pending.seconds_remaining(now, timeout_secs),
            });
        }

        self.policy.on_timeout(state).await
    }

    /// Snapshot of the pending slot.
    ///
    /// Never waits on the oracle network or the token ledger.
    pub async fn get_request_status(&self) -> RequestStatus {
        let state = self.ledger.read().await;
        let slot = state.slot();
        let mut status = slot.request().map_or_else(RequestStatus::idle, |pending| {
            RequestStatus::of(pending, self.clock.now(), self.config.timeout_secs())
        });
        status.in_flight = slot.is_in_flight();
        status
    }

    /// Copy of the outstanding request, including one with a call in flight.
    pub async fn pending_request(&self) -> Option<PendingRequest> {
        self.ledger.snapshot().await
    }

    /// Token id the next successful fulfillment will mint.
    pub async fn next_token_id(&self) -> TokenId {
        self.ledger.read().await.next_token_id()
    }

    /// Upkeep readiness check. See [`UpkeepMonitor::check_ready`].
    pub async fn check_ready(&self, context: &[u8]) -> UpkeepCheck {
        self.monitor.check_ready(context).await
    }

    /// Upkeep remediation. See [`UpkeepMonitor::perform_remediation`].
    ///
    /// # Errors
    ///
    /// Same as [`UpkeepMonitor::perform_remediation`].
    pub async fn perform_remediation(&self, payload: &[u8]) -> Result<RetryAction> {
        self.monitor.perform_remediation(payload).await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code

    use super::*;
    use chrono::Duration;
    use rwa_issuer_core::{OracleError, TokenLedgerError};
    use rwa_issuer_testing::{
        FixedClock, InMemoryTokenLedger, MockOracleNetwork, RecordingEventPublisher, test_clock,
    };

    const OWNER: Address = Address::repeat_byte(0xaa);
    const ISSUER: Address = Address::repeat_byte(0xbb);
    const ALICE: Address = Address::repeat_byte(0x01);

    struct Fixture {
        controller: IssuanceController,
        oracle: Arc<MockOracleNetwork>,
        tokens: Arc<InMemoryTokenLedger>,
        events: Arc<RecordingEventPublisher>,
        clock: FixedClock,
    }

    fn fixture() -> Fixture {
        let oracle = Arc::new(MockOracleNetwork::new());
        let tokens = Arc::new(InMemoryTokenLedger::new());
        tokens.set_issuer(ISSUER);
        let events = Arc::new(RecordingEventPublisher::new());
        let clock = test_clock();

        let env = IssuerEnvironment::new(
            Arc::new(clock.clone()),
            oracle.clone(),
            tokens.clone(),
            events.clone(),
        );
        let controller = IssuanceController::new(IssuerConfig::new(OWNER, ISSUER), env).unwrap();

        Fixture {
            controller,
            oracle,
            tokens,
            events,
            clock,
        }
    }

    async fn issue(f: &Fixture) -> RequestId {
        f.controller
            .issue(OWNER, IssueOrder::new(ALICE, 1_000), ExecutionParams::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn only_owner_may_act() {
        let f = fixture();
        let mallory = Address::repeat_byte(0x66);

        let err = f
            .controller
            .issue(mallory, IssueOrder::new(ALICE, 1), ExecutionParams::default())
            .await
            .unwrap_err();
        assert_eq!(err, IssuerError::Unauthorized { caller: mallory });
        assert_eq!(f.oracle.submission_count(), 0);

        issue(&f).await;
        assert!(matches!(
            f.controller.cancel_pending_request(mallory).await,
            Err(IssuerError::Unauthorized { .. })
        ));
        assert!(matches!(
            f.controller.retry_timed_out_request(mallory).await,
            Err(IssuerError::Unauthorized { .. })
        ));
        assert!(f.controller.get_request_status().await.has_pending);
    }

    #[tokio::test]
    async fn issue_records_network_id_and_emits_events() {
        let f = fixture();
        let id = issue(&f).await;

        assert_eq!(f.oracle.last_request_id(), Some(id));
        let status = f.controller.get_request_status().await;
        assert_eq!(status.request_id, Some(id));
        assert_eq!(status.retry_count, 0);
        assert_eq!(status.seconds_remaining, 300);
        assert_eq!(f.events.names(), vec!["RequestSent", "IssueRequestInitiated"]);
    }

    #[tokio::test]
    async fn refused_send_leaves_slot_empty() {
        let f = fixture();
        f.oracle.fail_next_submit(OracleError::Rejected("insufficient balance".into()));

        let err = f
            .controller
            .issue(OWNER, IssueOrder::new(ALICE, 1_000), ExecutionParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IssuerError::Oracle(_)));
        assert!(!f.controller.get_request_status().await.has_pending);

        // The slot is still usable
        issue(&f).await;
    }

    #[tokio::test]
    async fn successful_callback_mints_next_token_id() {
        let f = fixture();
        let id = issue(&f).await;

        let outcome = f
            .controller
            .on_callback(OracleResponse::success(id, b"ipfs://QmTest123".to_vec()))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            CallbackOutcome::Fulfilled {
                request_id: id,
                token_id: 0,
                token_uri: "ipfs://QmTest123".to_string(),
            }
        );
        assert_eq!(f.tokens.balance_of(ALICE, 0), 1_000);
        assert_eq!(f.tokens.token_uri(0).as_deref(), Some("ipfs://QmTest123"));
        assert_eq!(f.controller.next_token_id().await, 1);
        assert!(f.controller.pending_request().await.is_none());
    }

    #[tokio::test]
    async fn rejected_mint_keeps_request_pending() {
        let f = fixture();
        let id = issue(&f).await;
        f.tokens.reject_mints("token paused");

        let err = f
            .controller
            .on_callback(OracleResponse::success(id, b"ipfs://QmTest123".to_vec()))
            .await
            .unwrap_err();

        assert!(matches!(err, IssuerError::Mint(TokenLedgerError::Rejected(_))));
        assert_eq!(f.controller.pending_request().await.unwrap().request_id, id);
        assert_eq!(f.controller.next_token_id().await, 0);
        assert_eq!(f.tokens.total_supply(0), 0);
    }

    #[tokio::test]
    async fn cancel_is_idempotent_and_orphans_late_callbacks() {
        let f = fixture();
        assert_eq!(f.controller.cancel_pending_request(OWNER).await.unwrap(), None);

        let id = issue(&f).await;
        assert_eq!(f.controller.cancel_pending_request(OWNER).await.unwrap(), Some(id));
        assert_eq!(f.controller.cancel_pending_request(OWNER).await.unwrap(), None);

        let err = f
            .controller
            .on_callback(OracleResponse::success(id, b"ipfs://late".to_vec()))
            .await
            .unwrap_err();
        assert_eq!(err, IssuerError::UnknownRequest { request_id: id });
        assert_eq!(f.tokens.total_supply(0), 0);
        assert_eq!(f.events.count("RequestCancelled"), 1);
    }

    #[tokio::test]
    async fn manual_timeout_retry_requires_staleness() {
        let f = fixture();
        assert_eq!(
            f.controller.retry_timed_out_request(OWNER).await.unwrap_err(),
            IssuerError::NoPendingRequest
        );

        issue(&f).await;
        f.clock.advance(Duration::seconds(120));
        assert_eq!(
            f.controller.retry_timed_out_request(OWNER).await.unwrap_err(),
            IssuerError::RequestNotTimedOut {
                seconds_remaining: 180
            }
        );

        f.clock.advance(Duration::seconds(181));
        let action = f.controller.retry_timed_out_request(OWNER).await.unwrap();
        assert!(matches!(action, RetryAction::Retry { retry_count: 1, .. }));
    }

    #[tokio::test]
    async fn manual_timeout_retry_gives_up_when_exhausted() {
        let f = fixture();
        issue(&f).await;

        for expected in 1..=3 {
            f.clock.advance(Duration::seconds(301));
            let action = f.controller.retry_timed_out_request(OWNER).await.unwrap();
            assert!(matches!(
                action,
                RetryAction::Retry { retry_count, .. } if retry_count == expected
            ));
        }

        f.clock.advance(Duration::seconds(301));
        // Upkeep refuses exhausted requests; only the owner can force the give-up
        assert!(!f.controller.check_ready(b"").await.ready);
        let action = f.controller.retry_timed_out_request(OWNER).await.unwrap();
        assert!(matches!(action, RetryAction::GiveUp { retry_count: 3, .. }));
        assert!(!f.controller.get_request_status().await.has_pending);
        assert_eq!(f.events.count("RequestFailed"), 1);
    }
}
