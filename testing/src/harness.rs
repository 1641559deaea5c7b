//! A fully wired controller over in-memory collaborators.

#![allow(clippy::expect_used)] // Harness construction uses known-valid configuration

use crate::collaborators::{InMemoryTokenLedger, MockOracleNetwork, RecordingEventPublisher};
use crate::mocks::{FixedClock, test_clock};
use rwa_issuer_core::{
    Address, ComputationSpec, ExecutionParams, IssueOrder, IssuerConfig, OracleResponse, RequestId,
    Result,
};
use rwa_issuer_runtime::{CallbackOutcome, IssuanceController, IssuerEnvironment};
use std::sync::Arc;
use std::time::Duration;

/// Controller plus handles to every mock it talks to.
///
/// The owner is `0xaa…aa`, the issuer identity `0xbb…bb`; the token ledger
/// has the issuer registered unless the builder says otherwise.
pub struct TestHarness {
    /// The controller under test
    pub controller: Arc<IssuanceController>,
    /// Clock shared with the controller
    pub clock: FixedClock,
    /// Oracle network the controller submits to
    pub oracle: MockOracleNetwork,
    /// Token ledger the controller mints into
    pub tokens: InMemoryTokenLedger,
    /// Recorder of every lifecycle event
    pub events: RecordingEventPublisher,
    /// Owner identity accepted by the controller
    pub owner: Address,
}

impl TestHarness {
    /// Owner identity used by default.
    pub const OWNER: Address = Address::repeat_byte(0xaa);

    /// Issuer identity used by default.
    pub const ISSUER: Address = Address::repeat_byte(0xbb);

    /// Harness with three retries, a five minute timeout and a 30 second call bound.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start configuring a harness.
    #[must_use]
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::default()
    }

    /// Issue as the owner with default execution parameters.
    ///
    /// # Errors
    ///
    /// Whatever [`IssuanceController::issue`] returns.
    pub async fn issue(&self, recipient: Address, amount: u128) -> Result<RequestId> {
        self.controller
            .issue(self.owner, IssueOrder::new(recipient, amount), ExecutionParams::default())
            .await
    }

    /// Deliver a successful oracle response.
    ///
    /// # Errors
    ///
    /// Whatever [`IssuanceController::on_callback`] returns.
    pub async fn succeed(&self, request_id: RequestId, token_uri: &str) -> Result<CallbackOutcome> {
        self.controller
            .on_callback(OracleResponse::success(request_id, token_uri.as_bytes().to_vec()))
            .await
    }

    /// Deliver a failed oracle response.
    ///
    /// # Errors
    ///
    /// Whatever [`IssuanceController::on_callback`] returns.
    pub async fn fail(&self, request_id: RequestId, reason: &str) -> Result<CallbackOutcome> {
        self.controller
            .on_callback(OracleResponse::failure(request_id, reason.as_bytes().to_vec()))
            .await
    }

    /// Id currently held in the pending slot.
    pub async fn pending_id(&self) -> Option<RequestId> {
        self.controller.pending_request().await.map(|p| p.request_id)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`TestHarness`].
#[derive(Debug, Clone)]
pub struct TestHarnessBuilder {
    max_retries: u32,
    request_timeout: Duration,
    call_timeout: Duration,
    authorize_issuer: bool,
}

impl Default for TestHarnessBuilder {
    fn default() -> Self {
        Self {
            max_retries: 3,
            request_timeout: Duration::from_secs(300),
            call_timeout: Duration::from_secs(30),
            authorize_issuer: true,
        }
    }
}

impl TestHarnessBuilder {
    /// Set the retry ceiling.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the staleness threshold.
    #[must_use]
    pub const fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set how long a single oracle submission or mint may take.
    #[must_use]
    pub const fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Skip registering the issuer identity on the token ledger.
    #[must_use]
    pub const fn without_issuer_authorization(mut self) -> Self {
        self.authorize_issuer = false;
        self
    }

    /// Wire everything together.
    ///
    /// # Panics
    ///
    /// Panics if the configured limits fail validation (a zero timeout).
    #[must_use]
    pub fn build(self) -> TestHarness {
        let clock = test_clock();
        let oracle = MockOracleNetwork::new();
        let tokens = InMemoryTokenLedger::new();
        let events = RecordingEventPublisher::new();
        if self.authorize_issuer {
            tokens.set_issuer(TestHarness::ISSUER);
        }

        let config = IssuerConfig::new(TestHarness::OWNER, TestHarness::ISSUER)
            .with_max_retries(self.max_retries)
            .with_request_timeout(self.request_timeout)
            .with_call_timeout(self.call_timeout)
            .with_computation(ComputationSpec::default());
        let env = IssuerEnvironment::new(
            Arc::new(clock.clone()),
            Arc::new(oracle.clone()),
            Arc::new(tokens.clone()),
            Arc::new(events.clone()),
        );
        let controller =
            IssuanceController::new(config, env).expect("harness configuration is valid");

        TestHarness {
            controller: Arc::new(controller),
            clock,
            oracle,
            tokens,
            events,
            owner: TestHarness::OWNER,
        }
    }
}
