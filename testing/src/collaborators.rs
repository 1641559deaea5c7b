//! In-memory stand-ins for the external collaborators.
//!
//! - [`MockOracleNetwork`]: hands out sequential request ids and records submissions
//! - [`InMemoryTokenLedger`]: balances, supply and URIs, gated by `set_issuer`
//!
//! Both can be told to hang on the next call, which never completes.
//! - [`RecordingEventPublisher`]: captures every published event

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on poisoned locks

use rwa_issuer_core::{
    Address, BoxFuture, EventPublisher, IssuerEvent, MintRequest, OracleError, OracleNetwork,
    OracleSubmission, RequestId, TokenId, TokenLedger, TokenLedgerError,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

#[derive(Debug, Default)]
struct OracleState {
    submissions: Vec<OracleSubmission>,
    issued: Vec<RequestId>,
    failures: VecDeque<OracleError>,
    hangs: usize,
}

/// Oracle network that accepts every submission and never calls back.
///
/// Ids are `RequestId::from_u64(1)`, `from_u64(2)`, ... in submission order.
/// Callbacks are delivered by the test itself through `on_callback`.
#[derive(Clone, Debug, Default)]
pub struct MockOracleNetwork {
    state: Arc<RwLock<OracleState>>,
}

impl MockOracleNetwork {
    /// Create a network with no submissions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next submission fail with `error`. Calls queue up.
    pub fn fail_next_submit(&self, error: OracleError) {
        self.state.write().unwrap().failures.push_back(error);
    }

    /// Make the next submission hang forever. No id is consumed.
    pub fn hang_next_submit(&self) {
        self.state.write().unwrap().hangs += 1;
    }

    /// Every accepted submission, oldest first.
    #[must_use]
    pub fn submissions(&self) -> Vec<OracleSubmission> {
        self.state.read().unwrap().submissions.clone()
    }

    /// Number of accepted submissions.
    #[must_use]
    pub fn submission_count(&self) -> usize {
        self.state.read().unwrap().submissions.len()
    }

    /// The most recently handed out id.
    #[must_use]
    pub fn last_request_id(&self) -> Option<RequestId> {
        self.state.read().unwrap().issued.last().copied()
    }
}

impl OracleNetwork for MockOracleNetwork {
    fn submit(
        &self,
        submission: OracleSubmission,
    ) -> BoxFuture<'_, Result<RequestId, OracleError>> {
        let mut state = self.state.write().unwrap();
        if state.hangs > 0 {
            state.hangs -= 1;
            return Box::pin(std::future::pending());
        }
        let result = match state.failures.pop_front() {
            Some(error) => Err(error),
            None => {
                let request_id = RequestId::from_u64(state.issued.len() as u64 + 1);
                state.submissions.push(submission);
                state.issued.push(request_id);
                Ok(request_id)
            }
        };
        Box::pin(std::future::ready(result))
    }
}

#[derive(Debug, Default)]
struct TokenState {
    issuer: Option<Address>,
    balances: HashMap<(Address, TokenId), u128>,
    supply: HashMap<TokenId, u128>,
    uris: HashMap<TokenId, String>,
    rejection: Option<String>,
    hangs: usize,
    mints: Vec<MintRequest>,
}

/// Token ledger kept in memory.
///
/// Mints are refused until [`InMemoryTokenLedger::set_issuer`] registers the
/// minting identity, mirroring the out-of-band authorisation step.
#[derive(Clone, Debug, Default)]
pub struct InMemoryTokenLedger {
    state: Arc<RwLock<TokenState>>,
}

impl InMemoryTokenLedger {
    /// Create an empty ledger with no authorised issuer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Authorise `issuer` to mint.
    pub fn set_issuer(&self, issuer: Address) {
        self.state.write().unwrap().issuer = Some(issuer);
    }

    /// Reject every subsequent mint with `reason`.
    pub fn reject_mints(&self, reason: impl Into<String>) {
        self.state.write().unwrap().rejection = Some(reason.into());
    }

    /// Make the next mint hang forever without touching balances.
    pub fn hang_next_mint(&self) {
        self.state.write().unwrap().hangs += 1;
    }

    /// Accept mints again.
    pub fn accept_mints(&self) {
        self.state.write().unwrap().rejection = None;
    }

    /// Balance of `owner` for `token_id`.
    #[must_use]
    pub fn balance_of(&self, owner: Address, token_id: TokenId) -> u128 {
        self.state
            .read()
            .unwrap()
            .balances
            .get(&(owner, token_id))
            .copied()
            .unwrap_or(0)
    }

    /// Total minted supply of `token_id`.
    #[must_use]
    pub fn total_supply(&self, token_id: TokenId) -> u128 {
        self.state.read().unwrap().supply.get(&token_id).copied().unwrap_or(0)
    }

    /// Metadata URI recorded for `token_id`.
    #[must_use]
    pub fn token_uri(&self, token_id: TokenId) -> Option<String> {
        self.state.read().unwrap().uris.get(&token_id).cloned()
    }

    /// Every accepted mint, oldest first.
    #[must_use]
    pub fn mints(&self) -> Vec<MintRequest> {
        self.state.read().unwrap().mints.clone()
    }
}

impl TokenLedger for InMemoryTokenLedger {
    fn mint(&self, request: MintRequest) -> BoxFuture<'_, Result<(), TokenLedgerError>> {
        let mut state = self.state.write().unwrap();
        if state.hangs > 0 {
            state.hangs -= 1;
            return Box::pin(std::future::pending());
        }
        let result = if state.issuer != Some(request.issuer) {
            Err(TokenLedgerError::IssuerNotAuthorized(request.issuer))
        } else if let Some(reason) = &state.rejection {
            Err(TokenLedgerError::Rejected(reason.clone()))
        } else {
            *state.balances.entry((request.to, request.token_id)).or_default() += request.amount;
            *state.supply.entry(request.token_id).or_default() += request.amount;
            state.uris.insert(request.token_id, request.token_uri.clone());
            state.mints.push(request);
            Ok(())
        };
        Box::pin(std::future::ready(result))
    }
}

/// Publisher that keeps every event for later assertions.
#[derive(Clone, Debug, Default)]
pub struct RecordingEventPublisher {
    events: Arc<RwLock<Vec<IssuerEvent>>>,
}

impl RecordingEventPublisher {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every published event, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<IssuerEvent> {
        self.events.read().unwrap().clone()
    }

    /// Names of every published event, oldest first.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.events.read().unwrap().iter().map(IssuerEvent::name).collect()
    }

    /// Number of events named `name`.
    #[must_use]
    pub fn count(&self, name: &str) -> usize {
        self.events
            .read()
            .unwrap()
            .iter()
            .filter(|event| event.name() == name)
            .count()
    }

    /// Whether `event` was published.
    #[must_use]
    pub fn contains(&self, event: &IssuerEvent) -> bool {
        self.events.read().unwrap().contains(event)
    }

}

impl EventPublisher for RecordingEventPublisher {
    fn publish(&self, event: IssuerEvent) {
        self.events.write().unwrap().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rwa_issuer_core::{DonId, ExecutionParams};
    use std::time::Duration;

    fn submission() -> OracleSubmission {
        OracleSubmission::new(vec![1, 2, 3], &ExecutionParams::new(1, 300_000, DonId::ZERO))
    }

    #[tokio::test]
    async fn oracle_ids_are_sequential_and_failures_consume_no_id() {
        let oracle = MockOracleNetwork::new();
        assert_eq!(oracle.submit(submission()).await.unwrap(), RequestId::from_u64(1));

        oracle.fail_next_submit(OracleError::Unavailable("down".into()));
        assert!(oracle.submit(submission()).await.is_err());

        assert_eq!(oracle.submit(submission()).await.unwrap(), RequestId::from_u64(2));
        assert_eq!(oracle.submission_count(), 2);
        assert_eq!(oracle.last_request_id(), Some(RequestId::from_u64(2)));
    }

    #[tokio::test]
    async fn ledger_requires_registered_issuer() {
        let ledger = InMemoryTokenLedger::new();
        let issuer = Address::repeat_byte(0xbb);
        let mint = MintRequest {
            issuer,
            to: Address::repeat_byte(0x01),
            token_id: 0,
            amount: 1_000,
            token_uri: "ipfs://QmTest".to_string(),
        };

        assert_eq!(
            ledger.mint(mint.clone()).await.unwrap_err(),
            TokenLedgerError::IssuerNotAuthorized(issuer)
        );

        ledger.set_issuer(issuer);
        ledger.mint(mint.clone()).await.unwrap();
        assert_eq!(ledger.balance_of(mint.to, 0), 1_000);
        assert_eq!(ledger.total_supply(0), 1_000);
        assert_eq!(ledger.token_uri(0).as_deref(), Some("ipfs://QmTest"));

        ledger.reject_mints("paused");
        assert!(ledger.mint(mint.clone()).await.is_err());
        ledger.accept_mints();
        ledger.mint(mint).await.unwrap();
        assert_eq!(ledger.total_supply(0), 2_000);
        assert_eq!(ledger.mints().len(), 2);
    }

    #[test]
    fn recorder_counts_by_name() {
        let recorder = RecordingEventPublisher::new();
        let event = IssuerEvent::RequestSent {
            request_id: RequestId::from_u64(1),
        };
        recorder.publish(event.clone());
        recorder.publish(event.clone());

        assert_eq!(recorder.count("RequestSent"), 2);
        assert!(recorder.contains(&event));
        assert_eq!(recorder.events().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_calls_never_complete_and_consume_nothing() {
        let oracle = MockOracleNetwork::new();
        oracle.hang_next_submit();
        let hung = tokio::time::timeout(Duration::from_secs(60), oracle.submit(submission()));
        assert!(hung.await.is_err());
        assert_eq!(oracle.submit(submission()).await.unwrap(), RequestId::from_u64(1));

        let ledger = InMemoryTokenLedger::new();
        ledger.set_issuer(Address::repeat_byte(0xbb));
        ledger.hang_next_mint();
        let mint = MintRequest {
            issuer: Address::repeat_byte(0xbb),
            to: Address::repeat_byte(0x01),
            token_id: 0,
            amount: 5,
            token_uri: "ipfs://QmTest".to_string(),
        };
        let hung = tokio::time::timeout(Duration::from_secs(60), ledger.mint(mint.clone()));
        assert!(hung.await.is_err());
        assert_eq!(ledger.total_supply(0), 0);
        ledger.mint(mint).await.unwrap();
        assert_eq!(ledger.total_supply(0), 5);
    }
}
