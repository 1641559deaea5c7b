//! The single pending-request slot.
//!
//! [`LedgerState`] holds the pure state transitions; [`RequestLedger`] wraps it
//! in a shared `RwLock` so every mutation is single-writer.
//!
//! The lock is never held across a call to the oracle network or the token
//! ledger. Instead the slot moves into an in-flight state (`Sending`,
//! `Resending`, `Fulfilling`) and the caller receives a [`Ticket`]. When the
//! external call returns, the caller re-takes the lock and completes the
//! transition only if its ticket is still current, i.e. nobody cancelled or
//! otherwise changed the slot in between.

use crate::metrics::LifecycleMetrics;
use chrono::{DateTime, Utc};
use rwa_issuer_core::{
    ExecutionParams, IssueOrder, IssuerError, PendingRequest, RequestId, Result, TokenId,
};
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Write guard over the slot, handed between components during a transition.
pub type LedgerGuard<'a> = RwLockWriteGuard<'a, LedgerState>;

/// What the slot currently holds.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum Slot {
    /// Nothing outstanding
    #[default]
    Empty,
    /// Initial send in flight; the network has not assigned an id yet
    Sending {
        /// Order being sent
        order: IssueOrder,
        /// Parameters it is sent with
        params: ExecutionParams,
    },
    /// Waiting for the oracle to call back
    Pending(PendingRequest),
    /// Re-send in flight for a failed or stale request
    Resending(PendingRequest),
    /// Mint in flight for a verified result
    Fulfilling(PendingRequest),
}

impl Slot {
    /// The request held by the slot, whatever its phase.
    #[must_use]
    pub const fn request(&self) -> Option<&PendingRequest> {
        match self {
            Self::Empty | Self::Sending { .. } => None,
            Self::Pending(pending) | Self::Resending(pending) | Self::Fulfilling(pending) => {
                Some(pending)
            }
        }
    }

    /// Consume the slot, keeping its request.
    #[must_use]
    pub fn into_request(self) -> Option<PendingRequest> {
        match self {
            Self::Empty | Self::Sending { .. } => None,
            Self::Pending(pending) | Self::Resending(pending) | Self::Fulfilling(pending) => {
                Some(pending)
            }
        }
    }

    /// Whether an external call for the slot has not returned yet.
    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        matches!(
            self,
            Self::Sending { .. } | Self::Resending(_) | Self::Fulfilling(_)
        )
    }
}

/// Proof that the holder started an in-flight transition at a given generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

/// State guarded by the ledger lock.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LedgerState {
    slot: Slot,
    generation: u64,
    next_token_id: TokenId,
}

impl LedgerState {
    /// The slot, in whatever phase it is.
    #[must_use]
    pub const fn slot(&self) -> &Slot {
        &self.slot
    }

    /// The request waiting for a callback, if any.
    ///
    /// `None` while a send or mint is in flight.
    #[must_use]
    pub const fn pending(&self) -> Option<&PendingRequest> {
        match &self.slot {
            Slot::Pending(pending) => Some(pending),
            _ => None,
        }
    }

    /// Token id the next successful fulfillment will mint.
    #[must_use]
    pub const fn next_token_id(&self) -> TokenId {
        self.next_token_id
    }

    /// Whether `ticket` was issued by the most recent transition.
    #[must_use]
    pub const fn is_current(&self, ticket: Ticket) -> bool {
        self.generation == ticket.0
    }

    fn transition(&mut self, slot: Slot) -> Ticket {
        LifecycleMetrics::record_pending(!matches!(slot, Slot::Empty));
        self.slot = slot;
        self.generation = self.generation.wrapping_add(1);
        Ticket(self.generation)
    }

    /// Fail unless the slot is empty.
    ///
    /// # Errors
    ///
    /// - [`IssuerError::SendInProgress`] while the initial send is in flight
    /// - [`IssuerError::RequestInProgress`] carrying the outstanding id otherwise
    pub fn ensure_vacant(&self) -> Result<()> {
        match &self.slot {
            Slot::Empty => Ok(()),
            Slot::Sending { .. } => Err(IssuerError::SendInProgress),
            Slot::Pending(pending) | Slot::Resending(pending) | Slot::Fulfilling(pending) => {
                Err(IssuerError::RequestInProgress {
                    request_id: pending.request_id,
                })
            }
        }
    }

    /// Reserve the empty slot for an initial send.
    ///
    /// # Errors
    ///
    /// Same as [`LedgerState::ensure_vacant`].
    pub fn reserve(&mut self, order: IssueOrder, params: ExecutionParams) -> Result<Ticket> {
        self.ensure_vacant()?;
        Ok(self.transition(Slot::Sending { order, params }))
    }

    /// Record the id the network assigned to a reserved send.
    ///
    /// # Errors
    ///
    /// Returns [`IssuerError::SendAbandoned`] if the reservation was cancelled
    /// while the send was in flight; the slot is left alone.
    pub fn claim(
        &mut self,
        ticket: Ticket,
        request_id: RequestId,
        now: DateTime<Utc>,
    ) -> Result<RequestId> {
        let Slot::Sending { order, params } = &self.slot else {
            return Err(IssuerError::SendAbandoned { request_id });
        };
        if !self.is_current(ticket) {
            return Err(IssuerError::SendAbandoned { request_id });
        }

        let pending = PendingRequest::new(request_id, *order, *params, now);
        self.transition(Slot::Pending(pending));
        Ok(request_id)
    }

    /// Give the slot back after a failed initial send.
    ///
    /// Does nothing if the reservation is no longer current.
    pub fn release(&mut self, ticket: Ticket) {
        if self.is_current(ticket) && matches!(self.slot, Slot::Sending { .. }) {
            self.transition(Slot::Empty);
        }
    }

    /// Whether `request_id` is the id of the request waiting for a callback.
    #[must_use]
    pub fn matches(&self, request_id: &RequestId) -> bool {
        self.pending()
            .is_some_and(|pending| pending.request_id == *request_id)
    }

    /// Empty the slot, returning what it held.
    pub fn clear(&mut self) -> Slot {
        let previous = std::mem::take(&mut self.slot);
        self.transition(Slot::Empty);
        previous
    }

    /// Start a re-send of the pending request.
    ///
    /// # Errors
    ///
    /// Returns [`IssuerError::NoPendingRequest`] unless a request is waiting
    /// for a callback.
    pub fn begin_resend(&mut self) -> Result<Ticket> {
        let pending = self.pending().cloned().ok_or(IssuerError::NoPendingRequest)?;
        Ok(self.transition(Slot::Resending(pending)))
    }

    /// Replace the outstanding id after a re-send, bump the retry count and
    /// restart the timeout window.
    ///
    /// # Errors
    ///
    /// - [`IssuerError::NoPendingRequest`] if the slot was emptied meanwhile
    /// - [`IssuerError::SendAbandoned`] if it changed in any other way
    pub fn bump_retry(
        &mut self,
        ticket: Ticket,
        new_request_id: RequestId,
        now: DateTime<Utc>,
    ) -> Result<&PendingRequest> {
        match &self.slot {
            Slot::Empty => return Err(IssuerError::NoPendingRequest),
            Slot::Resending(_) if self.is_current(ticket) => {}
            _ => {
                return Err(IssuerError::SendAbandoned {
                    request_id: new_request_id,
                });
            }
        }

        let Slot::Resending(mut pending) = std::mem::take(&mut self.slot) else {
            return Err(IssuerError::NoPendingRequest);
        };
        pending.request_id = new_request_id;
        pending.retry_count = pending.retry_count.saturating_add(1);
        pending.issued_at = now;
        self.transition(Slot::Pending(pending));

        self.pending().ok_or(IssuerError::NoPendingRequest)
    }

    /// Put the request back, unchanged, after a failed re-send.
    ///
    /// Does nothing if the slot changed while the re-send was in flight.
    pub fn abort_resend(&mut self, ticket: Ticket) {
        if !self.is_current(ticket) {
            return;
        }
        if let Slot::Resending(pending) = std::mem::take(&mut self.slot) {
            self.transition(Slot::Pending(pending));
        }
    }

    /// Lock the pending request for minting and reserve the next token id.
    ///
    /// # Errors
    ///
    /// Returns [`IssuerError::NoPendingRequest`] unless a request is waiting
    /// for a callback.
    pub fn begin_fulfill(&mut self) -> Result<(Ticket, PendingRequest, TokenId)> {
        let pending = self.pending().cloned().ok_or(IssuerError::NoPendingRequest)?;
        let ticket = self.transition(Slot::Fulfilling(pending.clone()));
        Ok((ticket, pending, self.next_token_id))
    }

    /// Complete a fulfillment once the mint has returned.
    ///
    /// A successful mint consumes the token id and empties the slot; a failed
    /// one puts the request back as pending.
    pub fn finish_fulfill(&mut self, ticket: Ticket, minted: bool) {
        if minted {
            self.next_token_id = self.next_token_id.saturating_add(1);
        }
        if !self.is_current(ticket) {
            return;
        }
        if let Slot::Fulfilling(pending) = std::mem::take(&mut self.slot) {
            let next = if minted { Slot::Empty } else { Slot::Pending(pending) };
            self.transition(next);
        }
    }
}

/// Shared handle to the pending slot.
#[derive(Debug, Clone, Default)]
pub struct RequestLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl RequestLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the write guard for an atomic transition.
    pub async fn write(&self) -> LedgerGuard<'_> {
        self.state.write().await
    }

    /// Acquire a read guard.
    pub async fn read(&self) -> RwLockReadGuard<'_, LedgerState> {
        self.state.read().await
    }

    /// Copy of the request held by the slot, in any phase.
    pub async fn snapshot(&self) -> Option<PendingRequest> {
        self.state.read().await.slot().request().cloned()
    }
}
