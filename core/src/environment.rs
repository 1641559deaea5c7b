//! Dependency-injection traits for everything outside the issuer.
//!
//! The oracle network and the token ledger are external collaborators with
//! fixed interfaces. Both traits return boxed futures rather than using
//! `async fn` so they stay dyn-compatible (`Arc<dyn OracleNetwork>`).

use crate::error::{OracleError, TokenLedgerError};
use crate::oracle::{MintRequest, OracleSubmission};
use crate::types::RequestId;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;

/// Boxed, sendable future returned by collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Clock trait - abstracts time operations for testability
///
/// # Examples
///
/// ```
/// use rwa_issuer_core::environment::{Clock, SystemClock};
///
/// let clock = SystemClock;
/// let before = clock.now();
/// assert!(clock.now() >= before);
/// ```
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// External compute oracle.
///
/// `submit` hands an encoded request to the network and returns the id the
/// network assigned to it. The result is delivered later, out of band, via
/// the controller's callback surface, or never.
pub trait OracleNetwork: Send + Sync {
    /// Submit a request to the network.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError`] if the network refuses or cannot accept the request.
    fn submit(&self, submission: OracleSubmission) -> BoxFuture<'_, Result<RequestId, OracleError>>;
}

/// Token ledger that records minted shares.
///
/// The ledger only accepts mints from the identity registered through its
/// own out-of-band `set_issuer` operation.
pub trait TokenLedger: Send + Sync {
    /// Mint `amount` of `token_id` to the recipient.
    ///
    /// # Errors
    ///
    /// Returns [`TokenLedgerError`] if the issuer is not authorized or the
    /// ledger rejects the mint. No shares are minted in that case.
    fn mint(&self, request: MintRequest) -> BoxFuture<'_, Result<(), TokenLedgerError>>;
}
