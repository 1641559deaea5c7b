//! Error taxonomy for the issuance lifecycle.
//!
//! Synchronous rejections (`Unauthorized`, `RequestInProgress`,
//! `NoPendingRequest`, `UnknownRequest`, `StaleCheckResult`) are returned
//! directly to the caller and never mutate state. Oracle-reported failures and
//! timeouts are not errors at this level: they are routed through the retry
//! policy and only become observable as events.

use crate::types::{Address, RequestId};
use thiserror::Error;

/// Result alias used throughout the issuer crates.
pub type Result<T> = std::result::Result<T, IssuerError>;

/// Errors returned by the issuance controller and its components.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IssuerError {
    /// Caller is not the configured owner
    #[error("Unauthorized caller: {caller}")]
    Unauthorized {
        /// The rejected caller
        caller: Address,
    },

    /// A request already occupies the single pending slot
    #[error("Request {request_id} is already in progress")]
    RequestInProgress {
        /// Id of the outstanding request
        request_id: RequestId,
    },

    /// The slot is reserved by an oracle send that has not returned yet
    #[error("An oracle send is in flight")]
    SendInProgress,

    /// The oracle returned an id after the slot it was sent for had changed
    #[error("Request {request_id} was sent for a slot that has since changed")]
    SendAbandoned {
        /// Id the network assigned to the orphaned send
        request_id: RequestId,
    },

    /// The verified result is being minted; the slot cannot change until it returns
    #[error("Mint in progress for request {request_id}")]
    MintInProgress {
        /// Id of the request being fulfilled
        request_id: RequestId,
    },

    /// The operation needs an outstanding request but the slot is empty
    #[error("No pending request")]
    NoPendingRequest,

    /// A callback arrived for an id that is not the current pending request
    #[error("Unknown request: {request_id}")]
    UnknownRequest {
        /// The id carried by the rejected callback
        request_id: RequestId,
    },

    /// Upkeep remediation was requested but the conditions no longer hold
    #[error("Upkeep check result is stale: {reason}")]
    StaleCheckResult {
        /// Which condition failed re-validation
        reason: String,
    },

    /// Manual timeout retry attempted before the request timed out
    #[error("Request has not timed out yet ({seconds_remaining}s remaining)")]
    RequestNotTimedOut {
        /// Seconds until the request becomes stale
        seconds_remaining: u64,
    },

    /// Upkeep payload could not be decoded
    #[error("Invalid upkeep payload: {0}")]
    InvalidPayload(String),

    /// Oracle result could not be decoded into a metadata URI
    #[error("Invalid oracle response: {0}")]
    InvalidResponse(String),

    /// The oracle network refused or failed to accept a request
    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    /// The token ledger rejected the mint side effect
    #[error("Mint failed: {0}")]
    Mint(#[from] TokenLedgerError),

    /// Configuration could not be loaded or is inconsistent
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl IssuerError {
    /// Whether this error is an expected race between concurrent actors
    /// (keeper vs. callback vs. owner) rather than an operational fault.
    #[must_use]
    pub const fn is_benign_race(&self) -> bool {
        matches!(
            self,
            Self::StaleCheckResult { .. }
                | Self::NoPendingRequest
                | Self::UnknownRequest { .. }
                | Self::SendAbandoned { .. }
        )
    }
}

/// Errors from the oracle network collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// The network refused the request (bad subscription, budget too large, ...)
    #[error("Request rejected by oracle network: {0}")]
    Rejected(String),

    /// The network could not be reached
    #[error("Oracle network unavailable: {0}")]
    Unavailable(String),

    /// The request payload could not be encoded or decoded
    #[error("Oracle payload encoding failed: {0}")]
    Encoding(String),
}

/// Errors from the token ledger collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenLedgerError {
    /// The caller has not been registered through `set_issuer`
    #[error("{0} is not the authorized issuer")]
    IssuerNotAuthorized(Address),

    /// The ledger refused the mint
    #[error("Mint rejected: {0}")]
    Rejected(String),

    /// The ledger could not be reached
    #[error("Token ledger unavailable: {0}")]
    Unavailable(String),
}

/// Errors parsing hex-encoded identifiers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseIdError {
    /// Wrong number of hex digits
    #[error("expected {expected} hex digits, got {actual}")]
    Length {
        /// Expected digit count
        expected: usize,
        /// Actual digit count
        actual: usize,
    },

    /// Input was not valid hex
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn benign_races_are_classified() {
        assert!(IssuerError::NoPendingRequest.is_benign_race());
        assert!(
            IssuerError::StaleCheckResult {
                reason: "cancelled".to_string()
            }
            .is_benign_race()
        );
        assert!(
            IssuerError::UnknownRequest {
                request_id: RequestId::from_u64(1)
            }
            .is_benign_race()
        );
        assert!(
            !IssuerError::Unauthorized {
                caller: Address::ZERO
            }
            .is_benign_race()
        );
        assert!(
            IssuerError::SendAbandoned {
                request_id: RequestId::from_u64(2)
            }
            .is_benign_race()
        );
        assert!(!IssuerError::SendInProgress.is_benign_race());
        assert!(!IssuerError::Mint(TokenLedgerError::Rejected("paused".into())).is_benign_race());
    }

    #[test]
    fn collaborator_errors_convert() {
        let err: IssuerError = OracleError::Unavailable("timeout".into()).into();
        assert_eq!(err.to_string(), "Oracle error: Oracle network unavailable: timeout");

        let err: IssuerError = TokenLedgerError::IssuerNotAuthorized(Address::ZERO).into();
        assert!(err.to_string().starts_with("Mint failed: 0x0000"));
    }
}
