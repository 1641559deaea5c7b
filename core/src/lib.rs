//! # RWA Issuer Core
//!
//! Domain types, error taxonomy and dependency-injection traits for issuing
//! tokenized real-estate shares after an external oracle has verified the
//! off-chain property data.
//!
//! This crate holds no behaviour that touches the outside world. The request
//! lifecycle itself (single pending slot, retry policy, upkeep monitor and the
//! controller surface) lives in `rwa-issuer-runtime`; everything it needs from
//! the outside is abstracted here behind traits and injected:
//!
//! - **Clock**: current time, so staleness checks are deterministic in tests
//! - **`OracleNetwork`**: submits an encoded computation request, returns the
//!   network-assigned request id
//! - **`TokenLedger`**: the mint side effect performed on successful fulfillment
//! - **`EventPublisher`**: fire-and-forget observability events
//!
//! ## Request lifecycle
//!
//! ```text
//! EMPTY --issue()--> SENT
//! SENT --callback success--> EMPTY (+ mint)
//! SENT --callback failure / timeout, retries remain--> SENT (retry_count + 1, new id)
//! SENT --callback failure / timeout, retries exhausted--> EMPTY (terminal failure)
//! SENT --explicit cancel--> EMPTY
//! ```
//!
//! ## Example
//!
//! ```
//! use rwa_issuer_core::{Address, IssueOrder, PendingRequest, RequestId};
//! use rwa_issuer_core::ExecutionParams;
//! use chrono::{TimeZone, Utc};
//!
//! let issued_at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
//! let pending = PendingRequest::new(
//!     RequestId::from_u64(1),
//!     IssueOrder::new(Address::repeat_byte(0x11), 1_000),
//!     ExecutionParams::default(),
//!     issued_at,
//! );
//!
//! assert_eq!(pending.retry_count, 0);
//! assert!(!pending.is_stale(issued_at, 300));
//! ```

pub mod config;
pub mod environment;
pub mod error;
pub mod events;
pub mod oracle;
pub mod types;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use config::{IssuerConfig, KeeperConfig};
pub use environment::{BoxFuture, Clock, OracleNetwork, SystemClock, TokenLedger};
pub use error::{IssuerError, OracleError, ParseIdError, Result, TokenLedgerError};
pub use events::{EventPublisher, IssuerEvent, NoopEventPublisher};
pub use oracle::{MintRequest, OracleRequest, OracleResponse, OracleSubmission};
pub use types::{
    Address, ComputationSpec, DonId, ExecutionParams, IssueOrder, PendingRequest, RequestId,
    RequestStatus, TokenId, UpkeepCheck,
};
