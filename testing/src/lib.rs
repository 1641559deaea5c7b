//! # RWA Issuer Testing
//!
//! Testing utilities for the issuance lifecycle.
//!
//! This crate provides:
//! - Mock implementations of the environment traits (clock, oracle network,
//!   token ledger, event publisher)
//! - [`TestHarness`]: a fully wired controller over those mocks
//! - Property-based testing strategies
//! - Tracing initialisation for tests
//!
//! ## Example
//!
//! ```
//! use rwa_issuer_testing::TestHarness;
//! use rwa_issuer_core::{Address, OracleResponse};
//!
//! # tokio_test::block_on(async {
//! let harness = TestHarness::new();
//! let request_id = harness.issue(Address::repeat_byte(0x01), 1_000).await.unwrap();
//!
//! harness
//!     .controller
//!     .on_callback(OracleResponse::success(request_id, b"ipfs://QmTest".to_vec()))
//!     .await
//!     .unwrap();
//!
//! assert_eq!(harness.tokens.balance_of(Address::repeat_byte(0x01), 0), 1_000);
//! # });
//! ```

use chrono::{DateTime, Utc};
use rwa_issuer_core::environment::Clock;

mod collaborators;
mod harness;

/// Property-based testing strategies.
pub mod properties;

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, RwLock};

    pub use crate::collaborators::{InMemoryTokenLedger, MockOracleNetwork, RecordingEventPublisher};

    /// Manually driven clock for deterministic tests
    ///
    /// Time only moves when the test calls [`FixedClock::advance`] or
    /// [`FixedClock::set`]. Clones share the same time.
    ///
    /// # Example
    ///
    /// ```
    /// use rwa_issuer_testing::mocks::FixedClock;
    /// use rwa_issuer_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let start = clock.now();
    /// assert_eq!(clock.now(), start);
    ///
    /// clock.advance(Duration::seconds(301));
    /// assert_eq!(clock.now() - start, Duration::seconds(301));
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
            }
        }

        /// Move the clock forward by `by`
        #[allow(clippy::unwrap_used)] // Poisoned lock means a test already panicked
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.write().unwrap();
            *time += by;
        }

        /// Jump to `time`
        #[allow(clippy::unwrap_used)] // Poisoned lock means a test already panicked
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.write().unwrap() = time;
        }
    }

    impl Clock for FixedClock {
        #[allow(clippy::unwrap_used)] // Poisoned lock means a test already panicked
        fn now(&self) -> DateTime<Utc> {
            *self.time.read().unwrap()
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Install a `tracing` fmt subscriber for tests.
///
/// Honours `RUST_LOG` (default `warn`) and writes through the test writer so
/// output is captured per test. Safe to call from every test.
pub fn init_test_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use harness::{TestHarness, TestHarnessBuilder};
pub use mocks::{
    FixedClock, InMemoryTokenLedger, MockOracleNetwork, RecordingEventPublisher, test_clock,
};
