//! Issuer configuration.
//!
//! Values are fixed once a controller is built from them; there is no
//! runtime update path.
//!
//! # Environment Variables
//!
//! - `ISSUER_OWNER`: hex address allowed to call owner-only operations (required)
//! - `ISSUER_IDENTITY`: hex address the token ledger recognises as issuer (required)
//! - `ISSUER_MAX_RETRIES`: retry ceiling (default: 3)
//! - `ISSUER_REQUEST_TIMEOUT_SECS`: staleness threshold (default: 300)
//! - `ISSUER_COMPUTATION_SOURCE`: source executed by the oracle network
//! - `ISSUER_CALL_TIMEOUT_SECS`: bound on a single oracle submit or mint (default: 30)
//! - `KEEPER_POLL_INTERVAL_SECS`: upkeep poll period (default: 30)

use crate::error::{IssuerError, Result};
use crate::types::{Address, ComputationSpec};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default retry ceiling.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default staleness threshold (five minutes).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Default bound on a single call to the oracle network or token ledger.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default keeper poll period.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Configuration for the issuance controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuerConfig {
    /// Only identity allowed to issue, cancel and force a timeout retry
    pub owner: Address,
    /// Identity presented to the token ledger when minting
    pub issuer_identity: Address,
    /// Maximum number of automatic retries per request
    pub max_retries: u32,
    /// Elapsed time after which a request is considered stale
    pub request_timeout: Duration,
    /// Longest a single oracle submit or mint may take before it counts as failed
    pub call_timeout: Duration,
    /// Computation executed by the oracle network
    pub computation: ComputationSpec,
}

impl IssuerConfig {
    /// Configuration with the given owner and issuer identity and default limits.
    #[must_use]
    pub fn new(owner: Address, issuer_identity: Address) -> Self {
        Self {
            owner,
            issuer_identity,
            max_retries: DEFAULT_MAX_RETRIES,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            computation: ComputationSpec::default(),
        }
    }

    /// Set the retry ceiling.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the staleness threshold.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the bound on a single oracle submit or mint.
    #[must_use]
    pub const fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set the computation executed by the oracle network.
    #[must_use]
    pub fn with_computation(mut self, computation: ComputationSpec) -> Self {
        self.computation = computation;
        self
    }

    /// Staleness threshold in whole seconds.
    #[must_use]
    pub const fn timeout_secs(&self) -> u64 {
        self.request_timeout.as_secs()
    }

    /// Load configuration from environment variables.
    ///
    /// `ISSUER_OWNER` and `ISSUER_IDENTITY` are required; every other unset
    /// variable falls back to its default.
    ///
    /// # Errors
    ///
    /// Returns [`IssuerError::InvalidConfig`] if a variable is malformed or
    /// the resulting configuration fails [`IssuerConfig::validate`].
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`IssuerConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::new(
            required_var(&lookup, "ISSUER_OWNER")?,
            required_var(&lookup, "ISSUER_IDENTITY")?,
        );

        if let Some(max_retries) = parse_var(&lookup, "ISSUER_MAX_RETRIES")? {
            config.max_retries = max_retries;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "ISSUER_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "ISSUER_CALL_TIMEOUT_SECS")? {
            config.call_timeout = Duration::from_secs(secs);
        }
        if let Some(source) = lookup("ISSUER_COMPUTATION_SOURCE") {
            config.computation = ComputationSpec::new(source);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values that would make the lifecycle unusable.
    ///
    /// # Errors
    ///
    /// Returns [`IssuerError::InvalidConfig`] for a zero owner or issuer
    /// identity, a zero request or call timeout, or an empty computation source.
    pub fn validate(&self) -> Result<()> {
        if self.owner == Address::ZERO {
            return Err(IssuerError::InvalidConfig(
                "owner must not be the zero address".to_string(),
            ));
        }
        if self.issuer_identity == Address::ZERO {
            return Err(IssuerError::InvalidConfig(
                "issuer identity must not be the zero address".to_string(),
            ));
        }
        if self.request_timeout.as_secs() == 0 {
            return Err(IssuerError::InvalidConfig(
                "request timeout must be at least one second".to_string(),
            ));
        }
        if self.call_timeout.is_zero() {
            return Err(IssuerError::InvalidConfig(
                "call timeout must not be zero".to_string(),
            ));
        }
        if self.computation.source.trim().is_empty() {
            return Err(IssuerError::InvalidConfig(
                "computation source must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the upkeep keeper driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeeperConfig {
    /// How often `check_ready` is polled
    pub poll_interval: Duration,
}

impl KeeperConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`IssuerError::InvalidConfig`] if `KEEPER_POLL_INTERVAL_SECS`
    /// is malformed or zero.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`KeeperConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let poll_interval = parse_var::<u64>(&lookup, "KEEPER_POLL_INTERVAL_SECS")?
            .map_or(DEFAULT_POLL_INTERVAL, Duration::from_secs);
        if poll_interval.is_zero() {
            return Err(IssuerError::InvalidConfig(
                "keeper poll interval must be at least one second".to_string(),
            ));
        }
        Ok(Self { poll_interval })
    }
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

fn required_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse_var(lookup, key)?.ok_or_else(|| IssuerError::InvalidConfig(format!("{key} is required")))
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| IssuerError::InvalidConfig(format!("{key}: {e}")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code

    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const OWNER_HEX: &str = "0x1111111111111111111111111111111111111111";
    const IDENTITY_HEX: &str = "0x2222222222222222222222222222222222222222";

    fn identities() -> Vec<(&'static str, &'static str)> {
        vec![("ISSUER_OWNER", OWNER_HEX), ("ISSUER_IDENTITY", IDENTITY_HEX)]
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = IssuerConfig::from_lookup(lookup(&identities())).unwrap();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.timeout_secs(), 300);
        assert_eq!(config.call_timeout, DEFAULT_CALL_TIMEOUT);
        assert_eq!(config.owner, Address::repeat_byte(0x11));
        assert_eq!(config.computation, ComputationSpec::default());
    }

    #[test]
    fn owner_and_identity_are_required() {
        let err = IssuerConfig::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err, IssuerError::InvalidConfig("ISSUER_OWNER is required".to_string()));

        let err = IssuerConfig::from_lookup(lookup(&[("ISSUER_OWNER", OWNER_HEX)])).unwrap_err();
        assert_eq!(err, IssuerError::InvalidConfig("ISSUER_IDENTITY is required".to_string()));

        let zero = Address::ZERO.to_string();
        let err = IssuerConfig::from_lookup(lookup(&[
            ("ISSUER_OWNER", zero.as_str()),
            ("ISSUER_IDENTITY", IDENTITY_HEX),
        ]))
        .unwrap_err();
        assert!(matches!(err, IssuerError::InvalidConfig(msg) if msg.contains("owner")));
    }

    #[test]
    fn overrides_are_parsed() {
        let owner = Address::repeat_byte(0x11);
        let identity = Address::repeat_byte(0x22);
        let (owner_hex, identity_hex) = (owner.to_string(), identity.to_string());
        let config = IssuerConfig::from_lookup(lookup(&[
            ("ISSUER_OWNER", owner_hex.as_str()),
            ("ISSUER_IDENTITY", identity_hex.as_str()),
            ("ISSUER_MAX_RETRIES", "5"),
            ("ISSUER_REQUEST_TIMEOUT_SECS", " 60 "),
            ("ISSUER_CALL_TIMEOUT_SECS", "5"),
            ("ISSUER_COMPUTATION_SOURCE", "return Functions.encodeString('x');"),
        ]))
        .unwrap();

        assert_eq!(config.owner, owner);
        assert_eq!(config.issuer_identity, identity);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.call_timeout, Duration::from_secs(5));
        assert!(config.computation.source.starts_with("return"));
    }

    #[test]
    fn malformed_values_are_rejected() {
        let mut vars = identities();
        vars.push(("ISSUER_MAX_RETRIES", "many"));
        let err = IssuerConfig::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(
            err,
            IssuerError::InvalidConfig(msg) if msg.starts_with("ISSUER_MAX_RETRIES")
        ));

        let err = IssuerConfig::from_lookup(lookup(&[
            ("ISSUER_OWNER", "0x12"),
            ("ISSUER_IDENTITY", IDENTITY_HEX),
        ]))
        .unwrap_err();
        assert!(matches!(err, IssuerError::InvalidConfig(_)));
    }

    #[test]
    fn validate_rejects_unusable_limits() {
        let base = || IssuerConfig::new(Address::repeat_byte(0x11), Address::repeat_byte(0x22));
        assert!(base().validate().is_ok());

        assert!(base().with_request_timeout(Duration::ZERO).validate().is_err());
        assert!(base().with_call_timeout(Duration::ZERO).validate().is_err());
        assert!(base().with_computation(ComputationSpec::new("   ")).validate().is_err());
        assert!(IssuerConfig::new(Address::ZERO, Address::repeat_byte(0x22)).validate().is_err());
        assert!(IssuerConfig::new(Address::repeat_byte(0x11), Address::ZERO).validate().is_err());

        // Zero retries is a legitimate "never retry" policy
        assert!(base().with_max_retries(0).validate().is_ok());
    }

    #[test]
    fn keeper_poll_interval() {
        assert_eq!(
            KeeperConfig::from_lookup(lookup(&[])).unwrap(),
            KeeperConfig::default()
        );
        assert_eq!(
            KeeperConfig::from_lookup(lookup(&[("KEEPER_POLL_INTERVAL_SECS", "5")]))
                .unwrap()
                .poll_interval,
            Duration::from_secs(5)
        );
        assert!(KeeperConfig::from_lookup(lookup(&[("KEEPER_POLL_INTERVAL_SECS", "0")])).is_err());
    }
}
