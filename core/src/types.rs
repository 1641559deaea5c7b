//! Core types for the issuance request lifecycle.

use crate::error::ParseIdError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Identifier of the token class minted on a successful fulfillment.
pub type TokenId = u64;

fn write_hex(f: &mut std::fmt::Formatter<'_>, bytes: &[u8]) -> std::fmt::Result {
    write!(f, "0x{}", hex::encode(bytes))
}

fn parse_hex<const N: usize>(input: &str) -> Result<[u8; N], ParseIdError> {
    let digits = input.strip_prefix("0x").unwrap_or(input);
    if digits.len() != N * 2 {
        return Err(ParseIdError::Length {
            expected: N * 2,
            actual: digits.len(),
        });
    }

    let mut out = [0u8; N];
    hex::decode_to_slice(digits, &mut out)?;
    Ok(out)
}

/// A 20-byte account identity (recipient, owner, issuer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address([u8; 20]);

impl Address {
    /// The all-zero address.
    pub const ZERO: Self = Self([0u8; 20]);

    /// Create an address from raw bytes.
    #[must_use]
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Create an address with every byte set to `byte`. Handy for fixtures.
    #[must_use]
    pub const fn repeat_byte(byte: u8) -> Self {
        Self([byte; 20])
    }

    /// Raw bytes of the address.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write_hex(f, &self.0)
    }
}

impl FromStr for Address {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex::<20>(s).map(Self)
    }
}

/// Opaque request identifier assigned by the oracle network at send time.
///
/// Every send (initial or retry) gets a fresh id. Callbacks are correlated
/// against the id currently held in the pending slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId([u8; 32]);

impl RequestId {
    /// Create a request id from raw bytes.
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Create a request id whose low 8 bytes hold `value` (big-endian).
    ///
    /// Sequential mock networks use this to hand out predictable ids.
    #[must_use]
    pub fn from_u64(value: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&value.to_be_bytes());
        Self(bytes)
    }

    /// Raw bytes of the id.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write_hex(f, &self.0)
    }
}

impl FromStr for RequestId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex::<32>(s).map(Self)
    }
}

/// Routing identifier of the oracle node set (DON) that should execute the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DonId([u8; 32]);

impl DonId {
    /// The all-zero routing id.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create a routing id from raw bytes.
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Encode a human-readable label (e.g. `fun-avalanche-fuji-1`), right-padded
    /// with zeros. Labels longer than 32 bytes are truncated.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        let mut bytes = [0u8; 32];
        let raw = label.as_bytes();
        let len = raw.len().min(32);
        bytes[..len].copy_from_slice(&raw[..len]);
        Self(bytes)
    }

    /// Raw bytes of the routing id.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for DonId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write_hex(f, &self.0)
    }
}

/// What to mint, and for whom, once the oracle confirms the property data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueOrder {
    /// Identity that receives the minted shares
    pub recipient: Address,
    /// Number of shares to mint
    pub amount: u128,
}

impl IssueOrder {
    /// Create a new issue order.
    #[must_use]
    pub const fn new(recipient: Address, amount: u128) -> Self {
        Self { recipient, amount }
    }
}

/// Per-request execution parameters forwarded to the oracle network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionParams {
    /// Billing subscription the request is charged to
    pub subscription_id: u64,
    /// Compute budget for the callback
    pub gas_limit: u32,
    /// Routing identifier of the executing node set
    pub don_id: DonId,
}

impl ExecutionParams {
    /// Create execution parameters.
    #[must_use]
    pub const fn new(subscription_id: u64, gas_limit: u32, don_id: DonId) -> Self {
        Self {
            subscription_id,
            gas_limit,
            don_id,
        }
    }
}

impl Default for ExecutionParams {
    fn default() -> Self {
        Self::new(1, 300_000, DonId::ZERO)
    }
}

/// Inline source executed by the oracle network to fetch and pin property metadata.
const DEFAULT_METADATA_SOURCE: &str = r#"const { ethers } = await import('npm:ethers@6.10.0');
const Hash = await import('npm:ipfs-only-hash@4.0.0');

const apiResponse = await Functions.makeHttpRequest({
  url: `https://api.bridgedataoutput.com/api/v2/OData/test/Property('P_5dba1fb94aa4055b9f29696f')`,
  params: { access_token: secrets.bridgeApiKey },
});

const realEstateAddress = apiResponse.data.UnparsedAddress;
const yearBuilt = Number(apiResponse.data.YearBuilt);
const lotSizeSquareFeet = Number(apiResponse.data.LotSizeSquareFeet);
const livingArea = Number(apiResponse.data.LivingArea);
const bedroomsTotal = Number(apiResponse.data.BedroomsTotal);

const metadata = {
  name: "Real Estate Token",
  attributes: [
    { trait_type: "realEstateAddress", value: realEstateAddress },
    { trait_type: "yearBuilt", value: yearBuilt },
    { trait_type: "lotSizeSquareFeet", value: lotSizeSquareFeet },
    { trait_type: "livingArea", value: livingArea },
    { trait_type: "bedroomsTotal", value: bedroomsTotal },
  ],
};

const metadataString = JSON.stringify(metadata);
const ipfsCid = await Hash.of(metadataString);

return Functions.encodeString(`ipfs://${ipfsCid}`);
"#;

/// The computation the oracle network executes for every issuance request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputationSpec {
    /// Source code run by the oracle network
    pub source: String,
}

impl ComputationSpec {
    /// Create a computation spec from source code.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

impl Default for ComputationSpec {
    fn default() -> Self {
        Self::new(DEFAULT_METADATA_SOURCE)
    }
}

/// The single outstanding request, if any.
///
/// At most one of these exists at any time. It is created when `issue`
/// claims the empty slot, mutated on every retry, and destroyed on
/// fulfillment, cancellation or terminal failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRequest {
    /// Id of the most recent send
    pub request_id: RequestId,
    /// Recipient and amount to mint on success
    pub order: IssueOrder,
    /// Parameters reused verbatim on every retry
    pub params: ExecutionParams,
    /// Number of retries performed so far (starts at 0)
    pub retry_count: u32,
    /// Time of the most recent send, reset on every retry
    pub issued_at: DateTime<Utc>,
}

impl PendingRequest {
    /// Create a freshly sent request with `retry_count = 0`.
    #[must_use]
    pub const fn new(
        request_id: RequestId,
        order: IssueOrder,
        params: ExecutionParams,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            request_id,
            order,
            params,
            retry_count: 0,
            issued_at,
        }
    }

    /// Seconds elapsed since the most recent send (zero if the clock went backwards).
    #[must_use]
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> u64 {
        u64::try_from(now.signed_duration_since(self.issued_at).num_seconds()).unwrap_or(0)
    }

    /// A request is stale once strictly more than `timeout_secs` have passed.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, timeout_secs: u64) -> bool {
        self.elapsed_secs(now) > timeout_secs
    }

    /// Seconds left before the request becomes eligible for a timeout retry.
    #[must_use]
    pub fn seconds_remaining(&self, now: DateTime<Utc>, timeout_secs: u64) -> u64 {
        timeout_secs.saturating_sub(self.elapsed_secs(now))
    }

    /// Whether another automatic retry is allowed under `max_retries`.
    #[must_use]
    pub const fn can_retry(&self, max_retries: u32) -> bool {
        self.retry_count < max_retries
    }
}

/// Read-only snapshot of the pending slot, as returned by `get_request_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestStatus {
    /// Whether a request is outstanding
    pub has_pending: bool,
    /// Id of the outstanding request
    pub request_id: Option<RequestId>,
    /// Retries performed for the outstanding request
    pub retry_count: u32,
    /// Unix seconds of the most recent send
    pub issued_at: Option<i64>,
    /// Whether the outstanding request is past its timeout
    pub is_timed_out: bool,
    /// Seconds until the outstanding request times out (0 when idle or timed out)
    pub seconds_remaining: u64,
    /// Whether an oracle send or a mint for the slot has not returned yet
    pub in_flight: bool,
}

impl RequestStatus {
    /// Status reported when the slot is empty.
    #[must_use]
    pub const fn idle() -> Self {
        Self {
            has_pending: false,
            request_id: None,
            retry_count: 0,
            issued_at: None,
            is_timed_out: false,
            seconds_remaining: 0,
            in_flight: false,
        }
    }

    /// Status of an outstanding request at time `now`.
    #[must_use]
    pub fn of(pending: &PendingRequest, now: DateTime<Utc>, timeout_secs: u64) -> Self {
        Self {
            has_pending: true,
            request_id: Some(pending.request_id),
            retry_count: pending.retry_count,
            issued_at: Some(pending.issued_at.timestamp()),
            is_timed_out: pending.is_stale(now, timeout_secs),
            seconds_remaining: pending.seconds_remaining(now, timeout_secs),
            in_flight: false,
        }
    }
}

impl Default for RequestStatus {
    fn default() -> Self {
        Self::idle()
    }
}

/// Result of an upkeep readiness check.
///
/// `payload` carries the encoded id of the request that was found stale, so
/// the follow-up remediation call acts on exactly that request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpkeepCheck {
    /// Whether remediation should be performed
    pub ready: bool,
    /// Opaque data to hand back to `perform_remediation`
    pub payload: Vec<u8>,
}

impl UpkeepCheck {
    /// A check result that requires no action.
    #[must_use]
    pub const fn idle() -> Self {
        Self {
            ready: false,
            payload: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code

    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn pending() -> PendingRequest {
        PendingRequest::new(
            RequestId::from_u64(7),
            IssueOrder::new(Address::repeat_byte(0xab), 1_000),
            ExecutionParams::default(),
            t0(),
        )
    }

    #[test]
    fn address_display_and_parse_agree() {
        let addr = Address::repeat_byte(0xab);
        let text = addr.to_string();
        assert_eq!(text.len(), 42);
        assert!(text.starts_with("0xabab"));
        assert_eq!(text.parse::<Address>().unwrap(), addr);
    }

    #[test]
    fn address_parse_rejects_bad_input() {
        assert!(matches!(
            "0x1234".parse::<Address>(),
            Err(ParseIdError::Length { expected: 40, actual: 4 })
        ));
        let bad = format!("0x{}", "zz".repeat(20));
        assert!(matches!(bad.parse::<Address>(), Err(ParseIdError::Hex(_))));
        // Mixed case and a missing prefix are both accepted
        let upper = "AB".repeat(20);
        assert_eq!(upper.parse::<Address>().unwrap(), Address::repeat_byte(0xab));
    }

    #[test]
    fn request_id_from_u64_is_big_endian_suffix() {
        let id = RequestId::from_u64(0x0102);
        assert_eq!(id.as_bytes()[30], 0x01);
        assert_eq!(id.as_bytes()[31], 0x02);
        assert!(id.as_bytes()[..24].iter().all(|b| *b == 0));
        assert_ne!(RequestId::from_u64(1), RequestId::from_u64(2));
    }

    #[test]
    fn don_id_label_is_right_padded() {
        let don = DonId::from_label("fun-avalanche-fuji-1");
        assert_eq!(&don.as_bytes()[..20], b"fun-avalanche-fuji-1");
        assert!(don.as_bytes()[20..].iter().all(|b| *b == 0));
        assert_eq!(
            don.to_string(),
            "0x66756e2d6176616c616e6368652d66756a692d31000000000000000000000000"
        );
    }

    #[test]
    fn staleness_is_strict() {
        let request = pending();
        assert!(!request.is_stale(t0() + Duration::seconds(300), 300));
        assert!(request.is_stale(t0() + Duration::seconds(301), 300));
    }

    #[test]
    fn seconds_remaining_saturates() {
        let request = pending();
        assert_eq!(request.seconds_remaining(t0() + Duration::seconds(120), 300), 180);
        assert_eq!(request.seconds_remaining(t0() + Duration::seconds(900), 300), 0);
        // A clock that runs backwards never reports more than the full timeout
        assert_eq!(request.seconds_remaining(t0() - Duration::seconds(60), 300), 300);
    }

    #[test]
    fn retry_ceiling() {
        let mut request = pending();
        assert!(request.can_retry(3));
        request.retry_count = 3;
        assert!(!request.can_retry(3));
        assert!(!request.can_retry(0));
    }

    #[test]
    fn status_reflects_pending_request() {
        let request = pending();
        let status = RequestStatus::of(&request, t0() + Duration::seconds(60), 300);
        assert!(status.has_pending);
        assert_eq!(status.request_id, Some(request.request_id));
        assert_eq!(status.issued_at, Some(t0().timestamp()));
        assert!(!status.is_timed_out);
        assert_eq!(status.seconds_remaining, 240);

        assert_eq!(RequestStatus::default(), RequestStatus::idle());
        assert!(!RequestStatus::idle().has_pending);
    }

    #[test]
    fn request_id_display_and_parse_agree() {
        let id = RequestId::from_u64(0xdead_beef);
        let text = id.to_string();
        assert_eq!(text.len(), 66);
        assert!(text.ends_with("deadbeef"));
        assert_eq!(text.parse::<RequestId>().unwrap(), id);
    }

    proptest! {
        #[test]
        fn remaining_time_and_staleness_agree(offset in -1_000i64..2_000, timeout in 1u64..1_000) {
            let request = pending();
            let now = t0() + Duration::seconds(offset);
            if request.is_stale(now, timeout) {
                prop_assert_eq!(request.seconds_remaining(now, timeout), 0);
            } else {
                prop_assert_eq!(
                    request.seconds_remaining(now, timeout) + request.elapsed_secs(now),
                    timeout
                );
            }
        }
    }
}
