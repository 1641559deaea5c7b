//! Wire types exchanged with the oracle network and the token ledger.

use crate::error::OracleError;
use crate::types::{
    Address, ComputationSpec, DonId, ExecutionParams, IssueOrder, RequestId, TokenId,
};
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};

/// The computation request carried inside an [`OracleSubmission`] payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleRequest {
    /// Source code executed by the oracle network
    pub source: String,
    /// String arguments made available to the source (`args[0]`, `args[1]`, ...)
    pub args: SmallVec<[String; 2]>,
}

impl OracleRequest {
    /// Build the request for an issue order: `args = [recipient, amount]`.
    #[must_use]
    pub fn for_order(computation: &ComputationSpec, order: &IssueOrder) -> Self {
        Self {
            source: computation.source.clone(),
            args: smallvec![order.recipient.to_string(), order.amount.to_string()],
        }
    }

    /// Encode the request into the payload bytes submitted to the network.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::Encoding`] if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, OracleError> {
        bincode::serialize(self).map_err(|e| OracleError::Encoding(e.to_string()))
    }

    /// Decode a payload produced by [`OracleRequest::encode`].
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::Encoding`] if the bytes are not a valid request.
    pub fn decode(payload: &[u8]) -> Result<Self, OracleError> {
        bincode::deserialize(payload).map_err(|e| OracleError::Encoding(e.to_string()))
    }
}

/// Everything the oracle network needs to schedule a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleSubmission {
    /// Encoded [`OracleRequest`]
    pub payload: Vec<u8>,
    /// Billing subscription
    pub subscription_id: u64,
    /// Compute budget for the callback
    pub gas_limit: u32,
    /// Routing identifier of the executing node set
    pub don_id: DonId,
}

impl OracleSubmission {
    /// Combine an encoded payload with execution parameters.
    #[must_use]
    pub const fn new(payload: Vec<u8>, params: &ExecutionParams) -> Self {
        Self {
            payload,
            subscription_id: params.subscription_id,
            gas_limit: params.gas_limit,
            don_id: params.don_id,
        }
    }
}

/// An asynchronous callback delivered by the oracle network.
///
/// An empty `error` signals success; `result` then holds the UTF-8 metadata URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleResponse {
    /// Id of the request being answered
    pub request_id: RequestId,
    /// Raw result bytes
    pub result: Vec<u8>,
    /// Raw error bytes (empty on success)
    pub error: Vec<u8>,
}

impl OracleResponse {
    /// A successful response carrying `result`.
    #[must_use]
    pub fn success(request_id: RequestId, result: impl Into<Vec<u8>>) -> Self {
        Self {
            request_id,
            result: result.into(),
            error: Vec::new(),
        }
    }

    /// A failed response carrying `error`.
    #[must_use]
    pub fn failure(request_id: RequestId, error: impl Into<Vec<u8>>) -> Self {
        Self {
            request_id,
            result: Vec::new(),
            error: error.into(),
        }
    }

    /// Whether the oracle reported an error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}

/// Mint side effect requested from the token ledger on fulfillment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintRequest {
    /// Identity performing the mint (must be the ledger's registered issuer)
    pub issuer: Address,
    /// Recipient of the shares
    pub to: Address,
    /// Token id being minted
    pub token_id: TokenId,
    /// Number of shares
    pub amount: u128,
    /// Metadata URI returned by the oracle
    pub token_uri: String,
}
