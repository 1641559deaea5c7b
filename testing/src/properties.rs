//! proptest strategies for domain types and operation sequences.

use proptest::prelude::*;
use rwa_issuer_core::{Address, DonId, ExecutionParams, IssueOrder};

/// Any 20-byte address.
pub fn arb_address() -> impl Strategy<Value = Address> {
    any::<[u8; 20]>().prop_map(Address::new)
}

/// An issue order with a non-zero amount.
pub fn arb_order() -> impl Strategy<Value = IssueOrder> {
    (arb_address(), 1..=1_000_000_000u128)
        .prop_map(|(recipient, amount)| IssueOrder::new(recipient, amount))
}

/// Execution parameters in realistic ranges.
pub fn arb_params() -> impl Strategy<Value = ExecutionParams> {
    (1..=10_000u64, 100_000..=500_000u32, any::<[u8; 32]>())
        .prop_map(|(subscription_id, gas_limit, don)| {
            ExecutionParams::new(subscription_id, gas_limit, DonId::new(don))
        })
}

/// One step an external actor can take against the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Owner issues a new order with the given execution parameters
    Issue(IssueOrder, ExecutionParams),
    /// Owner cancels whatever is pending
    Cancel,
    /// Oracle answers the current request successfully
    CallbackSuccess,
    /// Oracle answers the current request with an error
    CallbackFailure,
    /// A callback for an id that was never current
    CallbackUnknown,
    /// Time passes
    Advance(u64),
    /// Keeper polls and remediates if ready
    Upkeep,
    /// Owner forces the timeout path
    ManualRetry,
}

/// Any single operation, weighted towards the interesting transitions.
pub fn arb_operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        3 => (arb_order(), arb_params())
            .prop_map(|(order, params)| Operation::Issue(order, params)),
        1 => Just(Operation::Cancel),
        2 => Just(Operation::CallbackSuccess),
        3 => Just(Operation::CallbackFailure),
        1 => Just(Operation::CallbackUnknown),
        3 => (0..=600u64).prop_map(Operation::Advance),
        2 => Just(Operation::Upkeep),
        1 => Just(Operation::ManualRetry),
    ]
}

/// A sequence of up to `max_len` operations.
pub fn arb_operations(max_len: usize) -> impl Strategy<Value = Vec<Operation>> {
    prop::collection::vec(arb_operation(), 1..=max_len)
}
