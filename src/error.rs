//! Error taxonomy for the coordinator core, per spec §7.

use thiserror::Error;

/// Protocol-level errors: malformed or unverifiable envelopes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("signature verification failed")]
    BadSig,
    #[error("public key is malformed: {0}")]
    MalformedKey(String),
    #[error("canonical encoding did not round-trip")]
    CanonMismatch,
    #[error("body failed schema validation: {0}")]
    SchemaInvalid(String),
    #[error("unknown envelope kind: {0}")]
    UnknownKind(String),
    #[error("envelope trade_id does not match trade")]
    WrongTradeId,
}

/// State-machine errors: legal but rejected transitions.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateError {
    #[error("envelope kind is not legal from the trade's current state")]
    IllegalTransition,
    #[error("bound field does not match the trade's recorded value: {0}")]
    MismatchedBinding(String),
    #[error("a TERMS envelope was already accepted for this trade")]
    DuplicateTerms,
    #[error("envelope is past its declared expiry")]
    StaleExpiry,
    #[error("envelope was already applied")]
    AlreadyApplied,
}

/// Pre-pay verification errors: the escrow does not (yet) satisfy the negotiated terms.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VerificationError {
    #[error("escrow account does not exist on-chain")]
    EscrowMissing,
    #[error("escrow account is not owned by the expected program")]
    EscrowWrongOwner,
    #[error("escrow amount, mint, recipient or refund does not match terms")]
    EscrowAmountMismatch,
    #[error("refund_after_unix is too close to now to pay safely")]
    EscrowTimeTooTight,
    #[error("invoice payment_hash does not match escrow payment_hash")]
    PayHashMismatch,
    #[error("vault holds less than the negotiated amount")]
    VaultUnderfunded,
}

/// Transport/IO errors, passed through from external collaborators.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("operation timed out")]
    Timeout,
    #[error("peer disconnected")]
    Disconnected,
    #[error("RPC call failed: {0}")]
    RpcFailure(String),
}

/// Top-level error type returned by every fallible public operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Verification(#[from] VerificationError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// A confirmed on-chain observation contradicts the persisted trade record.
    /// No automatic recovery is possible; the trade moves to `Inconsistent`.
    #[error("trade state is inconsistent with an observed on-chain fact: {0}")]
    Inconsistent(String),
}
