//! Error types for the delegation engine.
//!
//! Every failure an enforcer or the redemption engine can produce maps to a
//! canonical numeric code with a stable kebab-case name. Callers embedding
//! the engine in a service surface the name as the visible failure reason;
//! the structured [`Error`] variants carry enough context to act on.

use crate::delegation::{Address, DelegationHash};
use crate::execution::{CallType, ExecType};
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Canonical error codes.
///
/// Code ranges:
/// - 1000-1099: Terms / args shape errors
/// - 1100-1199: Authority errors (chain and signature)
/// - 1200-1299: Policy violations
/// - 1300-1399: State conflicts
/// - 1400-1499: Arithmetic errors
/// - 1500-1599: Execution mode errors
/// - 1600-1699: Encoding and size errors
/// - 1700-1799: Execution sink errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Terms / args shape errors (1000-1099)
    InvalidTermsLength = 1000,
    InvalidArgsLength = 1001,
    InvalidGroupIndex = 1002,
    InvalidCaveatArgsLength = 1003,
    UnknownEnforcer = 1004,
    InvalidTerms = 1005,
    MissingField = 1006,

    // Authority errors (1100-1199)
    SignatureInvalid = 1100,
    ChainBroken = 1101,
    InvalidDelegate = 1102,
    CycleDetected = 1103,
    DepthExceeded = 1104,

    // Policy violations (1200-1299)
    AllowanceExceeded = 1200,
    LimitExceeded = 1201,
    InsufficientBalanceChange = 1202,
    ExcessiveBalanceDecrease = 1203,
    EarlyRedemption = 1204,
    ExpiredDelegation = 1205,
    UnauthorizedTarget = 1206,
    UnauthorizedMethod = 1207,
    UnauthorizedRedeemer = 1208,
    InvalidExecution = 1209,
    ClaimNotStarted = 1210,
    ClaimAmountExceeded = 1211,
    ZeroExpectedChange = 1212,
    InvalidAsset = 1213,
    InvalidMethod = 1214,
    ExceedsOutputAmount = 1215,
    InvalidNonce = 1216,

    // State conflicts (1300-1399)
    EnforcerLocked = 1300,
    IdAlreadyUsed = 1301,

    // Arithmetic errors (1400-1499)
    ArithmeticOverflow = 1400,

    // Execution mode errors (1500-1599)
    InvalidCallType = 1500,
    InvalidExecType = 1501,

    // Encoding and size errors (1600-1699)
    MalformedExecution = 1600,
    InvalidBatchSize = 1601,
    SerializationError = 1602,
    DeserializationError = 1603,
    PayloadTooLarge = 1604,

    // Execution sink errors (1700-1799)
    ExecutionFailed = 1700,
    InsufficientBalance = 1701,
}

impl ErrorCode {
    /// Get the numeric code value.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Get the machine-readable name (kebab-case).
    pub fn name(self) -> &'static str {
        match self {
            // Terms / args shape errors
            Self::InvalidTermsLength => "invalid-terms-length",
            Self::InvalidArgsLength => "invalid-args-length",
            Self::InvalidGroupIndex => "invalid-group-index",
            Self::InvalidCaveatArgsLength => "invalid-caveat-args-length",
            Self::UnknownEnforcer => "unknown-enforcer",
            Self::InvalidTerms => "invalid-terms",
            Self::MissingField => "missing-field",

            // Authority errors
            Self::SignatureInvalid => "signature-invalid",
            Self::ChainBroken => "chain-broken",
            Self::InvalidDelegate => "invalid-delegate",
            Self::CycleDetected => "cycle-detected",
            Self::DepthExceeded => "depth-exceeded",

            // Policy violations
            Self::AllowanceExceeded => "allowance-exceeded",
            Self::LimitExceeded => "limit-exceeded",
            Self::InsufficientBalanceChange => "insufficient-balance-change",
            Self::ExcessiveBalanceDecrease => "excessive-balance-decrease",
            Self::EarlyRedemption => "early-redemption",
            Self::ExpiredDelegation => "expired-delegation",
            Self::UnauthorizedTarget => "unauthorized-target",
            Self::UnauthorizedMethod => "unauthorized-method",
            Self::UnauthorizedRedeemer => "unauthorized-redeemer",
            Self::InvalidExecution => "invalid-execution",
            Self::ClaimNotStarted => "claim-not-started",
            Self::ClaimAmountExceeded => "claim-amount-exceeded",
            Self::ZeroExpectedChange => "zero-expected-change",
            Self::InvalidAsset => "invalid-asset",
            Self::InvalidMethod => "invalid-method",
            Self::ExceedsOutputAmount => "exceeds-output-amount",
            Self::InvalidNonce => "invalid-nonce",

            // State conflicts
            Self::EnforcerLocked => "enforcer-locked",
            Self::IdAlreadyUsed => "id-already-used",

            // Arithmetic errors
            Self::ArithmeticOverflow => "arithmetic-overflow",

            // Execution mode errors
            Self::InvalidCallType => "invalid-call-type",
            Self::InvalidExecType => "invalid-execution-type",

            // Encoding and size errors
            Self::MalformedExecution => "malformed-execution",
            Self::InvalidBatchSize => "invalid-batch-size",
            Self::SerializationError => "serialization-error",
            Self::DeserializationError => "deserialization-error",
            Self::PayloadTooLarge => "payload-too-large",

            // Execution sink errors
            Self::ExecutionFailed => "execution-failed",
            Self::InsufficientBalance => "insufficient-balance",
        }
    }

    /// Get a human-readable description.
    pub fn description(self) -> &'static str {
        match self {
            Self::InvalidTermsLength => "Caveat terms do not match the expected byte layout",
            Self::InvalidArgsLength => "Redemption-time args do not match the expected byte layout",
            Self::InvalidGroupIndex => "Selected caveat group does not exist",
            Self::InvalidCaveatArgsLength => "Args count does not match the selected caveat group",
            Self::UnknownEnforcer => "Caveat references an unregistered enforcer",
            Self::InvalidTerms => "Caveat terms decode but carry an unusable value",
            Self::MissingField => "Builder is missing a required field",

            Self::SignatureInvalid => "Delegation signature verification failed",
            Self::ChainBroken => "Delegation chain linkage verification failed",
            Self::InvalidDelegate => "Delegation delegate does not match the redeeming principal",
            Self::CycleDetected => "Delegation appears more than once in a chain",
            Self::DepthExceeded => "Delegation chain exceeds the maximum depth",

            Self::AllowanceExceeded => "Requested amount exceeds the remaining allowance",
            Self::LimitExceeded => "Call count limit reached",
            Self::InsufficientBalanceChange => "Balance did not increase by the required amount",
            Self::ExcessiveBalanceDecrease => "Balance decreased by more than the allowed amount",
            Self::EarlyRedemption => "Redemption attempted before the validity window opens",
            Self::ExpiredDelegation => "Redemption attempted after the validity window closed",
            Self::UnauthorizedTarget => "Execution target not in the allow-list",
            Self::UnauthorizedMethod => "Execution method not in the allow-list",
            Self::UnauthorizedRedeemer => "Redeeming principal not in the allow-list",
            Self::InvalidExecution => "Execution does not match the required shape",
            Self::ClaimNotStarted => "Periodic allowance has not started yet",
            Self::ClaimAmountExceeded => "Claim exceeds the amount available this period",
            Self::ZeroExpectedChange => "Required balance change must be non-zero",
            Self::InvalidAsset => "Execution touches an asset other than the configured one",
            Self::InvalidMethod => "Execution method does not match the required call",
            Self::ExceedsOutputAmount => "Claim exceeds the offered output amount",
            Self::InvalidNonce => "Delegation nonce does not match the current nonce",

            Self::EnforcerLocked => "Tracker for this delegation is already in use",
            Self::IdAlreadyUsed => "Delegation id has already been redeemed",

            Self::ArithmeticOverflow => "Accumulator arithmetic overflowed",

            Self::InvalidCallType => "Enforcer does not support this call type",
            Self::InvalidExecType => "Enforcer does not support this execution type",

            Self::MalformedExecution => "Execution payload does not decode",
            Self::InvalidBatchSize => "Batch length does not match the required length",
            Self::SerializationError => "CBOR serialization failed",
            Self::DeserializationError => "CBOR deserialization failed",
            Self::PayloadTooLarge => "Encoded payload exceeds the size limit",

            Self::ExecutionFailed => "Execution sink reported a failure",
            Self::InsufficientBalance => "Ledger balance insufficient for transfer",
        }
    }
}

/// Errors produced by the redemption engine and the enforcer library.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Terms / Args Shape Errors
    // =========================================================================
    /// Caveat terms byte layout does not match the enforcer's expectation.
    #[error("invalid terms length for {enforcer}: {len} bytes")]
    InvalidTermsLength { enforcer: &'static str, len: usize },

    /// Redemption-time args byte layout does not match the enforcer's expectation.
    #[error("invalid args length for {enforcer}: {len} bytes")]
    InvalidArgsLength { enforcer: &'static str, len: usize },

    /// Selected caveat group index is out of range.
    #[error("invalid group index {index}: terms define {groups} groups")]
    InvalidGroupIndex { index: u32, groups: u32 },

    /// Args for the selected group do not line up with its caveats.
    #[error("invalid caveat args length: group has {expected} caveats, args carry {actual}")]
    InvalidCaveatArgsLength { expected: usize, actual: usize },

    /// Caveat references an enforcer that is not registered.
    #[error("unknown enforcer {0}")]
    UnknownEnforcer(Address),

    /// Terms decoded to a value the enforcer cannot use (zero period, empty
    /// allow-list, inverted window).
    #[error("invalid terms for {enforcer}: {reason}")]
    InvalidTerms {
        enforcer: &'static str,
        reason: &'static str,
    },

    /// A builder was finalized without a required field.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    // =========================================================================
    // Authority Errors
    // =========================================================================
    /// The external verifier rejected a delegation signature.
    #[error("signature verification failed for delegator {delegator}")]
    SignatureInvalid { delegator: Address },

    /// Chain linkage is broken (authority hash mismatch, bad continuity).
    #[error("chain broken: {0}")]
    ChainBroken(String),

    /// Terminal delegate does not match the redeeming principal.
    #[error("invalid delegate: chain grants {expected}, redeemed by {actual}")]
    InvalidDelegate { expected: Address, actual: Address },

    /// The same delegation appears more than once in a chain.
    #[error("cycle detected: delegation {0} appears multiple times")]
    CycleDetected(DelegationHash),

    /// Chain length exceeds the protocol cap.
    #[error("chain depth {depth} exceeds maximum {max}")]
    DepthExceeded { depth: usize, max: usize },

    // =========================================================================
    // Policy Violations
    // =========================================================================
    /// Spend would exceed the configured ceiling.
    #[error("allowance exceeded: requested {requested}, available {available}")]
    AllowanceExceeded { requested: u128, available: u128 },

    /// Call count limit reached.
    #[error("call limit of {limit} reached")]
    LimitExceeded { limit: u64 },

    /// Observed balance increase fell short of the required change.
    #[error("insufficient balance change: required increase {expected}, observed delta {observed}")]
    InsufficientBalanceChange { expected: u128, observed: i128 },

    /// Observed balance decrease exceeded the allowed change.
    #[error("excessive balance decrease: allowed {allowed}, observed delta {observed}")]
    ExcessiveBalanceDecrease { allowed: u128, observed: i128 },

    /// Redemption before the validity window opens.
    #[error("early redemption: valid from {not_before}, now {now}")]
    EarlyRedemption { not_before: u64, now: u64 },

    /// Redemption after the validity window closed.
    #[error("delegation expired: valid until {not_after}, now {now}")]
    ExpiredDelegation { not_after: u64, now: u64 },

    /// Execution target is not allow-listed.
    #[error("unauthorized target {0}")]
    UnauthorizedTarget(Address),

    /// Execution method selector is not allow-listed.
    #[error("unauthorized method 0x{}", hex::encode(.selector))]
    UnauthorizedMethod { selector: [u8; 4] },

    /// Redeeming principal is not allow-listed.
    #[error("unauthorized redeemer {0}")]
    UnauthorizedRedeemer(Address),

    /// Execution does not match the required shape.
    #[error("invalid execution: {0}")]
    InvalidExecution(String),

    /// Periodic allowance claimed before its start.
    #[error("claim not started: starts at {start}, now {now}")]
    ClaimNotStarted { start: u64, now: u64 },

    /// Claim exceeds what the current period still allows.
    #[error("claim amount exceeded: requested {requested}, available {available}")]
    ClaimAmountExceeded { requested: u128, available: u128 },

    /// A balance-change caveat was configured with a zero required change.
    #[error("expected balance change must be non-zero")]
    ZeroExpectedChange,

    /// Execution touches an asset other than the configured one.
    #[error("invalid asset: expected {expected}, got {actual}")]
    InvalidAsset { expected: Address, actual: Address },

    /// Execution method does not match the required call.
    #[error("invalid method 0x{}", hex::encode(.selector))]
    InvalidMethod { selector: [u8; 4] },

    /// Claim exceeds the remaining offered output amount.
    #[error("exceeds output amount: requested {requested}, remaining {remaining}")]
    ExceedsOutputAmount { requested: u128, remaining: u128 },

    /// Delegation nonce does not match the enforcer's current nonce.
    #[error("invalid nonce: current {expected}, delegation carries {actual}")]
    InvalidNonce { expected: u64, actual: u64 },

    // =========================================================================
    // State Conflicts
    // =========================================================================
    /// Single-use tracker re-entered before its matching after-hook ran.
    #[error("enforcer locked for delegation {0}")]
    EnforcerLocked(DelegationHash),

    /// Delegation id already redeemed.
    #[error("id {id} already used")]
    IdAlreadyUsed { id: u128 },

    // =========================================================================
    // Arithmetic Errors
    // =========================================================================
    /// Checked accumulator arithmetic wrapped. Always fatal.
    #[error("arithmetic overflow")]
    ArithmeticOverflow,

    // =========================================================================
    // Execution Mode Errors
    // =========================================================================
    /// Enforcer does not support the submitted call type.
    #[error("call type {actual:?} not supported")]
    InvalidCallType { actual: CallType },

    /// Enforcer does not support the submitted execution type.
    #[error("execution type {actual:?} not supported")]
    InvalidExecType { actual: ExecType },

    // =========================================================================
    // Encoding and Size Errors
    // =========================================================================
    /// Execution payload bytes do not decode under the submitted mode.
    #[error("malformed execution payload: {0}")]
    MalformedExecution(String),

    /// Batch length does not match the required length.
    #[error("invalid batch size: expected {expected}, got {actual}")]
    InvalidBatchSize { expected: usize, actual: usize },

    /// CBOR serialization failed.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// CBOR deserialization failed.
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Encoded payload exceeds the size limit.
    #[error("payload size {size} bytes exceeds maximum {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    // =========================================================================
    // Execution Sink Errors
    // =========================================================================
    /// The execution sink reported a failure (propagated in default mode).
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// Ledger balance insufficient for a transfer.
    #[error("insufficient balance of {asset}: needed {needed}, available {available}")]
    InsufficientBalance {
        asset: Address,
        needed: u128,
        available: u128,
    },
}

impl From<ciborium::ser::Error<std::io::Error>> for Error {
    fn from(e: ciborium::ser::Error<std::io::Error>) -> Self {
        Error::SerializationError(e.to_string())
    }
}

impl From<ciborium::de::Error<std::io::Error>> for Error {
    fn from(e: ciborium::de::Error<std::io::Error>) -> Self {
        Error::DeserializationError(e.to_string())
    }
}

impl Error {
    /// Map this error to its canonical code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidTermsLength { .. } => ErrorCode::InvalidTermsLength,
            Self::InvalidArgsLength { .. } => ErrorCode::InvalidArgsLength,
            Self::InvalidGroupIndex { .. } => ErrorCode::InvalidGroupIndex,
            Self::InvalidCaveatArgsLength { .. } => ErrorCode::InvalidCaveatArgsLength,
            Self::UnknownEnforcer(_) => ErrorCode::UnknownEnforcer,
            Self::InvalidTerms { .. } => ErrorCode::InvalidTerms,
            Self::MissingField(_) => ErrorCode::MissingField,

            Self::SignatureInvalid { .. } => ErrorCode::SignatureInvalid,
            Self::ChainBroken(_) => ErrorCode::ChainBroken,
            Self::InvalidDelegate { .. } => ErrorCode::InvalidDelegate,
            Self::CycleDetected(_) => ErrorCode::CycleDetected,
            Self::DepthExceeded { .. } => ErrorCode::DepthExceeded,

            Self::AllowanceExceeded { .. } => ErrorCode::AllowanceExceeded,
            Self::LimitExceeded { .. } => ErrorCode::LimitExceeded,
            Self::InsufficientBalanceChange { .. } => ErrorCode::InsufficientBalanceChange,
            Self::ExcessiveBalanceDecrease { .. } => ErrorCode::ExcessiveBalanceDecrease,
            Self::EarlyRedemption { .. } => ErrorCode::EarlyRedemption,
            Self::ExpiredDelegation { .. } => ErrorCode::ExpiredDelegation,
            Self::UnauthorizedTarget(_) => ErrorCode::UnauthorizedTarget,
            Self::UnauthorizedMethod { .. } => ErrorCode::UnauthorizedMethod,
            Self::UnauthorizedRedeemer(_) => ErrorCode::UnauthorizedRedeemer,
            Self::InvalidExecution(_) => ErrorCode::InvalidExecution,
            Self::ClaimNotStarted { .. } => ErrorCode::ClaimNotStarted,
            Self::ClaimAmountExceeded { .. } => ErrorCode::ClaimAmountExceeded,
            Self::ZeroExpectedChange => ErrorCode::ZeroExpectedChange,
            Self::InvalidAsset { .. } => ErrorCode::InvalidAsset,
            Self::InvalidMethod { .. } => ErrorCode::InvalidMethod,
            Self::ExceedsOutputAmount { .. } => ErrorCode::ExceedsOutputAmount,
            Self::InvalidNonce { .. } => ErrorCode::InvalidNonce,

            Self::EnforcerLocked(_) => ErrorCode::EnforcerLocked,
            Self::IdAlreadyUsed { .. } => ErrorCode::IdAlreadyUsed,

            Self::ArithmeticOverflow => ErrorCode::ArithmeticOverflow,

            Self::InvalidCallType { .. } => ErrorCode::InvalidCallType,
            Self::InvalidExecType { .. } => ErrorCode::InvalidExecType,

            Self::MalformedExecution(_) => ErrorCode::MalformedExecution,
            Self::InvalidBatchSize { .. } => ErrorCode::InvalidBatchSize,
            Self::SerializationError(_) => ErrorCode::SerializationError,
            Self::DeserializationError(_) => ErrorCode::DeserializationError,
            Self::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,

            Self::ExecutionFailed(_) => ErrorCode::ExecutionFailed,
            Self::InsufficientBalance { .. } => ErrorCode::InsufficientBalance,
        }
    }

    /// Get the machine-readable error name (kebab-case).
    pub fn name(&self) -> &'static str {
        self.code().name()
    }

    /// Get the human-readable description.
    pub fn description(&self) -> &'static str {
        self.code().description()
    }
}
