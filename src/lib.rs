//! # Mandate
//!
//! Delegation-chain authorization engine with composable caveat enforcers.
//!
//! A [`Delegation`] is a signed grant of authority from a delegator to a
//! delegate. Delegations chain: a grant's [`Authority`] is either the root
//! sentinel (a primary grant) or the content hash of the parent grant. Each
//! delegation carries an ordered list of [`Caveat`]s — references to policy
//! modules ([`CaveatEnforcer`]s) that inspect a proposed [`Execution`] before
//! it runs and validate its outcome afterwards. The effective permission of a
//! chain is the intersection of every caveat at every hop.
//!
//! The [`RedemptionEngine`] walks submitted chains, checks authority linkage
//! and signatures, runs every hop's before-hooks in chain order, executes the
//! authorized payload through an [`ExecutionSink`], and unwinds after-hooks in
//! reverse order like a call stack. Enforcers may re-enter the engine from
//! inside a hook, which is how conditional exchanges (an offer gated on a
//! nested payment redemption) compose.
//!
//! ## Example
//!
//! ```rust,ignore
//! use mandate::{Delegation, RedemptionEngine, PermissionContext, ExecutionMode};
//!
//! let delegation = Delegation::builder()
//!     .delegator(alice)
//!     .delegate(bob)
//!     .caveat(limited_calls, LimitedCallsEnforcer::terms(1), vec![])
//!     .random_salt()
//!     .build_unsigned();
//! let delegation = delegation.attach_signature(alice_sig);
//!
//! engine.redeem_delegations(bob, &[PermissionContext {
//!     chain: vec![delegation],
//!     mode: ExecutionMode::single_default(),
//!     payload: execution.encode_single(),
//! }])?;
//! ```
//!
//! ## Collaborators
//!
//! Signature verification, balance bookkeeping and the actual side effects
//! are external seams: [`SignatureVerifier`], [`Ledger`] and
//! [`ExecutionSink`]. The crate ships [`InMemoryLedger`] as a reference
//! implementation of the latter two.

pub mod clock;
pub mod delegation;
pub mod enforcer;
pub mod enforcers;
pub mod error;
pub mod execution;
pub mod ledger;
pub mod redemption;
pub mod verifier;
pub mod wire;

pub use clock::{Clock, ManualClock, SystemClock};
pub use delegation::{Address, Authority, Caveat, Delegation, DelegationBuilder, DelegationHash};
pub use enforcer::{CaveatEnforcer, EnforcerRegistry, HookContext};
pub use error::{Error, ErrorCode, Result};
pub use execution::{CallType, ExecType, Execution, ExecutionMode, TRANSFER_SELECTOR};
pub use ledger::{ExecutionSink, InMemoryLedger, Ledger, NATIVE_ASSET};
pub use redemption::{
    ExecutionResult, PermissionContext, RedemptionEngine, RedemptionEngineBuilder,
    RedemptionOutcome,
};
pub use verifier::{AcceptAllVerifier, SignatureVerifier};
pub use wire::{MAX_CONTEXT_SIZE, MAX_DELEGATION_SIZE};

/// Maximum delegation chain length accepted by the engine.
///
/// Individual deployments rarely need more than a handful of hops; the cap
/// bounds validation work for maliciously deep chains.
pub const MAX_CHAIN_DEPTH: usize = 64;
