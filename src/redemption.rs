//! Delegation chain redemption engine.
//!
//! [`RedemptionEngine::redeem_delegations`] takes N permission contexts
//! (chain + mode + execution payload), validates each chain's authority
//! linkage and signatures, and runs caveat hooks around the execution in
//! three phases:
//!
//! 1. every context: validate, then all hops' `before_all_hook` in chain
//!    order (root first), caveat order within a hop;
//! 2. every context: `before_hook`s in chain order, the execution itself,
//!    `after_hook`s in reverse hop and caveat order (unwinding like a call
//!    stack);
//! 3. every context in reverse: `after_all_hook`s in reverse hop and caveat
//!    order.
//!
//! The reverse unwinding is what lets an outer hop's after-hook observe
//! state after a nested redemption, triggered from inside an inner hook,
//! has fully completed. The engine is re-entrant: hooks receive a handle to
//! it through [`HookContext`] and may call `redeem_delegations` again
//! synchronously. Any error aborts the whole call; enforcer bookkeeping
//! already committed by earlier hooks stays committed (callers rotate salts
//! for fresh state).

use crate::clock::{Clock, SystemClock};
use crate::delegation::{Address, Delegation, DelegationHash};
use crate::enforcer::{EnforcerRegistry, HookContext};
use crate::error::{Error, Result};
use crate::execution::{ExecType, Execution, ExecutionMode};
use crate::ledger::{ExecutionSink, Ledger};
use crate::verifier::SignatureVerifier;
use crate::MAX_CHAIN_DEPTH;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// One chain + execution + mode submitted for redemption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionContext {
    /// Delegation chain, root grant first. Empty means self-execution.
    pub chain: Vec<Delegation>,
    /// Payload shape and failure propagation.
    pub mode: ExecutionMode,
    /// Encoded execution payload (see [`crate::execution`]).
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
}

/// Result of one execution within a context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    /// The sink ran the execution; opaque result bytes.
    Success(Vec<u8>),
    /// The sink failed and `Try` mode captured it.
    Failure(String),
}

impl ExecutionResult {
    /// Whether the execution succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success(_))
    }
}

/// Per-context redemption outcome.
#[derive(Debug, Clone)]
pub struct RedemptionOutcome {
    /// One result per execution (one for single mode, N for batch).
    pub results: Vec<ExecutionResult>,
}

/// Hook phase selector for the orchestration loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    BeforeAll,
    Before,
    After,
    AfterAll,
}

/// The delegation chain redemption engine.
///
/// Owns its identity (the `caller` component of every enforcer state key)
/// and the external collaborators. Construct via [`RedemptionEngine::builder`].
pub struct RedemptionEngine {
    address: Address,
    verifier: Arc<dyn SignatureVerifier>,
    ledger: Arc<dyn Ledger>,
    sink: Arc<dyn ExecutionSink>,
    clock: Arc<dyn Clock>,
    registry: EnforcerRegistry,
}

impl RedemptionEngine {
    /// Create a new engine builder.
    pub fn builder() -> RedemptionEngineBuilder {
        RedemptionEngineBuilder::new()
    }

    /// The engine's identity.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Balance book enforcers observe.
    pub fn ledger(&self) -> &dyn Ledger {
        self.ledger.as_ref()
    }

    /// Clock enforcers compare against.
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Enforcer registry.
    pub fn registry(&self) -> &EnforcerRegistry {
        &self.registry
    }

    /// Redeem `contexts` on behalf of `redeemer`.
    ///
    /// Atomic at this boundary: the first failure anywhere aborts the whole
    /// call with that error. On success, returns one outcome per context.
    pub fn redeem_delegations(
        &self,
        redeemer: Address,
        contexts: &[PermissionContext],
    ) -> Result<Vec<RedemptionOutcome>> {
        debug!(
            redeemer = %redeemer.short(),
            contexts = contexts.len(),
            "redeeming delegation chains"
        );

        // Phase 1: validate every chain, then run its before-all hooks.
        let mut chain_hashes = Vec::with_capacity(contexts.len());
        for context in contexts {
            let hashes = self.validate_chain(redeemer, context).inspect_err(|e| {
                warn!(redeemer = %redeemer.short(), error = %e, "chain validation failed");
            })?;
            self.run_hooks(redeemer, context, &hashes, Phase::BeforeAll)?;
            chain_hashes.push(hashes);
        }

        // Phase 2: per context, before hooks, the execution, after hooks.
        let mut outcomes = Vec::with_capacity(contexts.len());
        for (context, hashes) in contexts.iter().zip(chain_hashes.iter()) {
            self.run_hooks(redeemer, context, hashes, Phase::Before)?;
            let outcome = self.execute_payload(redeemer, context)?;
            self.run_hooks(redeemer, context, hashes, Phase::After)?;
            outcomes.push(outcome);
        }

        // Phase 3: after-all hooks, contexts unwinding in reverse.
        for (context, hashes) in contexts.iter().zip(chain_hashes.iter()).rev() {
            self.run_hooks(redeemer, context, hashes, Phase::AfterAll)?;
        }

        debug!(redeemer = %redeemer.short(), "redemption complete");
        Ok(outcomes)
    }

    /// Validate one chain and return the per-hop hashes.
    ///
    /// An empty chain is a self-execution and needs no checks.
    fn validate_chain(
        &self,
        redeemer: Address,
        context: &PermissionContext,
    ) -> Result<Vec<DelegationHash>> {
        let chain = &context.chain;
        if chain.is_empty() {
            return Ok(Vec::new());
        }
        if chain.len() > MAX_CHAIN_DEPTH {
            return Err(Error::DepthExceeded {
                depth: chain.len(),
                max: MAX_CHAIN_DEPTH,
            });
        }

        let mut hashes = Vec::with_capacity(chain.len());
        for delegation in chain {
            hashes.push(delegation.hash()?);
        }

        // Cycle detection: no delegation may appear twice.
        let mut seen: HashSet<DelegationHash> = HashSet::new();
        for hash in &hashes {
            if !seen.insert(*hash) {
                return Err(Error::CycleDetected(*hash));
            }
        }

        if !chain[0].authority.is_root() {
            return Err(Error::ChainBroken(
                "first delegation must carry root authority".to_string(),
            ));
        }

        for i in 1..chain.len() {
            let parent_hash = hashes[i - 1];
            if chain[i].authority.parent() != Some(parent_hash) {
                return Err(Error::ChainBroken(format!(
                    "delegation {} does not reference its parent {}",
                    hashes[i].short(),
                    parent_hash.short()
                )));
            }
            if chain[i].delegator != chain[i - 1].delegate {
                return Err(Error::ChainBroken(format!(
                    "delegator {} at hop {} is not the parent's delegate",
                    chain[i].delegator.short(),
                    i
                )));
            }
        }

        let leaf = &chain[chain.len() - 1];
        if leaf.delegate != redeemer {
            return Err(Error::InvalidDelegate {
                expected: leaf.delegate,
                actual: redeemer,
            });
        }

        for (delegation, hash) in chain.iter().zip(hashes.iter()) {
            let preimage = delegation.signing_preimage()?;
            if !self
                .verifier
                .verify(delegation.delegator, &preimage, &delegation.signature)
            {
                return Err(Error::SignatureInvalid {
                    delegator: delegation.delegator,
                });
            }
            trace!(delegation = %hash.short(), "signature verified");
        }

        Ok(hashes)
    }

    /// Run one hook phase over a context's chain.
    ///
    /// Before phases walk root-most hop first, caveats in array order.
    /// After phases unwind: delegate-most hop first, caveats reversed.
    fn run_hooks(
        &self,
        redeemer: Address,
        context: &PermissionContext,
        hashes: &[DelegationHash],
        phase: Phase,
    ) -> Result<()> {
        let forward = matches!(phase, Phase::BeforeAll | Phase::Before);
        let hops: Vec<usize> = if forward {
            (0..context.chain.len()).collect()
        } else {
            (0..context.chain.len()).rev().collect()
        };

        for hop in hops {
            let delegation = &context.chain[hop];
            let caveats: Vec<usize> = if forward {
                (0..delegation.caveats.len()).collect()
            } else {
                (0..delegation.caveats.len()).rev().collect()
            };
            for index in caveats {
                let caveat = &delegation.caveats[index];
                let enforcer = self.registry.resolve(caveat.enforcer)?;
                let ctx = HookContext {
                    engine: self,
                    enforcer: caveat.enforcer,
                    redeemer,
                    delegator: delegation.delegator,
                    delegation_hash: hashes[hop],
                    mode: context.mode,
                };
                let result = match phase {
                    Phase::BeforeAll => {
                        enforcer.before_all_hook(&caveat.terms, &caveat.args, &context.payload, &ctx)
                    }
                    Phase::Before => {
                        enforcer.before_hook(&caveat.terms, &caveat.args, &context.payload, &ctx)
                    }
                    Phase::After => {
                        enforcer.after_hook(&caveat.terms, &caveat.args, &context.payload, &ctx)
                    }
                    Phase::AfterAll => {
                        enforcer.after_all_hook(&caveat.terms, &caveat.args, &context.payload, &ctx)
                    }
                };
                result.inspect_err(|e| {
                    warn!(
                        enforcer = enforcer.name(),
                        phase = ?phase,
                        delegation = %hashes[hop].short(),
                        error = %e,
                        "caveat rejected redemption"
                    );
                })?;
                trace!(
                    enforcer = enforcer.name(),
                    phase = ?phase,
                    delegation = %hashes[hop].short(),
                    "caveat passed"
                );
            }
        }
        Ok(())
    }

    /// Decode and run a context's payload through the sink.
    ///
    /// The acting principal is the root delegator - the authority the chain
    /// ultimately grants - or the redeemer for a self-execution.
    fn execute_payload(
        &self,
        redeemer: Address,
        context: &PermissionContext,
    ) -> Result<RedemptionOutcome> {
        let principal = context
            .chain
            .first()
            .map(|delegation| delegation.delegator)
            .unwrap_or(redeemer);
        let executions = Execution::decode_payload(&context.payload, context.mode.call_type)?;

        let mut results = Vec::with_capacity(executions.len());
        for execution in &executions {
            match context.mode.exec_type {
                ExecType::Default => {
                    let bytes = self.sink.execute(principal, execution)?;
                    results.push(ExecutionResult::Success(bytes));
                }
                ExecType::Try => match self.sink.execute(principal, execution) {
                    Ok(bytes) => results.push(ExecutionResult::Success(bytes)),
                    Err(e) => {
                        trace!(error = %e, "try-mode execution failure captured");
                        results.push(ExecutionResult::Failure(e.to_string()));
                    }
                },
            }
        }
        Ok(RedemptionOutcome { results })
    }
}

impl std::fmt::Debug for RedemptionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedemptionEngine")
            .field("address", &self.address)
            .field("registry", &self.registry)
            .finish()
    }
}

/// Builder for [`RedemptionEngine`].
#[derive(Default)]
pub struct RedemptionEngineBuilder {
    address: Option<Address>,
    verifier: Option<Arc<dyn SignatureVerifier>>,
    ledger: Option<Arc<dyn Ledger>>,
    sink: Option<Arc<dyn ExecutionSink>>,
    clock: Option<Arc<dyn Clock>>,
    registry: EnforcerRegistry,
}

impl RedemptionEngineBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the engine's identity.
    pub fn address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }

    /// Set the signature verifier.
    pub fn verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Set the ledger.
    pub fn ledger(mut self, ledger: Arc<dyn Ledger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Set the execution sink.
    pub fn sink(mut self, sink: Arc<dyn ExecutionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Set the clock. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Register an enforcer under `address`.
    pub fn enforcer(
        mut self,
        address: Address,
        enforcer: Arc<dyn crate::enforcer::CaveatEnforcer>,
    ) -> Self {
        self.registry.register(address, enforcer);
        self
    }

    /// Build the engine.
    pub fn build(self) -> Result<RedemptionEngine> {
        Ok(RedemptionEngine {
            address: self.address.ok_or(Error::MissingField("address"))?,
            verifier: self.verifier.ok_or(Error::MissingField("verifier"))?,
            ledger: self.ledger.ok_or(Error::MissingField("ledger"))?,
            sink: self.sink.ok_or(Error::MissingField("sink"))?,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            registry: self.registry,
        })
    }
}
