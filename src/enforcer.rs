//! Caveat enforcer interface.
//!
//! Every policy module implements [`CaveatEnforcer`]: a `before`/`after`
//! hook pair around each guarded execution, plus `before_all`/`after_all`
//! variants that aggregate accounting across every use of the enforcer
//! within one redemption call. Hooks default to no-ops so an enforcer only
//! implements the phases it cares about.
//!
//! Hooks receive the caveat's signed `terms`, the redeemer-supplied `args`,
//! the raw execution payload bytes, and a [`HookContext`] carrying the
//! identities involved plus a handle back to the engine for nested
//! redemption.

use crate::clock::Clock;
use crate::delegation::{Address, DelegationHash};
use crate::error::{Error, Result};
use crate::execution::ExecutionMode;
use crate::ledger::Ledger;
use crate::redemption::RedemptionEngine;
use std::collections::HashMap;
use std::sync::Arc;

/// Call context handed to every hook.
///
/// `args` never appear here: they are untrusted redeemer input and are
/// passed alongside so their provenance stays visible at every call site.
pub struct HookContext<'a> {
    /// The engine running this redemption. Enforcers may re-enter it.
    pub engine: &'a RedemptionEngine,
    /// Address the caveat resolved this enforcer under.
    pub enforcer: Address,
    /// Principal redeeming the outer call.
    pub redeemer: Address,
    /// Delegator of the hop this caveat belongs to.
    pub delegator: Address,
    /// Hash of the delegation this caveat belongs to.
    pub delegation_hash: DelegationHash,
    /// Mode of the guarded execution.
    pub mode: ExecutionMode,
}

impl HookContext<'_> {
    /// The engine's identity - the tenant component of every state key.
    pub fn caller(&self) -> Address {
        self.engine.address()
    }

    /// Balance book the redemption observes.
    pub fn ledger(&self) -> &dyn Ledger {
        self.engine.ledger()
    }

    /// Clock the redemption compares against.
    pub fn clock(&self) -> &dyn Clock {
        self.engine.clock()
    }

    /// Current UNIX timestamp in seconds.
    pub fn now(&self) -> u64 {
        self.engine.clock().now()
    }
}

/// A pluggable policy module gating redemption.
///
/// Hook ordering per redemption call: every hop's `before_all_hook` (chain
/// order), then per hop `before_hook`, the execution, `after_hook` (reverse
/// hop order), and finally every hop's `after_all_hook` (reverse order).
/// An enforcer must commit any state it writes before returning, so nested
/// redemptions triggered from inside a hook observe it.
pub trait CaveatEnforcer: Send + Sync {
    /// Stable name used in error context and log lines.
    fn name(&self) -> &'static str;

    /// Aggregating pre-check; runs once per use before any `before_hook`.
    fn before_all_hook(
        &self,
        _terms: &[u8],
        _args: &[u8],
        _payload: &[u8],
        _ctx: &HookContext<'_>,
    ) -> Result<()> {
        Ok(())
    }

    /// Pre-check immediately before the guarded execution.
    fn before_hook(
        &self,
        _terms: &[u8],
        _args: &[u8],
        _payload: &[u8],
        _ctx: &HookContext<'_>,
    ) -> Result<()> {
        Ok(())
    }

    /// Post-check immediately after the guarded execution.
    fn after_hook(
        &self,
        _terms: &[u8],
        _args: &[u8],
        _payload: &[u8],
        _ctx: &HookContext<'_>,
    ) -> Result<()> {
        Ok(())
    }

    /// Aggregating post-check; runs once per use after every `after_hook`.
    fn after_all_hook(
        &self,
        _terms: &[u8],
        _args: &[u8],
        _payload: &[u8],
        _ctx: &HookContext<'_>,
    ) -> Result<()> {
        Ok(())
    }
}

/// Resolves caveat enforcer references to concrete implementations.
#[derive(Clone, Default)]
pub struct EnforcerRegistry {
    entries: HashMap<Address, Arc<dyn CaveatEnforcer>>,
}

impl EnforcerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `enforcer` under `address`, replacing any previous entry.
    pub fn register(&mut self, address: Address, enforcer: Arc<dyn CaveatEnforcer>) {
        self.entries.insert(address, enforcer);
    }

    /// Resolve an enforcer reference.
    pub fn resolve(&self, address: Address) -> Result<Arc<dyn CaveatEnforcer>> {
        self.entries
            .get(&address)
            .cloned()
            .ok_or(Error::UnknownEnforcer(address))
    }

    /// Whether `address` is registered.
    pub fn contains(&self, address: Address) -> bool {
        self.entries.contains_key(&address)
    }

    /// Number of registered enforcers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for EnforcerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnforcerRegistry")
            .field("len", &self.entries.len())
            .finish()
    }
}
