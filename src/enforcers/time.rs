//! Time windows, call counters, and wholesale revocation.
//!
//! [`NonceEnforcer`] and [`IdEnforcer`] double as the engine's revocation
//! story: a delegator who signed many outstanding delegations against one
//! nonce invalidates all of them with a single nonce bump, and id-tagged
//! delegations are single-use per redeemer.

use super::{layout, lock};
use crate::delegation::{Address, DelegationHash};
use crate::enforcer::{CaveatEnforcer, HookContext};
use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Bounds redemption to an inclusive `[after, before]` window.
///
/// Terms: `after(8) || before(8)`, UNIX seconds; zero means unbounded on
/// that side.
#[derive(Debug, Default)]
pub struct TimestampEnforcer;

/// Decoded timestamp terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampTerms {
    /// Earliest valid second, or 0 for unbounded.
    pub after: u64,
    /// Latest valid second, or 0 for unbounded.
    pub before: u64,
}

impl TimestampEnforcer {
    /// Create the enforcer.
    pub fn new() -> Self {
        Self
    }

    /// Encode terms.
    pub fn terms(after: u64, before: u64) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16);
        buf.extend_from_slice(&after.to_be_bytes());
        buf.extend_from_slice(&before.to_be_bytes());
        buf
    }

    /// Strictly decode and validate terms.
    pub fn decode_terms(terms: &[u8]) -> Result<TimestampTerms> {
        if terms.len() != 16 {
            return Err(Error::InvalidTermsLength {
                enforcer: "timestamp",
                len: terms.len(),
            });
        }
        let decoded = TimestampTerms {
            after: layout::u64_at(terms, 0),
            before: layout::u64_at(terms, 8),
        };
        if decoded.after != 0 && decoded.before != 0 && decoded.after > decoded.before {
            return Err(Error::InvalidTerms {
                enforcer: "timestamp",
                reason: "window opens after it closes",
            });
        }
        Ok(decoded)
    }
}

impl CaveatEnforcer for TimestampEnforcer {
    fn name(&self) -> &'static str {
        "timestamp"
    }

    fn before_hook(
        &self,
        terms: &[u8],
        _args: &[u8],
        _payload: &[u8],
        ctx: &HookContext<'_>,
    ) -> Result<()> {
        let terms = Self::decode_terms(terms)?;
        let now = ctx.now();
        if terms.after != 0 && now < terms.after {
            return Err(Error::EarlyRedemption {
                not_before: terms.after,
                now,
            });
        }
        if terms.before != 0 && now > terms.before {
            return Err(Error::ExpiredDelegation {
                not_after: terms.before,
                now,
            });
        }
        Ok(())
    }
}

/// Caps how many times one delegation redeems.
///
/// Terms: `limit(8)`, at least 1. State: a monotonic counter per
/// `(caller, delegation_hash)`; a redemption that would exceed the limit
/// fails and leaves the counter unchanged.
#[derive(Debug, Default)]
pub struct LimitedCallsEnforcer {
    counts: Mutex<HashMap<(Address, DelegationHash), u64>>,
}

impl LimitedCallsEnforcer {
    /// Create a fresh enforcer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode terms.
    pub fn terms(limit: u64) -> Vec<u8> {
        limit.to_be_bytes().to_vec()
    }

    /// Strictly decode and validate terms.
    pub fn decode_terms(terms: &[u8]) -> Result<u64> {
        if terms.len() != 8 {
            return Err(Error::InvalidTermsLength {
                enforcer: "limited-calls",
                len: terms.len(),
            });
        }
        let limit = layout::u64_at(terms, 0);
        if limit == 0 {
            return Err(Error::InvalidTerms {
                enforcer: "limited-calls",
                reason: "limit must be at least 1",
            });
        }
        Ok(limit)
    }

    /// Calls recorded under `(caller, hash)`.
    pub fn call_count(&self, caller: Address, hash: DelegationHash) -> u64 {
        lock(&self.counts).get(&(caller, hash)).copied().unwrap_or(0)
    }
}

impl CaveatEnforcer for LimitedCallsEnforcer {
    fn name(&self) -> &'static str {
        "limited-calls"
    }

    fn before_hook(
        &self,
        terms: &[u8],
        _args: &[u8],
        _payload: &[u8],
        ctx: &HookContext<'_>,
    ) -> Result<()> {
        let limit = Self::decode_terms(terms)?;
        let key = (ctx.caller(), ctx.delegation_hash);
        let mut counts = lock(&self.counts);
        let count = counts.get(&key).copied().unwrap_or(0);
        if count >= limit {
            return Err(Error::LimitExceeded { limit });
        }
        counts.insert(key, count + 1);
        Ok(())
    }
}

/// Ties delegations to a delegator-scoped nonce.
///
/// Terms: `nonce(8)`. A delegation only redeems while its signed nonce
/// equals the enforcer's current nonce for `(caller, delegator)`;
/// [`NonceEnforcer::increment_nonce`] revokes every outstanding delegation
/// signed against the old value at once.
#[derive(Debug, Default)]
pub struct NonceEnforcer {
    nonces: Mutex<HashMap<(Address, Address), u64>>,
}

impl NonceEnforcer {
    /// Create a fresh enforcer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode terms.
    pub fn terms(nonce: u64) -> Vec<u8> {
        nonce.to_be_bytes().to_vec()
    }

    /// Strictly decode terms.
    pub fn decode_terms(terms: &[u8]) -> Result<u64> {
        if terms.len() != 8 {
            return Err(Error::InvalidTermsLength {
                enforcer: "nonce",
                len: terms.len(),
            });
        }
        Ok(layout::u64_at(terms, 0))
    }

    /// Current nonce for `(caller, delegator)`.
    pub fn current_nonce(&self, caller: Address, delegator: Address) -> u64 {
        lock(&self.nonces)
            .get(&(caller, delegator))
            .copied()
            .unwrap_or(0)
    }

    /// Bump the nonce for `(caller, delegator)`, returning the new value.
    ///
    /// Every delegation signed against the previous nonce stops redeeming.
    pub fn increment_nonce(&self, caller: Address, delegator: Address) -> u64 {
        let mut nonces = lock(&self.nonces);
        let next = nonces
            .get(&(caller, delegator))
            .copied()
            .unwrap_or(0)
            .saturating_add(1);
        nonces.insert((caller, delegator), next);
        next
    }
}

impl CaveatEnforcer for NonceEnforcer {
    fn name(&self) -> &'static str {
        "nonce"
    }

    fn before_hook(
        &self,
        terms: &[u8],
        _args: &[u8],
        _payload: &[u8],
        ctx: &HookContext<'_>,
    ) -> Result<()> {
        let nonce = Self::decode_terms(terms)?;
        let current = self.current_nonce(ctx.caller(), ctx.delegator);
        if nonce != current {
            return Err(Error::InvalidNonce {
                expected: current,
                actual: nonce,
            });
        }
        Ok(())
    }
}

/// Makes an id-tagged delegation single-use per redeemer.
///
/// Terms: `id(16)`. State: used ids per `(caller, delegator, redeemer)`.
/// Several delegations may share an id; redeeming any one of them consumes
/// the id for that redeemer.
#[derive(Debug, Default)]
pub struct IdEnforcer {
    used: Mutex<HashSet<(Address, Address, Address, u128)>>,
}

impl IdEnforcer {
    /// Create a fresh enforcer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode terms.
    pub fn terms(id: u128) -> Vec<u8> {
        id.to_be_bytes().to_vec()
    }

    /// Strictly decode terms.
    pub fn decode_terms(terms: &[u8]) -> Result<u128> {
        if terms.len() != 16 {
            return Err(Error::InvalidTermsLength {
                enforcer: "id",
                len: terms.len(),
            });
        }
        Ok(layout::u128_at(terms, 0))
    }

    /// Whether `id` has been consumed for this scope.
    pub fn is_used(&self, caller: Address, delegator: Address, redeemer: Address, id: u128) -> bool {
        lock(&self.used).contains(&(caller, delegator, redeemer, id))
    }
}

impl CaveatEnforcer for IdEnforcer {
    fn name(&self) -> &'static str {
        "id"
    }

    fn before_hook(
        &self,
        terms: &[u8],
        _args: &[u8],
        _payload: &[u8],
        ctx: &HookContext<'_>,
    ) -> Result<()> {
        let id = Self::decode_terms(terms)?;
        let key = (ctx.caller(), ctx.delegator, ctx.redeemer, id);
        let mut used = lock(&self.used);
        if used.contains(&key) {
            return Err(Error::IdAlreadyUsed { id });
        }
        used.insert(key);
        Ok(())
    }
}
