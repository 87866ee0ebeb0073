//! Balance-delta enforcers.
//!
//! Both variants snapshot a recipient's balance before the guarded
//! execution and assert the delta afterwards: either "increased by at
//! least X" or "decreased by at most X". They differ in how they handle
//! multiple uses of the same tracking key within one redemption call:
//!
//! - [`BalanceChangeEnforcer`] is strictly single-use: a second before-hook
//!   on a live key fails with `EnforcerLocked`.
//! - [`MultiOperationBalanceEnforcer`] aggregates: N before-all hooks
//!   accumulate the expected delta and a pending counter; only the Nth
//!   after-all hook validates the aggregate and clears the entry.
//!
//! The aggregate variant deliberately validates only the total: K sibling
//! delegations each demanding ">= X" are satisfied by any combination of
//! settlements summing to K * X - a single payment covering the whole sum
//! counts for all of them, and nothing ties an individual use to its own
//! payment. Callers who need per-use attribution must key the siblings to
//! different recipients. This is a documented property, not an oversight.

use super::{layout, lock, require_default};
use crate::delegation::Address;
use crate::enforcer::{CaveatEnforcer, HookContext};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::Mutex;

/// Which way the recipient's balance must move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceDirection {
    /// Balance must end at least `amount` above the snapshot.
    IncreaseAtLeast,
    /// Balance must end no more than `amount` below the snapshot.
    DecreaseAtMost,
}

impl BalanceDirection {
    fn from_byte(enforcer: &'static str, byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(BalanceDirection::IncreaseAtLeast),
            1 => Ok(BalanceDirection::DecreaseAtMost),
            _ => Err(Error::InvalidTerms {
                enforcer,
                reason: "direction byte must be 0 or 1",
            }),
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            BalanceDirection::IncreaseAtLeast => 0,
            BalanceDirection::DecreaseAtMost => 1,
        }
    }
}

/// Decoded balance-change terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceTerms {
    /// Required movement direction.
    pub direction: BalanceDirection,
    /// Asset whose balance is tracked.
    pub asset: Address,
    /// Principal whose balance is tracked.
    pub recipient: Address,
    /// Required (increase) or allowed (decrease) delta. Must be non-zero.
    pub amount: u128,
}

const TERMS_WIDTH: usize = 81;

fn encode_terms(terms: &BalanceTerms) -> Vec<u8> {
    let mut buf = Vec::with_capacity(TERMS_WIDTH);
    buf.push(terms.direction.to_byte());
    buf.extend_from_slice(terms.asset.as_bytes());
    buf.extend_from_slice(terms.recipient.as_bytes());
    buf.extend_from_slice(&terms.amount.to_be_bytes());
    buf
}

fn decode_terms(enforcer: &'static str, terms: &[u8]) -> Result<BalanceTerms> {
    if terms.len() != TERMS_WIDTH {
        return Err(Error::InvalidTermsLength {
            enforcer,
            len: terms.len(),
        });
    }
    Ok(BalanceTerms {
        direction: BalanceDirection::from_byte(enforcer, terms[0])?,
        asset: layout::address_at(terms, 1),
        recipient: layout::address_at(terms, 33),
        amount: layout::u128_at(terms, 65),
    })
}

/// Signed delta for error reporting. Clamps at the i128 range edges.
pub(crate) fn signed_delta(before: u128, current: u128) -> i128 {
    if current >= before {
        i128::try_from(current - before).unwrap_or(i128::MAX)
    } else {
        i128::try_from(before - current)
            .map(|d| -d)
            .unwrap_or(i128::MIN)
    }
}

/// Assert the observed balance movement satisfies the expected one.
fn validate_delta(
    direction: BalanceDirection,
    before: u128,
    current: u128,
    expected: u128,
) -> Result<()> {
    match direction {
        BalanceDirection::IncreaseAtLeast => {
            let floor = before.checked_add(expected).ok_or(Error::ArithmeticOverflow)?;
            if current < floor {
                return Err(Error::InsufficientBalanceChange {
                    expected,
                    observed: signed_delta(before, current),
                });
            }
        }
        BalanceDirection::DecreaseAtMost => {
            if current < before && before - current > expected {
                return Err(Error::ExcessiveBalanceDecrease {
                    allowed: expected,
                    observed: signed_delta(before, current),
                });
            }
        }
    }
    Ok(())
}

/// Tracking key: the calling engine plus the observed (asset, recipient).
type TrackKey = (Address, Address, Address);

#[derive(Debug, Clone, Copy)]
struct SingleEntry {
    balance_before: u128,
    direction: BalanceDirection,
    expected: u128,
}

/// Single-use balance-delta tracker with a strict lock.
///
/// Terms: `direction(1) || asset(32) || recipient(32) || amount(16)`.
/// The before-hook snapshots the recipient's balance and locks the key;
/// the after-hook validates the delta and unlocks. Re-entering a locked
/// key fails with `EnforcerLocked` - this is the non-aggregating sibling
/// of [`MultiOperationBalanceEnforcer`].
#[derive(Debug, Default)]
pub struct BalanceChangeEnforcer {
    state: Mutex<HashMap<TrackKey, SingleEntry>>,
}

impl BalanceChangeEnforcer {
    /// Create a fresh enforcer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode terms.
    pub fn terms(
        direction: BalanceDirection,
        asset: Address,
        recipient: Address,
        amount: u128,
    ) -> Vec<u8> {
        encode_terms(&BalanceTerms {
            direction,
            asset,
            recipient,
            amount,
        })
    }

    /// Strictly decode terms.
    pub fn decode_terms(terms: &[u8]) -> Result<BalanceTerms> {
        decode_terms("balance-change", terms)
    }

    /// Whether the tracker for `(caller, asset, recipient)` is live.
    pub fn is_locked(&self, caller: Address, asset: Address, recipient: Address) -> bool {
        lock(&self.state).contains_key(&(caller, asset, recipient))
    }
}

impl CaveatEnforcer for BalanceChangeEnforcer {
    fn name(&self) -> &'static str {
        "balance-change"
    }

    fn before_hook(
        &self,
        terms: &[u8],
        _args: &[u8],
        _payload: &[u8],
        ctx: &HookContext<'_>,
    ) -> Result<()> {
        let terms = Self::decode_terms(terms)?;
        require_default(ctx.mode)?;
        if terms.amount == 0 {
            return Err(Error::ZeroExpectedChange);
        }

        let key = (ctx.caller(), terms.asset, terms.recipient);
        let mut state = lock(&self.state);
        if state.contains_key(&key) {
            return Err(Error::EnforcerLocked(ctx.delegation_hash));
        }
        let balance_before = ctx.ledger().balance_of(terms.asset, terms.recipient);
        state.insert(
            key,
            SingleEntry {
                balance_before,
                direction: terms.direction,
                expected: terms.amount,
            },
        );
        Ok(())
    }

    fn after_hook(
        &self,
        terms: &[u8],
        _args: &[u8],
        _payload: &[u8],
        ctx: &HookContext<'_>,
    ) -> Result<()> {
        let terms = Self::decode_terms(terms)?;
        let key = (ctx.caller(), terms.asset, terms.recipient);
        let entry = match lock(&self.state).remove(&key) {
            Some(entry) => entry,
            // The matching before-hook never ran (the engine pairs hooks,
            // so only an already-cleared key lands here).
            None => return Ok(()),
        };
        let current = ctx.ledger().balance_of(terms.asset, terms.recipient);
        validate_delta(entry.direction, entry.balance_before, current, entry.expected)
    }
}

#[derive(Debug, Clone, Copy)]
struct MultiEntry {
    balance_before: u128,
    direction: BalanceDirection,
    expected: u128,
    pending: u32,
}

/// Aggregating balance-delta tracker for batched sibling uses.
///
/// Terms: same layout as [`BalanceChangeEnforcer`]. The first before-all
/// hook on a key snapshots the balance; further uses only add to the
/// expected delta and bump a pending counter, so balance movements between
/// grouped before-calls are absorbed rather than double-counted. Each
/// after-all hook decrements the counter; the one that reaches zero reads
/// the balance, validates the aggregate delta, and deletes the entry.
///
/// See the module docs for the aggregate-attribution property this design
/// accepts.
#[derive(Debug, Default)]
pub struct MultiOperationBalanceEnforcer {
    state: Mutex<HashMap<TrackKey, MultiEntry>>,
}

impl MultiOperationBalanceEnforcer {
    /// Create a fresh enforcer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode terms.
    pub fn terms(
        direction: BalanceDirection,
        asset: Address,
        recipient: Address,
        amount: u128,
    ) -> Vec<u8> {
        encode_terms(&BalanceTerms {
            direction,
            asset,
            recipient,
            amount,
        })
    }

    /// Strictly decode terms.
    pub fn decode_terms(terms: &[u8]) -> Result<BalanceTerms> {
        decode_terms("multi-operation-balance", terms)
    }

    /// Outstanding after-all calls for `(caller, asset, recipient)`.
    pub fn pending(&self, caller: Address, asset: Address, recipient: Address) -> u32 {
        lock(&self.state)
            .get(&(caller, asset, recipient))
            .map(|entry| entry.pending)
            .unwrap_or(0)
    }
}

impl CaveatEnforcer for MultiOperationBalanceEnforcer {
    fn name(&self) -> &'static str {
        "multi-operation-balance"
    }

    fn before_all_hook(
        &self,
        terms: &[u8],
        _args: &[u8],
        _payload: &[u8],
        ctx: &HookContext<'_>,
    ) -> Result<()> {
        let terms = Self::decode_terms(terms)?;
        require_default(ctx.mode)?;
        if terms.amount == 0 {
            return Err(Error::ZeroExpectedChange);
        }

        let key = (ctx.caller(), terms.asset, terms.recipient);
        let mut state = lock(&self.state);
        match state.get_mut(&key) {
            Some(entry) => {
                if entry.direction != terms.direction {
                    return Err(Error::InvalidExecution(
                        "conflicting balance directions on one tracking key".to_string(),
                    ));
                }
                entry.expected = entry
                    .expected
                    .checked_add(terms.amount)
                    .ok_or(Error::ArithmeticOverflow)?;
                entry.pending = entry
                    .pending
                    .checked_add(1)
                    .ok_or(Error::ArithmeticOverflow)?;
            }
            None => {
                let balance_before = ctx.ledger().balance_of(terms.asset, terms.recipient);
                state.insert(
                    key,
                    MultiEntry {
                        balance_before,
                        direction: terms.direction,
                        expected: terms.amount,
                        pending: 1,
                    },
                );
            }
        }
        Ok(())
    }

    fn after_all_hook(
        &self,
        terms: &[u8],
        _args: &[u8],
        _payload: &[u8],
        ctx: &HookContext<'_>,
    ) -> Result<()> {
        let terms = Self::decode_terms(terms)?;
        let key = (ctx.caller(), terms.asset, terms.recipient);
        let mut state = lock(&self.state);
        let entry = match state.get_mut(&key) {
            Some(entry) => entry,
            None => return Ok(()),
        };
        entry.pending = entry.pending.saturating_sub(1);
        if entry.pending > 0 {
            // Not the last use: validation waits for the group to drain.
            return Ok(());
        }
        let entry = match state.remove(&key) {
            Some(entry) => entry,
            None => return Ok(()),
        };
        drop(state);
        let current = ctx.ledger().balance_of(terms.asset, terms.recipient);
        validate_delta(entry.direction, entry.balance_before, current, entry.expected)
    }
}
