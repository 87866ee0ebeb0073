//! Ledger and execution-sink seams.
//!
//! Balance-delta enforcers observe balances through [`Ledger`]; the engine's
//! only side-effecting primitive is [`ExecutionSink::execute`]. Both are
//! external collaborators. [`InMemoryLedger`] is the reference
//! implementation of the pair, sufficient for tests and embedded use.

use crate::delegation::Address;
use crate::error::{Error, Result};
use crate::execution::{self, Execution};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::trace;

/// Asset identifier for native `value` transfers.
pub const NATIVE_ASSET: Address = Address::ZERO;

/// Balance book the enforcers observe.
pub trait Ledger: Send + Sync {
    /// Balance of `principal` in `asset`.
    fn balance_of(&self, asset: Address, principal: Address) -> u128;

    /// Move `amount` of `asset` from `from` to `to`.
    fn transfer(&self, asset: Address, from: Address, to: Address, amount: u128) -> Result<()>;
}

/// Side-effecting primitive the engine executes payloads through.
pub trait ExecutionSink: Send + Sync {
    /// Run `execution` with `principal` as the acting party.
    ///
    /// Returns opaque result bytes on success. Errors propagate or are
    /// captured depending on the redemption mode.
    fn execute(&self, principal: Address, execution: &Execution) -> Result<Vec<u8>>;
}

/// In-memory ledger doubling as an execution sink.
///
/// Executions it understands: a non-zero `value` moves [`NATIVE_ASSET`] from
/// the acting principal to the target, and a non-empty payload must decode
/// as transfer calldata, moving the named asset from the acting principal to
/// the calldata's recipient.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    balances: Mutex<HashMap<(Address, Address), u128>>,
}

impl InMemoryLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the balance of `principal` in `asset`.
    pub fn set_balance(&self, asset: Address, principal: Address, amount: u128) {
        self.lock().insert((asset, principal), amount);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<(Address, Address), u128>> {
        self.balances.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Ledger for InMemoryLedger {
    fn balance_of(&self, asset: Address, principal: Address) -> u128 {
        self.lock().get(&(asset, principal)).copied().unwrap_or(0)
    }

    fn transfer(&self, asset: Address, from: Address, to: Address, amount: u128) -> Result<()> {
        let mut balances = self.lock();
        let from_balance = balances.get(&(asset, from)).copied().unwrap_or(0);
        if from_balance < amount {
            return Err(Error::InsufficientBalance {
                asset,
                needed: amount,
                available: from_balance,
            });
        }
        if from == to {
            return Ok(());
        }
        let to_balance = balances.get(&(asset, to)).copied().unwrap_or(0);
        let credited = to_balance
            .checked_add(amount)
            .ok_or(Error::ArithmeticOverflow)?;
        balances.insert((asset, from), from_balance - amount);
        balances.insert((asset, to), credited);
        trace!(
            asset = %asset.short(),
            from = %from.short(),
            to = %to.short(),
            amount,
            "ledger transfer"
        );
        Ok(())
    }
}

impl ExecutionSink for InMemoryLedger {
    fn execute(&self, principal: Address, execution: &Execution) -> Result<Vec<u8>> {
        if execution.value > 0 {
            self.transfer(NATIVE_ASSET, principal, execution.target, execution.value)?;
        }
        if execution.payload.is_empty() {
            return Ok(Vec::new());
        }
        let call = execution::decode_transfer(&execution.payload)?;
        self.transfer(call.asset, principal, call.recipient, call.amount)?;
        Ok(Vec::new())
    }
}
