//! Concrete caveat enforcer library.
//!
//! Every enforcer follows the same discipline:
//!
//! - **Strict terms**: a fixed positional byte layout, decoded and validated
//!   before anything else. Wrong width fails with `InvalidTermsLength`;
//!   decodable-but-unusable values (zero period, empty allow-list) fail with
//!   `InvalidTerms`.
//! - **Mode gating**: an enforcer rejects call/exec types it does not
//!   support before touching state.
//! - **Scoped state**: bookkeeping lives in a map owned by the enforcer
//!   instance, keyed by the calling engine's address plus the delegation
//!   hash (or a derived key including asset and recipient). Unrelated
//!   delegations never share accounting.
//! - **Check then commit**: a failing hook never mutates state, so a
//!   rejected attempt leaves accumulators exactly where they were.
//!
//! Term layouts use 32-byte addresses, 16-byte big-endian `u128` amounts,
//! 8-byte big-endian `u64` timestamps and counts, and 4-byte big-endian
//! `u32` lengths and indices.

pub mod amount;
pub mod balance;
pub mod call;
pub mod logic;
pub mod swap;
pub mod time;

pub use amount::{
    MultiAssetPeriodEnforcer, PeriodConfig, PeriodicAllowanceEnforcer,
    StreamingAllowanceEnforcer, StreamingTerms, TransferAmountEnforcer, TransferAmountTerms,
    ValueCapEnforcer,
};
pub use balance::{
    BalanceChangeEnforcer, BalanceDirection, BalanceTerms, MultiOperationBalanceEnforcer,
};
pub use call::{
    AllowedMethodsEnforcer, AllowedTargetsEnforcer, ArgsEqualityEnforcer, ExactCalldataBatchEnforcer,
    ExactCalldataEnforcer, ExactExecutionBatchEnforcer, ExactExecutionEnforcer, NoCalldataEnforcer,
    RedeemerEnforcer,
};
pub use logic::{CaveatSpec, LogicalOrWrapperEnforcer};
pub use swap::{PaymentEnforcer, PaymentTerms, SwapOfferEnforcer, SwapOfferTerms};
pub use time::{IdEnforcer, LimitedCallsEnforcer, NonceEnforcer, TimestampEnforcer, TimestampTerms};

use crate::error::{Error, Result};
use crate::execution::{CallType, ExecType, ExecutionMode};
use std::sync::{Mutex, MutexGuard};

/// Require a single-execution payload.
pub(crate) fn require_single(mode: ExecutionMode) -> Result<()> {
    if mode.call_type != CallType::Single {
        return Err(Error::InvalidCallType {
            actual: mode.call_type,
        });
    }
    Ok(())
}

/// Require a batch payload.
pub(crate) fn require_batch(mode: ExecutionMode) -> Result<()> {
    if mode.call_type != CallType::Batch {
        return Err(Error::InvalidCallType {
            actual: mode.call_type,
        });
    }
    Ok(())
}

/// Require the default (failure-propagating) exec type.
pub(crate) fn require_default(mode: ExecutionMode) -> Result<()> {
    if mode.exec_type != ExecType::Default {
        return Err(Error::InvalidExecType {
            actual: mode.exec_type,
        });
    }
    Ok(())
}

/// Lock an enforcer state map.
///
/// A poisoned mutex only means another thread panicked mid-hook; entries
/// are inserted whole, so the recovered guard is still consistent.
pub(crate) fn lock<T>(state: &Mutex<T>) -> MutexGuard<'_, T> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Fixed-width term readers shared by the enforcer decoders.
pub(crate) mod layout {
    use crate::delegation::Address;
    use crate::execution::read_array;

    pub(crate) fn address_at(data: &[u8], offset: usize) -> Address {
        Address(read_array::<32>(data, offset))
    }

    pub(crate) fn u128_at(data: &[u8], offset: usize) -> u128 {
        u128::from_be_bytes(read_array::<16>(data, offset))
    }

    pub(crate) fn u64_at(data: &[u8], offset: usize) -> u64 {
        u64::from_be_bytes(read_array::<8>(data, offset))
    }

    pub(crate) fn u32_at(data: &[u8], offset: usize) -> u32 {
        u32::from_be_bytes(read_array::<4>(data, offset))
    }

    pub(crate) fn selector_at(data: &[u8], offset: usize) -> [u8; 4] {
        read_array::<4>(data, offset)
    }
}
