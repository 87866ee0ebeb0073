//! Spend caps and allowances over ledger-transfer executions.
//!
//! These enforcers decode the guarded execution's calldata as a ledger
//! transfer and meter the transferred amount against a signed ceiling:
//! a flat cap, a linearly streaming allowance, or a per-period claim.

use super::{layout, lock, require_default, require_single};
use crate::delegation::{Address, DelegationHash};
use crate::enforcer::{CaveatEnforcer, HookContext};
use crate::error::{Error, Result};
use crate::execution::{self, Execution, TransferCall};
use std::collections::HashMap;
use std::sync::Mutex;

/// Decode a single-execution payload down to its transfer call.
fn transfer_from_payload(payload: &[u8]) -> Result<TransferCall> {
    let execution = Execution::decode_single(payload)?;
    execution::decode_transfer(&execution.payload)
}

/// Caps the cumulative amount transferred under one delegation.
///
/// Terms: `asset(32) || max(16)`. State: monotonic `spent` per
/// `(caller, delegation_hash)`.
#[derive(Debug, Default)]
pub struct TransferAmountEnforcer {
    spent: Mutex<HashMap<(Address, DelegationHash), u128>>,
}

/// Decoded transfer-amount terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferAmountTerms {
    /// Asset the cap applies to.
    pub asset: Address,
    /// Cumulative ceiling.
    pub max: u128,
}

impl TransferAmountEnforcer {
    /// Create a fresh enforcer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode terms.
    pub fn terms(asset: Address, max: u128) -> Vec<u8> {
        let mut buf = Vec::with_capacity(48);
        buf.extend_from_slice(asset.as_bytes());
        buf.extend_from_slice(&max.to_be_bytes());
        buf
    }

    /// Strictly decode terms.
    pub fn decode_terms(terms: &[u8]) -> Result<TransferAmountTerms> {
        if terms.len() != 48 {
            return Err(Error::InvalidTermsLength {
                enforcer: "transfer-amount",
                len: terms.len(),
            });
        }
        Ok(TransferAmountTerms {
            asset: layout::address_at(terms, 0),
            max: layout::u128_at(terms, 32),
        })
    }

    /// Amount already spent under `(caller, hash)`.
    pub fn spent(&self, caller: Address, hash: DelegationHash) -> u128 {
        lock(&self.spent).get(&(caller, hash)).copied().unwrap_or(0)
    }
}

impl CaveatEnforcer for TransferAmountEnforcer {
    fn name(&self) -> &'static str {
        "transfer-amount"
    }

    fn before_hook(
        &self,
        terms: &[u8],
        _args: &[u8],
        payload: &[u8],
        ctx: &HookContext<'_>,
    ) -> Result<()> {
        let terms = Self::decode_terms(terms)?;
        require_single(ctx.mode)?;
        require_default(ctx.mode)?;

        let call = transfer_from_payload(payload)?;
        if call.asset != terms.asset {
            return Err(Error::InvalidAsset {
                expected: terms.asset,
                actual: call.asset,
            });
        }

        let key = (ctx.caller(), ctx.delegation_hash);
        let mut spent = lock(&self.spent);
        let used = spent.get(&key).copied().unwrap_or(0);
        let total = used
            .checked_add(call.amount)
            .ok_or(Error::ArithmeticOverflow)?;
        if total > terms.max {
            return Err(Error::AllowanceExceeded {
                requested: call.amount,
                available: terms.max - used,
            });
        }
        spent.insert(key, total);
        Ok(())
    }
}

/// Caps the native `value` of each guarded execution.
///
/// Terms: `max(16)`. Stateless: the cap applies per execution, not
/// cumulatively.
#[derive(Debug, Default)]
pub struct ValueCapEnforcer;

impl ValueCapEnforcer {
    /// Create the enforcer.
    pub fn new() -> Self {
        Self
    }

    /// Encode terms.
    pub fn terms(max: u128) -> Vec<u8> {
        max.to_be_bytes().to_vec()
    }

    /// Strictly decode terms.
    pub fn decode_terms(terms: &[u8]) -> Result<u128> {
        if terms.len() != 16 {
            return Err(Error::InvalidTermsLength {
                enforcer: "value-cap",
                len: terms.len(),
            });
        }
        Ok(layout::u128_at(terms, 0))
    }
}

impl CaveatEnforcer for ValueCapEnforcer {
    fn name(&self) -> &'static str {
        "value-cap"
    }

    fn before_hook(
        &self,
        terms: &[u8],
        _args: &[u8],
        payload: &[u8],
        ctx: &HookContext<'_>,
    ) -> Result<()> {
        let max = Self::decode_terms(terms)?;
        require_single(ctx.mode)?;
        let execution = Execution::decode_single(payload)?;
        if execution.value > max {
            return Err(Error::AllowanceExceeded {
                requested: execution.value,
                available: max,
            });
        }
        Ok(())
    }
}

/// Linearly streaming allowance.
///
/// Terms: `asset(32) || initial(16) || max(16) || rate(16) || start(8)`.
/// Available at time `t >= start` is `min(max, initial + rate * (t - start))`,
/// zero before `start`. State: monotonic `spent` per `(caller, hash)`.
#[derive(Debug, Default)]
pub struct StreamingAllowanceEnforcer {
    spent: Mutex<HashMap<(Address, DelegationHash), u128>>,
}

/// Decoded streaming terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamingTerms {
    /// Asset being streamed.
    pub asset: Address,
    /// Amount unlocked at `start`.
    pub initial: u128,
    /// Hard ceiling the stream never exceeds.
    pub max: u128,
    /// Unlock rate per second.
    pub rate: u128,
    /// Stream start, UNIX seconds.
    pub start: u64,
}

impl StreamingTerms {
    /// Total unlocked at `now`, saturating at `max`.
    pub fn available(&self, now: u64) -> u128 {
        if now < self.start {
            return 0;
        }
        let elapsed = (now - self.start) as u128;
        self.rate
            .checked_mul(elapsed)
            .and_then(|accrued| self.initial.checked_add(accrued))
            .map_or(self.max, |total| total.min(self.max))
    }
}

impl StreamingAllowanceEnforcer {
    /// Create a fresh enforcer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode terms.
    pub fn terms(asset: Address, initial: u128, max: u128, rate: u128, start: u64) -> Vec<u8> {
        let mut buf = Vec::with_capacity(88);
        buf.extend_from_slice(asset.as_bytes());
        buf.extend_from_slice(&initial.to_be_bytes());
        buf.extend_from_slice(&max.to_be_bytes());
        buf.extend_from_slice(&rate.to_be_bytes());
        buf.extend_from_slice(&start.to_be_bytes());
        buf
    }

    /// Strictly decode and validate terms.
    pub fn decode_terms(terms: &[u8]) -> Result<StreamingTerms> {
        if terms.len() != 88 {
            return Err(Error::InvalidTermsLength {
                enforcer: "streaming-allowance",
                len: terms.len(),
            });
        }
        let decoded = StreamingTerms {
            asset: layout::address_at(terms, 0),
            initial: layout::u128_at(terms, 32),
            max: layout::u128_at(terms, 48),
            rate: layout::u128_at(terms, 64),
            start: layout::u64_at(terms, 80),
        };
        if decoded.initial > decoded.max {
            return Err(Error::InvalidTerms {
                enforcer: "streaming-allowance",
                reason: "initial amount exceeds max",
            });
        }
        Ok(decoded)
    }

    /// Amount already spent under `(caller, hash)`.
    pub fn spent(&self, caller: Address, hash: DelegationHash) -> u128 {
        lock(&self.spent).get(&(caller, hash)).copied().unwrap_or(0)
    }
}

impl CaveatEnforcer for StreamingAllowanceEnforcer {
    fn name(&self) -> &'static str {
        "streaming-allowance"
    }

    fn before_hook(
        &self,
        terms: &[u8],
        _args: &[u8],
        payload: &[u8],
        ctx: &HookContext<'_>,
    ) -> Result<()> {
        let terms = Self::decode_terms(terms)?;
        require_single(ctx.mode)?;
        require_default(ctx.mode)?;

        let call = transfer_from_payload(payload)?;
        if call.asset != terms.asset {
            return Err(Error::InvalidAsset {
                expected: terms.asset,
                actual: call.asset,
            });
        }

        let key = (ctx.caller(), ctx.delegation_hash);
        let mut spent = lock(&self.spent);
        let used = spent.get(&key).copied().unwrap_or(0);
        let available = terms.available(ctx.now()).saturating_sub(used);
        if call.amount > available {
            return Err(Error::AllowanceExceeded {
                requested: call.amount,
                available,
            });
        }
        let total = used
            .checked_add(call.amount)
            .ok_or(Error::ArithmeticOverflow)?;
        spent.insert(key, total);
        Ok(())
    }
}

/// Per-period claim tracking shared by the periodic enforcers.
#[derive(Debug, Clone, Copy)]
struct PeriodEntry {
    period_index: u64,
    claimed: u128,
}

/// One periodic configuration: `amount` of `asset` per `period`, from `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodConfig {
    /// Asset the allowance covers.
    pub asset: Address,
    /// Claimable amount per period.
    pub amount: u128,
    /// Period length in seconds.
    pub period: u64,
    /// First period start, UNIX seconds.
    pub start: u64,
}

impl PeriodConfig {
    const WIDTH: usize = 64;

    fn decode_at(enforcer: &'static str, terms: &[u8], offset: usize) -> Result<Self> {
        let config = PeriodConfig {
            asset: layout::address_at(terms, offset),
            amount: layout::u128_at(terms, offset + 32),
            period: layout::u64_at(terms, offset + 48),
            start: layout::u64_at(terms, offset + 56),
        };
        if config.amount == 0 {
            return Err(Error::InvalidTerms {
                enforcer,
                reason: "period amount must be non-zero",
            });
        }
        if config.period == 0 {
            return Err(Error::InvalidTerms {
                enforcer,
                reason: "period duration must be non-zero",
            });
        }
        Ok(config)
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.asset.as_bytes());
        buf.extend_from_slice(&self.amount.to_be_bytes());
        buf.extend_from_slice(&self.period.to_be_bytes());
        buf.extend_from_slice(&self.start.to_be_bytes());
    }

    /// Check a claim of `amount` at `now` against `entry`, returning the
    /// updated entry on success.
    fn claim(
        &self,
        now: u64,
        amount: u128,
        entry: Option<PeriodEntry>,
    ) -> Result<PeriodEntry> {
        if now < self.start {
            return Err(Error::ClaimNotStarted {
                start: self.start,
                now,
            });
        }
        let current = (now - self.start) / self.period;
        let claimed = match entry {
            Some(entry) if entry.period_index == current => entry.claimed,
            // New period: the counter resets.
            _ => 0,
        };
        let total = claimed.checked_add(amount).ok_or(Error::ArithmeticOverflow)?;
        if total > self.amount {
            return Err(Error::ClaimAmountExceeded {
                requested: amount,
                available: self.amount - claimed,
            });
        }
        Ok(PeriodEntry {
            period_index: current,
            claimed: total,
        })
    }
}

/// Fixed amount claimable per period, resetting on each period boundary.
///
/// Terms: one [`PeriodConfig`]: `asset(32) || amount(16) || period(8) ||
/// start(8)`. State per `(caller, hash)`.
#[derive(Debug, Default)]
pub struct PeriodicAllowanceEnforcer {
    state: Mutex<HashMap<(Address, DelegationHash), PeriodEntry>>,
}

impl PeriodicAllowanceEnforcer {
    /// Create a fresh enforcer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode terms.
    pub fn terms(config: PeriodConfig) -> Vec<u8> {
        let mut buf = Vec::with_capacity(PeriodConfig::WIDTH);
        config.encode_into(&mut buf);
        buf
    }

    /// Strictly decode and validate terms.
    pub fn decode_terms(terms: &[u8]) -> Result<PeriodConfig> {
        if terms.len() != PeriodConfig::WIDTH {
            return Err(Error::InvalidTermsLength {
                enforcer: "periodic-allowance",
                len: terms.len(),
            });
        }
        PeriodConfig::decode_at("periodic-allowance", terms, 0)
    }
}

impl CaveatEnforcer for PeriodicAllowanceEnforcer {
    fn name(&self) -> &'static str {
        "periodic-allowance"
    }

    fn before_hook(
        &self,
        terms: &[u8],
        _args: &[u8],
        payload: &[u8],
        ctx: &HookContext<'_>,
    ) -> Result<()> {
        let config = Self::decode_terms(terms)?;
        require_single(ctx.mode)?;
        require_default(ctx.mode)?;

        let call = transfer_from_payload(payload)?;
        if call.asset != config.asset {
            return Err(Error::InvalidAsset {
                expected: config.asset,
                actual: call.asset,
            });
        }

        let key = (ctx.caller(), ctx.delegation_hash);
        let mut state = lock(&self.state);
        let updated = config.claim(ctx.now(), call.amount, state.get(&key).copied())?;
        state.insert(key, updated);
        Ok(())
    }
}

/// Several periodic configurations under one caveat; redemption-time args
/// select which one a use draws from.
///
/// Terms: one or more concatenated [`PeriodConfig`]s. Args: `index(4)`.
/// State per `(caller, hash, asset)`, so configs for different assets meter
/// independently.
#[derive(Debug, Default)]
pub struct MultiAssetPeriodEnforcer {
    state: Mutex<HashMap<(Address, DelegationHash, Address), PeriodEntry>>,
}

impl MultiAssetPeriodEnforcer {
    /// Create a fresh enforcer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode terms.
    pub fn terms(configs: &[PeriodConfig]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(configs.len() * PeriodConfig::WIDTH);
        for config in configs {
            config.encode_into(&mut buf);
        }
        buf
    }

    /// Encode args selecting config `index`.
    pub fn args(index: u32) -> Vec<u8> {
        index.to_be_bytes().to_vec()
    }

    /// Strictly decode and validate terms.
    pub fn decode_terms(terms: &[u8]) -> Result<Vec<PeriodConfig>> {
        if terms.is_empty() || terms.len() % PeriodConfig::WIDTH != 0 {
            return Err(Error::InvalidTermsLength {
                enforcer: "multi-asset-period",
                len: terms.len(),
            });
        }
        (0..terms.len() / PeriodConfig::WIDTH)
            .map(|i| PeriodConfig::decode_at("multi-asset-period", terms, i * PeriodConfig::WIDTH))
            .collect()
    }
}

impl CaveatEnforcer for MultiAssetPeriodEnforcer {
    fn name(&self) -> &'static str {
        "multi-asset-period"
    }

    fn before_hook(
        &self,
        terms: &[u8],
        args: &[u8],
        payload: &[u8],
        ctx: &HookContext<'_>,
    ) -> Result<()> {
        let configs = Self::decode_terms(terms)?;
        require_single(ctx.mode)?;
        require_default(ctx.mode)?;

        if args.len() != 4 {
            return Err(Error::InvalidArgsLength {
                enforcer: "multi-asset-period",
                len: args.len(),
            });
        }
        let index = layout::u32_at(args, 0);
        let config = configs.get(index as usize).ok_or(Error::InvalidGroupIndex {
            index,
            groups: configs.len() as u32,
        })?;

        let call = transfer_from_payload(payload)?;
        if call.asset != config.asset {
            return Err(Error::InvalidAsset {
                expected: config.asset,
                actual: call.asset,
            });
        }

        let key = (ctx.caller(), ctx.delegation_hash, config.asset);
        let mut state = lock(&self.state);
        let updated = config.claim(ctx.now(), call.amount, state.get(&key).copied())?;
        state.insert(key, updated);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address([byte; 32])
    }

    #[test]
    fn test_transfer_amount_terms_roundtrip() {
        let terms = TransferAmountEnforcer::terms(addr(1), 500);
        let decoded = TransferAmountEnforcer::decode_terms(&terms).unwrap();
        assert_eq!(decoded.asset, addr(1));
        assert_eq!(decoded.max, 500);

        assert_eq!(
            TransferAmountEnforcer::decode_terms(&terms[..47])
                .unwrap_err()
                .name(),
            "invalid-terms-length"
        );
        let mut long = terms.clone();
        long.push(0);
        assert!(TransferAmountEnforcer::decode_terms(&long).is_err());
    }

    #[test]
    fn test_streaming_terms_validation() {
        let terms = StreamingAllowanceEnforcer::terms(addr(1), 10, 100, 2, 1000);
        let decoded = StreamingAllowanceEnforcer::decode_terms(&terms).unwrap();
        assert_eq!(decoded.initial, 10);
        assert_eq!(decoded.rate, 2);

        let inverted = StreamingAllowanceEnforcer::terms(addr(1), 200, 100, 2, 1000);
        assert_eq!(
            StreamingAllowanceEnforcer::decode_terms(&inverted)
                .unwrap_err()
                .name(),
            "invalid-terms"
        );
    }

    #[test]
    fn test_streaming_available_curve() {
        let terms = StreamingTerms {
            asset: addr(1),
            initial: 10,
            max: 100,
            rate: 2,
            start: 1000,
        };
        assert_eq!(terms.available(999), 0);
        assert_eq!(terms.available(1000), 10);
        assert_eq!(terms.available(1010), 30);
        // Saturates at max.
        assert_eq!(terms.available(10_000), 100);
        // Overflow in the accrual product clamps to max.
        let hot = StreamingTerms {
            asset: addr(1),
            initial: 0,
            max: 100,
            rate: u128::MAX,
            start: 0,
        };
        assert_eq!(hot.available(u64::MAX), 100);
    }

    #[test]
    fn test_period_config_validation() {
        let good = PeriodConfig {
            asset: addr(1),
            amount: 5,
            period: 60,
            start: 0,
        };
        let terms = PeriodicAllowanceEnforcer::terms(good);
        assert_eq!(PeriodicAllowanceEnforcer::decode_terms(&terms).unwrap(), good);

        let zero_period = PeriodicAllowanceEnforcer::terms(PeriodConfig {
            period: 0,
            ..good
        });
        assert_eq!(
            PeriodicAllowanceEnforcer::decode_terms(&zero_period)
                .unwrap_err()
                .name(),
            "invalid-terms"
        );

        let zero_amount = PeriodicAllowanceEnforcer::terms(PeriodConfig { amount: 0, ..good });
        assert!(PeriodicAllowanceEnforcer::decode_terms(&zero_amount).is_err());
    }

    #[test]
    fn test_period_claim_resets_on_boundary() {
        let config = PeriodConfig {
            asset: addr(1),
            amount: 10,
            period: 100,
            start: 1000,
        };
        let err = config.claim(999, 1, None).unwrap_err();
        assert_eq!(err.name(), "claim-not-started");

        let entry = config.claim(1000, 10, None).unwrap();
        assert_eq!(entry.claimed, 10);
        // Same period: exhausted.
        let err = config.claim(1099, 1, Some(entry)).unwrap_err();
        assert_eq!(err.name(), "claim-amount-exceeded");
        // Next period: resets.
        let entry = config.claim(1100, 10, Some(entry)).unwrap();
        assert_eq!(entry.period_index, 1);
        assert_eq!(entry.claimed, 10);
    }

    #[test]
    fn test_multi_asset_terms_strictness() {
        let configs = [
            PeriodConfig {
                asset: addr(1),
                amount: 5,
                period: 60,
                start: 0,
            },
            PeriodConfig {
                asset: addr(2),
                amount: 7,
                period: 120,
                start: 10,
            },
        ];
        let terms = MultiAssetPeriodEnforcer::terms(&configs);
        assert_eq!(
            MultiAssetPeriodEnforcer::decode_terms(&terms).unwrap(),
            configs
        );

        assert!(MultiAssetPeriodEnforcer::decode_terms(&[]).is_err());
        assert!(MultiAssetPeriodEnforcer::decode_terms(&terms[..100]).is_err());
    }
}
