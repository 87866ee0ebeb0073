//! Conditional-exchange enforcers built on nested redemption.
//!
//! Both enforcers here re-enter the engine from inside a hook, redeeming a
//! permission context the redeemer supplied via `args`, and then assert a
//! balance outcome. That nested context carries its own delegations and
//! caveats (typically a transfer-amount cap on the payer's side), so the
//! exchange composes from the same primitives as everything else. The
//! redeeming principal of the nested call is the enforcer's own address:
//! the nested chain's leaf must delegate to the enforcer.

use super::balance::signed_delta;
use super::{layout, lock, require_default, require_single};
use crate::delegation::{Address, DelegationHash};
use crate::enforcer::{CaveatEnforcer, HookContext};
use crate::error::{Error, Result};
use crate::execution::{self, Execution};
use crate::wire;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// Decoded swap-offer terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapOfferTerms {
    /// Asset the offer pays out.
    pub asset_out: Address,
    /// Asset the offer demands in return.
    pub asset_in: Address,
    /// Total amount of `asset_out` on offer.
    pub amount_out: u128,
    /// Amount of `asset_in` demanded for the full `amount_out`.
    pub amount_in: u128,
    /// Who must receive the `asset_in` payment.
    pub recipient: Address,
}

/// Rate-gated exchange offer.
///
/// Terms: `asset_out(32) || asset_in(32) || amount_out(16) || amount_in(16)
/// || recipient(32)`. The guarded execution must be a ledger transfer of
/// `asset_out`; the redeemer may claim any part of `amount_out` across any
/// number of uses, paying `asset_in` pro rata (rounded up) each time. The
/// payment is a nested redemption of the context supplied via `args`,
/// triggered synchronously inside the before-hook, and the recipient's
/// `asset_in` balance must grow by the required amount before the hook
/// returns.
#[derive(Debug, Default)]
pub struct SwapOfferEnforcer {
    claimed: Mutex<HashMap<(Address, DelegationHash), u128>>,
}

impl SwapOfferEnforcer {
    /// Create a fresh enforcer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode terms.
    pub fn terms(terms: &SwapOfferTerms) -> Vec<u8> {
        let mut buf = Vec::with_capacity(128);
        buf.extend_from_slice(terms.asset_out.as_bytes());
        buf.extend_from_slice(terms.asset_in.as_bytes());
        buf.extend_from_slice(&terms.amount_out.to_be_bytes());
        buf.extend_from_slice(&terms.amount_in.to_be_bytes());
        buf.extend_from_slice(terms.recipient.as_bytes());
        buf
    }

    /// Strictly decode and validate terms.
    pub fn decode_terms(terms: &[u8]) -> Result<SwapOfferTerms> {
        if terms.len() != 128 {
            return Err(Error::InvalidTermsLength {
                enforcer: "swap-offer",
                len: terms.len(),
            });
        }
        let decoded = SwapOfferTerms {
            asset_out: layout::address_at(terms, 0),
            asset_in: layout::address_at(terms, 32),
            amount_out: layout::u128_at(terms, 64),
            amount_in: layout::u128_at(terms, 80),
            recipient: layout::address_at(terms, 96),
        };
        if decoded.amount_out == 0 || decoded.amount_in == 0 {
            return Err(Error::InvalidTerms {
                enforcer: "swap-offer",
                reason: "offer amounts must be non-zero",
            });
        }
        Ok(decoded)
    }

    /// Amount of `asset_out` already claimed under `(caller, hash)`.
    pub fn claimed(&self, caller: Address, hash: DelegationHash) -> u128 {
        lock(&self.claimed)
            .get(&(caller, hash))
            .copied()
            .unwrap_or(0)
    }
}

impl CaveatEnforcer for SwapOfferEnforcer {
    fn name(&self) -> &'static str {
        "swap-offer"
    }

    fn before_hook(
        &self,
        terms: &[u8],
        args: &[u8],
        payload: &[u8],
        ctx: &HookContext<'_>,
    ) -> Result<()> {
        let terms = Self::decode_terms(terms)?;
        require_single(ctx.mode)?;
        require_default(ctx.mode)?;

        let outer = Execution::decode_single(payload)?;
        let call = execution::decode_transfer(&outer.payload)?;
        if call.asset != terms.asset_out {
            return Err(Error::InvalidAsset {
                expected: terms.asset_out,
                actual: call.asset,
            });
        }

        let requested = call.amount;
        let required_in = requested
            .checked_mul(terms.amount_in)
            .ok_or(Error::ArithmeticOverflow)?
            .div_ceil(terms.amount_out);

        let payment = wire::decode_context(args).map_err(|_| Error::InvalidArgsLength {
            enforcer: "swap-offer",
            len: args.len(),
        })?;

        // Commit the claim before the nested call so a re-entrant use of
        // the same offer sees it.
        let key = (ctx.caller(), ctx.delegation_hash);
        {
            let mut claimed = lock(&self.claimed);
            let used = claimed.get(&key).copied().unwrap_or(0);
            let remaining = terms.amount_out - used.min(terms.amount_out);
            if requested > remaining {
                return Err(Error::ExceedsOutputAmount {
                    requested,
                    remaining,
                });
            }
            claimed.insert(
                key,
                used.checked_add(requested).ok_or(Error::ArithmeticOverflow)?,
            );
        }
        let before = ctx.ledger().balance_of(terms.asset_in, terms.recipient);
        debug!(
            requested,
            required_in,
            recipient = %terms.recipient.short(),
            "swap offer triggering nested payment redemption"
        );
        ctx.engine.redeem_delegations(ctx.enforcer, &[payment])?;

        let current = ctx.ledger().balance_of(terms.asset_in, terms.recipient);
        let floor = before
            .checked_add(required_in)
            .ok_or(Error::ArithmeticOverflow)?;
        if current < floor {
            return Err(Error::InsufficientBalanceChange {
                expected: required_in,
                observed: signed_delta(before, current),
            });
        }
        Ok(())
    }
}

/// Decoded payment terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentTerms {
    /// Asset the payment must arrive in.
    pub asset: Address,
    /// Who must receive it.
    pub recipient: Address,
    /// Minimum amount.
    pub amount: u128,
}

/// Charges for a delegation's use by the end of its redemption.
///
/// Terms: `asset(32) || recipient(32) || amount(16)`. In the after-all
/// phase - after the guarded execution and every inner hook has unwound -
/// the enforcer redeems the payment context supplied via `args` and
/// requires the recipient's balance to have grown by at least `amount`.
/// Delegators typically pair this with an args-equality caveat on the
/// payment chain to pin which delegation the payment settles.
#[derive(Debug, Default)]
pub struct PaymentEnforcer;

impl PaymentEnforcer {
    /// Create the enforcer.
    pub fn new() -> Self {
        Self
    }

    /// Encode terms.
    pub fn terms(terms: &PaymentTerms) -> Vec<u8> {
        let mut buf = Vec::with_capacity(80);
        buf.extend_from_slice(terms.asset.as_bytes());
        buf.extend_from_slice(terms.recipient.as_bytes());
        buf.extend_from_slice(&terms.amount.to_be_bytes());
        buf
    }

    /// Strictly decode and validate terms.
    pub fn decode_terms(terms: &[u8]) -> Result<PaymentTerms> {
        if terms.len() != 80 {
            return Err(Error::InvalidTermsLength {
                enforcer: "payment",
                len: terms.len(),
            });
        }
        let decoded = PaymentTerms {
            asset: layout::address_at(terms, 0),
            recipient: layout::address_at(terms, 32),
            amount: layout::u128_at(terms, 64),
        };
        if decoded.amount == 0 {
            return Err(Error::InvalidTerms {
                enforcer: "payment",
                reason: "payment amount must be non-zero",
            });
        }
        Ok(decoded)
    }
}

impl CaveatEnforcer for PaymentEnforcer {
    fn name(&self) -> &'static str {
        "payment"
    }

    fn after_all_hook(
        &self,
        terms: &[u8],
        args: &[u8],
        _payload: &[u8],
        ctx: &HookContext<'_>,
    ) -> Result<()> {
        let terms = Self::decode_terms(terms)?;
        require_default(ctx.mode)?;

        let payment = wire::decode_context(args).map_err(|_| Error::InvalidArgsLength {
            enforcer: "payment",
            len: args.len(),
        })?;
        let before = ctx.ledger().balance_of(terms.asset, terms.recipient);
        debug!(
            amount = terms.amount,
            recipient = %terms.recipient.short(),
            "payment enforcer redeeming settlement context"
        );
        ctx.engine.redeem_delegations(ctx.enforcer, &[payment])?;

        let current = ctx.ledger().balance_of(terms.asset, terms.recipient);
        let floor = before
            .checked_add(terms.amount)
            .ok_or(Error::ArithmeticOverflow)?;
        if current < floor {
            return Err(Error::InsufficientBalanceChange {
                expected: terms.amount,
                observed: signed_delta(before, current),
            });
        }
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
    fn test_swap_terms_roundtrip() {
        let terms = SwapOfferTerms {
            asset_out: addr(1),
            asset_in: addr(2),
            amount_out: 100,
            amount_in: 50,
            recipient: addr(3),
        };
        let encoded = SwapOfferEnforcer::terms(&terms);
        assert_eq!(SwapOfferEnforcer::decode_terms(&encoded).unwrap(), terms);
        assert!(SwapOfferEnforcer::decode_terms(&encoded[..127]).is_err());
    }

    #[test]
    fn test_swap_terms_reject_zero_amounts() {
        let zero_out = SwapOfferEnforcer::terms(&SwapOfferTerms {
            asset_out: addr(1),
            asset_in: addr(2),
            amount_out: 0,
            amount_in: 50,
            recipient: addr(3),
        });
        assert_eq!(
            SwapOfferEnforcer::decode_terms(&zero_out).unwrap_err().name(),
            "invalid-terms"
        );
    }

    #[test]
    fn test_payment_terms() {
        let terms = PaymentTerms {
            asset: addr(1),
            recipient: addr(2),
            amount: 75,
        };
        let encoded = PaymentEnforcer::terms(&terms);
        assert_eq!(PaymentEnforcer::decode_terms(&encoded).unwrap(), terms);

        let zero = PaymentEnforcer::terms(&PaymentTerms { amount: 0, ..terms });
        assert_eq!(
            PaymentEnforcer::decode_terms(&zero).unwrap_err().name(),
            "invalid-terms"
        );
    }

    #[test]
    fn test_pro_rata_rounds_up() {
        // 40 of 100 offered at 50 in / 100 out -> 20 in; 1 of 3 at 1/3 -> 1.
        assert_eq!(40u128.checked_mul(50).unwrap().div_ceil(100), 20);
        assert_eq!(1u128.checked_mul(1).unwrap().div_ceil(3), 1);
    }
}
