//! Structural enforcers: exact-call matching and allow-lists.
//!
//! These are stateless shape checks on the guarded execution: byte-exact
//! call pinning, target/method/redeemer membership, and calldata bans.

use super::{layout, require_batch, require_single};
use crate::delegation::Address;
use crate::enforcer::{CaveatEnforcer, HookContext};
use crate::error::{Error, Result};
use crate::execution::Execution;
use std::collections::HashSet;

/// Decode an address allow-list: one or more concatenated 32-byte entries.
fn decode_address_set(enforcer: &'static str, terms: &[u8]) -> Result<HashSet<Address>> {
    if terms.is_empty() || terms.len() % 32 != 0 {
        return Err(Error::InvalidTermsLength {
            enforcer,
            len: terms.len(),
        });
    }
    Ok((0..terms.len() / 32)
        .map(|i| layout::address_at(terms, i * 32))
        .collect())
}

fn encode_address_set(addresses: &[Address]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(addresses.len() * 32);
    for address in addresses {
        buf.extend_from_slice(address.as_bytes());
    }
    buf
}

/// Pins the guarded execution to one exact `(target, value, payload)`.
///
/// Terms: a single-execution payload; comparison is byte-exact.
#[derive(Debug, Default)]
pub struct ExactExecutionEnforcer;

impl ExactExecutionEnforcer {
    /// Create the enforcer.
    pub fn new() -> Self {
        Self
    }

    /// Encode terms pinning `execution`.
    pub fn terms(execution: &Execution) -> Vec<u8> {
        execution.encode_single()
    }

    /// Strictly decode terms.
    pub fn decode_terms(terms: &[u8]) -> Result<Execution> {
        Execution::decode_single(terms).map_err(|_| Error::InvalidTermsLength {
            enforcer: "exact-execution",
            len: terms.len(),
        })
    }
}

impl CaveatEnforcer for ExactExecutionEnforcer {
    fn name(&self) -> &'static str {
        "exact-execution"
    }

    fn before_hook(
        &self,
        terms: &[u8],
        _args: &[u8],
        payload: &[u8],
        ctx: &HookContext<'_>,
    ) -> Result<()> {
        Self::decode_terms(terms)?;
        require_single(ctx.mode)?;
        if payload != terms {
            return Err(Error::InvalidExecution(
                "execution does not match the pinned call".to_string(),
            ));
        }
        Ok(())
    }
}

/// Pins a batch to an exact ordered list of executions.
///
/// Terms: a batch payload. The submitted batch must match element count and
/// every element byte-exactly.
#[derive(Debug, Default)]
pub struct ExactExecutionBatchEnforcer;

impl ExactExecutionBatchEnforcer {
    /// Create the enforcer.
    pub fn new() -> Self {
        Self
    }

    /// Encode terms pinning `executions`.
    pub fn terms(executions: &[Execution]) -> Vec<u8> {
        Execution::encode_batch(executions)
    }

    /// Strictly decode terms.
    pub fn decode_terms(terms: &[u8]) -> Result<Vec<Execution>> {
        Execution::decode_batch(terms).map_err(|_| Error::InvalidTermsLength {
            enforcer: "exact-execution-batch",
            len: terms.len(),
        })
    }
}

impl CaveatEnforcer for ExactExecutionBatchEnforcer {
    fn name(&self) -> &'static str {
        "exact-execution-batch"
    }

    fn before_hook(
        &self,
        terms: &[u8],
        _args: &[u8],
        payload: &[u8],
        ctx: &HookContext<'_>,
    ) -> Result<()> {
        let expected = Self::decode_terms(terms)?;
        require_batch(ctx.mode)?;
        let actual = Execution::decode_batch(payload)?;
        if actual.len() != expected.len() {
            return Err(Error::InvalidBatchSize {
                expected: expected.len(),
                actual: actual.len(),
            });
        }
        for (index, (want, got)) in expected.iter().zip(actual.iter()).enumerate() {
            if want != got {
                return Err(Error::InvalidExecution(format!(
                    "batch item {} does not match the pinned call",
                    index
                )));
            }
        }
        Ok(())
    }
}

/// Pins the guarded execution's calldata, leaving target and value free.
///
/// Terms: the expected calldata bytes (any length).
#[derive(Debug, Default)]
pub struct ExactCalldataEnforcer;

impl ExactCalldataEnforcer {
    /// Create the enforcer.
    pub fn new() -> Self {
        Self
    }

    /// Encode terms.
    pub fn terms(calldata: &[u8]) -> Vec<u8> {
        calldata.to_vec()
    }
}

impl CaveatEnforcer for ExactCalldataEnforcer {
    fn name(&self) -> &'static str {
        "exact-calldata"
    }

    fn before_hook(
        &self,
        terms: &[u8],
        _args: &[u8],
        payload: &[u8],
        ctx: &HookContext<'_>,
    ) -> Result<()> {
        require_single(ctx.mode)?;
        let execution = Execution::decode_single(payload)?;
        if execution.payload != terms {
            return Err(Error::InvalidExecution(
                "calldata does not match the pinned bytes".to_string(),
            ));
        }
        Ok(())
    }
}

/// Pins each batch item's calldata.
///
/// Terms: `count(4)` then per item `len(4) || calldata`. Strict: trailing
/// bytes are a terms error.
#[derive(Debug, Default)]
pub struct ExactCalldataBatchEnforcer;

impl ExactCalldataBatchEnforcer {
    /// Create the enforcer.
    pub fn new() -> Self {
        Self
    }

    /// Encode terms.
    pub fn terms(calldatas: &[Vec<u8>]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(calldatas.len() as u32).to_be_bytes());
        for calldata in calldatas {
            buf.extend_from_slice(&(calldata.len() as u32).to_be_bytes());
            buf.extend_from_slice(calldata);
        }
        buf
    }

    /// Strictly decode terms.
    pub fn decode_terms(terms: &[u8]) -> Result<Vec<Vec<u8>>> {
        let fail = || Error::InvalidTermsLength {
            enforcer: "exact-calldata-batch",
            len: terms.len(),
        };
        if terms.len() < 4 {
            return Err(fail());
        }
        let count = layout::u32_at(terms, 0) as usize;
        let mut offset = 4;
        let mut calldatas = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            if terms.len() < offset + 4 {
                return Err(fail());
            }
            let len = layout::u32_at(terms, offset) as usize;
            offset += 4;
            if terms.len() < offset + len {
                return Err(fail());
            }
            calldatas.push(terms[offset..offset + len].to_vec());
            offset += len;
        }
        if offset != terms.len() {
            return Err(fail());
        }
        Ok(calldatas)
    }
}

impl CaveatEnforcer for ExactCalldataBatchEnforcer {
    fn name(&self) -> &'static str {
        "exact-calldata-batch"
    }

    fn before_hook(
        &self,
        terms: &[u8],
        _args: &[u8],
        payload: &[u8],
        ctx: &HookContext<'_>,
    ) -> Result<()> {
        let expected = Self::decode_terms(terms)?;
        require_batch(ctx.mode)?;
        let executions = Execution::decode_batch(payload)?;
        if executions.len() != expected.len() {
            return Err(Error::InvalidBatchSize {
                expected: expected.len(),
                actual: executions.len(),
            });
        }
        for (index, (want, execution)) in expected.iter().zip(executions.iter()).enumerate() {
            if &execution.payload != want {
                return Err(Error::InvalidExecution(format!(
                    "batch item {} calldata does not match the pinned bytes",
                    index
                )));
            }
        }
        Ok(())
    }
}

/// Restricts execution targets to an allow-list.
///
/// Terms: one or more 32-byte addresses. Applies to every item of a batch.
#[derive(Debug, Default)]
pub struct AllowedTargetsEnforcer;

impl AllowedTargetsEnforcer {
    /// Create the enforcer.
    pub fn new() -> Self {
        Self
    }

    /// Encode terms.
    pub fn terms(targets: &[Address]) -> Vec<u8> {
        encode_address_set(targets)
    }

    /// Strictly decode terms.
    pub fn decode_terms(terms: &[u8]) -> Result<HashSet<Address>> {
        decode_address_set("allowed-targets", terms)
    }
}

impl CaveatEnforcer for AllowedTargetsEnforcer {
    fn name(&self) -> &'static str {
        "allowed-targets"
    }

    fn before_hook(
        &self,
        terms: &[u8],
        _args: &[u8],
        payload: &[u8],
        ctx: &HookContext<'_>,
    ) -> Result<()> {
        let allowed = Self::decode_terms(terms)?;
        let executions = Execution::decode_payload(payload, ctx.mode.call_type)?;
        for execution in &executions {
            if !allowed.contains(&execution.target) {
                return Err(Error::UnauthorizedTarget(execution.target));
            }
        }
        Ok(())
    }
}

/// Restricts calldata selectors to an allow-list.
///
/// Terms: one or more 4-byte selectors. Every execution must carry at
/// least a selector's worth of calldata.
#[derive(Debug, Default)]
pub struct AllowedMethodsEnforcer;

impl AllowedMethodsEnforcer {
    /// Create the enforcer.
    pub fn new() -> Self {
        Self
    }

    /// Encode terms.
    pub fn terms(selectors: &[[u8; 4]]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(selectors.len() * 4);
        for selector in selectors {
            buf.extend_from_slice(selector);
        }
        buf
    }

    /// Strictly decode terms.
    pub fn decode_terms(terms: &[u8]) -> Result<HashSet<[u8; 4]>> {
        if terms.is_empty() || terms.len() % 4 != 0 {
            return Err(Error::InvalidTermsLength {
                enforcer: "allowed-methods",
                len: terms.len(),
            });
        }
        Ok((0..terms.len() / 4)
            .map(|i| layout::selector_at(terms, i * 4))
            .collect())
    }
}

impl CaveatEnforcer for AllowedMethodsEnforcer {
    fn name(&self) -> &'static str {
        "allowed-methods"
    }

    fn before_hook(
        &self,
        terms: &[u8],
        _args: &[u8],
        payload: &[u8],
        ctx: &HookContext<'_>,
    ) -> Result<()> {
        let allowed = Self::decode_terms(terms)?;
        let executions = Execution::decode_payload(payload, ctx.mode.call_type)?;
        for execution in &executions {
            if execution.payload.len() < 4 {
                return Err(Error::InvalidExecution(
                    "calldata shorter than a selector".to_string(),
                ));
            }
            let selector = layout::selector_at(&execution.payload, 0);
            if !allowed.contains(&selector) {
                return Err(Error::UnauthorizedMethod { selector });
            }
        }
        Ok(())
    }
}

/// Requires every execution to carry empty calldata.
///
/// Terms: empty. Useful for pure value transfers.
#[derive(Debug, Default)]
pub struct NoCalldataEnforcer;

impl NoCalldataEnforcer {
    /// Create the enforcer.
    pub fn new() -> Self {
        Self
    }

    /// Encode (empty) terms.
    pub fn terms() -> Vec<u8> {
        Vec::new()
    }
}

impl CaveatEnforcer for NoCalldataEnforcer {
    fn name(&self) -> &'static str {
        "no-calldata"
    }

    fn before_hook(
        &self,
        terms: &[u8],
        _args: &[u8],
        payload: &[u8],
        ctx: &HookContext<'_>,
    ) -> Result<()> {
        if !terms.is_empty() {
            return Err(Error::InvalidTermsLength {
                enforcer: "no-calldata",
                len: terms.len(),
            });
        }
        let executions = Execution::decode_payload(payload, ctx.mode.call_type)?;
        for execution in &executions {
            if !execution.payload.is_empty() {
                return Err(Error::InvalidExecution(
                    "execution carries calldata".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Restricts who may redeem to an allow-list of principals.
///
/// Terms: one or more 32-byte addresses.
#[derive(Debug, Default)]
pub struct RedeemerEnforcer;

impl RedeemerEnforcer {
    /// Create the enforcer.
    pub fn new() -> Self {
        Self
    }

    /// Encode terms.
    pub fn terms(redeemers: &[Address]) -> Vec<u8> {
        encode_address_set(redeemers)
    }

    /// Strictly decode terms.
    pub fn decode_terms(terms: &[u8]) -> Result<HashSet<Address>> {
        decode_address_set("redeemer", terms)
    }
}

impl CaveatEnforcer for RedeemerEnforcer {
    fn name(&self) -> &'static str {
        "redeemer"
    }

    fn before_hook(
        &self,
        terms: &[u8],
        _args: &[u8],
        _payload: &[u8],
        ctx: &HookContext<'_>,
    ) -> Result<()> {
        let allowed = Self::decode_terms(terms)?;
        if !allowed.contains(&ctx.redeemer) {
            return Err(Error::UnauthorizedRedeemer(ctx.redeemer));
        }
        Ok(())
    }
}

/// Requires redemption-time args to equal the signed terms byte-exactly.
///
/// Lets a delegator pin what another caveat will receive as args - commonly
/// composed with the payment and swap enforcers to bind a nested context to
/// this delegation.
#[derive(Debug, Default)]
pub struct ArgsEqualityEnforcer;

impl ArgsEqualityEnforcer {
    /// Create the enforcer.
    pub fn new() -> Self {
        Self
    }
}

impl CaveatEnforcer for ArgsEqualityEnforcer {
    fn name(&self) -> &'static str {
        "args-equality"
    }

    fn before_hook(
        &self,
        terms: &[u8],
        args: &[u8],
        _payload: &[u8],
        _ctx: &HookContext<'_>,
    ) -> Result<()> {
        if args != terms {
            return Err(Error::InvalidExecution(
                "args do not match the pinned terms".to_string(),
            ));
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
    fn test_address_set_strictness() {
        assert!(decode_address_set("allowed-targets", &[]).is_err());
        assert!(decode_address_set("allowed-targets", &[0u8; 33]).is_err());
        let set = decode_address_set(
            "allowed-targets",
            &AllowedTargetsEnforcer::terms(&[addr(1), addr(2)]),
        )
        .unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains(&addr(1)));
    }

    #[test]
    fn test_exact_execution_terms() {
        let execution = Execution::new(addr(1), 5, vec![1, 2, 3]);
        let terms = ExactExecutionEnforcer::terms(&execution);
        assert_eq!(ExactExecutionEnforcer::decode_terms(&terms).unwrap(), execution);
        assert_eq!(
            ExactExecutionEnforcer::decode_terms(&terms[..40])
                .unwrap_err()
                .name(),
            "invalid-terms-length"
        );
    }

    #[test]
    fn test_calldata_batch_terms_roundtrip() {
        let calldatas = vec![vec![1, 2, 3], Vec::new(), vec![9; 40]];
        let terms = ExactCalldataBatchEnforcer::terms(&calldatas);
        assert_eq!(
            ExactCalldataBatchEnforcer::decode_terms(&terms).unwrap(),
            calldatas
        );

        // Trailing byte.
        let mut long = terms.clone();
        long.push(0);
        assert!(ExactCalldataBatchEnforcer::decode_terms(&long).is_err());
        // Truncated.
        assert!(ExactCalldataBatchEnforcer::decode_terms(&terms[..terms.len() - 1]).is_err());
    }

    #[test]
    fn test_allowed_methods_terms() {
        let terms = AllowedMethodsEnforcer::terms(&[[1, 2, 3, 4], [5, 6, 7, 8]]);
        let set = AllowedMethodsEnforcer::decode_terms(&terms).unwrap();
        assert!(set.contains(&[1, 2, 3, 4]));
        assert!(AllowedMethodsEnforcer::decode_terms(&terms[..7]).is_err());
        assert!(AllowedMethodsEnforcer::decode_terms(&[]).is_err());
    }
}
