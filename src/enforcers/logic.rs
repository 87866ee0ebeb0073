//! Logical-OR composition.
//!
//! Caveat concatenation across a chain is an implicit AND; this wrapper is
//! the framework's sole disjunction primitive. The signed terms carry
//! several named groups of caveats, and the redeemer's args select exactly
//! one group to evaluate. The selection conveys nothing beyond which
//! branch runs - every branch definition originates from the signed terms.

use crate::delegation::Address;
use crate::enforcer::{CaveatEnforcer, HookContext};
use crate::error::{Error, Result};
use crate::execution::read_array;

/// One caveat inside a group: enforcer reference plus signed terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaveatSpec {
    /// Enforcer the caveat resolves to.
    pub enforcer: Address,
    /// Signed terms handed to that enforcer.
    pub terms: Vec<u8>,
}

/// Hook phase the wrapper forwards.
#[derive(Debug, Clone, Copy)]
enum Phase {
    BeforeAll,
    Before,
    After,
    AfterAll,
}

/// Evaluates exactly one redeemer-selected group of caveats.
///
/// Terms: `group_count(4)` then per group `caveat_count(4)` and per caveat
/// `enforcer(32) || terms_len(4) || terms`. Args: `group_index(4)` then one
/// `args_len(4) || args` entry per caveat of the selected group.
#[derive(Debug, Default)]
pub struct LogicalOrWrapperEnforcer;

impl LogicalOrWrapperEnforcer {
    /// Create the enforcer.
    pub fn new() -> Self {
        Self
    }

    /// Encode terms from caveat groups.
    pub fn terms(groups: &[Vec<CaveatSpec>]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(groups.len() as u32).to_be_bytes());
        for group in groups {
            buf.extend_from_slice(&(group.len() as u32).to_be_bytes());
            for spec in group {
                buf.extend_from_slice(spec.enforcer.as_bytes());
                buf.extend_from_slice(&(spec.terms.len() as u32).to_be_bytes());
                buf.extend_from_slice(&spec.terms);
            }
        }
        buf
    }

    /// Encode args selecting `group_index` and supplying per-caveat args.
    pub fn args(group_index: u32, caveat_args: &[Vec<u8>]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&group_index.to_be_bytes());
        for args in caveat_args {
            buf.extend_from_slice(&(args.len() as u32).to_be_bytes());
            buf.extend_from_slice(args);
        }
        buf
    }

    /// Strictly decode and validate terms.
    pub fn decode_terms(terms: &[u8]) -> Result<Vec<Vec<CaveatSpec>>> {
        let fail = || Error::InvalidTermsLength {
            enforcer: "logical-or-wrapper",
            len: terms.len(),
        };
        if terms.len() < 4 {
            return Err(fail());
        }
        let group_count = u32::from_be_bytes(read_array::<4>(terms, 0)) as usize;
        let mut offset = 4;
        let mut groups = Vec::with_capacity(group_count.min(256));
        for _ in 0..group_count {
            if terms.len() < offset + 4 {
                return Err(fail());
            }
            let caveat_count = u32::from_be_bytes(read_array::<4>(terms, offset)) as usize;
            offset += 4;
            let mut group = Vec::with_capacity(caveat_count.min(256));
            for _ in 0..caveat_count {
                if terms.len() < offset + 36 {
                    return Err(fail());
                }
                let enforcer = Address(read_array::<32>(terms, offset));
                let terms_len = u32::from_be_bytes(read_array::<4>(terms, offset + 32)) as usize;
                offset += 36;
                if terms.len() < offset + terms_len {
                    return Err(fail());
                }
                group.push(CaveatSpec {
                    enforcer,
                    terms: terms[offset..offset + terms_len].to_vec(),
                });
                offset += terms_len;
            }
            groups.push(group);
        }
        if offset != terms.len() {
            return Err(fail());
        }
        if groups.is_empty() {
            return Err(Error::InvalidTerms {
                enforcer: "logical-or-wrapper",
                reason: "terms define no groups",
            });
        }
        if groups.iter().any(|group| group.is_empty()) {
            return Err(Error::InvalidTerms {
                enforcer: "logical-or-wrapper",
                reason: "a group with no caveats would pass vacuously",
            });
        }
        Ok(groups)
    }

    /// Decode args against decoded groups: the selection plus per-caveat args.
    fn decode_selection<'g>(
        groups: &'g [Vec<CaveatSpec>],
        args: &[u8],
    ) -> Result<(&'g [CaveatSpec], Vec<Vec<u8>>)> {
        let fail = || Error::InvalidArgsLength {
            enforcer: "logical-or-wrapper",
            len: args.len(),
        };
        if args.len() < 4 {
            return Err(fail());
        }
        let index = u32::from_be_bytes(read_array::<4>(args, 0));
        let group = groups
            .get(index as usize)
            .ok_or(Error::InvalidGroupIndex {
                index,
                groups: groups.len() as u32,
            })?;

        let mut offset = 4;
        let mut caveat_args = Vec::with_capacity(group.len());
        while offset < args.len() {
            if args.len() < offset + 4 {
                return Err(fail());
            }
            let len = u32::from_be_bytes(read_array::<4>(args, offset)) as usize;
            offset += 4;
            if args.len() < offset + len {
                return Err(fail());
            }
            caveat_args.push(args[offset..offset + len].to_vec());
            offset += len;
        }
        if caveat_args.len() != group.len() {
            return Err(Error::InvalidCaveatArgsLength {
                expected: group.len(),
                actual: caveat_args.len(),
            });
        }
        Ok((group.as_slice(), caveat_args))
    }

    /// Forward one phase to the selected group through the registry.
    fn forward(
        &self,
        phase: Phase,
        terms: &[u8],
        args: &[u8],
        payload: &[u8],
        ctx: &HookContext<'_>,
    ) -> Result<()> {
        let groups = Self::decode_terms(terms)?;
        let (group, caveat_args) = Self::decode_selection(&groups, args)?;

        // After phases unwind the group in reverse, matching the engine's
        // own caveat ordering.
        let order: Vec<usize> = match phase {
            Phase::BeforeAll | Phase::Before => (0..group.len()).collect(),
            Phase::After | Phase::AfterAll => (0..group.len()).rev().collect(),
        };

        for index in order {
            let spec = &group[index];
            let enforcer = ctx.engine.registry().resolve(spec.enforcer)?;
            let sub_ctx = HookContext {
                engine: ctx.engine,
                enforcer: spec.enforcer,
                redeemer: ctx.redeemer,
                delegator: ctx.delegator,
                delegation_hash: ctx.delegation_hash,
                mode: ctx.mode,
            };
            let sub_args = &caveat_args[index];
            match phase {
                Phase::BeforeAll => {
                    enforcer.before_all_hook(&spec.terms, sub_args, payload, &sub_ctx)?
                }
                Phase::Before => enforcer.before_hook(&spec.terms, sub_args, payload, &sub_ctx)?,
                Phase::After => enforcer.after_hook(&spec.terms, sub_args, payload, &sub_ctx)?,
                Phase::AfterAll => {
                    enforcer.after_all_hook(&spec.terms, sub_args, payload, &sub_ctx)?
                }
            }
        }
        Ok(())
    }
}

impl CaveatEnforcer for LogicalOrWrapperEnforcer {
    fn name(&self) -> &'static str {
        "logical-or-wrapper"
    }

    fn before_all_hook(
        &self,
        terms: &[u8],
        args: &[u8],
        payload: &[u8],
        ctx: &HookContext<'_>,
    ) -> Result<()> {
        self.forward(Phase::BeforeAll, terms, args, payload, ctx)
    }

    fn before_hook(
        &self,
        terms: &[u8],
        args: &[u8],
        payload: &[u8],
        ctx: &HookContext<'_>,
    ) -> Result<()> {
        self.forward(Phase::Before, terms, args, payload, ctx)
    }

    fn after_hook(
        &self,
        terms: &[u8],
        args: &[u8],
        payload: &[u8],
        ctx: &HookContext<'_>,
    ) -> Result<()> {
        self.forward(Phase::After, terms, args, payload, ctx)
    }

    fn after_all_hook(
        &self,
        terms: &[u8],
        args: &[u8],
        payload: &[u8],
        ctx: &HookContext<'_>,
    ) -> Result<()> {
        self.forward(Phase::AfterAll, terms, args, payload, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address([byte; 32])
    }

    fn sample_groups() -> Vec<Vec<CaveatSpec>> {
        vec![
            vec![CaveatSpec {
                enforcer: addr(1),
                terms: vec![1, 2, 3],
            }],
            vec![
                CaveatSpec {
                    enforcer: addr(2),
                    terms: Vec::new(),
                },
                CaveatSpec {
                    enforcer: addr(3),
                    terms: vec![9; 16],
                },
            ],
        ]
    }

    #[test]
    fn test_terms_roundtrip() {
        let groups = sample_groups();
        let terms = LogicalOrWrapperEnforcer::terms(&groups);
        assert_eq!(LogicalOrWrapperEnforcer::decode_terms(&terms).unwrap(), groups);
    }

    #[test]
    fn test_terms_strictness() {
        let terms = LogicalOrWrapperEnforcer::terms(&sample_groups());
        assert!(LogicalOrWrapperEnforcer::decode_terms(&terms[..terms.len() - 1]).is_err());
        let mut long = terms.clone();
        long.push(0);
        assert!(LogicalOrWrapperEnforcer::decode_terms(&long).is_err());
        assert!(LogicalOrWrapperEnforcer::decode_terms(&[]).is_err());
    }

    #[test]
    fn test_terms_reject_empty_groups() {
        let none = LogicalOrWrapperEnforcer::terms(&[]);
        assert_eq!(
            LogicalOrWrapperEnforcer::decode_terms(&none).unwrap_err().name(),
            "invalid-terms"
        );
        let vacuous = LogicalOrWrapperEnforcer::terms(&[Vec::new()]);
        assert_eq!(
            LogicalOrWrapperEnforcer::decode_terms(&vacuous)
                .unwrap_err()
                .name(),
            "invalid-terms"
        );
    }

    #[test]
    fn test_selection_decoding() {
        let groups = sample_groups();
        let args = LogicalOrWrapperEnforcer::args(1, &[vec![7], vec![8, 9]]);
        let (group, caveat_args) =
            LogicalOrWrapperEnforcer::decode_selection(&groups, &args).unwrap();
        assert_eq!(group.len(), 2);
        assert_eq!(caveat_args, vec![vec![7], vec![8, 9]]);
    }

    #[test]
    fn test_selection_bad_index() {
        let groups = sample_groups();
        let args = LogicalOrWrapperEnforcer::args(5, &[]);
        let err = LogicalOrWrapperEnforcer::decode_selection(&groups, &args).unwrap_err();
        assert_eq!(err.name(), "invalid-group-index");
    }

    #[test]
    fn test_selection_args_count_mismatch() {
        let groups = sample_groups();
        // Group 1 has two caveats; one args entry supplied.
        let args = LogicalOrWrapperEnforcer::args(1, &[vec![7]]);
        let err = LogicalOrWrapperEnforcer::decode_selection(&groups, &args).unwrap_err();
        assert_eq!(err.name(), "invalid-caveat-args-length");
    }
}
