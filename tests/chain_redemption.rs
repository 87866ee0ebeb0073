//! End-to-end redemption engine semantics: chain validation, hook
//! ordering, execution modes, and atomicity at the call boundary.

mod common;

use common::*;
use mandate::{
    AcceptAllVerifier, Address, CaveatEnforcer, Delegation, Execution, ExecutionMode,
    HookContext, InMemoryLedger, Ledger, PermissionContext, RedemptionEngine,
};
use std::sync::{Arc, Mutex};

#[test]
fn single_hop_redemption_executes_transfer() {
    let h = Harness::new();
    h.ledger.set_balance(TOKEN_A, ALICE, 100);

    let delegation = sign(
        Delegation::builder()
            .delegator(ALICE)
            .delegate(BOB)
            .random_salt()
            .build_unsigned()
            .unwrap(),
    );

    let execution = transfer_exec(TOKEN_A, CHARLIE, 40);
    let outcomes = h
        .engine
        .redeem_delegations(BOB, &[single_ctx(vec![delegation], &execution)])
        .unwrap();

    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].results[0].is_success());
    assert_eq!(h.ledger.balance_of(TOKEN_A, ALICE), 60);
    assert_eq!(h.ledger.balance_of(TOKEN_A, CHARLIE), 40);
}

#[test]
fn two_hop_chain_executes_as_root_delegator() {
    let h = Harness::new();
    h.ledger.set_balance(TOKEN_A, ALICE, 100);

    let root = sign(
        Delegation::builder()
            .delegator(ALICE)
            .delegate(BOB)
            .random_salt()
            .build_unsigned()
            .unwrap(),
    );
    let leaf = sign(
        Delegation::builder()
            .delegator(BOB)
            .delegate(CHARLIE)
            .parent(&root)
            .unwrap()
            .random_salt()
            .build_unsigned()
            .unwrap(),
    );

    let execution = transfer_exec(TOKEN_A, DAVE, 25);
    h.engine
        .redeem_delegations(CHARLIE, &[single_ctx(vec![root, leaf], &execution)])
        .unwrap();

    // The transfer debits the root delegator, not any intermediary.
    assert_eq!(h.ledger.balance_of(TOKEN_A, ALICE), 75);
    assert_eq!(h.ledger.balance_of(TOKEN_A, DAVE), 25);
}

#[test]
fn empty_chain_is_self_execution() {
    let h = Harness::new();
    h.ledger.set_balance(TOKEN_A, BOB, 50);

    let execution = transfer_exec(TOKEN_A, CHARLIE, 10);
    h.engine
        .redeem_delegations(BOB, &[single_ctx(Vec::new(), &execution)])
        .unwrap();

    assert_eq!(h.ledger.balance_of(TOKEN_A, BOB), 40);
    assert_eq!(h.ledger.balance_of(TOKEN_A, CHARLIE), 10);
}

#[test]
fn non_root_first_delegation_breaks_chain() {
    let h = Harness::new();
    let fake_parent = mandate::DelegationHash::from([9u8; 32]);
    let delegation = sign(
        Delegation::builder()
            .delegator(ALICE)
            .delegate(BOB)
            .authority(mandate::Authority::Delegation(fake_parent))
            .build_unsigned()
            .unwrap(),
    );

    let err = h
        .engine
        .redeem_delegations(BOB, &[single_ctx(vec![delegation], &transfer_exec(TOKEN_A, BOB, 1))])
        .unwrap_err();
    assert_eq!(err.name(), "chain-broken");
}

#[test]
fn wrong_parent_hash_breaks_chain() {
    let h = Harness::new();
    let root = sign(
        Delegation::builder()
            .delegator(ALICE)
            .delegate(BOB)
            .salt(1)
            .build_unsigned()
            .unwrap(),
    );
    let unrelated = Delegation::builder()
        .delegator(ALICE)
        .delegate(BOB)
        .salt(2)
        .build_unsigned()
        .unwrap();
    let leaf = sign(
        Delegation::builder()
            .delegator(BOB)
            .delegate(CHARLIE)
            .parent(&unrelated)
            .unwrap()
            .build_unsigned()
            .unwrap(),
    );

    let err = h
        .engine
        .redeem_delegations(
            CHARLIE,
            &[single_ctx(vec![root, leaf], &transfer_exec(TOKEN_A, BOB, 1))],
        )
        .unwrap_err();
    assert_eq!(err.name(), "chain-broken");
}

#[test]
fn delegator_discontinuity_breaks_chain() {
    let h = Harness::new();
    let root = sign(
        Delegation::builder()
            .delegator(ALICE)
            .delegate(BOB)
            .build_unsigned()
            .unwrap(),
    );
    // Charlie was never granted anything by the root's delegate.
    let leaf = sign(
        Delegation::builder()
            .delegator(CHARLIE)
            .delegate(DAVE)
            .parent(&root)
            .unwrap()
            .build_unsigned()
            .unwrap(),
    );

    let err = h
        .engine
        .redeem_delegations(
            DAVE,
            &[single_ctx(vec![root, leaf], &transfer_exec(TOKEN_A, BOB, 1))],
        )
        .unwrap_err();
    assert_eq!(err.name(), "chain-broken");
}

#[test]
fn leaf_delegate_must_match_redeemer() {
    let h = Harness::new();
    let delegation = sign(
        Delegation::builder()
            .delegator(ALICE)
            .delegate(BOB)
            .build_unsigned()
            .unwrap(),
    );

    let err = h
        .engine
        .redeem_delegations(
            CHARLIE,
            &[single_ctx(vec![delegation], &transfer_exec(TOKEN_A, BOB, 1))],
        )
        .unwrap_err();
    assert_eq!(err.name(), "invalid-delegate");
}

#[test]
fn tampered_signature_is_rejected() {
    let h = Harness::new();
    h.ledger.set_balance(TOKEN_A, ALICE, 100);

    let mut delegation = sign(
        Delegation::builder()
            .delegator(ALICE)
            .delegate(BOB)
            .build_unsigned()
            .unwrap(),
    );
    delegation.signature[0] ^= 0xff;

    let err = h
        .engine
        .redeem_delegations(
            BOB,
            &[single_ctx(vec![delegation], &transfer_exec(TOKEN_A, BOB, 1))],
        )
        .unwrap_err();
    assert_eq!(err.name(), "signature-invalid");
    // Nothing executed.
    assert_eq!(h.ledger.balance_of(TOKEN_A, ALICE), 100);
}

#[test]
fn duplicate_delegation_is_a_cycle() {
    let h = Harness::new();
    let delegation = sign(
        Delegation::builder()
            .delegator(ALICE)
            .delegate(BOB)
            .build_unsigned()
            .unwrap(),
    );

    let err = h
        .engine
        .redeem_delegations(
            BOB,
            &[single_ctx(
                vec![delegation.clone(), delegation],
                &transfer_exec(TOKEN_A, BOB, 1),
            )],
        )
        .unwrap_err();
    assert_eq!(err.name(), "cycle-detected");
}

#[test]
fn chain_depth_is_capped() {
    let h = Harness::new();
    // Depth checking happens before signature verification, so the chain
    // can stay unsigned.
    let mut chain = vec![Delegation::builder()
        .delegator(addr(0))
        .delegate(addr(1))
        .build_unsigned()
        .unwrap()];
    for i in 1..=mandate::MAX_CHAIN_DEPTH {
        let parent = chain.last().unwrap();
        chain.push(
            Delegation::builder()
                .delegator(addr(i as u8))
                .delegate(addr(i as u8 + 1))
                .parent(parent)
                .unwrap()
                .build_unsigned()
                .unwrap(),
        );
    }

    let err = h
        .engine
        .redeem_delegations(
            addr(mandate::MAX_CHAIN_DEPTH as u8 + 1),
            &[single_ctx(chain, &transfer_exec(TOKEN_A, BOB, 1))],
        )
        .unwrap_err();
    assert_eq!(err.name(), "depth-exceeded");
}

#[test]
fn unregistered_enforcer_is_rejected() {
    let h = Harness::new();
    let delegation = sign(
        Delegation::builder()
            .delegator(ALICE)
            .delegate(BOB)
            .caveat(addr(0x77), Vec::new())
            .build_unsigned()
            .unwrap(),
    );

    let err = h
        .engine
        .redeem_delegations(
            BOB,
            &[single_ctx(vec![delegation], &transfer_exec(TOKEN_A, BOB, 1))],
        )
        .unwrap_err();
    assert_eq!(err.name(), "unknown-enforcer");
}

#[test]
fn try_mode_captures_sink_failure() {
    let h = Harness::new();
    // Alice has nothing to transfer.
    let delegation = sign(
        Delegation::builder()
            .delegator(ALICE)
            .delegate(BOB)
            .build_unsigned()
            .unwrap(),
    );
    let execution = transfer_exec(TOKEN_A, CHARLIE, 40);

    let context = PermissionContext {
        chain: vec![delegation.clone()],
        mode: ExecutionMode::single_try(),
        payload: execution.encode_single(),
    };
    let outcomes = h.engine.redeem_delegations(BOB, &[context]).unwrap();
    assert!(!outcomes[0].results[0].is_success());

    // Default mode propagates the same failure.
    let err = h
        .engine
        .redeem_delegations(BOB, &[single_ctx(vec![delegation], &execution)])
        .unwrap_err();
    assert_eq!(err.name(), "insufficient-balance");
}

#[test]
fn batch_default_aborts_on_first_failure() {
    let h = Harness::new();
    h.ledger.set_balance(TOKEN_A, ALICE, 10);

    let delegation = sign(
        Delegation::builder()
            .delegator(ALICE)
            .delegate(BOB)
            .build_unsigned()
            .unwrap(),
    );
    let batch = [
        transfer_exec(TOKEN_A, CHARLIE, 10),
        transfer_exec(TOKEN_A, DAVE, 1),
    ];

    let err = h
        .engine
        .redeem_delegations(BOB, &[batch_ctx(vec![delegation.clone()], &batch)])
        .unwrap_err();
    assert_eq!(err.name(), "insufficient-balance");
    // The failing batch is not rolled back: the first item already landed.
    assert_eq!(h.ledger.balance_of(TOKEN_A, CHARLIE), 10);

    // Under try mode the same batch reports per-item results instead.
    h.ledger.set_balance(TOKEN_A, ALICE, 10);
    let context = PermissionContext {
        chain: vec![delegation],
        mode: ExecutionMode::batch_try(),
        payload: Execution::encode_batch(&batch),
    };
    let outcomes = h.engine.redeem_delegations(BOB, &[context]).unwrap();
    assert!(outcomes[0].results[0].is_success());
    assert!(!outcomes[0].results[1].is_success());
}

#[test]
fn payload_must_decode_under_mode() {
    let h = Harness::new();
    let delegation = sign(
        Delegation::builder()
            .delegator(ALICE)
            .delegate(BOB)
            .build_unsigned()
            .unwrap(),
    );
    let context = PermissionContext {
        chain: vec![delegation],
        mode: ExecutionMode::batch_default(),
        payload: transfer_exec(TOKEN_A, BOB, 1).encode_single(),
    };
    let err = h.engine.redeem_delegations(BOB, &[context]).unwrap_err();
    assert_eq!(err.name(), "malformed-execution");
}

/// Records every hook invocation as `(phase, marker)` where the marker is
/// the caveat's first terms byte.
#[derive(Default)]
struct RecordingEnforcer {
    log: Mutex<Vec<(&'static str, u8)>>,
}

impl RecordingEnforcer {
    fn record(&self, phase: &'static str, terms: &[u8]) {
        self.log.lock().unwrap().push((phase, terms[0]));
    }

    fn take(&self) -> Vec<(&'static str, u8)> {
        std::mem::take(&mut *self.log.lock().unwrap())
    }
}

impl CaveatEnforcer for RecordingEnforcer {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn before_all_hook(
        &self,
        terms: &[u8],
        _args: &[u8],
        _payload: &[u8],
        _ctx: &HookContext<'_>,
    ) -> mandate::Result<()> {
        self.record("before_all", terms);
        Ok(())
    }

    fn before_hook(
        &self,
        terms: &[u8],
        _args: &[u8],
        _payload: &[u8],
        _ctx: &HookContext<'_>,
    ) -> mandate::Result<()> {
        self.record("before", terms);
        Ok(())
    }

    fn after_hook(
        &self,
        terms: &[u8],
        _args: &[u8],
        _payload: &[u8],
        _ctx: &HookContext<'_>,
    ) -> mandate::Result<()> {
        self.record("after", terms);
        Ok(())
    }

    fn after_all_hook(
        &self,
        terms: &[u8],
        _args: &[u8],
        _payload: &[u8],
        _ctx: &HookContext<'_>,
    ) -> mandate::Result<()> {
        self.record("after_all", terms);
        Ok(())
    }
}

fn recording_engine() -> (RedemptionEngine, Arc<RecordingEnforcer>, Address) {
    let recorder = Arc::new(RecordingEnforcer::default());
    let recorder_addr = addr(0x99);
    let ledger = Arc::new(InMemoryLedger::new());
    let engine = RedemptionEngine::builder()
        .address(ENGINE_ADDR)
        .verifier(Arc::new(AcceptAllVerifier))
        .ledger(ledger.clone())
        .sink(ledger)
        .enforcer(recorder_addr, recorder.clone())
        .build()
        .unwrap();
    (engine, recorder, recorder_addr)
}

#[test]
fn hooks_run_forward_then_unwind_in_reverse() {
    let (engine, recorder, recorder_addr) = recording_engine();

    let root = Delegation::builder()
        .delegator(ALICE)
        .delegate(BOB)
        .caveat(recorder_addr, vec![0])
        .build_unsigned()
        .unwrap();
    let leaf = Delegation::builder()
        .delegator(BOB)
        .delegate(CHARLIE)
        .parent(&root)
        .unwrap()
        .caveat(recorder_addr, vec![1])
        .build_unsigned()
        .unwrap();

    let execution = Execution::new(DAVE, 0, Vec::new());
    engine
        .redeem_delegations(CHARLIE, &[single_ctx(vec![root, leaf], &execution)])
        .unwrap();

    assert_eq!(
        recorder.take(),
        vec![
            ("before_all", 0),
            ("before_all", 1),
            ("before", 0),
            ("before", 1),
            ("after", 1),
            ("after", 0),
            ("after_all", 1),
            ("after_all", 0),
        ]
    );
}

#[test]
fn caveats_within_a_hop_unwind_in_reverse() {
    let (engine, recorder, recorder_addr) = recording_engine();

    let delegation = Delegation::builder()
        .delegator(ALICE)
        .delegate(BOB)
        .caveat(recorder_addr, vec![0])
        .caveat(recorder_addr, vec![1])
        .build_unsigned()
        .unwrap();

    let execution = Execution::new(DAVE, 0, Vec::new());
    engine
        .redeem_delegations(BOB, &[single_ctx(vec![delegation], &execution)])
        .unwrap();

    assert_eq!(
        recorder.take(),
        vec![
            ("before_all", 0),
            ("before_all", 1),
            ("before", 0),
            ("before", 1),
            ("after", 1),
            ("after", 0),
            ("after_all", 1),
            ("after_all", 0),
        ]
    );
}

#[test]
fn contexts_share_before_all_phase_and_unwind_after_all() {
    let (engine, recorder, recorder_addr) = recording_engine();

    let make = |marker: u8| {
        Delegation::builder()
            .delegator(ALICE)
            .delegate(BOB)
            .caveat(recorder_addr, vec![marker])
            .salt(marker as u128)
            .build_unsigned()
            .unwrap()
    };
    let execution = Execution::new(DAVE, 0, Vec::new());
    engine
        .redeem_delegations(
            BOB,
            &[
                single_ctx(vec![make(0)], &execution),
                single_ctx(vec![make(1)], &execution),
            ],
        )
        .unwrap();

    assert_eq!(
        recorder.take(),
        vec![
            // Every context's before-all runs before any execution...
            ("before_all", 0),
            ("before_all", 1),
            ("before", 0),
            ("after", 0),
            ("before", 1),
            ("after", 1),
            // ...and after-all unwinds the contexts in reverse.
            ("after_all", 1),
            ("after_all", 0),
        ]
    );
}
