//! Shared fixtures for the integration suites.
#![allow(dead_code)]

use mandate::enforcers::{
    AllowedMethodsEnforcer, AllowedTargetsEnforcer, ArgsEqualityEnforcer, BalanceChangeEnforcer,
    ExactCalldataBatchEnforcer, ExactCalldataEnforcer, ExactExecutionBatchEnforcer,
    ExactExecutionEnforcer, IdEnforcer, LimitedCallsEnforcer, LogicalOrWrapperEnforcer,
    MultiAssetPeriodEnforcer, MultiOperationBalanceEnforcer, NoCalldataEnforcer,
    NonceEnforcer, PaymentEnforcer, PeriodicAllowanceEnforcer, RedeemerEnforcer,
    StreamingAllowanceEnforcer, SwapOfferEnforcer, TimestampEnforcer, TransferAmountEnforcer,
    ValueCapEnforcer,
};
use mandate::execution::transfer_calldata;
use mandate::{
    Address, Delegation, Execution, ExecutionMode, InMemoryLedger, ManualClock,
    PermissionContext, RedemptionEngine, SignatureVerifier,
};
use sha2::{Digest, Sha256};
use std::sync::Arc;

// Principals.
pub const ALICE: Address = Address([0x0a; 32]);
pub const BOB: Address = Address([0x0b; 32]);
pub const CHARLIE: Address = Address([0x0c; 32]);
pub const DAVE: Address = Address([0x0d; 32]);

// Assets.
pub const TOKEN_A: Address = Address([0xa0; 32]);
pub const TOKEN_B: Address = Address([0xb0; 32]);

// The ledger service executions are addressed to.
pub const LEDGER_TARGET: Address = Address([0x1f; 32]);

// Engine identity.
pub const ENGINE_ADDR: Address = Address([0xee; 32]);

// Enforcer registry addresses.
pub const TIMESTAMP_ADDR: Address = Address([0xa1; 32]);
pub const TRANSFER_AMOUNT_ADDR: Address = Address([0xa2; 32]);
pub const VALUE_CAP_ADDR: Address = Address([0xa3; 32]);
pub const STREAMING_ADDR: Address = Address([0xa4; 32]);
pub const PERIODIC_ADDR: Address = Address([0xa5; 32]);
pub const MULTI_ASSET_ADDR: Address = Address([0xa6; 32]);
pub const BALANCE_CHANGE_ADDR: Address = Address([0xa7; 32]);
pub const MULTI_BALANCE_ADDR: Address = Address([0xa8; 32]);
pub const EXACT_EXECUTION_ADDR: Address = Address([0xa9; 32]);
pub const EXACT_EXECUTION_BATCH_ADDR: Address = Address([0xaa; 32]);
pub const EXACT_CALLDATA_ADDR: Address = Address([0xab; 32]);
pub const EXACT_CALLDATA_BATCH_ADDR: Address = Address([0xac; 32]);
pub const ALLOWED_TARGETS_ADDR: Address = Address([0xad; 32]);
pub const ALLOWED_METHODS_ADDR: Address = Address([0xae; 32]);
pub const NO_CALLDATA_ADDR: Address = Address([0xaf; 32]);
pub const REDEEMER_ADDR: Address = Address([0xb1; 32]);
pub const ARGS_EQUALITY_ADDR: Address = Address([0xb2; 32]);
pub const LIMITED_CALLS_ADDR: Address = Address([0xb3; 32]);
pub const NONCE_ADDR: Address = Address([0xb4; 32]);
pub const ID_ADDR: Address = Address([0xb5; 32]);
pub const LOGICAL_OR_ADDR: Address = Address([0xb6; 32]);
pub const SWAP_OFFER_ADDR: Address = Address([0xb7; 32]);
pub const PAYMENT_ADDR: Address = Address([0xb8; 32]);

/// Starting point for the manual clock in every suite.
pub const T0: u64 = 1_000_000;

pub fn addr(byte: u8) -> Address {
    Address([byte; 32])
}

fn tag(secret: &[u8], message: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(secret);
    hasher.update(message);
    hasher.finalize().to_vec()
}

/// Each principal's test signing secret is derived from its address.
fn secret_of(principal: Address) -> Vec<u8> {
    tag(b"mandate-test-secret", principal.as_bytes())
}

/// Verifier accepting signatures tagged with the delegator's derived secret.
pub struct DerivedKeyVerifier;

impl SignatureVerifier for DerivedKeyVerifier {
    fn verify(&self, principal: Address, message: &[u8], signature: &[u8]) -> bool {
        signature == tag(&secret_of(principal), message).as_slice()
    }
}

/// Sign a delegation with its delegator's derived secret.
pub fn sign(delegation: Delegation) -> Delegation {
    let preimage = delegation.signing_preimage().unwrap();
    let signature = tag(&secret_of(delegation.delegator), &preimage);
    delegation.attach_signature(signature)
}

/// Everything a suite needs: the engine plus handles to stateful pieces.
pub struct Harness {
    pub engine: RedemptionEngine,
    pub ledger: Arc<InMemoryLedger>,
    pub clock: Arc<ManualClock>,
    pub transfer_amount: Arc<TransferAmountEnforcer>,
    pub streaming: Arc<StreamingAllowanceEnforcer>,
    pub balance_change: Arc<BalanceChangeEnforcer>,
    pub multi_balance: Arc<MultiOperationBalanceEnforcer>,
    pub limited_calls: Arc<LimitedCallsEnforcer>,
    pub nonce: Arc<NonceEnforcer>,
    pub id: Arc<IdEnforcer>,
    pub swap_offer: Arc<SwapOfferEnforcer>,
}

impl Harness {
    pub fn new() -> Self {
        let ledger = Arc::new(InMemoryLedger::new());
        let clock = Arc::new(ManualClock::new(T0));
        let transfer_amount = Arc::new(TransferAmountEnforcer::new());
        let streaming = Arc::new(StreamingAllowanceEnforcer::new());
        let balance_change = Arc::new(BalanceChangeEnforcer::new());
        let multi_balance = Arc::new(MultiOperationBalanceEnforcer::new());
        let limited_calls = Arc::new(LimitedCallsEnforcer::new());
        let nonce = Arc::new(NonceEnforcer::new());
        let id = Arc::new(IdEnforcer::new());
        let swap_offer = Arc::new(SwapOfferEnforcer::new());

        let engine = RedemptionEngine::builder()
            .address(ENGINE_ADDR)
            .verifier(Arc::new(DerivedKeyVerifier))
            .ledger(ledger.clone())
            .sink(ledger.clone())
            .clock(clock.clone())
            .enforcer(TIMESTAMP_ADDR, Arc::new(TimestampEnforcer::new()))
            .enforcer(TRANSFER_AMOUNT_ADDR, transfer_amount.clone())
            .enforcer(VALUE_CAP_ADDR, Arc::new(ValueCapEnforcer::new()))
            .enforcer(STREAMING_ADDR, streaming.clone())
            .enforcer(PERIODIC_ADDR, Arc::new(PeriodicAllowanceEnforcer::new()))
            .enforcer(MULTI_ASSET_ADDR, Arc::new(MultiAssetPeriodEnforcer::new()))
            .enforcer(BALANCE_CHANGE_ADDR, balance_change.clone())
            .enforcer(MULTI_BALANCE_ADDR, multi_balance.clone())
            .enforcer(EXACT_EXECUTION_ADDR, Arc::new(ExactExecutionEnforcer::new()))
            .enforcer(
                EXACT_EXECUTION_BATCH_ADDR,
                Arc::new(ExactExecutionBatchEnforcer::new()),
            )
            .enforcer(EXACT_CALLDATA_ADDR, Arc::new(ExactCalldataEnforcer::new()))
            .enforcer(
                EXACT_CALLDATA_BATCH_ADDR,
                Arc::new(ExactCalldataBatchEnforcer::new()),
            )
            .enforcer(ALLOWED_TARGETS_ADDR, Arc::new(AllowedTargetsEnforcer::new()))
            .enforcer(ALLOWED_METHODS_ADDR, Arc::new(AllowedMethodsEnforcer::new()))
            .enforcer(NO_CALLDATA_ADDR, Arc::new(NoCalldataEnforcer::new()))
            .enforcer(REDEEMER_ADDR, Arc::new(RedeemerEnforcer::new()))
            .enforcer(ARGS_EQUALITY_ADDR, Arc::new(ArgsEqualityEnforcer::new()))
            .enforcer(LIMITED_CALLS_ADDR, limited_calls.clone())
            .enforcer(NONCE_ADDR, nonce.clone())
            .enforcer(ID_ADDR, id.clone())
            .enforcer(LOGICAL_OR_ADDR, Arc::new(LogicalOrWrapperEnforcer::new()))
            .enforcer(SWAP_OFFER_ADDR, swap_offer.clone())
            .enforcer(PAYMENT_ADDR, Arc::new(PaymentEnforcer::new()))
            .build()
            .unwrap();

        Harness {
            engine,
            ledger,
            clock,
            transfer_amount,
            streaming,
            balance_change,
            multi_balance,
            limited_calls,
            nonce,
            id,
            swap_offer,
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Execution transferring `amount` of `asset` to `recipient` via the ledger.
pub fn transfer_exec(asset: Address, recipient: Address, amount: u128) -> Execution {
    Execution::new(LEDGER_TARGET, 0, transfer_calldata(asset, recipient, amount))
}

/// Wrap a chain and a single execution into a default-mode context.
pub fn single_ctx(chain: Vec<Delegation>, execution: &Execution) -> PermissionContext {
    PermissionContext {
        chain,
        mode: ExecutionMode::single_default(),
        payload: execution.encode_single(),
    }
}

/// Wrap a chain and a batch into a default-mode context.
pub fn batch_ctx(chain: Vec<Delegation>, executions: &[Execution]) -> PermissionContext {
    PermissionContext {
        chain,
        mode: ExecutionMode::batch_default(),
        payload: Execution::encode_batch(executions),
    }
}
