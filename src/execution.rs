//! Execution abstraction - the unit of work a delegation authorizes.
//!
//! An [`Execution`] is a `(target, value, payload)` triple. Redemption
//! submits executions as an opaque byte payload in a strict positional
//! layout; the [`ExecutionMode`] tag says whether the bytes carry one
//! execution or a batch, and whether a sub-call failure aborts the hop
//! (`Default`) or is captured (`Try`).
//!
//! ## Payload layout
//!
//! Single: `target(32) || value(16 BE) || calldata(rest)`.
//!
//! Batch: `count(u32 BE)` then per item
//! `target(32) || value(16 BE) || len(u32 BE) || calldata`.
//!
//! Decoding is strict: trailing or missing bytes fail with
//! `MalformedExecution`. Any change to field order or width is a breaking
//! wire-format change.

use crate::delegation::Address;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Selector tag for the ledger transfer call shape (`"trfr"`).
pub const TRANSFER_SELECTOR: [u8; 4] = [0x74, 0x72, 0x66, 0x72];

/// Fixed width of a single-execution header (target + value).
const SINGLE_HEADER_LEN: usize = 48;

/// Fixed width of transfer calldata (selector + asset + recipient + amount).
const TRANSFER_CALLDATA_LEN: usize = 84;

/// A unit of work: call `target` with `value` and `payload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    /// Who the call is addressed to.
    pub target: Address,
    /// Native amount carried by the call.
    pub value: u128,
    /// Opaque call bytes; by convention `selector(4) || fixed-width args`.
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
}

impl Execution {
    /// Construct an execution.
    pub fn new(target: Address, value: u128, payload: Vec<u8>) -> Self {
        Self {
            target,
            value,
            payload,
        }
    }

    /// Encode as a single-execution payload.
    pub fn encode_single(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(SINGLE_HEADER_LEN + self.payload.len());
        buf.extend_from_slice(self.target.as_bytes());
        buf.extend_from_slice(&self.value.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Decode a single-execution payload. Strict: consumes all bytes.
    pub fn decode_single(data: &[u8]) -> Result<Execution> {
        if data.len() < SINGLE_HEADER_LEN {
            return Err(Error::MalformedExecution(format!(
                "single execution needs at least {} bytes, got {}",
                SINGLE_HEADER_LEN,
                data.len()
            )));
        }
        let target = Address(read_array::<32>(data, 0));
        let value = u128::from_be_bytes(read_array::<16>(data, 32));
        let payload = data[SINGLE_HEADER_LEN..].to_vec();
        Ok(Execution {
            target,
            value,
            payload,
        })
    }

    /// Encode a batch payload.
    pub fn encode_batch(executions: &[Execution]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(executions.len() as u32).to_be_bytes());
        for execution in executions {
            buf.extend_from_slice(execution.target.as_bytes());
            buf.extend_from_slice(&execution.value.to_be_bytes());
            buf.extend_from_slice(&(execution.payload.len() as u32).to_be_bytes());
            buf.extend_from_slice(&execution.payload);
        }
        buf
    }

    /// Decode a batch payload. Strict: exact item count, no trailing bytes.
    pub fn decode_batch(data: &[u8]) -> Result<Vec<Execution>> {
        if data.len() < 4 {
            return Err(Error::MalformedExecution(
                "batch payload shorter than its count prefix".to_string(),
            ));
        }
        let count = u32::from_be_bytes(read_array::<4>(data, 0)) as usize;
        let mut offset = 4;
        let mut executions = Vec::with_capacity(count.min(1024));
        for index in 0..count {
            if data.len() < offset + SINGLE_HEADER_LEN + 4 {
                return Err(Error::MalformedExecution(format!(
                    "batch item {} truncated at offset {}",
                    index, offset
                )));
            }
            let target = Address(read_array::<32>(data, offset));
            let value = u128::from_be_bytes(read_array::<16>(data, offset + 32));
            let len = u32::from_be_bytes(read_array::<4>(data, offset + 48)) as usize;
            offset += SINGLE_HEADER_LEN + 4;
            if data.len() < offset + len {
                return Err(Error::MalformedExecution(format!(
                    "batch item {} calldata truncated: wants {} bytes",
                    index, len
                )));
            }
            let payload = data[offset..offset + len].to_vec();
            offset += len;
            executions.push(Execution {
                target,
                value,
                payload,
            });
        }
        if offset != data.len() {
            return Err(Error::MalformedExecution(format!(
                "{} trailing bytes after batch",
                data.len() - offset
            )));
        }
        Ok(executions)
    }

    /// Decode a payload under the given mode into a uniform list.
    pub fn decode_payload(data: &[u8], call_type: CallType) -> Result<Vec<Execution>> {
        match call_type {
            CallType::Single => Ok(vec![Execution::decode_single(data)?]),
            CallType::Batch => Execution::decode_batch(data),
        }
    }
}

/// Whether a payload carries one execution or a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallType {
    /// Exactly one execution.
    Single,
    /// An ordered batch, all-or-nothing per hop under `Default`.
    Batch,
}

/// How sub-call failure propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecType {
    /// A failure aborts the hop.
    Default,
    /// A failure is captured and reported without aborting.
    Try,
}

/// Mode tag: `{single, batch} x {default, try}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionMode {
    /// Payload shape.
    pub call_type: CallType,
    /// Failure propagation.
    pub exec_type: ExecType,
}

impl ExecutionMode {
    /// One execution, failure aborts.
    pub fn single_default() -> Self {
        Self {
            call_type: CallType::Single,
            exec_type: ExecType::Default,
        }
    }

    /// One execution, failure captured.
    pub fn single_try() -> Self {
        Self {
            call_type: CallType::Single,
            exec_type: ExecType::Try,
        }
    }

    /// Batch, failure aborts the whole hop.
    pub fn batch_default() -> Self {
        Self {
            call_type: CallType::Batch,
            exec_type: ExecType::Default,
        }
    }

    /// Batch, per-item failures captured.
    pub fn batch_try() -> Self {
        Self {
            call_type: CallType::Batch,
            exec_type: ExecType::Try,
        }
    }
}

/// A decoded ledger transfer call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferCall {
    /// Asset being moved.
    pub asset: Address,
    /// Who receives it.
    pub recipient: Address,
    /// How much.
    pub amount: u128,
}

/// Build transfer calldata: `TRANSFER_SELECTOR || asset || recipient || amount`.
pub fn transfer_calldata(asset: Address, recipient: Address, amount: u128) -> Vec<u8> {
    let mut buf = Vec::with_capacity(TRANSFER_CALLDATA_LEN);
    buf.extend_from_slice(&TRANSFER_SELECTOR);
    buf.extend_from_slice(asset.as_bytes());
    buf.extend_from_slice(recipient.as_bytes());
    buf.extend_from_slice(&amount.to_be_bytes());
    buf
}

/// Strictly decode transfer calldata.
///
/// Fails with `MalformedExecution` on any width mismatch and with
/// `InvalidMethod` when the selector is not [`TRANSFER_SELECTOR`].
pub fn decode_transfer(calldata: &[u8]) -> Result<TransferCall> {
    if calldata.len() != TRANSFER_CALLDATA_LEN {
        return Err(Error::MalformedExecution(format!(
            "transfer calldata must be {} bytes, got {}",
            TRANSFER_CALLDATA_LEN,
            calldata.len()
        )));
    }
    let selector = read_array::<4>(calldata, 0);
    if selector != TRANSFER_SELECTOR {
        return Err(Error::InvalidMethod { selector });
    }
    Ok(TransferCall {
        asset: Address(read_array::<32>(calldata, 4)),
        recipient: Address(read_array::<32>(calldata, 36)),
        amount: u128::from_be_bytes(read_array::<16>(calldata, 68)),
    })
}

/// Copy `N` bytes out of `data` at `offset`.
///
/// Callers bounds-check first; the slice conversion cannot fail after that.
pub(crate) fn read_array<const N: usize>(data: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&data[offset..offset + N]);
    out
}
