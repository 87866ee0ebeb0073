//! Signature-verification seam.
//!
//! The engine does not pick a signature scheme. Deployments plug in whatever
//! their key infrastructure provides; the engine only asks whether a
//! delegator authorized the bytes of a delegation's signing preimage.

use crate::delegation::Address;

/// External collaborator that validates delegation signatures.
pub trait SignatureVerifier: Send + Sync {
    /// Whether `principal` authorized `message` with `signature`.
    fn verify(&self, principal: Address, message: &[u8], signature: &[u8]) -> bool;
}

/// Verifier that accepts everything. Test and prototyping use only.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAllVerifier;

impl SignatureVerifier for AcceptAllVerifier {
    fn verify(&self, _principal: Address, _message: &[u8], _signature: &[u8]) -> bool {
        true
    }
}
