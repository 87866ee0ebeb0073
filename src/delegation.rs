//! Delegation model - the core primitive of the engine.
//!
//! A delegation is a signed grant of authority containing:
//! - A delegator (who grants) and a delegate (who receives)
//! - An authority reference (root, or the hash of a parent delegation)
//! - An ordered list of caveats (how the grant is restricted)
//! - A salt (distinguishes otherwise-identical grants)
//! - A signature proving the delegator authorized it
//!
//! Crucially, authority can only shrink as delegations chain: every hop's
//! caveats apply, and the effective permission is their intersection.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// An opaque 32-byte principal, target or asset reference.
///
/// The engine never interprets addresses; they identify parties to the
/// external collaborators (signature verifier, ledger, execution sink) and
/// key enforcer-local bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; 32]);

impl Address {
    /// The all-zero address.
    pub const ZERO: Address = Address([0u8; 32]);

    /// Construct an address from raw bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short fingerprint for log lines (first 8 hex chars).
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl From<[u8; 32]> for Address {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&hex::encode(self.0))
        } else {
            serde_bytes::Bytes::new(&self.0).serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
            let arr: [u8; 32] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| serde::de::Error::custom("address must be 32 bytes"))?;
            Ok(Address(arr))
        } else {
            let buf = serde_bytes::ByteBuf::deserialize(deserializer)?;
            let arr: [u8; 32] = buf
                .as_slice()
                .try_into()
                .map_err(|_| serde::de::Error::custom("address must be 32 bytes"))?;
            Ok(Address(arr))
        }
    }
}

/// SHA-256 content hash of a delegation's signing preimage.
///
/// The hash covers everything the delegator committed to: delegate,
/// delegator, authority, each caveat's enforcer and terms, and the salt.
/// Redemption-time `args` are excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DelegationHash(pub [u8; 32]);

impl DelegationHash {
    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short fingerprint for log lines (first 8 hex chars).
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl From<[u8; 32]> for DelegationHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Display for DelegationHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Serialize for DelegationHash {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&hex::encode(self.0))
        } else {
            serde_bytes::Bytes::new(&self.0).serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for DelegationHash {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
            let arr: [u8; 32] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| serde::de::Error::custom("hash must be 32 bytes"))?;
            Ok(DelegationHash(arr))
        } else {
            let buf = serde_bytes::ByteBuf::deserialize(deserializer)?;
            let arr: [u8; 32] = buf
                .as_slice()
                .try_into()
                .map_err(|_| serde::de::Error::custom("hash must be 32 bytes"))?;
            Ok(DelegationHash(arr))
        }
    }
}

/// Parent-authority reference.
///
/// `Root` marks a primary grant; `Delegation` links to the parent grant
/// whose delegate is this delegation's delegator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Authority {
    /// Primary grant - the delegator acts on their own authority.
    Root,
    /// Attenuated grant - authority derives from the referenced parent.
    Delegation(DelegationHash),
}

impl Default for Authority {
    fn default() -> Self {
        Authority::Root
    }
}

impl Authority {
    /// Whether this is the root sentinel.
    pub fn is_root(&self) -> bool {
        matches!(self, Authority::Root)
    }

    /// The parent hash, if any.
    pub fn parent(&self) -> Option<DelegationHash> {
        match self {
            Authority::Root => None,
            Authority::Delegation(hash) => Some(*hash),
        }
    }
}

/// A policy check attached to a delegation.
///
/// `terms` are fixed configuration signed by the delegator. `args` are
/// supplied by the redeemer at redemption time, excluded from the hash, and
/// must never be used by an enforcer to relax what `terms` allow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caveat {
    /// Reference to the enforcer that evaluates this caveat.
    pub enforcer: Address,
    /// Signed configuration bytes (strict fixed-width layout per enforcer).
    #[serde(with = "serde_bytes")]
    pub terms: Vec<u8>,
    /// Redeemer-supplied bytes, untrusted.
    #[serde(with = "serde_bytes")]
    pub args: Vec<u8>,
}

impl Caveat {
    /// Construct a caveat with empty args.
    pub fn new(enforcer: Address, terms: Vec<u8>) -> Self {
        Self {
            enforcer,
            terms,
            args: Vec::new(),
        }
    }

    /// Construct a caveat with redemption-time args.
    pub fn with_args(enforcer: Address, terms: Vec<u8>, args: Vec<u8>) -> Self {
        Self {
            enforcer,
            terms,
            args,
        }
    }
}

/// Signing-preimage view of a caveat: enforcer and terms only.
#[derive(Serialize)]
struct CaveatPreimage<'a> {
    enforcer: &'a Address,
    #[serde(with = "serde_bytes")]
    terms: &'a [u8],
}

/// Signing-preimage view of a delegation: everything the signature covers.
#[derive(Serialize)]
struct DelegationPreimage<'a> {
    delegate: &'a Address,
    delegator: &'a Address,
    authority: &'a Authority,
    caveats: Vec<CaveatPreimage<'a>>,
    salt: u128,
}

/// A signed grant of authority from a delegator to a delegate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    /// Who may redeem this grant.
    pub delegate: Address,
    /// Who issued this grant.
    pub delegator: Address,
    /// Root sentinel or parent-delegation hash.
    pub authority: Authority,
    /// Ordered policy checks; all must pass.
    pub caveats: Vec<Caveat>,
    /// Distinguishes otherwise-identical grants.
    pub salt: u128,
    /// Delegator's signature over [`Delegation::signing_preimage`].
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
}

impl Delegation {
    /// Create a new delegation builder.
    pub fn builder() -> DelegationBuilder {
        DelegationBuilder::new()
    }

    /// Canonical bytes the delegator signs.
    ///
    /// Covers delegate, delegator, authority, each caveat's `(enforcer,
    /// terms)` pair, and the salt - encoded as deterministic CBOR. `args`
    /// and the signature itself are excluded.
    pub fn signing_preimage(&self) -> Result<Vec<u8>> {
        let preimage = DelegationPreimage {
            delegate: &self.delegate,
            delegator: &self.delegator,
            authority: &self.authority,
            caveats: self
                .caveats
                .iter()
                .map(|c| CaveatPreimage {
                    enforcer: &c.enforcer,
                    terms: &c.terms,
                })
                .collect(),
            salt: self.salt,
        };
        let mut buf = Vec::new();
        ciborium::ser::into_writer(&preimage, &mut buf)?;
        Ok(buf)
    }

    /// Content hash: SHA-256 over the signing preimage.
    pub fn hash(&self) -> Result<DelegationHash> {
        let preimage = self.signing_preimage()?;
        let digest = Sha256::digest(&preimage);
        Ok(DelegationHash(digest.into()))
    }

    /// Return a copy with the given signature attached.
    pub fn attach_signature(mut self, signature: Vec<u8>) -> Self {
        self.signature = signature;
        self
    }

    /// Set redemption-time args on the caveat at `index`.
    ///
    /// Args are redeemer-supplied and do not affect the hash, so mutating
    /// them on an already-signed delegation is legitimate.
    pub fn with_caveat_args(mut self, index: usize, args: Vec<u8>) -> Self {
        if let Some(caveat) = self.caveats.get_mut(index) {
            caveat.args = args;
        }
        self
    }
}

/// Builder for [`Delegation`].
#[derive(Debug, Default)]
pub struct DelegationBuilder {
    delegate: Option<Address>,
    delegator: Option<Address>,
    authority: Authority,
    caveats: Vec<Caveat>,
    salt: u128,
}

impl DelegationBuilder {
    /// Create an empty builder (root authority, zero salt).
    pub fn new() -> Self {
        Self {
            delegate: None,
            delegator: None,
            authority: Authority::Root,
            caveats: Vec::new(),
            salt: 0,
        }
    }

    /// Set the delegate (who may redeem).
    pub fn delegate(mut self, delegate: Address) -> Self {
        self.delegate = Some(delegate);
        self
    }

    /// Set the delegator (who grants).
    pub fn delegator(mut self, delegator: Address) -> Self {
        self.delegator = Some(delegator);
        self
    }

    /// Set the authority reference directly.
    pub fn authority(mut self, authority: Authority) -> Self {
        self.authority = authority;
        self
    }

    /// Link this delegation under a parent grant.
    ///
    /// Fails only if the parent's preimage cannot be serialized.
    pub fn parent(mut self, parent: &Delegation) -> Result<Self> {
        self.authority = Authority::Delegation(parent.hash()?);
        Ok(self)
    }

    /// Append a caveat with empty args.
    pub fn caveat(mut self, enforcer: Address, terms: Vec<u8>) -> Self {
        self.caveats.push(Caveat::new(enforcer, terms));
        self
    }

    /// Append a caveat with redemption-time args.
    pub fn caveat_with_args(mut self, enforcer: Address, terms: Vec<u8>, args: Vec<u8>) -> Self {
        self.caveats.push(Caveat::with_args(enforcer, terms, args));
        self
    }

    /// Set the salt explicitly.
    pub fn salt(mut self, salt: u128) -> Self {
        self.salt = salt;
        self
    }

    /// Set a random salt.
    pub fn random_salt(mut self) -> Self {
        self.salt = Uuid::new_v4().as_u128();
        self
    }

    /// Build the delegation with an empty signature.
    ///
    /// The caller signs [`Delegation::signing_preimage`] out of band and
    /// attaches the result via [`Delegation::attach_signature`].
    pub fn build_unsigned(self) -> Result<Delegation> {
        let delegate = self.delegate.ok_or(Error::MissingField("delegate"))?;
        let delegator = self.delegator.ok_or(Error::MissingField("delegator"))?;
        Ok(Delegation {
            delegate,
            delegator,
            authority: self.authority,
            caveats: self.caveats,
            salt: self.salt,
            signature: Vec::new(),
        })
    }
}
