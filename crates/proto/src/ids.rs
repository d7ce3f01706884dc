//! Identifier newtypes and the deterministic database-id derivation.
//!
//! A derived database id is the hex encoding of the first 32 bytes of
//! `SHA3-512(owner_address_bytes || nonce_le)`, which makes the id
//! computable client-side before the creation transaction confirms. Ids
//! that are not derived (operator-chosen aliases) pass through as opaque
//! strings.

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_512};
use std::fmt;

use dsql_common::Address;

/// Identifies one logical database on the coordinator chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatabaseId(pub String);

impl DatabaseId {
    pub fn new(id: impl Into<String>) -> Self { DatabaseId(id.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for DatabaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DatabaseId {
    fn from(s: &str) -> Self { DatabaseId(s.to_string()) }
}

/// Identifies a node (block producer or miner) on the network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self { NodeId(id.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-account strictly increasing counter allocated by the coordinator
/// chain. Each transaction consumes exactly one nonce; allocation is never
/// rolled back, even when the transaction later fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountNonce(pub u32);

impl AccountNonce {
    pub fn as_u32(&self) -> u32 { self.0 }
}

impl fmt::Display for AccountNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Derive the database id owned by `addr` for the transaction carrying
/// `nonce`: hex of SHA3-512(addr || nonce_le)[..32], 64 hex chars.
pub fn derive_database_id(addr: &Address, nonce: AccountNonce) -> DatabaseId {
    let mut hasher = Sha3_512::new();
    hasher.update(addr.as_bytes());
    hasher.update(nonce.0.to_le_bytes());
    let digest = hasher.finalize();
    DatabaseId(hex::encode(&digest[..32]))
}

/// Whether `s` has the shape of a derived database id (64 lowercase hex chars).
pub fn looks_like_derived_id(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
