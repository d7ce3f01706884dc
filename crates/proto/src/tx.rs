//! Transaction envelope, payload types and signing / hash helpers.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use dsql_common::crypto::{
    address_from_pubkey_bytes, public_key_bytes_from_keypair_bytes, sha3_512, sign_message,
    verify_signature,
};
use dsql_common::{Address, Hash};

use crate::ids::{AccountNonce, DatabaseId};
use crate::meta::{Permission, ResourceMeta};

/// Confirmation state of a metadata transaction on the coordinator chain.
///
/// `Pending` and `Packed` are non-terminal; pollers keep waiting on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxState {
    Pending,
    Packed,
    Confirmed,
    Expired,
    NotFound,
}

impl TxState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxState::Confirmed | TxState::Expired | TxState::NotFound)
    }

    /// Wire name of the state, also accepted back by `from_str`.
    pub fn as_str(&self) -> &'static str {
        match self {
            TxState::Pending => "pending",
            TxState::Packed => "packed",
            TxState::Confirmed => "confirmed",
            TxState::Expired => "expired",
            TxState::NotFound => "not_found",
        }
    }
}

impl std::fmt::Display for TxState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TxState {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TxState::Pending),
            "packed" => Ok(TxState::Packed),
            "confirmed" => Ok(TxState::Confirmed),
            "expired" => Ok(TxState::Expired),
            "not_found" => Ok(TxState::NotFound),
            _ => Err(()),
        }
    }
}

/// Payload variants for metadata transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TxPayload {
    /// Provision a new database owned by the sender.
    CreateDatabase {
        owner: Address,
        meta: ResourceMeta,
    },

    /// Grant or revoke a user's permission on one database.
    UpdatePermission {
        target_user: Address,
        target_database: DatabaseId,
        permission: Permission,
    },
}

/// A signed metadata transaction as submitted to the block producers.
///
/// The hash and signature cover the bincode image of (payload, owner,
/// nonce); `pubkey` lets the quorum verify without a key registry lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxEnvelope {
    pub payload: TxPayload,
    pub owner: Address,
    pub nonce: AccountNonce,
    #[serde(default)]
    pub pubkey: Vec<u8>,
    #[serde(default)]
    pub signature: Vec<u8>,
}

impl TxEnvelope {
    pub fn new(payload: TxPayload, owner: Address, nonce: AccountNonce) -> Self {
        TxEnvelope {
            payload,
            owner,
            nonce,
            pubkey: Vec::new(),
            signature: Vec::new(),
        }
    }

    /// The byte image the hash and signature commit to.
    fn signing_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(&(&self.payload, &self.owner, &self.nonce))
            .map_err(|e| anyhow!("serialize tx for signing: {}", e))
    }

    /// Transaction hash: SHA3-512 over the signing image.
    pub fn hash(&self) -> Result<Hash> {
        Ok(sha3_512(&self.signing_bytes()?))
    }

    /// Sign with the combined 64-byte keypair, filling pubkey and signature.
    pub fn sign(&mut self, kp_bytes: &[u8]) -> Result<()> {
        let msg = self.signing_bytes()?;
        self.pubkey = public_key_bytes_from_keypair_bytes(kp_bytes)?;
        self.signature = sign_message(kp_bytes, &msg)?;
        Ok(())
    }

    /// Verify the signature and that the embedded pubkey derives `owner`.
    pub fn verify(&self) -> Result<()> {
        let msg = self.signing_bytes()?;
        if !verify_signature(&self.pubkey, &msg, &self.signature)? {
            return Err(anyhow!("tx signature verification failed"));
        }
        let derived = address_from_pubkey_bytes(&self.pubkey)?;
        if derived != self.owner {
            return Err(anyhow!("tx owner does not match signing key"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsql_common::crypto::generate_keypair_bytes;

    fn signed_envelope() -> (TxEnvelope, Vec<u8>) {
        let (pk, kp) = generate_keypair_bytes();
        let owner = address_from_pubkey_bytes(&pk).expect("addr");
        let mut tx = TxEnvelope::new(
            TxPayload::CreateDatabase {
                owner,
                meta: ResourceMeta { node: 2, ..Default::default() },
            },
            owner,
            AccountNonce(9),
        );
        tx.sign(&kp).expect("sign");
        (tx, kp)
    }

    #[test]
    fn sign_then_verify() {
        let (tx, _kp) = signed_envelope();
        tx.verify().expect("verify");
    }

    #[test]
    fn hash_ignores_signature() {
        let (mut tx, _kp) = signed_envelope();
        let h1 = tx.hash().expect("hash");
        tx.signature = vec![0u8; 64];
        let h2 = tx.hash().expect("hash");
        assert_eq!(h1, h2);
    }

    #[test]
    fn tampered_payload_fails_verify() {
        let (mut tx, _kp) = signed_envelope();
        tx.nonce = AccountNonce(10);
        assert!(tx.verify().is_err());
    }

    #[test]
    fn foreign_key_fails_owner_check() {
        let (mut tx, _kp) = signed_envelope();
        let (_pk2, kp2) = generate_keypair_bytes();
        tx.sign(&kp2).expect("sign");
        assert!(tx.verify().is_err());
    }

    #[test]
    fn tx_state_terminality() {
        assert!(!TxState::Pending.is_terminal());
        assert!(!TxState::Packed.is_terminal());
        assert!(TxState::Confirmed.is_terminal());
        assert!(TxState::Expired.is_terminal());
        assert!(TxState::NotFound.is_terminal());
    }

    #[test]
    fn tx_state_wire_names_roundtrip() {
        for state in [
            TxState::Pending,
            TxState::Packed,
            TxState::Confirmed,
            TxState::Expired,
            TxState::NotFound,
        ] {
            assert_eq!(state.as_str().parse::<TxState>(), Ok(state));
        }
        assert!("limbo".parse::<TxState>().is_err());
    }
}
