//! The signed set of miners currently serving one database.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use dsql_common::crypto::{
    public_key_bytes_from_keypair_bytes, sign_message, verify_signature,
};

use crate::ids::NodeId;

/// Per-database peer set: which miners serve it and who leads.
///
/// The client fetches the miner list from the coordinator chain, picks the
/// leader, and signs the set with its own key; the signed value doubles as
/// the authorization credential attached to every data-plane request. The
/// set is replaced wholesale on refresh, never partially mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peers {
    /// Chain term the assignment was observed at.
    pub term: u64,
    pub leader: NodeId,
    pub servers: Vec<NodeId>,
    #[serde(default)]
    pub pubkey: Vec<u8>,
    #[serde(default)]
    pub signature: Vec<u8>,
}

impl Peers {
    /// Build an unsigned peer set. Fails unless `leader` is one of `servers`.
    pub fn new(term: u64, leader: NodeId, servers: Vec<NodeId>) -> Result<Self> {
        if !servers.contains(&leader) {
            return Err(anyhow!("peers leader {} not in server list", leader));
        }
        Ok(Peers {
            term,
            leader,
            servers,
            pubkey: Vec::new(),
            signature: Vec::new(),
        })
    }

    fn signing_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(&(self.term, &self.leader, &self.servers))
            .map_err(|e| anyhow!("serialize peers for signing: {}", e))
    }

    /// Sign with the combined 64-byte keypair, filling pubkey and signature.
    pub fn sign(&mut self, kp_bytes: &[u8]) -> Result<()> {
        let msg = self.signing_bytes()?;
        self.pubkey = public_key_bytes_from_keypair_bytes(kp_bytes)?;
        self.signature = sign_message(kp_bytes, &msg)?;
        Ok(())
    }

    pub fn verify(&self) -> Result<()> {
        let msg = self.signing_bytes()?;
        if !verify_signature(&self.pubkey, &msg, &self.signature)? {
            return Err(anyhow!("peers signature verification failed"));
        }
        Ok(())
    }

    /// Servers other than the leader.
    pub fn followers(&self) -> impl Iterator<Item = &NodeId> {
        self.servers.iter().filter(move |s| **s != self.leader)
    }
}
