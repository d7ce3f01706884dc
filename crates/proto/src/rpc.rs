//! Request/Response structs for coordinator and data-plane RPC.
//!
//! All pairs travel as JSON over HTTP. Remote failures arrive as non-2xx
//! responses whose body is the error message; the well-known chain error
//! strings below are matched by clients to tell expected "does not exist
//! yet / anymore" conditions apart from real failures.

use serde::{Deserialize, Serialize};

use dsql_common::{Address, Hash};

use crate::ids::{AccountNonce, DatabaseId, NodeId};
use crate::meta::Permission;
use crate::peers::Peers;
use crate::tx::TxEnvelope;

/// Error string reported while a database's profile has not yet confirmed.
pub const ERR_DATABASE_NOT_FOUND: &str = "database not found";
/// Error string reported once a database has been dropped from the chain.
pub const ERR_NO_SUCH_DATABASE: &str = "no such database";

// ============================================================
// COORDINATOR RPC
// ============================================================

/// Request the next unused nonce for an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextNonceReq {
    pub addr: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextNonceRes {
    pub nonce: AccountNonce,
}

/// Submit a signed metadata transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddTxReq {
    pub tx: TxEnvelope,
    /// Relay TTL among block producers.
    #[serde(default)]
    pub ttl: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddTxRes {
    /// Hex transaction hash echoed back by the accepting producer.
    pub txid: String,
}

/// Query the confirmation state of a submitted transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryTxStateReq {
    pub hash: Hash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryTxStateRes {
    /// Wire name of a [`TxState`](crate::tx::TxState); carried as a
    /// string so a newer chain can report states this client does not
    /// know, which the client must treat as an explicit error rather
    /// than a decode failure.
    pub state: String,
}

/// One miner assignment inside a database profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinerInfo {
    pub node_id: NodeId,
    /// Reachable data-plane endpoint, e.g. "http://127.0.0.1:7300".
    pub addr: String,
}

/// One per-user permission entry inside a database profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub addr: Address,
    pub permission: Permission,
}

/// Authoritative chain-side metadata for one database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseProfile {
    pub id: DatabaseId,
    /// Chain term of the current miner assignment.
    #[serde(default)]
    pub term: u64,
    pub miners: Vec<MinerInfo>,
    /// Present when the chain exposes permission entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<UserProfile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryProfileReq {
    pub database_id: DatabaseId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryProfileRes {
    pub profile: DatabaseProfile,
}

/// Self-announcement of a client node to the block producers. Repeating
/// the announcement for an already-known node is not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingNodeReq {
    pub node_id: NodeId,
    /// Hex-encoded Ed25519 public key of the node.
    pub pubkey: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addr: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingNodeRes {
    pub message: String,
}

// ============================================================
// DATA-PLANE RPC
// ============================================================

/// A SQL value crossing the data-plane wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self { Value::Integer(v) }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self { Value::Real(v) }
}
impl From<bool> for Value {
    fn from(v: bool) -> Self { Value::Bool(v) }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self { Value::Text(v.to_string()) }
}
impl From<String> for Value {
    fn from(v: String) -> Self { Value::Text(v) }
}

/// One parameterized statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(pattern: impl Into<String>) -> Self {
        Statement { pattern: pattern.into(), params: Vec::new() }
    }

    pub fn with_params(pattern: impl Into<String>, params: Vec<Value>) -> Self {
        Statement { pattern: pattern.into(), params }
    }
}

/// A read or write request addressed to one miner.
///
/// `conn_id` and `seq_no` order requests within one logical connection;
/// a miner rejects out-of-sequence writes. `peers` is the signed
/// authorization credential produced by the peer directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub database_id: DatabaseId,
    pub node_id: NodeId,
    pub conn_id: u64,
    pub seq_no: u64,
    pub queries: Vec<Statement>,
    pub peers: Peers,
}

/// Tabular response to a read query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub columns: Vec<String>,
    pub decl_types: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Response to a write statement or batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecResponse {
    pub rows_affected: u64,
    pub last_insert_id: i64,
}
