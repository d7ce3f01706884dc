//! # dsql Proto Crate
//!
//! Wire-level data contract between the dsql client, the block-producer
//! quorum (coordinator chain) and the miners that execute SQL.
//!
//! ## Modules
//!
//! - [`ids`]: `DatabaseId`, `NodeId`, `AccountNonce` and the deterministic
//!   database-id derivation
//! - [`meta`]: `ResourceMeta` provisioning requests and permission grants
//! - [`tx`]: signed transaction envelopes and `TxState`
//! - [`peers`]: the signed per-database peer set
//! - [`rpc`]: request/response pairs for coordinator and data-plane RPC

pub mod ids;
pub mod meta;
pub mod peers;
pub mod rpc;
pub mod tx;

pub use ids::{derive_database_id, AccountNonce, DatabaseId, NodeId};
pub use meta::{Permission, PermissionRole, ResourceMeta};
pub use peers::Peers;
pub use tx::{TxEnvelope, TxPayload, TxState};
