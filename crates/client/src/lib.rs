//! # dsql Client Crate
//!
//! Client driver for dsql, a blockchain-anchored distributed SQL
//! database. A quorum of block producers (the coordinator chain) owns
//! every database's metadata (identity, miner assignment, per-user
//! permissions, account nonces) while the assigned miners execute the
//! SQL itself. This crate makes that multi-party, asynchronous
//! confirmation machinery look like a synchronous database call.
//!
//! ## Modules
//!
//! - [`dsn`]: connection-string parsing and formatting
//! - [`driver`]: one-shot init, `open`, and lifecycle transactions
//! - [`coordinator`]: RPC client for the block-producer quorum
//! - [`peers`]: cached, background-refreshed signed peer sets
//! - [`conn`]: connections, routing and transaction batching
//! - [`rows`] / [`result`]: read and write result adapters
//! - [`txn`]: the begin/commit/rollback envelope helper
//! - [`receipt`]: out-of-band request receipts
//! - [`error`]: the driver error taxonomy
//!
//! ## Usage
//! ```rust,ignore
//! dsql_client::init("~/.dsql/config.toml", b"").await?;
//! let (tx_hash, dsn) = dsql_client::create(ResourceMeta { node: 3, ..Default::default() }).await?;
//! dsql_client::wait_tx_confirmation(tx_hash, Duration::from_secs(60)).await?;
//! dsql_client::wait_database_creation(&dsn, Duration::from_secs(60), Duration::from_secs(3)).await?;
//!
//! let conn = dsql_client::open(&dsn).await?;
//! conn.exec("CREATE TABLE test (test int)", vec![]).await?;
//! conn.exec("INSERT INTO test VALUES (?)", vec![1.into()]).await?;
//! let mut rows = conn.query("SELECT * FROM test LIMIT 1", vec![]).await?;
//! ```

pub mod conn;
pub mod coordinator;
pub mod driver;
pub mod dsn;
pub mod error;
pub mod miner;
pub mod peers;
pub mod receipt;
pub mod result;
pub mod rows;
pub mod txn;

pub use conn::Connection;
pub use coordinator::CoordinatorClient;
pub use driver::{
    client_config, create, drop_database, init, is_initialized, local_account, open, reset,
    update_permission, wait_database_creation, wait_tx_confirmation,
};
pub use dsn::{Config, DB_SCHEME};
pub use error::{Error, Result};
pub use peers::{PeerDirectory, PeerEntry, PEERS_UPDATE_INTERVAL};
pub use receipt::{Receipt, ReceiptSlot};
pub use result::ExecResult;
pub use rows::Rows;
pub use txn::{with_transaction, Transaction};
