//! The driver's error taxonomy.
//!
//! Chain-reported domain errors ("database not found", "no such database")
//! travel as non-2xx response bodies; the classifiers here recognize them
//! wherever they surface so pollers can treat them as expected signals
//! while every other path treats them as fatal.

use thiserror::Error;

use dsql_proto::rpc::{ERR_DATABASE_NOT_FOUND, ERR_NO_SUCH_DATABASE};

pub type Result<T> = std::result::Result<T, Error>;

/// Various errors the driver might return.
#[derive(Debug, Error)]
pub enum Error {
    /// The driver is not initialized yet.
    #[error("driver not initialized")]
    NotInitialized,

    /// The driver is already initialized.
    #[error("driver already initialized")]
    AlreadyInitialized,

    /// The DSN could not be parsed.
    #[error("invalid dsn: {0}")]
    InvalidDsn(String),

    /// Invalid sequence no of request.
    #[error("invalid request sequence applied")]
    InvalidRequestSeq,

    /// The chain-side database profile is malformed or lists no miners.
    #[error("invalid database profile")]
    InvalidProfile,

    /// A read query was presented during an open write transaction.
    #[error("only write is supported during transaction")]
    QueryInTransaction,

    /// `begin` was called while a transaction is already open.
    #[error("transaction already open on this connection")]
    TransactionActive,

    /// `commit` was called with no open transaction.
    #[error("no transaction open on this connection")]
    NoTransaction,

    /// The connection has been closed.
    #[error("connection is closed")]
    ConnClosed,

    /// The database's profile has not confirmed on the chain yet.
    #[error("database not found")]
    DatabaseNotFound,

    /// The database existed once but is gone from the chain.
    #[error("no such database")]
    NoSuchDatabase,

    /// The coordinator reported a transaction state this driver does not know.
    #[error("unknown transaction state: {0}")]
    UnknownTxState(String),

    /// Transport- or remote-reported RPC failure.
    #[error("rpc: {0}")]
    Rpc(String),

    /// A deadline elapsed before a wait completed. Distinct from submission
    /// failure: the submitted work's outcome is unknown and a retry is only
    /// safe via a nonce-fresh resubmission.
    #[error("wait timed out after {elapsed_ms} ms (last error: {last_error})")]
    Timeout {
        elapsed_ms: u64,
        /// Display of the last per-tick error, or "none".
        last_error: String,
    },

    /// Local configuration problem.
    #[error("config: {0}")]
    Config(String),

    /// Key handling or signing problem.
    #[error("crypto: {0}")]
    Crypto(String),
}

impl Error {
    /// Build a timeout error carrying the most specific last observation.
    pub(crate) fn timeout(elapsed: std::time::Duration, last: Option<&Error>) -> Self {
        Error::Timeout {
            elapsed_ms: elapsed.as_millis() as u64,
            last_error: last.map(|e| e.to_string()).unwrap_or_else(|| "none".into()),
        }
    }

    /// Map a remote non-2xx body to the taxonomy.
    pub(crate) fn from_remote(status: u16, body: &str) -> Self {
        let msg = body.trim();
        if msg.contains(ERR_NO_SUCH_DATABASE) {
            Error::NoSuchDatabase
        } else if msg.contains(ERR_DATABASE_NOT_FOUND) {
            Error::DatabaseNotFound
        } else if msg.contains("invalid request sequence") {
            Error::InvalidRequestSeq
        } else {
            Error::Rpc(format!("status {}: {}", status, msg))
        }
    }

    /// Expected while a created database has not confirmed yet.
    pub fn is_database_not_found(&self) -> bool {
        matches!(self, Error::DatabaseNotFound)
    }

    /// Reported when a tracked database no longer exists on the chain.
    pub fn is_no_such_database(&self) -> bool {
        matches!(self, Error::NoSuchDatabase)
    }
}

impl From<dsql_common::crypto::CryptoError> for Error {
    fn from(e: dsql_common::crypto::CryptoError) -> Self {
        Error::Crypto(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Rpc(e.to_string())
    }
}
