//! Transaction envelope helper.
//!
//! The only sanctioned way to group multiple writes atomically. Direct
//! multi-statement sequences outside this helper carry no atomicity
//! guarantee.

use std::future::Future;

use tracing::warn;

use dsql_proto::rpc::Value;

use crate::conn::Connection;
use crate::error::Result;
use crate::result::ExecResult;

/// Handle passed to the closure of [`with_transaction`]; accepts writes
/// only. Read queries on the underlying connection fail with
/// `QueryInTransaction` until the transaction closes.
pub struct Transaction<'a> {
    conn: &'a Connection,
}

impl<'a> Transaction<'a> {
    /// Buffer a write for the atomic batch submitted at commit.
    pub async fn exec(&self, sql: &str, params: Vec<Value>) -> Result<ExecResult> {
        self.conn.exec(sql, params).await
    }

    pub fn connection(&self) -> &Connection {
        self.conn
    }
}

/// Begin a transaction, run `f`, commit on success.
///
/// Any error from `f` triggers a rollback and propagates unchanged; the
/// rollback's own outcome never masks the triggering error.
pub async fn with_transaction<'a, T, Fut>(
    conn: &'a Connection,
    f: impl FnOnce(Transaction<'a>) -> Fut,
) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    conn.begin()?;
    match f(Transaction { conn }).await {
        Ok(value) => {
            conn.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rb) = conn.rollback() {
                warn!(error = %rb, "rollback failed after transaction error");
            }
            Err(err)
        }
    }
}
