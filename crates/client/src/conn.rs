//! Connection bound to one database's peer set.
//!
//! Reads are routed by the DSN's leader/follower preference; writes
//! always go to the leader. While a transaction is open, writes are
//! buffered locally and submitted as one atomic batch at commit, and
//! read queries are rejected.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;
use tracing::debug;

use dsql_common::crypto::sha3_512;
use dsql_proto::ids::{DatabaseId, NodeId};
use dsql_proto::peers::Peers;
use dsql_proto::rpc::{QueryRequest, Statement, Value};

use crate::driver::Env;
use crate::dsn::Config;
use crate::error::{Error, Result};
use crate::receipt::{Receipt, ReceiptSlot};
use crate::result::ExecResult;
use crate::rows::Rows;

/// Bounded pool of connection ids plus the global request sequence.
///
/// Ids are checked out on demand and returned to a free list on release;
/// the lock is held only around the free-list mutation, never around a
/// network call. Sequence numbers are globally monotonic.
pub(crate) struct ConnAllocator {
    free: Mutex<Vec<u64>>,
    seq: AtomicU64,
}

impl ConnAllocator {
    pub(crate) fn new() -> Self {
        ConnAllocator {
            free: Mutex::new(Vec::new()),
            seq: AtomicU64::new(0),
        }
    }

    pub(crate) fn allocate(&self) -> u64 {
        let recycled = self.free.lock().pop();
        recycled.unwrap_or_else(|| rand::thread_rng().gen())
    }

    pub(crate) fn release(&self, conn_id: u64) {
        self.free.lock().push(conn_id);
    }

    pub(crate) fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }
}

struct ConnState {
    closed: bool,
    in_tx: bool,
    pending: Vec<Statement>,
}

/// A connection to one database, produced by [`crate::driver::open`].
pub struct Connection {
    cfg: Config,
    env: Arc<Env>,
    conn_id: u64,
    state: Mutex<ConnState>,
}

impl Connection {
    pub(crate) fn new(env: Arc<Env>, cfg: Config) -> Self {
        let conn_id = env.allocator.allocate();
        Connection {
            cfg,
            env,
            conn_id,
            state: Mutex::new(ConnState {
                closed: false,
                in_tx: false,
                pending: Vec::new(),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn database_id(&self) -> DatabaseId {
        DatabaseId::new(self.cfg.database_id.clone())
    }

    pub fn in_transaction(&self) -> bool {
        self.state.lock().in_tx
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Execute a read query.
    pub async fn query(&self, sql: &str, params: Vec<Value>) -> Result<Rows> {
        self.query_with_receipt(sql, params, None).await
    }

    /// Execute a read query, populating `slot` with the request hash on
    /// success.
    pub async fn query_with_receipt(
        &self,
        sql: &str,
        params: Vec<Value>,
        slot: Option<&ReceiptSlot>,
    ) -> Result<Rows> {
        {
            let st = self.state.lock();
            if st.closed {
                return Err(Error::ConnClosed);
            }
            if st.in_tx {
                return Err(Error::QueryInTransaction);
            }
        }

        let stmt = Statement::with_params(sql, params);
        let (endpoint, req) = self.build_request(vec![stmt], true).await?;
        let res = self.env.miner.query(&endpoint, &req).await?;
        populate_receipt(slot, &req);
        Ok(Rows::new(res))
    }

    /// Execute a write statement. Inside an open transaction the write is
    /// buffered and applied atomically at commit; the returned counts are
    /// zero until then.
    pub async fn exec(&self, sql: &str, params: Vec<Value>) -> Result<ExecResult> {
        self.exec_with_receipt(sql, params, None).await
    }

    /// Execute a write statement, populating `slot` with the request hash
    /// once the write (or the batch it joins) reaches a miner.
    pub async fn exec_with_receipt(
        &self,
        sql: &str,
        params: Vec<Value>,
        slot: Option<&ReceiptSlot>,
    ) -> Result<ExecResult> {
        let stmt = Statement::with_params(sql, params);
        {
            let mut st = self.state.lock();
            if st.closed {
                return Err(Error::ConnClosed);
            }
            if st.in_tx {
                st.pending.push(stmt);
                return Ok(ExecResult::default());
            }
        }

        let (endpoint, req) = self.build_request(vec![stmt], false).await?;
        let res = self.env.miner.exec(&endpoint, &req).await?;
        populate_receipt(slot, &req);
        Ok(res.into())
    }

    /// Open a transaction on this connection.
    pub fn begin(&self) -> Result<()> {
        let mut st = self.state.lock();
        if st.closed {
            return Err(Error::ConnClosed);
        }
        if st.in_tx {
            return Err(Error::TransactionActive);
        }
        st.in_tx = true;
        Ok(())
    }

    /// Submit the buffered writes as one atomic batch and close the
    /// transaction.
    pub async fn commit(&self) -> Result<ExecResult> {
        let pending = {
            let mut st = self.state.lock();
            if st.closed {
                return Err(Error::ConnClosed);
            }
            if !st.in_tx {
                return Err(Error::NoTransaction);
            }
            st.in_tx = false;
            std::mem::take(&mut st.pending)
        };

        if pending.is_empty() {
            return Ok(ExecResult::default());
        }

        let (endpoint, req) = self.build_request(pending, false).await?;
        let res = self.env.miner.exec(&endpoint, &req).await?;
        debug!(conn_id = self.conn_id, statements = req.queries.len(), "transaction committed");
        Ok(res.into())
    }

    /// Discard buffered writes and close the transaction. Rolling back
    /// with no open transaction is a no-op.
    pub fn rollback(&self) -> Result<()> {
        let mut st = self.state.lock();
        if st.closed {
            return Err(Error::ConnClosed);
        }
        st.in_tx = false;
        st.pending.clear();
        Ok(())
    }

    /// Return the connection id to the free list. Idempotent.
    pub fn close(&self) {
        let mut st = self.state.lock();
        if st.closed {
            return;
        }
        st.closed = true;
        st.in_tx = false;
        st.pending.clear();
        self.env.allocator.release(self.conn_id);
    }

    async fn build_request(
        &self,
        queries: Vec<Statement>,
        is_read: bool,
    ) -> Result<(String, QueryRequest)> {
        let database_id = self.database_id();
        let entry = self.env.directory.get(&database_id).await?;

        let node = if is_read {
            self.pick_read_node(&entry.peers)
        } else {
            entry.peers.leader.clone()
        };
        let endpoint = entry
            .endpoint_of(&node)
            .ok_or(Error::InvalidProfile)?
            .to_string();

        let req = QueryRequest {
            database_id,
            node_id: self.env.node_id.clone(),
            conn_id: self.conn_id,
            seq_no: self.env.allocator.next_seq(),
            queries,
            peers: entry.peers.clone(),
        };
        Ok((endpoint, req))
    }

    /// Candidate set for reads honors the DSN flags; an empty set falls
    /// back to the leader.
    fn pick_read_node(&self, peers: &Peers) -> NodeId {
        let mut candidates: Vec<NodeId> = Vec::new();
        if self.cfg.use_leader {
            candidates.push(peers.leader.clone());
        }
        if self.cfg.use_follower {
            candidates.extend(peers.followers().cloned());
        }
        if candidates.is_empty() {
            return peers.leader.clone();
        }
        let pick = rand::thread_rng().gen_range(0..candidates.len());
        candidates.swap_remove(pick)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("database_id", &self.cfg.database_id)
            .field("conn_id", &self.conn_id)
            .field("in_transaction", &self.in_transaction())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn populate_receipt(slot: Option<&ReceiptSlot>, req: &QueryRequest) {
    if let Some(slot) = slot {
        if let Ok(bytes) = serde_json::to_vec(req) {
            slot.set(Receipt { request_hash: sha3_512(&bytes) });
        }
    }
}
