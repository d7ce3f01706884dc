//! Client for the block-producer quorum.
//!
//! Every call is a JSON POST against one producer endpoint. Transport
//! failures and 5xx answers fail over to the next endpoint in order,
//! starting from the last endpoint that answered; a 4xx is an
//! authoritative answer and is returned as-is. Confirmation waits are
//! deadline-driven and cancellable at every poll boundary.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};

use dsql_common::{Address, Hash};
use dsql_proto::ids::{AccountNonce, DatabaseId};
use dsql_proto::rpc::{
    AddTxReq, AddTxRes, DatabaseProfile, NextNonceReq, NextNonceRes, PingNodeReq, PingNodeRes,
    QueryProfileReq, QueryProfileRes, QueryTxStateReq, QueryTxStateRes,
};
use dsql_proto::tx::{TxEnvelope, TxState};

use crate::error::{Error, Result};

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default interval between confirmation polls.
pub const TX_POLL_PERIOD: Duration = Duration::from_secs(1);

pub struct CoordinatorClient {
    endpoints: Vec<String>,
    last_good: AtomicUsize,
    http: reqwest::Client,
}

impl CoordinatorClient {
    pub fn new(endpoints: Vec<String>) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(Error::Config("no block producer endpoints".into()));
        }
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("build http client: {}", e)))?;
        Ok(CoordinatorClient {
            endpoints,
            last_good: AtomicUsize::new(0),
            http,
        })
    }

    async fn post<Req, Res>(&self, path: &str, req: &Req) -> Result<Res>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let start = self.last_good.load(Ordering::Relaxed);
        let mut last_err = Error::Rpc("no block producer reachable".into());

        for offset in 0..self.endpoints.len() {
            let idx = (start + offset) % self.endpoints.len();
            let base = self.endpoints[idx].trim_end_matches('/');
            let url = format!("{}/v1/{}", base, path);

            match self.http.post(&url).json(req).send().await {
                Ok(resp) if resp.status().is_success() => {
                    self.last_good.store(idx, Ordering::Relaxed);
                    return resp.json::<Res>().await.map_err(Error::from);
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    let err = Error::from_remote(status.as_u16(), &body);
                    if !status.is_server_error() {
                        // An authoritative answer; asking another producer
                        // would yield the same verdict.
                        self.last_good.store(idx, Ordering::Relaxed);
                        return Err(err);
                    }
                    warn!(endpoint = base, %status, "block producer error, trying next");
                    last_err = err;
                }
                Err(e) => {
                    debug!(endpoint = base, error = %e, "block producer unreachable, trying next");
                    last_err = Error::Rpc(e.to_string());
                }
            }
        }
        Err(last_err)
    }

    /// Allocate the next unused nonce for `addr`. Allocation is never
    /// rolled back, even when the transaction it was fetched for fails.
    pub async fn next_nonce(&self, addr: Address) -> Result<AccountNonce> {
        let res: NextNonceRes = self.post("next_nonce", &NextNonceReq { addr }).await?;
        Ok(res.nonce)
    }

    /// Submit a signed metadata transaction.
    pub async fn add_tx(&self, tx: TxEnvelope) -> Result<()> {
        let _res: AddTxRes = self.post("add_tx", &AddTxReq { tx, ttl: 1 }).await?;
        Ok(())
    }

    pub async fn query_tx_state(&self, hash: Hash) -> Result<TxState> {
        let res: QueryTxStateRes = self.post("query_tx_state", &QueryTxStateReq { hash }).await?;
        res.state
            .parse()
            .map_err(|_| Error::UnknownTxState(res.state))
    }

    pub async fn query_profile(&self, database_id: &DatabaseId) -> Result<DatabaseProfile> {
        let res: QueryProfileRes = self
            .post(
                "query_profile",
                &QueryProfileReq { database_id: database_id.clone() },
            )
            .await?;
        Ok(res.profile)
    }

    /// Announce the local node. Re-announcing an already-known node is
    /// not an error.
    pub async fn ping_node(&self, req: &PingNodeReq) -> Result<()> {
        let _res: PingNodeRes = self.post("ping_node", req).await?;
        Ok(())
    }

    /// Poll `query_tx_state` until a terminal state or `timeout`.
    ///
    /// Per-tick RPC failures are logged and retried; they surface as the
    /// last-error of the timeout when the deadline wins. An unknown
    /// state string aborts immediately.
    pub async fn wait_tx_confirmation(
        &self,
        tx_hash: Hash,
        timeout: Duration,
        period: Duration,
    ) -> Result<TxState> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut last_err: Option<Error> = None;

        loop {
            match tokio::time::timeout_at(deadline, self.query_tx_state(tx_hash)).await {
                Err(_) => return Err(Error::timeout(started.elapsed(), last_err.as_ref())),
                Ok(Ok(state)) => {
                    debug!(
                        tx_hash = %tx_hash,
                        tx_state = %state,
                        elapsed = ?started.elapsed(),
                        "waiting for tx confirmation"
                    );
                    if state.is_terminal() {
                        return Ok(state);
                    }
                }
                Ok(Err(e @ Error::UnknownTxState(_))) => return Err(e),
                Ok(Err(e)) => {
                    debug!(tx_hash = %tx_hash, error = %e, "tx state poll failed");
                    last_err = Some(e);
                }
            }

            if tokio::time::timeout_at(deadline, tokio::time::sleep(period))
                .await
                .is_err()
            {
                return Err(Error::timeout(started.elapsed(), last_err.as_ref()));
            }
        }
    }

    /// Poll the database profile until it resolves or `timeout`.
    ///
    /// "database not found" keeps the poll going (the expected state
    /// before the creation confirms); any other error is fatal
    /// immediately and is not retried to the deadline.
    pub async fn wait_database_profile(
        &self,
        database_id: &DatabaseId,
        timeout: Duration,
        period: Duration,
    ) -> Result<DatabaseProfile> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut last_err: Option<Error> = None;

        loop {
            match tokio::time::timeout_at(deadline, self.query_profile(database_id)).await {
                Err(_) => return Err(Error::timeout(started.elapsed(), last_err.as_ref())),
                Ok(Ok(profile)) => return Ok(profile),
                Ok(Err(e)) if e.is_database_not_found() => {
                    debug!(
                        db = %database_id,
                        elapsed = ?started.elapsed(),
                        "database profile not confirmed yet"
                    );
                    last_err = Some(e);
                }
                Ok(Err(e)) => return Err(e),
            }

            if tokio::time::timeout_at(deadline, tokio::time::sleep(period))
                .await
                .is_err()
            {
                return Err(Error::timeout(started.elapsed(), last_err.as_ref()));
            }
        }
    }
}

impl std::fmt::Debug for CoordinatorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorClient")
            .field("endpoints", &self.endpoints)
            .finish()
    }
}
