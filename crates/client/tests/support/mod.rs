//! In-process mock block producer and miner for integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::{Mutex, MutexGuard};

use dsql_common::crypto::generate_keypair_bytes;
use dsql_common::keyfile;
use dsql_proto::rpc::{
    AddTxReq, AddTxRes, DatabaseProfile, ExecResponse, MinerInfo, NextNonceReq, NextNonceRes,
    PingNodeReq, PingNodeRes, QueryProfileReq, QueryProfileRes, QueryRequest, QueryResponse,
    QueryTxStateReq, QueryTxStateRes, Value, ERR_DATABASE_NOT_FOUND,
};
use dsql_proto::ids::NodeId;
use dsql_proto::tx::TxState;

type RemoteError = (StatusCode, String);

/// Serializes tests that touch the process-wide driver singleton.
pub fn driver_lock() -> MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock()
}

// ============================================================
// MOCK BLOCK PRODUCER
// ============================================================

#[derive(Default)]
pub struct MockChain {
    /// Next nonce handed out per account address (hex).
    nonces: Mutex<HashMap<String, u32>>,
    /// Signed envelopes accepted via add_tx, by hex tx hash.
    pub accepted_txs: Mutex<Vec<String>>,
    /// States served to query_tx_state, in order; the last entry repeats.
    pub tx_states: Mutex<VecDeque<TxState>>,
    /// Raw wire state overriding the script, e.g. "limbo".
    pub tx_state_override: Mutex<Option<String>>,
    /// Forced query_tx_state failure, e.g. (500, "boom").
    pub tx_state_error: Mutex<Option<(u16, String)>>,
    /// Installed database profiles by id.
    profiles: Mutex<HashMap<String, DatabaseProfile>>,
    /// Forced query_profile failure per database id.
    pub profile_errors: Mutex<HashMap<String, (u16, String)>>,
    /// Serve "database not found" until this many profile queries happened.
    pub profile_not_found_until: AtomicU32,
    pub profile_queries: AtomicU32,
    pub pings: AtomicU32,
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        let chain = MockChain::default();
        chain.tx_states.lock().push_back(TxState::Confirmed);
        Arc::new(chain)
    }

    pub fn install_profile(&self, id: &str, term: u64, miners: Vec<MinerInfo>) {
        self.profiles.lock().insert(
            id.to_string(),
            DatabaseProfile {
                id: id.into(),
                term,
                miners,
                users: Vec::new(),
            },
        );
    }

    pub fn remove_profile(&self, id: &str) {
        self.profiles.lock().remove(id);
    }

    pub fn set_tx_states(&self, states: Vec<TxState>) {
        *self.tx_states.lock() = states.into();
    }
}

async fn next_nonce(
    State(chain): State<Arc<MockChain>>,
    Json(req): Json<NextNonceReq>,
) -> Json<NextNonceRes> {
    let mut nonces = chain.nonces.lock();
    let next = nonces.entry(req.addr.to_hex()).or_insert(1);
    let nonce = *next;
    *next += 1;
    Json(NextNonceRes { nonce: dsql_proto::ids::AccountNonce(nonce) })
}

async fn add_tx(
    State(chain): State<Arc<MockChain>>,
    Json(req): Json<AddTxReq>,
) -> Result<Json<AddTxRes>, RemoteError> {
    req.tx
        .verify()
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("bad tx: {}", e)))?;
    let txid = req
        .tx
        .hash()
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
        .to_hex();
    chain.accepted_txs.lock().push(txid.clone());
    Ok(Json(AddTxRes { txid }))
}

async fn query_tx_state(
    State(chain): State<Arc<MockChain>>,
    Json(_req): Json<QueryTxStateReq>,
) -> Result<Json<QueryTxStateRes>, RemoteError> {
    if let Some((code, msg)) = chain.tx_state_error.lock().clone() {
        return Err((StatusCode::from_u16(code).unwrap(), msg));
    }
    if let Some(raw) = chain.tx_state_override.lock().clone() {
        return Ok(Json(QueryTxStateRes { state: raw }));
    }
    let mut states = chain.tx_states.lock();
    let state = if states.len() > 1 {
        states.pop_front().unwrap()
    } else {
        *states.front().expect("mock chain has no tx state scripted")
    };
    Ok(Json(QueryTxStateRes { state: state.as_str().to_string() }))
}

async fn query_profile(
    State(chain): State<Arc<MockChain>>,
    Json(req): Json<QueryProfileReq>,
) -> Result<Json<QueryProfileRes>, RemoteError> {
    let count = chain.profile_queries.fetch_add(1, Ordering::SeqCst) + 1;

    if let Some((code, msg)) = chain.profile_errors.lock().get(req.database_id.as_str()) {
        return Err((StatusCode::from_u16(*code).unwrap(), msg.clone()));
    }
    if count <= chain.profile_not_found_until.load(Ordering::SeqCst) {
        return Err((StatusCode::NOT_FOUND, ERR_DATABASE_NOT_FOUND.into()));
    }
    match chain.profiles.lock().get(req.database_id.as_str()) {
        Some(profile) => Ok(Json(QueryProfileRes { profile: profile.clone() })),
        None => Err((StatusCode::NOT_FOUND, ERR_DATABASE_NOT_FOUND.into())),
    }
}

async fn ping_node(
    State(chain): State<Arc<MockChain>>,
    Json(_req): Json<PingNodeReq>,
) -> Json<PingNodeRes> {
    chain.pings.fetch_add(1, Ordering::SeqCst);
    Json(PingNodeRes { message: "ok".into() })
}

/// Serve the mock chain on an ephemeral port; returns its base url.
pub async fn spawn_chain(chain: Arc<MockChain>) -> String {
    let app = Router::new()
        .route("/v1/next_nonce", post(next_nonce))
        .route("/v1/add_tx", post(add_tx))
        .route("/v1/query_tx_state", post(query_tx_state))
        .route("/v1/query_profile", post(query_profile))
        .route("/v1/ping_node", post(ping_node))
        .with_state(chain);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock chain");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve mock chain");
    });
    format!("http://{}", addr)
}

// ============================================================
// MOCK MINER
// ============================================================

#[derive(Default)]
pub struct MockMiner {
    pub exec_requests: Mutex<Vec<QueryRequest>>,
    pub query_requests: Mutex<Vec<QueryRequest>>,
    /// Rows of the single mock table "test".
    pub table: Mutex<Vec<Vec<Value>>>,
    /// When set, every request fails with 500 "miner offline".
    pub offline: AtomicBool,
}

impl MockMiner {
    pub fn new() -> Arc<Self> {
        Arc::new(MockMiner::default())
    }
}

/// Pull the first integer literal out of "... VALUES(1)".
fn literal_insert_value(pattern: &str) -> Option<i64> {
    let open = pattern.rfind('(')?;
    let close = pattern[open..].find(')')? + open;
    pattern[open + 1..close].trim().parse().ok()
}

async fn miner_exec(
    State(miner): State<Arc<MockMiner>>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<ExecResponse>, RemoteError> {
    if miner.offline.load(Ordering::SeqCst) {
        return Err((StatusCode::INTERNAL_SERVER_ERROR, "miner offline".into()));
    }

    let mut rows_affected = 0u64;
    for stmt in &req.queries {
        let lowered = stmt.pattern.to_lowercase();
        if lowered.starts_with("insert into test") {
            let row = match stmt.params.first() {
                Some(v) => vec![v.clone()],
                None => vec![Value::Integer(
                    literal_insert_value(&stmt.pattern).unwrap_or_default(),
                )],
            };
            miner.table.lock().push(row);
            rows_affected += 1;
        }
    }
    let last_insert_id = miner.table.lock().len() as i64;
    miner.exec_requests.lock().push(req);
    Ok(Json(ExecResponse { rows_affected, last_insert_id }))
}

async fn miner_query(
    State(miner): State<Arc<MockMiner>>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, RemoteError> {
    if miner.offline.load(Ordering::SeqCst) {
        return Err((StatusCode::INTERNAL_SERVER_ERROR, "miner offline".into()));
    }

    let pattern = req
        .queries
        .first()
        .map(|s| s.pattern.to_lowercase())
        .unwrap_or_default();
    miner.query_requests.lock().push(req);

    if pattern.contains("from test") {
        let mut rows = miner.table.lock().clone();
        if pattern.contains("limit 1") {
            rows.truncate(1);
        }
        return Ok(Json(QueryResponse {
            columns: vec!["test".into()],
            decl_types: vec!["int".into()],
            rows,
        }));
    }
    // SHOW TABLES and anything else: an empty result set
    Ok(Json(QueryResponse {
        columns: vec!["name".into()],
        decl_types: vec!["text".into()],
        rows: Vec::new(),
    }))
}

/// Serve the mock miner on an ephemeral port; returns its base url.
pub async fn spawn_miner(miner: Arc<MockMiner>) -> String {
    let app = Router::new()
        .route("/v1/exec", post(miner_exec))
        .route("/v1/query", post(miner_query))
        .with_state(miner);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock miner");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve mock miner");
    });
    format!("http://{}", addr)
}

pub fn miner_info(id: &str, endpoint: &str) -> MinerInfo {
    MinerInfo {
        node_id: NodeId::new(id),
        addr: endpoint.to_string(),
    }
}

// ============================================================
// FIXTURES
// ============================================================

/// Write a keypair and a client config pointing at `block_producers`;
/// returns (config path, combined keypair bytes).
pub fn write_client_fixture(dir: &Path, block_producers: &[String]) -> (PathBuf, Vec<u8>) {
    let (_pk, kp) = generate_keypair_bytes();
    keyfile::save_keypair(dir.join("client.key"), &kp).expect("save keypair");

    let producers = block_producers
        .iter()
        .map(|bp| format!("{:?}", bp))
        .collect::<Vec<_>>()
        .join(", ");
    let config = format!(
        "node_id = \"test-client\"\nprivate_key_file = \"client.key\"\nblock_producers = [{}]\n",
        producers
    );
    let config_path = dir.join("config.toml");
    std::fs::write(&config_path, config).expect("write config");
    (config_path, kp)
}
