//! Driver front-end: one-shot process initialization, DSN open, and the
//! database lifecycle operations against the block-producer quorum.
//!
//! Initialization is guarded by a compare-and-swap so exactly one
//! sequence runs even under concurrent first-time callers; [`reset`]
//! tears the singleton down for test isolation.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};

use dsql_common::config::{self, ClientConfig, DEFAULT_CONFIG_FILE};
use dsql_common::crypto::{address_from_pubkey_bytes, public_key_bytes_from_keypair_bytes};
use dsql_common::keyfile;
use dsql_common::{Address, Hash};
use dsql_proto::ids::{derive_database_id, DatabaseId, NodeId};
use dsql_proto::meta::{Permission, ResourceMeta};
use dsql_proto::rpc::PingNodeReq;
use dsql_proto::tx::{TxEnvelope, TxPayload, TxState};

use crate::conn::{ConnAllocator, Connection};
use crate::coordinator::{CoordinatorClient, TX_POLL_PERIOD};
use crate::dsn::Config;
use crate::error::{Error, Result};
use crate::peers::PeerDirectory;

static DRIVER_INITIALIZED: AtomicBool = AtomicBool::new(false);
static DRIVER_ENV: RwLock<Option<Arc<Env>>> = RwLock::new(None);

/// Everything the initialized driver shares across connections.
pub(crate) struct Env {
    pub(crate) client_config: ClientConfig,
    pub(crate) keypair: Vec<u8>,
    pub(crate) account: Address,
    pub(crate) node_id: NodeId,
    pub(crate) coordinator: Arc<CoordinatorClient>,
    pub(crate) directory: PeerDirectory,
    pub(crate) miner: crate::miner::MinerClient,
    pub(crate) allocator: ConnAllocator,
}

fn current_env() -> Option<Arc<Env>> {
    DRIVER_ENV.read().clone()
}

/// One-shot driver initialization.
///
/// Loads the TOML client config and the local keypair, announces the
/// local node to the block producers (idempotent) and starts the peer
/// directory's refresh loop. A second call fails with
/// `AlreadyInitialized` and does not alter existing state, which keeps a
/// double registration from being resubmitted. A failed first call rolls
/// the guard back so a corrected config can be retried.
pub async fn init(config_path: impl AsRef<Path>, master_key: &[u8]) -> Result<()> {
    if DRIVER_INITIALIZED
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return Err(Error::AlreadyInitialized);
    }

    match build_env(config_path.as_ref(), master_key).await {
        Ok(env) => {
            env.directory.start();
            *DRIVER_ENV.write() = Some(env);
            Ok(())
        }
        Err(e) => {
            DRIVER_INITIALIZED.store(false, Ordering::Release);
            Err(e)
        }
    }
}

async fn build_env(config_path: &Path, master_key: &[u8]) -> Result<Arc<Env>> {
    let client_config =
        config::load_from_file(config_path).map_err(|e| Error::Config(e.to_string()))?;
    let keypair = keyfile::load_keypair(client_config.key_path(config_path), master_key)
        .map_err(|e| Error::Crypto(e.to_string()))?;
    let pubkey = public_key_bytes_from_keypair_bytes(&keypair)?;
    let account = address_from_pubkey_bytes(&pubkey)?;
    let node_id = NodeId::new(
        client_config
            .node_id
            .clone()
            .unwrap_or_else(|| account.to_hex()),
    );

    let coordinator = Arc::new(CoordinatorClient::new(client_config.block_producers.clone())?);

    info!(node = %node_id, account = %account, "announcing local node to block producers");
    coordinator
        .ping_node(&PingNodeReq {
            node_id: node_id.clone(),
            pubkey: hex::encode(&pubkey),
            addr: client_config.listen_addr.clone(),
        })
        .await?;

    let directory = PeerDirectory::new(coordinator.clone(), keypair.clone());

    Ok(Arc::new(Env {
        client_config,
        keypair,
        account,
        node_id,
        coordinator,
        directory,
        miner: crate::miner::MinerClient::new()?,
        allocator: ConnAllocator::new(),
    }))
}

/// Initialize from the well-known default config location. Fails with
/// `NotInitialized` when that location is not resolvable.
async fn default_init() -> Result<()> {
    let path = config::expand_home(DEFAULT_CONFIG_FILE);
    if path == DEFAULT_CONFIG_FILE || !Path::new(&path).exists() {
        debug!(config = %path, "could not find dsql default config location");
        return Err(Error::NotInitialized);
    }
    info!(config = %path, "using dsql default config location");
    init(&path, b"").await
}

/// Open a connection to the database a DSN names.
///
/// Parses the DSN first (failing fast on `InvalidDsn`), then runs
/// default initialization if the process has not initialized yet. No
/// network round-trip happens here beyond initialization; peers are
/// fetched lazily on the first query.
pub async fn open(dsn: &str) -> Result<Connection> {
    let cfg = Config::parse(dsn)?;

    if !DRIVER_INITIALIZED.load(Ordering::Acquire) {
        match default_init().await {
            Ok(()) => {}
            // A concurrent caller won the race; their init serves us.
            Err(Error::AlreadyInitialized) => {}
            Err(e) => return Err(e),
        }
    }

    // A concurrent first-time caller may hold the guard while its
    // environment is still being built; wait briefly for it to publish.
    let mut backoff = 0u32;
    let env = loop {
        if let Some(env) = current_env() {
            break env;
        }
        if !DRIVER_INITIALIZED.load(Ordering::Acquire) || backoff > 200 {
            return Err(Error::NotInitialized);
        }
        backoff += 1;
        tokio::time::sleep(Duration::from_millis(10)).await;
    };
    Ok(Connection::new(env, cfg))
}

/// Send a create-database transaction to the block producers.
///
/// The database id is derived locally from the caller's account and the
/// allocated nonce, so the DSN is available before confirmation
/// completes. Returns the transaction hash and the DSN.
pub async fn create(meta: ResourceMeta) -> Result<(Hash, String)> {
    let env = current_env().ok_or(Error::NotInitialized)?;

    let nonce = env.coordinator.next_nonce(env.account).await?;

    let mut tx = TxEnvelope::new(
        TxPayload::CreateDatabase { owner: env.account, meta },
        env.account,
        nonce,
    );
    tx.sign(&env.keypair).map_err(|e| Error::Crypto(e.to_string()))?;
    let tx_hash = tx.hash().map_err(|e| Error::Crypto(e.to_string()))?;

    env.coordinator.add_tx(tx).await?;

    let database_id = derive_database_id(&env.account, nonce);
    let cfg = Config {
        database_id: database_id.0,
        ..Config::default()
    };
    let dsn = cfg.format_dsn();
    info!(tx_hash = %tx_hash, dsn = %dsn, "create database transaction submitted");
    Ok((tx_hash, dsn))
}

/// Drop a database.
///
/// Evicts the cached peer entry only; no on-chain deprovisioning
/// transaction is submitted, so callers must not assume immediate
/// chain-side teardown. The returned hash is the zero hash.
pub fn drop_database(dsn: &str) -> Result<Hash> {
    let env = current_env().ok_or(Error::NotInitialized)?;
    let cfg = Config::parse(dsn)?;
    env.directory.evict(&DatabaseId::new(cfg.database_id));
    Ok(Hash::zero())
}

/// Send an update-permission transaction for `target_user` on
/// `target_database`.
pub async fn update_permission(
    target_user: Address,
    target_database: &DatabaseId,
    permission: Permission,
) -> Result<Hash> {
    let env = current_env().ok_or(Error::NotInitialized)?;

    let nonce = env.coordinator.next_nonce(env.account).await?;

    let mut tx = TxEnvelope::new(
        TxPayload::UpdatePermission {
            target_user,
            target_database: target_database.clone(),
            permission,
        },
        env.account,
        nonce,
    );
    tx.sign(&env.keypair).map_err(|e| Error::Crypto(e.to_string()))?;
    let tx_hash = tx.hash().map_err(|e| Error::Crypto(e.to_string()))?;

    env.coordinator.add_tx(tx).await?;
    info!(tx_hash = %tx_hash, db = %target_database, "permission update submitted");
    Ok(tx_hash)
}

/// Wait until the transaction reaches a terminal state or `timeout`.
pub async fn wait_tx_confirmation(tx_hash: Hash, timeout: Duration) -> Result<TxState> {
    let env = current_env().ok_or(Error::NotInitialized)?;
    env.coordinator
        .wait_tx_confirmation(tx_hash, timeout, TX_POLL_PERIOD)
        .await
}

/// Wait for a created database to become usable.
///
/// Polls the database profile every `period`; "database not found" is
/// the expected pre-confirmation state and keeps the poll going, while
/// any other error aborts immediately. Once the profile resolves, a
/// trivial read is issued against the assigned miners so success means
/// the data plane answers, not just the control plane.
pub async fn wait_database_creation(dsn: &str, timeout: Duration, period: Duration) -> Result<()> {
    let cfg = Config::parse(dsn)?;
    let env = current_env().ok_or(Error::NotInitialized)?;
    let database_id = DatabaseId::new(cfg.database_id);
    let conn = open(dsn).await?;

    let started = Instant::now();
    let deadline = started + timeout;
    let mut last_err: Option<Error> = None;

    loop {
        match tokio::time::timeout_at(deadline, env.coordinator.query_profile(&database_id)).await {
            Err(_) => return Err(Error::timeout(started.elapsed(), last_err.as_ref())),
            Ok(Ok(_profile)) => {
                // Control plane confirmed; probe the data plane.
                match tokio::time::timeout_at(deadline, conn.query("SHOW TABLES", Vec::new()))
                    .await
                {
                    Err(_) => return Err(Error::timeout(started.elapsed(), last_err.as_ref())),
                    Ok(Ok(_rows)) => {
                        conn.close();
                        return Ok(());
                    }
                    Ok(Err(e)) => {
                        debug!(db = %database_id, error = %e, "miners not reachable yet");
                        last_err = Some(e);
                    }
                }
            }
            Ok(Err(e)) if e.is_database_not_found() => {
                debug!(
                    db = %database_id,
                    elapsed = ?started.elapsed(),
                    "querying database profile"
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

/// Tear down the process-wide driver state: stop the refresh loop and
/// drop the environment. Exists for test isolation; production code has
/// no reason to call it.
pub fn reset() {
    let env = DRIVER_ENV.write().take();
    if let Some(env) = env {
        env.directory.stop();
    }
    DRIVER_INITIALIZED.store(false, Ordering::Release);
}

/// Whether the driver has completed initialization.
pub fn is_initialized() -> bool {
    DRIVER_INITIALIZED.load(Ordering::Acquire) && current_env().is_some()
}

/// Account address of the local identity.
pub fn local_account() -> Result<Address> {
    current_env()
        .map(|env| env.account)
        .ok_or(Error::NotInitialized)
}

/// Snapshot of the loaded client configuration.
pub fn client_config() -> Result<ClientConfig> {
    current_env()
        .map(|env| env.client_config.clone())
        .ok_or(Error::NotInitialized)
}
