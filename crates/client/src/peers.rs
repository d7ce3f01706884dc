//! Peer directory: a concurrently-readable cache of signed peer sets.
//!
//! Maps a database id to the miners currently serving it. Reads are
//! cache-first with a live fetch-and-sign on miss. A background loop
//! refreshes every tracked database on a fixed interval, replacing each
//! entry wholesale so concurrent readers always observe either the old or
//! the new set, never a partial one. No lock is held across a network
//! round-trip.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::RwLock;
use tracing::{debug, warn};

use dsql_proto::ids::{DatabaseId, NodeId};
use dsql_proto::peers::Peers;

use crate::coordinator::CoordinatorClient;
use crate::error::{Error, Result};

/// Default peers list refresh interval for the client.
pub const PEERS_UPDATE_INTERVAL: Duration = Duration::from_secs(5);

/// One cached peer set plus the data-plane endpoints of its members.
#[derive(Debug, Clone)]
pub struct PeerEntry {
    /// The signed peer set, attached to data-plane requests as the
    /// authorization credential.
    pub peers: Peers,
    endpoints: HashMap<NodeId, String>,
}

impl PeerEntry {
    pub fn endpoint_of(&self, node: &NodeId) -> Option<&str> {
        self.endpoints.get(node).map(String::as_str)
    }
}

struct Inner {
    coordinator: Arc<CoordinatorClient>,
    keypair: Vec<u8>,
    cache: RwLock<HashMap<DatabaseId, Arc<PeerEntry>>>,
    running: AtomicBool,
    interval: Duration,
}

/// The directory itself; cheap to clone, shared across callers and the
/// background refresh task.
#[derive(Clone)]
pub struct PeerDirectory {
    inner: Arc<Inner>,
}

impl PeerDirectory {
    pub fn new(coordinator: Arc<CoordinatorClient>, keypair: Vec<u8>) -> Self {
        Self::with_interval(coordinator, keypair, PEERS_UPDATE_INTERVAL)
    }

    pub fn with_interval(
        coordinator: Arc<CoordinatorClient>,
        keypair: Vec<u8>,
        interval: Duration,
    ) -> Self {
        PeerDirectory {
            inner: Arc::new(Inner {
                coordinator,
                keypair,
                cache: RwLock::new(HashMap::new()),
                running: AtomicBool::new(false),
                interval,
            }),
        }
    }

    /// Cache-first lookup; on miss fetches the profile, signs the peer
    /// set and stores it.
    pub async fn get(&self, database_id: &DatabaseId) -> Result<Arc<PeerEntry>> {
        if let Some(entry) = self.inner.cache.read().get(database_id) {
            debug!(db = %database_id, hit = true, "cache get peers for database");
            return Ok(entry.clone());
        }
        debug!(db = %database_id, hit = false, "cache get peers for database");
        self.inner.fetch_and_store(database_id).await
    }

    /// Remove a database from the cache. Returns whether it was tracked.
    pub fn evict(&self, database_id: &DatabaseId) -> bool {
        self.inner.cache.write().remove(database_id).is_some()
    }

    /// Number of tracked databases.
    pub fn tracked(&self) -> usize {
        self.inner.cache.read().len()
    }

    /// Start the background refresh loop. At most one loop runs per
    /// directory; a second start is a silent no-op. Must be called from
    /// within a tokio runtime.
    pub fn start(&self) {
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let inner = self.inner.clone();
        tokio::spawn(async move {
            loop {
                if !inner.running.load(Ordering::Acquire) {
                    return;
                }

                let tracked: Vec<DatabaseId> = inner.cache.read().keys().cloned().collect();
                let refreshes = tracked.iter().map(|db| inner.refresh_one(db));
                join_all(refreshes).await;

                tokio::time::sleep(inner.interval).await;
            }
        });
    }

    /// Ask the refresh loop to exit on its next tick. In-flight fetches
    /// are left to finish.
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }
}

impl Inner {
    async fn fetch_and_store(&self, database_id: &DatabaseId) -> Result<Arc<PeerEntry>> {
        let profile = self.coordinator.query_profile(database_id).await?;
        if profile.miners.is_empty() {
            return Err(Error::InvalidProfile);
        }

        let servers: Vec<NodeId> = profile.miners.iter().map(|m| m.node_id.clone()).collect();
        let leader = servers[0].clone();
        let mut peers = Peers::new(profile.term, leader, servers)
            .map_err(|_| Error::InvalidProfile)?;
        peers
            .sign(&self.keypair)
            .map_err(|e| Error::Crypto(e.to_string()))?;

        let endpoints = profile
            .miners
            .into_iter()
            .map(|m| (m.node_id, m.addr))
            .collect();
        let entry = Arc::new(PeerEntry { peers, endpoints });

        // Whole-value replacement: readers see the old or the new set.
        self.cache
            .write()
            .insert(database_id.clone(), entry.clone());

        debug!(db = %database_id, peers = entry.peers.servers.len(), "peers updated for database");
        Ok(entry)
    }

    async fn refresh_one(&self, database_id: &DatabaseId) {
        match self.fetch_and_store(database_id).await {
            Ok(_) => {}
            Err(e) if e.is_no_such_database() => {
                warn!(db = %database_id, "database no longer exists, stopping peers update");
                self.cache.write().remove(database_id);
            }
            Err(e) => {
                // Transient failure: the stale entry stays serviceable.
                debug!(db = %database_id, error = %e, "update peers failed");
            }
        }
    }
}

impl std::fmt::Debug for PeerDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerDirectory")
            .field("tracked", &self.tracked())
            .field("running", &self.is_running())
            .finish()
    }
}
