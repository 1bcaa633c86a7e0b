//! Peer table: what the local node knows about every peer it has heard.
//!
//! Every peer moves through a small state machine driven by advertisements
//! and completed transfers:
//!
//! ```text
//! (absent) --advertisement seen--> HEARD
//! HEARD --advertised version != known--> INCONSISTENT
//! HEARD --advertised version == known--> SYNCHRONIZED
//! INCONSISTENT --transfer completes--> SYNCHRONIZED
//! SYNCHRONIZED --advertised version != known--> INCONSISTENT
//! (any) --expired--> evicted
//! ```
//!
//! All reads and read-decide-write sequences happen under a single lock
//! acquisition, and every access evicts expired entries first, so the table
//! never hands out a peer whose advertisement has lapsed.

use parking_lot::Mutex;
use std::{
    collections::HashMap,
    fmt,
    net::IpAddr,
    sync::Arc,
    time::Duration,
};
use tokio::time::Instant;

#[cfg(feature = "metrics")]
use crate::metrics;
use crate::{
    dataset::VersionedDataset,
    error::Result,
    message::HelloMessage,
};

/// Reconciliation state of a peer, from the local node's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PeerState {
    /// Advertisement seen, nothing known about the peer's view of us.
    Heard,
    /// The peer advertises a version we do not hold.
    Inconsistent,
    /// We hold the version the peer advertises.
    Synchronized,
}

impl PeerState {
    /// Upper-case name of the state.
    pub const fn as_str(&self) -> &'static str {
        match self {
            PeerState::Heard => "HEARD",
            PeerState::Inconsistent => "INCONSISTENT",
            PeerState::Synchronized => "SYNCHRONIZED",
        }
    }
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything known about one peer.
#[derive(Debug, Clone)]
pub struct PeerRecord {
    peer_id: String,
    peer_addr: IpAddr,
    expires_at: Instant,
    state: PeerState,
    dataset: Arc<VersionedDataset>,
}

impl PeerRecord {
    /// A freshly heard peer with an empty dataset.
    pub fn new(peer_id: impl Into<String>, peer_addr: IpAddr, ttl: Duration) -> Self {
        Self {
            peer_id: peer_id.into(),
            peer_addr,
            expires_at: Instant::now() + ttl,
            state: PeerState::Heard,
            dataset: Arc::new(VersionedDataset::empty()),
        }
    }

    /// Identifier of the peer.
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Source address of the peer's last advertisement.
    pub fn peer_addr(&self) -> IpAddr {
        self.peer_addr
    }

    /// Instant after which the peer is forgotten.
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Current reconciliation state.
    pub fn state(&self) -> PeerState {
        self.state
    }

    /// Last fully received copy of the peer's dataset.
    pub fn dataset(&self) -> Arc<VersionedDataset> {
        self.dataset.clone()
    }

    /// Version of [`dataset`](Self::dataset).
    pub fn version(&self) -> i64 {
        self.dataset.version()
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at < now
    }

    fn transition(&mut self, to: PeerState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        tracing::info!(peer = %self.peer_id, %from, %to, "peer state changed");
        #[cfg(feature = "metrics")]
        metrics::record_state_transition(from, to);
    }
}

/// Result of applying one advertisement to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// State of the sender after the advertisement.
    pub state: PeerState,
    /// Version we hold for the sender.
    pub version: i64,
    /// True if the sender was not in the table before.
    pub created: bool,
}

/// What a LIST part means for its sender, decided under the table lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListDecision {
    /// The sender is not in the table.
    UnknownPeer,
    /// The sender is already SYNCHRONIZED.
    AlreadySynchronized,
    /// We already hold the offered version; the sender is now SYNCHRONIZED.
    UpToDate,
    /// The part belongs to a transfer we still need.
    Assemble,
}

/// Result of installing an assembled dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Dataset installed, sender now SYNCHRONIZED.
    Installed,
    /// The sender is no longer in the table.
    UnknownPeer,
    /// The sender became SYNCHRONIZED while the transfer was in flight.
    AlreadySynchronized,
}

/// Thread-safe map of peer ID to [`PeerRecord`].
#[derive(Debug)]
pub struct PeerTable {
    peers: Mutex<HashMap<String, PeerRecord>>,
    refresh_expiry: bool,
}

impl Default for PeerTable {
    fn default() -> Self {
        Self::new(true)
    }
}

impl PeerTable {
    /// Create an empty table.
    ///
    /// With `refresh_expiry`, every advertisement pushes the expiry of its
    /// sender forward; otherwise a peer expires one interval after it was
    /// first heard and is then rediscovered from scratch.
    pub fn new(refresh_expiry: bool) -> Self {
        Self {
            peers: Mutex::new(HashMap::new()),
            refresh_expiry,
        }
    }

    /// Get a copy of a peer's record.
    pub fn get(&self, peer_id: &str) -> Option<PeerRecord> {
        let mut peers = self.peers.lock();
        Self::evict_expired(&mut peers);
        peers.get(peer_id).cloned()
    }

    /// Check if a peer is known.
    pub fn contains(&self, peer_id: &str) -> bool {
        let mut peers = self.peers.lock();
        Self::evict_expired(&mut peers);
        peers.contains_key(peer_id)
    }

    /// IDs of every known peer, sorted.
    pub fn peer_ids(&self) -> Vec<String> {
        let mut peers = self.peers.lock();
        Self::evict_expired(&mut peers);
        let mut ids: Vec<String> = peers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of known peers.
    pub fn len(&self) -> usize {
        let mut peers = self.peers.lock();
        Self::evict_expired(&mut peers);
        peers.len()
    }

    /// Check if no peer is known.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// State of a peer.
    pub fn state_of(&self, peer_id: &str) -> Option<PeerState> {
        self.get_with(peer_id, |r| r.state)
    }

    /// Version we hold for a peer.
    pub fn version_of(&self, peer_id: &str) -> Option<i64> {
        self.get_with(peer_id, |r| r.version())
    }

    /// Apply an advertisement from `source`.
    ///
    /// Creates the sender's record if needed, then, if the advertisement
    /// lists `local_id`, compares the advertised version with the one we
    /// hold and moves the sender to INCONSISTENT or SYNCHRONIZED.
    pub fn observe_hello(
        &self,
        hello: &HelloMessage,
        source: IpAddr,
        local_id: &str,
    ) -> Observation {
        let now = Instant::now();
        let ttl = Duration::from_secs(u64::from(hello.advertise_interval()));
        let mut peers = self.peers.lock();
        Self::evict_expired(&mut peers);

        let mut created = false;
        let record = peers
            .entry(hello.sender_id().to_string())
            .or_insert_with(|| {
                created = true;
                PeerRecord::new(hello.sender_id(), source, ttl)
            });

        if created {
            tracing::info!(peer = %record.peer_id, addr = %source, "peer discovered");
            #[cfg(feature = "metrics")]
            metrics::record_peer_added();
        } else {
            record.peer_addr = source;
            if self.refresh_expiry {
                record.expires_at = now + ttl;
            }
        }

        if hello.lists_peer(local_id) {
            if record.version() == hello.sequence() {
                record.transition(PeerState::Synchronized);
            } else {
                record.transition(PeerState::Inconsistent);
            }
        }

        let observation = Observation {
            state: record.state,
            version: record.version(),
            created,
        };

        #[cfg(feature = "metrics")]
        metrics::set_known_peers(peers.len());

        observation
    }

    /// Decide what to do with a LIST part carrying `sequence` from
    /// `peer_id`.
    ///
    /// If we already hold `sequence` the sender is marked SYNCHRONIZED in
    /// the same lock acquisition.
    pub fn apply_list(&self, peer_id: &str, sequence: i64) -> ListDecision {
        let mut peers = self.peers.lock();
        Self::evict_expired(&mut peers);
        let Some(record) = peers.get_mut(peer_id) else {
            return ListDecision::UnknownPeer;
        };
        if record.state == PeerState::Synchronized {
            ListDecision::AlreadySynchronized
        } else if record.version() == sequence {
            record.transition(PeerState::Synchronized);
            ListDecision::UpToDate
        } else {
            ListDecision::Assemble
        }
    }

    /// Install a fully assembled dataset for a peer and mark it
    /// SYNCHRONIZED.
    ///
    /// Nothing is installed if the peer is gone or already SYNCHRONIZED.
    pub fn complete_transfer(
        &self,
        peer_id: &str,
        records: Vec<String>,
        version: i64,
    ) -> Result<TransferOutcome> {
        let dataset = Arc::new(VersionedDataset::new(records, version)?);
        let mut peers = self.peers.lock();
        Self::evict_expired(&mut peers);
        let Some(record) = peers.get_mut(peer_id) else {
            return Ok(TransferOutcome::UnknownPeer);
        };
        if record.state == PeerState::Synchronized {
            return Ok(TransferOutcome::AlreadySynchronized);
        }
        record.dataset = dataset;
        record.transition(PeerState::Synchronized);
        Ok(TransferOutcome::Installed)
    }

    /// Insert or replace a record.
    pub fn insert(&self, record: PeerRecord) {
        let mut peers = self.peers.lock();
        Self::evict_expired(&mut peers);
        peers.insert(record.peer_id.clone(), record);
    }

    /// Remove a peer.
    pub fn remove(&self, peer_id: &str) -> Option<PeerRecord> {
        let mut peers = self.peers.lock();
        Self::evict_expired(&mut peers);
        peers.remove(peer_id)
    }

    fn get_with<R>(&self, peer_id: &str, f: impl FnOnce(&PeerRecord) -> R) -> Option<R> {
        let mut peers = self.peers.lock();
        Self::evict_expired(&mut peers);
        peers.get(peer_id).map(f)
    }

    fn evict_expired(peers: &mut HashMap<String, PeerRecord>) {
        let now = Instant::now();
        peers.retain(|id, record| {
            if record.is_expired(now) {
                tracing::info!(peer = %id, "peer expired");
                #[cfg(feature = "metrics")]
                metrics::record_peer_evicted();
                false
            } else {
                true
            }
        });
    }
}
