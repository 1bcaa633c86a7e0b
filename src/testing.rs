//! In-process network for testing lan-sync nodes.
//!
//! [`MemoryNetwork`] behaves like one broadcast segment: every payload an
//! endpoint broadcasts is delivered to every endpoint, the sender included,
//! exactly as a UDP broadcast loops back to its own socket.
//!
//! ## Features
//!
//! - **Message Loss**: Randomly drop deliveries with configurable probability
//! - **Network Partitions**: Block delivery between pairs of endpoints
//! - **Latency Injection**: Delay deliveries, with jitter that reorders them
//!
//! ## Example
//!
//! ```ignore
//! use lan_sync::testing::{ChaosConfig, MemoryNetwork};
//!
//! let network = MemoryNetwork::with_chaos(ChaosConfig::new().with_message_loss_rate(0.1));
//! let a = network.endpoint("10.0.0.1".parse()?);
//! let b = network.endpoint("10.0.0.2".parse()?);
//! ```

use std::{
    collections::{HashMap, HashSet},
    net::{IpAddr, SocketAddr},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use bytes::Bytes;
use parking_lot::RwLock;
use rand::Rng;

use crate::{config::DEFAULT_PORT, transport::Transport};

/// Datagrams buffered per endpoint before further deliveries are dropped.
const ENDPOINT_BUFFER: usize = 1024;

/// Configuration for chaos testing.
#[derive(Debug, Clone, Default)]
pub struct ChaosConfig {
    /// Probability of dropping a delivery (0.0 to 1.0).
    pub message_loss_rate: f64,

    /// Latency added to every delivery.
    pub base_latency: Duration,

    /// Random jitter added to latency (0 to this value).
    pub latency_jitter: Duration,
}

impl ChaosConfig {
    /// Create a configuration with no chaos.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration for moderate failure testing.
    ///
    /// - 5% message loss
    /// - 10ms base latency with 20ms jitter
    pub fn moderate() -> Self {
        Self {
            message_loss_rate: 0.05,
            base_latency: Duration::from_millis(10),
            latency_jitter: Duration::from_millis(20),
        }
    }

    /// Set the message loss rate.
    pub fn with_message_loss_rate(mut self, rate: f64) -> Self {
        self.message_loss_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Set the base latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.base_latency = latency;
        self
    }

    /// Set the latency jitter.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.latency_jitter = jitter;
        self
    }

    /// Decide whether to drop one delivery.
    pub fn should_drop(&self) -> bool {
        self.message_loss_rate > 0.0 && rand::thread_rng().gen::<f64>() < self.message_loss_rate
    }

    /// Latency for one delivery.
    pub fn latency(&self) -> Duration {
        if self.latency_jitter.is_zero() {
            return self.base_latency;
        }
        let jitter_ms = rand::thread_rng().gen_range(0..=self.latency_jitter.as_millis() as u64);
        self.base_latency + Duration::from_millis(jitter_ms)
    }
}

/// Delivery counters.
#[derive(Debug, Default)]
struct NetworkStats {
    broadcasts: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    partition_blocked: AtomicU64,
}

/// Snapshot of delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkStatsSnapshot {
    /// Payloads broadcast by endpoints or injected.
    pub broadcasts: u64,
    /// Deliveries handed to an endpoint.
    pub delivered: u64,
    /// Deliveries lost to the loss rate or a full endpoint buffer.
    pub dropped: u64,
    /// Deliveries blocked by a partition.
    pub partition_blocked: u64,
}

#[derive(Debug)]
struct NetworkInner {
    port: u16,
    endpoints: RwLock<HashMap<IpAddr, async_channel::Sender<(Bytes, SocketAddr)>>>,
    partitions: RwLock<HashSet<(IpAddr, IpAddr)>>,
    chaos: RwLock<ChaosConfig>,
    stats: NetworkStats,
}

/// A simulated broadcast segment.
///
/// Cloning is cheap; clones share the same segment.
#[derive(Debug, Clone)]
pub struct MemoryNetwork {
    inner: Arc<NetworkInner>,
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNetwork {
    /// Create a lossless segment.
    pub fn new() -> Self {
        Self::with_chaos(ChaosConfig::default())
    }

    /// Create a segment with the given chaos configuration.
    pub fn with_chaos(chaos: ChaosConfig) -> Self {
        Self {
            inner: Arc::new(NetworkInner {
                port: DEFAULT_PORT,
                endpoints: RwLock::new(HashMap::new()),
                partitions: RwLock::new(HashSet::new()),
                chaos: RwLock::new(chaos),
                stats: NetworkStats::default(),
            }),
        }
    }

    /// Attach an endpoint at `addr`, replacing any previous endpoint there.
    pub fn endpoint(&self, addr: IpAddr) -> MemoryEndpoint {
        let (tx, rx) = async_channel::bounded(ENDPOINT_BUFFER);
        self.inner.endpoints.write().insert(addr, tx);
        MemoryEndpoint {
            addr,
            rx,
            network: self.clone(),
        }
    }

    /// Detach the endpoint at `addr`. Its pending and future receives fail.
    pub fn close_endpoint(&self, addr: IpAddr) {
        if let Some(tx) = self.inner.endpoints.write().remove(&addr) {
            tx.close();
        }
    }

    /// Replace the chaos configuration.
    pub fn set_chaos(&self, chaos: ChaosConfig) {
        *self.inner.chaos.write() = chaos;
    }

    /// Block delivery in both directions between `a` and `b`.
    pub fn partition(&self, a: IpAddr, b: IpAddr) {
        let mut partitions = self.inner.partitions.write();
        partitions.insert((a, b));
        partitions.insert((b, a));
    }

    /// Restore delivery between `a` and `b`.
    pub fn heal(&self, a: IpAddr, b: IpAddr) {
        let mut partitions = self.inner.partitions.write();
        partitions.remove(&(a, b));
        partitions.remove(&(b, a));
    }

    /// Remove every partition.
    pub fn heal_all(&self) {
        self.inner.partitions.write().clear();
    }

    /// Broadcast a payload as if it came from `source`, which need not be
    /// an attached endpoint.
    pub fn inject(&self, payload: impl Into<Bytes>, source: IpAddr) {
        self.deliver(source, payload.into());
    }

    /// Current delivery counters.
    pub fn stats(&self) -> NetworkStatsSnapshot {
        let stats = &self.inner.stats;
        NetworkStatsSnapshot {
            broadcasts: stats.broadcasts.load(Ordering::Relaxed),
            delivered: stats.delivered.load(Ordering::Relaxed),
            dropped: stats.dropped.load(Ordering::Relaxed),
            partition_blocked: stats.partition_blocked.load(Ordering::Relaxed),
        }
    }

    fn deliver(&self, from: IpAddr, data: Bytes) {
        let stats = &self.inner.stats;
        stats.broadcasts.fetch_add(1, Ordering::Relaxed);

        let source = SocketAddr::new(from, self.inner.port);
        let chaos = self.inner.chaos.read().clone();
        let targets: Vec<_> = self
            .inner
            .endpoints
            .read()
            .iter()
            .map(|(addr, tx)| (*addr, tx.clone()))
            .collect();

        for (to, tx) in targets {
            if self.inner.partitions.read().contains(&(from, to)) {
                stats.partition_blocked.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            if chaos.should_drop() {
                stats.dropped.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            let latency = chaos.latency();
            if latency.is_zero() {
                self.push(&tx, data.clone(), source);
            } else {
                let network = self.clone();
                let data = data.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(latency).await;
                    network.push(&tx, data, source);
                });
            }
        }
    }

    fn push(&self, tx: &async_channel::Sender<(Bytes, SocketAddr)>, data: Bytes, source: SocketAddr) {
        let stats = &self.inner.stats;
        match tx.try_send((data, source)) {
            Ok(()) => {
                stats.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(async_channel::TrySendError::Full(_)) => {
                tracing::trace!(%source, "endpoint buffer full, datagram dropped");
                stats.dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(async_channel::TrySendError::Closed(_)) => {}
        }
    }
}

/// One node's attachment to a [`MemoryNetwork`].
#[derive(Debug)]
pub struct MemoryEndpoint {
    addr: IpAddr,
    rx: async_channel::Receiver<(Bytes, SocketAddr)>,
    network: MemoryNetwork,
}

impl MemoryEndpoint {
    /// Address other endpoints see as the source of this one's payloads.
    pub fn addr(&self) -> IpAddr {
        self.addr
    }
}

/// Error type for memory endpoints.
#[derive(Debug, Clone)]
pub struct MemoryNetworkError(pub String);

impl std::fmt::Display for MemoryNetworkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "memory network error: {}", self.0)
    }
}

impl std::error::Error for MemoryNetworkError {}

impl Transport for MemoryEndpoint {
    type Error = MemoryNetworkError;

    async fn receive(&self) -> Result<(Bytes, SocketAddr), Self::Error> {
        self.rx
            .recv()
            .await
            .map_err(|_| MemoryNetworkError(format!("endpoint {} closed", self.addr)))
    }

    async fn broadcast(&self, data: Bytes) -> Result<(), Self::Error> {
        if self.rx.is_closed() {
            return Err(MemoryNetworkError(format!("endpoint {} closed", self.addr)));
        }
        self.network.deliver(self.addr, data);
        Ok(())
    }
}
