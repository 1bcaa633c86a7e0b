//! State shared by every actor of one node.

use std::sync::Arc;

use crate::{
    config::NodeConfig,
    dataset::LocalDataset,
    peer_table::PeerTable,
    shutdown::Shutdown,
    tasks::TaskRegistry,
};

/// Handle to the node-wide state: configuration, local dataset, peer table,
/// the per-peer SYN retry tasks and the shutdown signal.
///
/// Cloning is cheap.
#[derive(Debug, Clone)]
pub struct NodeContext {
    inner: Arc<ContextInner>,
}

#[derive(Debug)]
struct ContextInner {
    config: NodeConfig,
    dataset: LocalDataset,
    peers: Arc<PeerTable>,
    retries: TaskRegistry<String>,
    shutdown: Shutdown,
}

impl NodeContext {
    /// Create a context with an empty peer table.
    pub fn new(config: NodeConfig, dataset: LocalDataset, shutdown: Shutdown) -> Self {
        let peers = Arc::new(PeerTable::new(config.refresh_expiry));
        Self::with_peer_table(config, dataset, peers, shutdown)
    }

    /// Create a context around an existing peer table.
    pub fn with_peer_table(
        config: NodeConfig,
        dataset: LocalDataset,
        peers: Arc<PeerTable>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                config,
                dataset,
                peers,
                retries: TaskRegistry::new(),
                shutdown,
            }),
        }
    }

    /// Node configuration.
    pub fn config(&self) -> &NodeConfig {
        &self.inner.config
    }

    /// Identifier of the local node.
    pub fn node_id(&self) -> &str {
        &self.inner.config.node_id
    }

    /// The local dataset.
    pub fn dataset(&self) -> &LocalDataset {
        &self.inner.dataset
    }

    /// The peer table.
    pub fn peers(&self) -> &Arc<PeerTable> {
        &self.inner.peers
    }

    /// Live SYN retry tasks, keyed by peer ID.
    pub fn retries(&self) -> &TaskRegistry<String> {
        &self.inner.retries
    }

    /// The node's shutdown signal.
    pub fn shutdown(&self) -> &Shutdown {
        &self.inner.shutdown
    }
}
