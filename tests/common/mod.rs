//! Shared test utilities for lan-sync integration tests.
//!
//! Nodes run on a [`MemoryNetwork`] under paused tokio time, so multi-second
//! protocol timers elapse instantly and deterministically.

#![allow(dead_code)]

use std::{net::IpAddr, time::Duration};

use lan_sync::{testing::MemoryNetwork, Node, NodeConfig, NodeHandle, PeerState};

/// Address of the `n`-th simulated node.
pub fn node_addr(n: u8) -> IpAddr {
    IpAddr::from([192, 168, 1, n])
}

/// Start one node called `id` at `addr` with the testing preset.
pub fn start_node(network: &MemoryNetwork, id: &str, addr: IpAddr) -> NodeHandle {
    start_node_with(network, NodeConfig::testing(id), addr)
}

/// Start one node with an explicit configuration.
pub fn start_node_with(network: &MemoryNetwork, config: NodeConfig, addr: IpAddr) -> NodeHandle {
    Node::new(config, network.endpoint(addr))
        .expect("valid node config")
        .spawn()
}

/// Start `ids.len()` nodes, the `i`-th at `node_addr(i + 1)`.
pub fn start_cluster(network: &MemoryNetwork, ids: &[&str]) -> Vec<NodeHandle> {
    ids.iter()
        .enumerate()
        .map(|(i, id)| start_node(network, id, node_addr(i as u8 + 1)))
        .collect()
}

/// Stop every node, failing the test if one of them errored.
pub async fn stop_all(nodes: Vec<NodeHandle>) {
    for node in nodes {
        let id = node.node_id().to_string();
        node.stop()
            .await
            .unwrap_or_else(|e| panic!("node {} failed: {}", id, e));
    }
}

/// Poll `condition` every 50ms of (paused) time until it holds or
/// `timeout` elapses. Returns whether it held.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Check whether `node` holds a SYNCHRONIZED copy of `peer`'s current
/// dataset.
pub fn holds_copy_of(node: &NodeHandle, peer: &NodeHandle) -> bool {
    let Some(record) = node.peers().get(peer.node_id()) else {
        return false;
    };
    let theirs = peer.dataset().snapshot();
    record.state() == PeerState::Synchronized
        && record.version() == theirs.version()
        && record.dataset().records() == theirs.records()
}

/// Check whether every node holds a current copy of every other node.
pub fn fully_converged(nodes: &[NodeHandle]) -> bool {
    nodes.iter().all(|node| {
        nodes
            .iter()
            .filter(|peer| peer.node_id() != node.node_id())
            .all(|peer| holds_copy_of(node, peer))
    })
}
