//! Wire-level scenarios: one node driven by hand through a channel
//! transport.

mod common;

use std::{net::SocketAddr, time::Duration};

use bytes::Bytes;
use common::wait_until;
use lan_sync::{ChannelTransport, ChannelTransportHandle, Node, NodeConfig, NodeHandle, PeerState};

const PEER: &str = "192.168.1.1:4242";

struct Harness {
    node: NodeHandle,
    wire: ChannelTransportHandle,
}

impl Harness {
    fn start(id: &str) -> Self {
        let (transport, wire) = ChannelTransport::bounded(4096);
        let node = Node::new(NodeConfig::testing(id), transport)
            .unwrap()
            .with_observer()
            .spawn();
        Self { node, wire }
    }

    async fn inject(&self, payload: &str) {
        let source: SocketAddr = PEER.parse().unwrap();
        self.wire
            .inbound
            .send((Bytes::copy_from_slice(payload.as_bytes()), source))
            .await
            .unwrap();
    }

    /// Everything the node broadcast since the last call.
    fn sent(&self) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(data) = self.wire.outbound.try_recv() {
            out.push(String::from_utf8(data.to_vec()).unwrap());
        }
        out
    }

    fn sent_of_kind(&self, tag: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|p| p.starts_with(tag))
            .collect()
    }

    /// Bring the node to know peer A at `version`, SYNCHRONIZED.
    async fn synchronize_with_a(&self, version: i64) {
        self.inject(&format!("HELLO;A;{};30;0", version)).await;
        assert!(wait_until(Duration::from_secs(1), || self.node.peers().contains("A")).await);
        self.inject(&format!("LIST;A;{};{};1;0;seed;", self.node.node_id(), version))
            .await;
        assert!(
            wait_until(Duration::from_secs(1), || {
                self.node.peers().version_of("A") == Some(version)
            })
            .await
        );
        assert_eq!(self.node.peers().state_of("A"), Some(PeerState::Synchronized));
        // Let anything already queued reach the wire.
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    async fn stop(self) {
        self.node.stop().await.unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn test_hello_without_peers_only_records_sender() {
    let h = Harness::start("B");
    h.inject("HELLO;A;1;30;0").await;

    assert!(wait_until(Duration::from_secs(1), || h.node.peers().contains("A")).await);
    let record = h.node.peers().get("A").unwrap();
    assert_eq!(record.state(), PeerState::Heard);
    assert_eq!(record.version(), -1);
    assert_eq!(record.peer_addr(), "192.168.1.1".parse::<std::net::IpAddr>().unwrap());

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_inconsistent_peer_gets_periodic_syn() {
    let h = Harness::start("B");
    h.synchronize_with_a(5).await;
    h.sent();

    h.inject("HELLO;A;6;30;1;B").await;
    assert!(
        wait_until(Duration::from_secs(1), || {
            h.node.peers().state_of("A") == Some(PeerState::Inconsistent)
        })
        .await
    );

    tokio::time::sleep(Duration::from_millis(1000)).await;
    let syns = h.sent_of_kind("SYN;");
    assert!(syns.len() >= 4, "expected periodic SYN, got {:?}", syns);
    assert!(syns.iter().all(|s| s == "SYN;B;A;5"), "{:?}", syns);

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_out_of_order_parts_assemble() {
    let h = Harness::start("B");
    h.synchronize_with_a(5).await;
    h.inject("HELLO;A;6;30;1;B").await;
    assert!(
        wait_until(Duration::from_secs(1), || {
            h.node.peers().state_of("A") == Some(PeerState::Inconsistent)
        })
        .await
    );

    for part in ["LIST;A;B;6;3;1;r1;", "LIST;A;B;6;3;0;r0;"] {
        h.inject(part).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(h.node.peers().state_of("A"), Some(PeerState::Inconsistent));
        assert_eq!(h.node.peers().version_of("A"), Some(5));
    }

    h.inject("LIST;A;B;6;3;2;r2;").await;
    assert!(
        wait_until(Duration::from_secs(1), || {
            h.node.peers().state_of("A") == Some(PeerState::Synchronized)
        })
        .await
    );
    let record = h.node.peers().get("A").unwrap();
    assert_eq!(record.version(), 6);
    assert_eq!(
        record.dataset().records(),
        &["r0".to_string(), "r1".to_string(), "r2".to_string()]
    );

    // The retry task stops once the transfer completes.
    tokio::time::sleep(Duration::from_millis(100)).await;
    h.sent();
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert!(h.sent_of_kind("SYN;").is_empty());

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_syn_answered_with_list() {
    let h = Harness::start("A");
    h.node
        .dataset()
        .replace(vec!["r0".into(), "r1".into(), "r2".into()], 6)
        .unwrap();

    h.inject("SYN;B;A;5").await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(
        h.sent_of_kind("LIST;"),
        vec![
            "LIST;A;B;6;3;0;r0;".to_string(),
            "LIST;A;B;6;3;1;r1;".to_string(),
            "LIST;A;B;6;3;2;r2;".to_string(),
        ]
    );

    // Up to date, or addressed to someone else: no transfer.
    h.inject("SYN;B;A;6").await;
    h.inject("SYN;B;C;5").await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(h.sent_of_kind("LIST;").is_empty());

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_advertisement_reflects_state() {
    let h = Harness::start("B");
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.sent_of_kind("HELLO;"), vec!["HELLO;B;-1;2;0".to_string()]);

    h.node.dataset().append("Hey0").unwrap();
    h.inject("HELLO;A;1;30;0").await;
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(h.sent_of_kind("HELLO;"), vec!["HELLO;B;0;2;1;A".to_string()]);

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_malformed_payloads_are_ignored() {
    let h = Harness::start("B");
    for bad in [
        "",
        "HELLO",
        "HELLO;A;1;30;2;C",
        "HELLO;way_too_long_identifier;1;30;0",
        "SYN;A;B",
        "LIST;A;B;6;0;0;r0;",
        "LIST;A;B;6;3;3;r0;",
        "PING;A",
    ] {
        h.inject(bad).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.node.peers().is_empty());
    assert!(!h.node.is_finished());

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_invalid_utf8_stops_node() {
    let h = Harness::start("B");
    let source: SocketAddr = PEER.parse().unwrap();
    h.wire
        .inbound
        .send((Bytes::from_static(&[0xc3, 0x28]), source))
        .await
        .unwrap();

    let result = h.node.join().await;
    assert!(matches!(result, Err(lan_sync::Error::Decode(_))));
}

#[tokio::test(start_paused = true)]
async fn test_many_peers_keep_node_alive() {
    let h = Harness::start("B");
    for i in 0..130 {
        h.inject(&format!("HELLO;peer_{:011};1;30;0", i)).await;
    }
    assert!(wait_until(Duration::from_secs(1), || h.node.peers().len() == 130).await);
    h.sent();

    tokio::time::sleep(Duration::from_millis(1100)).await;
    let hellos = h.sent_of_kind("HELLO;");
    assert!(!hellos.is_empty());
    assert!(hellos.iter().all(|p| p.len() <= lan_sync::DEFAULT_MAX_DATAGRAM_SIZE));
    assert!(!h.node.is_finished());

    h.stop().await;
}
