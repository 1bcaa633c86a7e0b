//! A lan-sync node on the local network segment.
//!
//! Appends a record `HeyN` to its dataset every 5 seconds and prints what it
//! knows about its peers.
//!
//! Run with: cargo run --example lan_node -- <node-id> [--interval SECS] [--port PORT]
//!
//! Start several instances on different machines of the same segment (or
//! with different IDs on one machine) and watch them converge. Set
//! `RUST_LOG=lan_sync=debug` to see every message.

use clap::Parser;
use lan_sync::{Node, NodeConfig, NodeHandle, UdpBroadcastTransport, DEFAULT_PORT};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const APPEND_PERIOD: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "lan_node")]
#[command(about = "Broadcast anti-entropy node for the local segment", long_about = None)]
struct Args {
    /// Node identifier: word characters only, at most 16
    node_id: String,

    /// Advertise interval in seconds
    #[arg(short, long, default_value_t = 30)]
    interval: u8,

    /// UDP port shared by every node
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
}

impl Args {
    fn config(&self) -> NodeConfig {
        NodeConfig::lan(self.node_id.as_str())
            .with_advertise_interval(self.interval)
            .with_port(self.port)
    }
}

fn print_peers(node: &NodeHandle) {
    let peers = node.peers();
    let ids = peers.peer_ids();
    println!(
        "[{}] local v{} | {} peer(s)",
        node.node_id(),
        node.dataset().version(),
        ids.len()
    );
    for id in ids {
        if let Some(peer) = peers.get(&id) {
            println!(
                "    {:<16} {:<13} v{:<4} {:?}",
                id,
                peer.state(),
                peer.version(),
                peer.dataset().records()
            );
        }
    }
}

#[tokio::main]
async fn main() -> lan_sync::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Args::parse().config();
    tracing::info!(node = %config.node_id, port = config.port, interval = config.advertise_interval, "lan_node starting");

    let transport = UdpBroadcastTransport::bind(&config).await?;
    let node = Node::new(config, transport)?.with_observer().spawn();

    let mut ticker = tokio::time::interval(APPEND_PERIOD);
    let mut counter = 0u64;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, shutting down");
                break;
            }
            _ = ticker.tick() => {
                if node.is_finished() {
                    break;
                }
                node.dataset().append(format!("Hey{}", counter))?;
                counter += 1;
                print_peers(&node);
            }
        }
    }

    node.stop().await
}
