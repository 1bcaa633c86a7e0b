//! # lan-sync
//!
//! Broadcast-based anti-entropy for nodes sharing one local network segment.
//!
//! Every node periodically advertises its liveness, its dataset version and
//! the peers it knows. A node that sees a peer advertise a version it does
//! not hold asks for that peer's dataset and reassembles it from a
//! multi-part transfer. All traffic, including the messages addressed to a
//! single peer, goes over one unreliable broadcast transport.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐ ┌──────────────┐ ┌─────────────┐ ┌──────────────┐ ┌──────────┐
//! │ HelloSender  │ │HelloReceiver │ │ SynReceiver │ │ ListReceiver │ │ Observer │
//! │   (timer)    │ │ (SYN retry)  │ │ (transfer)  │ │  (assembly)  │ │ (debug)  │
//! └──────┬───────┘ └──────▲───┬───┘ └──────▲───┬──┘ └──────▲───────┘ └────▲─────┘
//!        │ HELLO    inbox │   │ SYN  inbox │   │ LIST     │ inbox        │ inbox
//! ┌──────▼────────────────┴───▼────────────┴───▼──────────┴──────────────┴─────┐
//! │                              Dispatcher                                     │
//! │        receive loop: fan out to every actor · send loop: drain outbox       │
//! └──────────────────────────────────┬──────────────────────────────────────────┘
//!                                    │
//!                     Transport (UDP broadcast / MemoryNetwork)
//! ```
//!
//! Actors share a [`NodeContext`]: the [`NodeConfig`], the [`LocalDataset`],
//! the [`PeerTable`] and the node's [`Shutdown`] signal.
//!
//! ## Peer States
//!
//! | State | Meaning |
//! |-------|---------|
//! | `HEARD` | Advertisement seen, our inclusion in its peer list not yet evaluated |
//! | `INCONSISTENT` | The peer advertises a version we do not hold |
//! | `SYNCHRONIZED` | We hold the version the peer advertises |
//!
//! ## Example
//!
//! ```ignore
//! use lan_sync::{Node, NodeConfig, UdpBroadcastTransport};
//!
//! let config = NodeConfig::lan("kitchen");
//! let transport = UdpBroadcastTransport::bind(&config).await?;
//! let node = Node::new(config, transport)?.spawn();
//!
//! node.dataset().append("milk")?;
//! for id in node.peers().peer_ids() {
//!     println!("{}: {:?}", id, node.peers().get(&id).map(|p| p.dataset()));
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]

mod actors;
mod config;
mod context;
mod dataset;
mod dispatcher;
mod error;
pub mod message;
mod peer_table;
mod queue;
mod runner;
mod shutdown;
mod tasks;
pub mod testing;
mod transport;

#[cfg(feature = "metrics")]
#[cfg_attr(docsrs, doc(cfg(feature = "metrics")))]
pub mod metrics;

// Re-export actor types
pub use actors::{
    Actor, HelloReceiver, HelloSender, Inbound, ListProgress, ListReceiver, Observer, SynReceiver,
};

// Re-export config types
pub use config::{NodeConfig, DEFAULT_MAX_DATAGRAM_SIZE, DEFAULT_PORT, DEFAULT_QUEUE_CAPACITY};

// Re-export context
pub use context::NodeContext;

// Re-export dataset types
pub use dataset::{validate_record, LocalDataset, VersionedDataset, INITIAL_VERSION, MAX_RECORD_LEN};

// Re-export dispatcher types
pub use dispatcher::{Dispatcher, Outbox};

// Re-export error types
pub use error::{Error, Result};

// Re-export message types
pub use message::{HelloMessage, ListMessage, MessageKind, SynMessage};

// Re-export peer table types
pub use peer_table::{ListDecision, Observation, PeerRecord, PeerState, PeerTable, TransferOutcome};

// Re-export queue
pub use queue::BoundedQueue;

// Re-export runner types
pub use runner::{Node, NodeHandle};

// Re-export shutdown signal
pub use shutdown::Shutdown;

// Re-export task registry
pub use tasks::TaskRegistry;

// Re-export transport types
pub use transport::{
    ChannelTransport, ChannelTransportError, ChannelTransportHandle, Transport,
    UdpBroadcastTransport,
};
