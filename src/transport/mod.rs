//! Broadcast transport abstraction.
//!
//! Every lan-sync message, including the ones addressed to a single peer, is
//! broadcast to the whole segment: destination filtering happens in the
//! receiving actors. A transport therefore only needs two operations, read
//! the next datagram and broadcast one.
//!
//! # Available Transports
//!
//! - [`UdpBroadcastTransport`]: UDP socket with `SO_BROADCAST`
//! - [`ChannelTransport`]: channel-based transport for testing
//! - [`MemoryNetwork`](crate::testing::MemoryNetwork) endpoints: in-process
//!   broadcast segment shared by several nodes

use bytes::Bytes;
use std::future::Future;
use std::net::SocketAddr;

mod udp;

pub use udp::UdpBroadcastTransport;

/// Transport trait for broadcasting lan-sync payloads.
///
/// The dispatcher owns the only handle and calls `receive` and `broadcast`
/// from two separate loops, so implementations must allow both to be in
/// flight at once.
///
/// # Example
///
/// ```ignore
/// use lan_sync::Transport;
///
/// struct MyTransport {
///     socket: MySocket,
/// }
///
/// impl Transport for MyTransport {
///     type Error = std::io::Error;
///
///     async fn receive(&self) -> Result<(Bytes, SocketAddr), Self::Error> {
///         self.socket.recv().await
///     }
///
///     async fn broadcast(&self, data: Bytes) -> Result<(), Self::Error> {
///         self.socket.send_to_all(data).await
///     }
/// }
/// ```
#[auto_impl::auto_impl(Box, Arc)]
pub trait Transport: Send + Sync + 'static {
    /// Error type for transport operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Wait for the next datagram and return it with its source address.
    fn receive(&self) -> impl Future<Output = Result<(Bytes, SocketAddr), Self::Error>> + Send;

    /// Broadcast a payload to every node on the segment.
    fn broadcast(&self, data: Bytes) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// A channel-based transport.
///
/// Inbound datagrams are read from one channel, broadcasts are written to
/// another. Useful for driving a single node by hand in tests.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    inbound: async_channel::Receiver<(Bytes, SocketAddr)>,
    outbound: async_channel::Sender<Bytes>,
}

/// The test-side ends of a [`ChannelTransport`].
#[derive(Debug, Clone)]
pub struct ChannelTransportHandle {
    /// Feed datagrams to the node.
    pub inbound: async_channel::Sender<(Bytes, SocketAddr)>,
    /// Read what the node broadcast.
    pub outbound: async_channel::Receiver<Bytes>,
}

impl ChannelTransport {
    /// Create a transport with bounded channels in both directions.
    pub fn bounded(capacity: usize) -> (Self, ChannelTransportHandle) {
        let (in_tx, in_rx) = async_channel::bounded(capacity);
        let (out_tx, out_rx) = async_channel::bounded(capacity);
        (
            Self {
                inbound: in_rx,
                outbound: out_tx,
            },
            ChannelTransportHandle {
                inbound: in_tx,
                outbound: out_rx,
            },
        )
    }
}

/// Error type for channel transport.
#[derive(Debug, Clone)]
pub struct ChannelTransportError(pub String);

impl std::fmt::Display for ChannelTransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "channel transport error: {}", self.0)
    }
}

impl std::error::Error for ChannelTransportError {}

impl Transport for ChannelTransport {
    type Error = ChannelTransportError;

    async fn receive(&self) -> Result<(Bytes, SocketAddr), Self::Error> {
        self.inbound
            .recv()
            .await
            .map_err(|e| ChannelTransportError(e.to_string()))
    }

    async fn broadcast(&self, data: Bytes) -> Result<(), Self::Error> {
        self.outbound
            .send(data)
            .await
            .map_err(|e| ChannelTransportError(e.to_string()))
    }
}
