//! UDP broadcast transport.

use bytes::Bytes;
use std::{
    io,
    net::{Ipv4Addr, SocketAddr},
};
use tokio::net::UdpSocket;

use super::Transport;
use crate::config::NodeConfig;

/// UDP socket bound to `0.0.0.0:port` with `SO_BROADCAST` enabled.
///
/// Every broadcast goes to `broadcast_addr:port`, so the node also receives
/// its own datagrams; the actors ignore them by sender ID.
#[derive(Debug)]
pub struct UdpBroadcastTransport {
    socket: UdpSocket,
    target: SocketAddr,
    max_datagram_size: usize,
}

impl UdpBroadcastTransport {
    /// Bind the socket described by `config`.
    pub async fn bind(config: &NodeConfig) -> io::Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, config.port)).await?;
        socket.set_broadcast(true)?;
        let target = SocketAddr::new(config.broadcast_addr, config.port);
        tracing::debug!(local = ?socket.local_addr().ok(), %target, "udp broadcast transport bound");
        Ok(Self {
            socket,
            target,
            max_datagram_size: config.max_datagram_size,
        })
    }

    /// Address every payload is sent to.
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Local address of the socket.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl Transport for UdpBroadcastTransport {
    type Error = io::Error;

    async fn receive(&self) -> Result<(Bytes, SocketAddr), Self::Error> {
        let mut buf = vec![0u8; self.max_datagram_size];
        let (len, source) = self.socket.recv_from(&mut buf).await?;
        buf.truncate(len);
        Ok((Bytes::from(buf), source))
    }

    async fn broadcast(&self, data: Bytes) -> Result<(), Self::Error> {
        if data.len() > self.max_datagram_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "payload of {} bytes exceeds maximum datagram size {}",
                    data.len(),
                    self.max_datagram_size
                ),
            ));
        }
        self.socket.send_to(&data, self.target).await?;
        Ok(())
    }
}
