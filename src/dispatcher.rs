//! Message dispatcher: the only owner of the transport.
//!
//! Runs two loops. The receive loop reads datagrams, decodes them and fans
//! each one out to every registered actor in registration order. The send
//! loop drains the shared outgoing queue into the transport, dropping
//! payloads larger than one datagram. A transport or decode failure in
//! either loop fires the node's shutdown signal, which stops the other loop
//! and every actor.

use bytes::Bytes;
use std::net::IpAddr;

#[cfg(feature = "metrics")]
use crate::metrics;
use crate::{
    actors::{Actor, Inbound},
    config::NodeConfig,
    error::{Error, Result},
    message::MessageKind,
    queue::BoundedQueue,
    shutdown::Shutdown,
    transport::Transport,
};

/// Sending side of the dispatcher, shared by every actor.
///
/// Cloning is cheap; all clones feed the same outgoing queue.
#[derive(Debug, Clone)]
pub struct Outbox {
    queue: BoundedQueue<String>,
}

impl Outbox {
    pub(crate) fn new(queue: BoundedQueue<String>) -> Self {
        Self { queue }
    }

    /// Queue a payload for broadcast.
    ///
    /// Waits while the outgoing queue is full; fails only on shutdown.
    pub async fn send(&self, payload: impl Into<String>) -> Result<()> {
        let payload = payload.into();
        tracing::debug!(%payload, "queueing payload");
        self.queue.enqueue(payload).await
    }

    /// Number of payloads waiting to be broadcast.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

/// Reads from and writes to the transport on behalf of all actors.
pub struct Dispatcher<T> {
    transport: T,
    outgoing: BoundedQueue<String>,
    actors: Vec<Actor>,
    registered: bool,
    max_datagram_size: usize,
    shutdown: Shutdown,
}

impl<T> std::fmt::Debug for Dispatcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("outgoing", &self.outgoing)
            .field("actors", &self.actors.iter().map(Actor::name).collect::<Vec<_>>())
            .finish()
    }
}

impl<T: Transport> Dispatcher<T> {
    /// Create a dispatcher around `transport`.
    pub fn new(transport: T, config: &NodeConfig, shutdown: Shutdown) -> Self {
        Self {
            transport,
            outgoing: BoundedQueue::new(config.queue_capacity, shutdown.clone()),
            actors: Vec::new(),
            registered: false,
            max_datagram_size: config.max_datagram_size,
            shutdown,
        }
    }

    /// Handle for queueing outbound payloads.
    pub fn outbox(&self) -> Outbox {
        Outbox::new(self.outgoing.clone())
    }

    /// Register the actors that receive every inbound payload, binding each
    /// one to this dispatcher's outbox.
    ///
    /// May be called once, before [`run`](Self::run).
    pub fn register_actors(&mut self, actors: impl IntoIterator<Item = Actor>) -> Result<()> {
        if self.registered {
            return Err(Error::Config("actors are already registered".into()));
        }
        let outbox = self.outbox();
        for actor in actors {
            actor.bind_dispatcher(outbox.clone())?;
            tracing::debug!(actor = actor.name(), "actor registered");
            self.actors.push(actor);
        }
        self.registered = true;
        Ok(())
    }

    /// Registered actors, in dispatch order.
    pub fn actors(&self) -> &[Actor] {
        &self.actors
    }

    /// Hand one payload to every registered actor, in registration order.
    pub async fn dispatch(&self, payload: &str, source: IpAddr) -> Result<()> {
        let msg = Inbound::new(payload, source);
        for actor in &self.actors {
            actor.on_message(&msg).await?;
        }
        Ok(())
    }

    /// Run the receive and send loops until shutdown or transport failure.
    ///
    /// Returns `Ok(())` on a clean shutdown and the first failure otherwise.
    pub async fn run(&self) -> Result<()> {
        let (received, sent) = tokio::join!(self.receive_loop(), self.send_loop());
        received.and(sent)
    }

    async fn receive_loop(&self) -> Result<()> {
        loop {
            let received = tokio::select! {
                biased;
                _ = self.shutdown.wait() => return Ok(()),
                received = self.transport.receive() => received,
            };
            let (data, source) = match received {
                Ok(datagram) => datagram,
                Err(e) => {
                    tracing::error!(error = %e, "transport receive failed");
                    self.shutdown.trigger();
                    return Err(Error::Transport(e.to_string()));
                }
            };

            #[cfg(feature = "metrics")]
            metrics::record_datagram();

            let payload = match std::str::from_utf8(&data) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::error!(%source, error = %e, "datagram is not valid UTF-8");
                    self.shutdown.trigger();
                    return Err(Error::Decode(format!("payload from {}: {}", source, e)));
                }
            };
            tracing::trace!(%source, %payload, "datagram received");

            match self.dispatch(payload, source.ip()).await {
                Ok(()) => {}
                Err(Error::Shutdown) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_loop(&self) -> Result<()> {
        loop {
            let payload = match self.outgoing.dequeue().await {
                Ok(payload) => payload,
                Err(Error::Shutdown) => return Ok(()),
                Err(e) => return Err(e),
            };
            let kind = MessageKind::detect(&payload);
            if payload.len() > self.max_datagram_size {
                tracing::warn!(
                    kind = ?kind,
                    len = payload.len(),
                    max = self.max_datagram_size,
                    "payload too large for one datagram, dropped"
                );
                continue;
            }

            let sent = tokio::select! {
                biased;
                _ = self.shutdown.wait() => return Ok(()),
                sent = self.transport.broadcast(Bytes::from(payload)) => sent,
            };
            if let Err(e) = sent {
                tracing::error!(error = %e, "transport broadcast failed");
                self.shutdown.trigger();
                return Err(Error::Transport(e.to_string()));
            }

            tracing::trace!(kind = ?kind, "payload broadcast");
            #[cfg(feature = "metrics")]
            metrics::record_sent(kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        actors::{HelloReceiver, ListReceiver, Observer},
        context::NodeContext,
        dataset::LocalDataset,
        peer_table::PeerState,
        transport::ChannelTransport,
    };
    use std::{net::SocketAddr, sync::Arc, time::Duration};

    fn source() -> SocketAddr {
        "192.168.1.20:4242".parse().unwrap()
    }

    #[tokio::test]
    async fn test_register_once() {
        let shutdown = Shutdown::new();
        let config = NodeConfig::testing("B");
        let ctx = NodeContext::new(config.clone(), LocalDataset::new(), shutdown.clone());
        let (transport, _handle) = ChannelTransport::bounded(8);
        let mut dispatcher = Dispatcher::new(transport, &config, shutdown);

        dispatcher.register_actors(Actor::protocol(&ctx)).unwrap();
        assert_eq!(dispatcher.actors().len(), 4);
        assert!(matches!(
            dispatcher.register_actors(vec![Observer::new(&ctx).into()]),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_dispatch_fans_out_to_actors() {
        let shutdown = Shutdown::new();
        let config = NodeConfig::testing("B");
        let ctx = NodeContext::new(config.clone(), LocalDataset::new(), shutdown.clone());
        let (transport, _handle) = ChannelTransport::bounded(8);
        let mut dispatcher = Dispatcher::new(transport, &config, shutdown.clone());

        let hello = HelloReceiver::new(ctx.clone());
        let list = ListReceiver::new(ctx.clone());
        dispatcher
            .register_actors(vec![hello.clone().into(), list.clone().into()])
            .unwrap();

        dispatcher
            .dispatch("HELLO;A;1;30;0", source().ip())
            .await
            .unwrap();
        assert_eq!(hello.pending(), 1);
        assert_eq!(list.pending(), 1);
        shutdown.trigger();
    }

    #[tokio::test]
    async fn test_send_loop_broadcasts_outbox() {
        let shutdown = Shutdown::new();
        let config = NodeConfig::testing("B");
        let (transport, handle) = ChannelTransport::bounded(8);
        let dispatcher = Arc::new(Dispatcher::new(transport, &config, shutdown.clone()));

        let outbox = dispatcher.outbox();
        outbox.send("SYN;B;A;5").await.unwrap();
        outbox.send("HELLO;B;-1;2;0").await.unwrap();

        let task = tokio::spawn({
            let dispatcher = dispatcher.clone();
            async move { dispatcher.run().await }
        });

        assert_eq!(handle.outbound.recv().await.unwrap(), Bytes::from("SYN;B;A;5"));
        assert_eq!(
            handle.outbound.recv().await.unwrap(),
            Bytes::from("HELLO;B;-1;2;0")
        );

        shutdown.trigger();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_oversized_payload_is_dropped() {
        let shutdown = Shutdown::new();
        let config = NodeConfig::testing("B").with_max_datagram_size(16);
        let (transport, handle) = ChannelTransport::bounded(8);
        let dispatcher = Arc::new(Dispatcher::new(transport, &config, shutdown.clone()));

        let outbox = dispatcher.outbox();
        outbox.send("HELLO;B;-1;2;2;peer_one;peer_two").await.unwrap();
        outbox.send("SYN;B;A;5").await.unwrap();

        let task = tokio::spawn({
            let dispatcher = dispatcher.clone();
            async move { dispatcher.run().await }
        });

        assert_eq!(handle.outbound.recv().await.unwrap(), Bytes::from("SYN;B;A;5"));
        assert!(!shutdown.is_triggered());

        shutdown.trigger();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_receive_loop_drives_actors() {
        let shutdown = Shutdown::new();
        let config = NodeConfig::testing("B");
        let ctx = NodeContext::new(config.clone(), LocalDataset::new(), shutdown.clone());
        let (transport, handle) = ChannelTransport::bounded(8);
        let mut dispatcher = Dispatcher::new(transport, &config, shutdown.clone());

        let hello = HelloReceiver::new(ctx.clone());
        dispatcher.register_actors(vec![hello.clone().into()]).unwrap();
        let dispatcher = Arc::new(dispatcher);

        let actor = tokio::spawn(Actor::from(hello).run());
        let task = tokio::spawn({
            let dispatcher = dispatcher.clone();
            async move { dispatcher.run().await }
        });

        handle
            .inbound
            .send((Bytes::from("HELLO;A;-1;30;1;B"), source()))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while ctx.peers().state_of("A") != Some(PeerState::Synchronized) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        shutdown.trigger();
        assert!(task.await.unwrap().is_ok());
        assert!(actor.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_fatal() {
        let shutdown = Shutdown::new();
        let config = NodeConfig::testing("B");
        let (transport, handle) = ChannelTransport::bounded(8);
        let dispatcher = Dispatcher::new(transport, &config, shutdown.clone());

        handle
            .inbound
            .send((Bytes::from_static(&[0xff, 0xfe, 0x00]), source()))
            .await
            .unwrap();

        let result = dispatcher.run().await;
        assert!(matches!(result, Err(Error::Decode(_))));
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_transport_failure_is_fatal() {
        let shutdown = Shutdown::new();
        let config = NodeConfig::testing("B");
        let (transport, handle) = ChannelTransport::bounded(8);
        let dispatcher = Dispatcher::new(transport, &config, shutdown.clone());
        drop(handle);

        let result = dispatcher.run().await;
        assert!(matches!(result, Err(Error::Transport(_))));
        assert!(shutdown.is_triggered());
    }
}
