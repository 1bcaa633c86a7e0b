//! HELLO advertisement: sender loop, receiver and per-peer SYN retries.

use std::time::Duration;
use tokio::time::MissedTickBehavior;

use super::{Inbound, OutboxSlot};
#[cfg(feature = "metrics")]
use crate::metrics;
use crate::{
    context::NodeContext,
    dispatcher::Outbox,
    error::{Error, Result},
    message::{HelloMessage, SynMessage, MAX_PEERS},
    peer_table::{Observation, PeerState},
    queue::BoundedQueue,
};

/// Broadcasts a HELLO every hello period.
///
/// Each advertisement carries the local ID, the current local dataset
/// version, the advertise interval and every non-expired peer ID.
#[derive(Debug, Clone)]
pub struct HelloSender {
    ctx: NodeContext,
    outbox: OutboxSlot,
}

impl HelloSender {
    /// Create a sender for the node described by `ctx`.
    pub fn new(ctx: NodeContext) -> Self {
        Self {
            ctx,
            outbox: OutboxSlot::new("hello-sender"),
        }
    }

    pub(crate) fn bind_dispatcher(&self, outbox: Outbox) -> Result<()> {
        self.outbox.bind(outbox)
    }

    /// Build the advertisement for the current local state.
    ///
    /// Lists at most [`MAX_PEERS`] peers, and no more than fit in one
    /// datagram of `max_datagram_size` bytes.
    pub fn advertisement(&self) -> Result<HelloMessage> {
        let config = self.ctx.config();
        let peers = self.ctx.peers().peer_ids();
        let mut hello = HelloMessage::new(
            config.node_id.as_str(),
            self.ctx.dataset().version(),
            config.advertise_interval,
        )?;

        // The peer count field is at most three digits wide.
        let mut len = hello.encode().len() + 2;
        for peer in &peers {
            len += 1 + peer.len();
            if hello.peers().len() == MAX_PEERS || len > config.max_datagram_size {
                break;
            }
            hello.add_peer(peer.as_str())?;
        }

        if hello.peers().len() < peers.len() {
            tracing::warn!(
                known = peers.len(),
                listed = hello.peers().len(),
                "too many peers for one advertisement, truncating"
            );
        }
        Ok(hello)
    }

    pub(crate) async fn run(self) -> Result<()> {
        let outbox = self.outbox.get()?.clone();
        let shutdown = self.ctx.shutdown().clone();
        let mut ticker = tokio::time::interval(self.ctx.config().effective_hello_period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => return Ok(()),
                _ = ticker.tick() => {}
            }

            let hello = match self.advertisement() {
                Ok(hello) => hello,
                Err(e) => {
                    tracing::error!(error = %e, "failed to build advertisement");
                    continue;
                }
            };
            #[cfg(feature = "metrics")]
            metrics::set_local_version(hello.sequence());
            outbox.send(hello.encode()).await?;
        }
    }
}

/// Applies advertisements to the peer table and keeps one SYN retry task
/// alive for every peer that is not SYNCHRONIZED.
#[derive(Debug, Clone)]
pub struct HelloReceiver {
    ctx: NodeContext,
    inbox: BoundedQueue<Inbound>,
    outbox: OutboxSlot,
}

impl HelloReceiver {
    /// Create a receiver for the node described by `ctx`.
    pub fn new(ctx: NodeContext) -> Self {
        let inbox = BoundedQueue::new(ctx.config().queue_capacity, ctx.shutdown().clone());
        Self {
            ctx,
            inbox,
            outbox: OutboxSlot::new("hello-receiver"),
        }
    }

    pub(crate) fn bind_dispatcher(&self, outbox: Outbox) -> Result<()> {
        self.outbox.bind(outbox)
    }

    pub(crate) async fn on_message(&self, msg: &Inbound) -> Result<()> {
        self.inbox.enqueue(msg.clone()).await
    }

    /// Number of payloads waiting in the inbox.
    pub fn pending(&self) -> usize {
        self.inbox.len()
    }

    /// Process one payload.
    ///
    /// Returns the resulting observation, or `None` if the payload is not a
    /// HELLO or is our own.
    pub fn handle(&self, msg: &Inbound) -> Option<Observation> {
        let hello = HelloMessage::parse(&msg.payload).ok()?;
        if hello.sender_id() == self.ctx.node_id() {
            return None;
        }
        tracing::debug!(
            peer = hello.sender_id(),
            seq = hello.sequence(),
            peers = hello.peers().len(),
            "advertisement received"
        );
        #[cfg(feature = "metrics")]
        metrics::record_received(crate::message::MessageKind::Hello);

        let observation = self
            .ctx
            .peers()
            .observe_hello(&hello, msg.source, self.ctx.node_id());

        let peer = hello.sender_id().to_string();
        if observation.state == PeerState::Synchronized {
            if self.ctx.retries().cancel(&peer) {
                tracing::debug!(%peer, "peer synchronized, retry task cancelled");
            }
        } else {
            self.start_retry(peer, observation.version);
        }
        Some(observation)
    }

    fn start_retry(&self, peer: String, version: i64) {
        let outbox = match self.outbox.get() {
            Ok(outbox) => outbox.clone(),
            Err(e) => {
                tracing::error!(error = %e, "cannot request dataset");
                return;
            }
        };
        let ctx = self.ctx.clone();
        let started = self
            .ctx
            .retries()
            .spawn_unique(peer.clone(), retry_syn(ctx, outbox, peer.clone(), version));
        if started {
            tracing::debug!(%peer, version, "SYN retry task started");
        }
    }

    pub(crate) async fn run(self) -> Result<()> {
        loop {
            let msg = self.inbox.dequeue().await?;
            self.handle(&msg);
        }
    }
}

/// Ask `peer` for its dataset every retry interval until the version we hold
/// for it moves away from `version` or the peer is forgotten.
async fn retry_syn(ctx: NodeContext, outbox: Outbox, peer: String, version: i64) {
    let interval: Duration = ctx.config().syn_retry_interval;
    loop {
        if ctx.peers().version_of(&peer) != Some(version) {
            break;
        }
        let syn = match SynMessage::new(ctx.node_id(), peer.as_str(), version, ctx.peers()) {
            Ok(syn) => syn,
            Err(Error::UnknownPeer(_)) => break,
            Err(e) => {
                tracing::error!(%peer, error = %e, "failed to build SYN");
                break;
            }
        };
        if outbox.send(syn.encode()).await.is_err() {
            break;
        }
        #[cfg(feature = "metrics")]
        metrics::record_syn_retry();
        if ctx.shutdown().sleep(interval).await.is_err() {
            break;
        }
    }
    tracing::debug!(%peer, version, "SYN retry task finished");
}
