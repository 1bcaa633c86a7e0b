//! Protocol actors.
//!
//! Each actor owns a bounded inbox and a run loop. The dispatcher hands every
//! inbound payload to every registered actor; each one tries to parse it as
//! the message kind it handles and drops it silently otherwise.
//!
//! | Actor | Consumes | Emits |
//! |-------|----------|-------|
//! | [`HelloSender`] | timer | HELLO |
//! | [`HelloReceiver`] | HELLO | SYN (retry task per peer) |
//! | [`SynReceiver`] | SYN | LIST (transfer task per requester) |
//! | [`ListReceiver`] | LIST | nothing |
//! | [`Observer`] | everything | nothing |

mod hello;
mod list;
mod observer;
mod syn;

pub use hello::{HelloReceiver, HelloSender};
pub use list::{ListProgress, ListReceiver};
pub use observer::Observer;
pub use syn::SynReceiver;

use once_cell::sync::OnceCell;
use std::{net::IpAddr, sync::Arc};

use crate::{
    context::NodeContext,
    dispatcher::Outbox,
    error::{Error, Result},
};

/// One datagram as handed to the actors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    /// Decoded payload.
    pub payload: Arc<str>,
    /// Address the datagram came from.
    pub source: IpAddr,
}

impl Inbound {
    /// Wrap a decoded payload.
    pub fn new(payload: impl Into<Arc<str>>, source: IpAddr) -> Self {
        Self {
            payload: payload.into(),
            source,
        }
    }
}

/// Late-bound handle to the dispatcher's outbox.
///
/// Actors are created before the dispatcher registers them, so the outbox is
/// filled in exactly once by [`Actor::bind_dispatcher`].
#[derive(Debug, Clone)]
pub(crate) struct OutboxSlot {
    name: &'static str,
    cell: Arc<OnceCell<Outbox>>,
}

impl OutboxSlot {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            cell: Arc::new(OnceCell::new()),
        }
    }

    pub(crate) fn bind(&self, outbox: Outbox) -> Result<()> {
        self.cell
            .set(outbox)
            .map_err(|_| Error::Config(format!("{} is already bound to a dispatcher", self.name)))
    }

    pub(crate) fn get(&self) -> Result<&Outbox> {
        self.cell.get().ok_or(Error::NotBound(self.name))
    }
}

/// The closed set of actors a node can run.
#[derive(Debug, Clone)]
pub enum Actor {
    /// Periodic HELLO broadcaster.
    HelloSender(HelloSender),
    /// HELLO handler and SYN retrier.
    HelloReceiver(HelloReceiver),
    /// SYN handler and LIST transmitter.
    SynReceiver(SynReceiver),
    /// LIST assembler.
    ListReceiver(ListReceiver),
    /// Passive logger.
    Observer(Observer),
}

impl Actor {
    /// The four protocol actors of a node, in dispatch order.
    pub fn protocol(ctx: &NodeContext) -> Vec<Actor> {
        vec![
            HelloSender::new(ctx.clone()).into(),
            HelloReceiver::new(ctx.clone()).into(),
            SynReceiver::new(ctx.clone()).into(),
            ListReceiver::new(ctx.clone()).into(),
        ]
    }

    /// Name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Actor::HelloSender(_) => "hello-sender",
            Actor::HelloReceiver(_) => "hello-receiver",
            Actor::SynReceiver(_) => "syn-receiver",
            Actor::ListReceiver(_) => "list-receiver",
            Actor::Observer(_) => "observer",
        }
    }

    /// Give the actor the outbox it sends through.
    ///
    /// Actors that never send accept and ignore it.
    pub fn bind_dispatcher(&self, outbox: Outbox) -> Result<()> {
        match self {
            Actor::HelloSender(a) => a.bind_dispatcher(outbox),
            Actor::HelloReceiver(a) => a.bind_dispatcher(outbox),
            Actor::SynReceiver(a) => a.bind_dispatcher(outbox),
            Actor::ListReceiver(_) | Actor::Observer(_) => Ok(()),
        }
    }

    /// Deliver an inbound payload to the actor's inbox.
    ///
    /// Waits while the inbox is full; fails only on shutdown.
    pub async fn on_message(&self, msg: &Inbound) -> Result<()> {
        match self {
            Actor::HelloSender(_) => Ok(()),
            Actor::HelloReceiver(a) => a.on_message(msg).await,
            Actor::SynReceiver(a) => a.on_message(msg).await,
            Actor::ListReceiver(a) => a.on_message(msg).await,
            Actor::Observer(a) => a.on_message(msg).await,
        }
    }

    /// Run the actor until shutdown.
    pub async fn run(self) -> Result<()> {
        let name = self.name();
        tracing::debug!(actor = name, "actor started");
        let result = match self {
            Actor::HelloSender(a) => a.run().await,
            Actor::HelloReceiver(a) => a.run().await,
            Actor::SynReceiver(a) => a.run().await,
            Actor::ListReceiver(a) => a.run().await,
            Actor::Observer(a) => a.run().await,
        };
        match result {
            Ok(()) | Err(Error::Shutdown) => {
                tracing::debug!(actor = name, "actor stopped");
                Ok(())
            }
            Err(e) => {
                tracing::error!(actor = name, error = %e, "actor failed");
                Err(e)
            }
        }
    }
}

impl From<HelloSender> for Actor {
    fn from(a: HelloSender) -> Self {
        Actor::HelloSender(a)
    }
}

impl From<HelloReceiver> for Actor {
    fn from(a: HelloReceiver) -> Self {
        Actor::HelloReceiver(a)
    }
}

impl From<SynReceiver> for Actor {
    fn from(a: SynReceiver) -> Self {
        Actor::SynReceiver(a)
    }
}

impl From<ListReceiver> for Actor {
    fn from(a: ListReceiver) -> Self {
        Actor::ListReceiver(a)
    }
}

impl From<Observer> for Actor {
    fn from(a: Observer) -> Self {
        Actor::Observer(a)
    }
}
