//! Node runner: wires the context, actors and dispatcher together.
//!
//! # Example
//!
//! ```ignore
//! use lan_sync::{Node, NodeConfig, UdpBroadcastTransport};
//!
//! let config = NodeConfig::lan("kitchen");
//! let transport = UdpBroadcastTransport::bind(&config).await?;
//! let node = Node::new(config, transport)?.spawn();
//!
//! node.dataset().append("milk")?;
//! // ...
//! node.stop().await?;
//! ```

use futures::future::join_all;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::{
    actors::{Actor, Observer},
    config::NodeConfig,
    context::NodeContext,
    dataset::LocalDataset,
    dispatcher::Dispatcher,
    error::{Error, Result},
    peer_table::PeerTable,
    shutdown::Shutdown,
    transport::Transport,
};

/// A lan-sync node that has not been started yet.
pub struct Node<T> {
    ctx: NodeContext,
    dispatcher: Dispatcher<T>,
    actors: Vec<Actor>,
}

impl<T> std::fmt::Debug for Node<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("node_id", &self.ctx.node_id())
            .field("actors", &self.actors.iter().map(Actor::name).collect::<Vec<_>>())
            .finish()
    }
}

impl<T: Transport> Node<T> {
    /// Create a node with an empty local dataset.
    pub fn new(config: NodeConfig, transport: T) -> Result<Self> {
        Self::with_dataset(config, LocalDataset::new(), transport)
    }

    /// Create a node around an existing local dataset.
    pub fn with_dataset(config: NodeConfig, dataset: LocalDataset, transport: T) -> Result<Self> {
        config.validate()?;
        let shutdown = Shutdown::new();
        let dispatcher = Dispatcher::new(transport, &config, shutdown.clone());
        let ctx = NodeContext::new(config, dataset, shutdown);
        let actors = Actor::protocol(&ctx);
        Ok(Self {
            ctx,
            dispatcher,
            actors,
        })
    }

    /// Also run a passive [`Observer`] that logs every inbound payload.
    pub fn with_observer(mut self) -> Self {
        self.actors.push(Observer::new(&self.ctx).into());
        self
    }

    /// Shared node state.
    pub fn context(&self) -> &NodeContext {
        &self.ctx
    }

    /// Run the node until shutdown or a fatal transport error.
    ///
    /// On return every actor and background task has been stopped.
    pub async fn run(self) -> Result<()> {
        let Node {
            ctx,
            mut dispatcher,
            actors,
        } = self;

        dispatcher.register_actors(actors.iter().cloned())?;
        let tasks: Vec<JoinHandle<Result<()>>> =
            actors.into_iter().map(|a| tokio::spawn(a.run())).collect();
        tracing::info!(node = ctx.node_id(), actors = tasks.len(), "node started");

        let result = dispatcher.run().await;

        ctx.shutdown().trigger();
        ctx.retries().cancel_all();
        for joined in join_all(tasks).await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "actor ended with error"),
                Err(e) => tracing::warn!(error = %e, "actor task panicked or was aborted"),
            }
        }

        match &result {
            Ok(()) => tracing::info!(node = ctx.node_id(), "node stopped"),
            Err(e) => tracing::error!(node = ctx.node_id(), error = %e, "node stopped on error"),
        }
        result
    }

    /// Start the node on the current tokio runtime.
    pub fn spawn(self) -> NodeHandle {
        let ctx = self.ctx.clone();
        let task = tokio::spawn(self.run());
        NodeHandle { ctx, task }
    }
}

/// Handle to a running node.
#[derive(Debug)]
pub struct NodeHandle {
    ctx: NodeContext,
    task: JoinHandle<Result<()>>,
}

impl NodeHandle {
    /// Shared node state.
    pub fn context(&self) -> &NodeContext {
        &self.ctx
    }

    /// Identifier of the node.
    pub fn node_id(&self) -> &str {
        self.ctx.node_id()
    }

    /// The node's local dataset.
    pub fn dataset(&self) -> &LocalDataset {
        self.ctx.dataset()
    }

    /// The node's peer table.
    pub fn peers(&self) -> &Arc<PeerTable> {
        self.ctx.peers()
    }

    /// Check whether the node has stopped.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Ask the node to stop without waiting for it.
    pub fn shutdown(&self) {
        self.ctx.shutdown().trigger();
    }

    /// Wait for the node to stop on its own.
    pub async fn join(self) -> Result<()> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(Error::Channel(format!("node task failed: {}", e))),
        }
    }

    /// Stop the node and wait for it.
    pub async fn stop(self) -> Result<()> {
        self.shutdown();
        self.join().await
    }
}
