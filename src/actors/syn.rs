//! SYN handling: answer reconciliation requests with a LIST transfer.

use std::sync::Arc;

use super::{Inbound, OutboxSlot};
#[cfg(feature = "metrics")]
use crate::metrics;
use crate::{
    context::NodeContext,
    dispatcher::Outbox,
    error::Result,
    message::{ListMessage, SynMessage},
    queue::BoundedQueue,
    tasks::TaskRegistry,
};

/// Answers SYN requests addressed to the local node.
///
/// A request for a version other than the local one starts a transfer task
/// that snapshots the local dataset once and sends one LIST per record. At
/// most one transfer runs per requester; requests arriving meanwhile are
/// dropped.
#[derive(Debug, Clone)]
pub struct SynReceiver {
    ctx: NodeContext,
    inbox: BoundedQueue<Inbound>,
    outbox: OutboxSlot,
    transfers: Arc<TaskRegistry<String>>,
}

impl SynReceiver {
    /// Create a receiver for the node described by `ctx`.
    pub fn new(ctx: NodeContext) -> Self {
        let inbox = BoundedQueue::new(ctx.config().queue_capacity, ctx.shutdown().clone());
        Self {
            ctx,
            inbox,
            outbox: OutboxSlot::new("syn-receiver"),
            transfers: Arc::new(TaskRegistry::new()),
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

    /// Live transfer tasks, keyed by requester ID.
    pub fn transfers(&self) -> &TaskRegistry<String> {
        &self.transfers
    }

    /// Process one payload.
    ///
    /// Returns true if a transfer task was started.
    pub fn handle(&self, msg: &Inbound) -> bool {
        let Ok(syn) = SynMessage::parse(&msg.payload) else {
            return false;
        };
        if syn.dest_id() != self.ctx.node_id() {
            return false;
        }
        #[cfg(feature = "metrics")]
        metrics::record_received(crate::message::MessageKind::Syn);

        let local_version = self.ctx.dataset().version();
        if syn.sequence() == local_version {
            tracing::debug!(
                requester = syn.sender_id(),
                version = local_version,
                "requester is up to date"
            );
            return false;
        }

        let outbox = match self.outbox.get() {
            Ok(outbox) => outbox.clone(),
            Err(e) => {
                tracing::error!(error = %e, "cannot answer SYN");
                return false;
            }
        };
        let requester = syn.sender_id().to_string();
        let started = self.transfers.spawn_unique(
            requester.clone(),
            transfer(self.ctx.clone(), outbox, requester.clone()),
        );
        if started {
            tracing::debug!(%requester, their = syn.sequence(), ours = local_version, "transfer started");
            #[cfg(feature = "metrics")]
            metrics::record_transfer_started();
        } else {
            tracing::debug!(%requester, "transfer already in progress, request dropped");
        }
        started
    }

    pub(crate) async fn run(self) -> Result<()> {
        let result = self.serve().await;
        self.transfers.cancel_all();
        result
    }

    async fn serve(&self) -> Result<()> {
        loop {
            let msg = self.inbox.dequeue().await?;
            self.handle(&msg);
        }
    }
}

/// Send the current local dataset to `requester`, one record per part.
async fn transfer(ctx: NodeContext, outbox: Outbox, requester: String) {
    let snapshot = ctx.dataset().snapshot();
    let total = snapshot.len();
    for (index, record) in snapshot.records().iter().enumerate() {
        let list = match ListMessage::new(
            ctx.node_id(),
            requester.as_str(),
            snapshot.version(),
            total,
            index,
            record.as_str(),
        ) {
            Ok(list) => list,
            Err(e) => {
                tracing::error!(%requester, index, error = %e, "failed to build LIST");
                return;
            }
        };
        if outbox.send(list.encode()).await.is_err() {
            return;
        }
    }
    tracing::debug!(%requester, parts = total, version = snapshot.version(), "transfer finished");
}
