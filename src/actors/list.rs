//! LIST handling: reassemble multi-part transfers into peer datasets.

use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};

use super::Inbound;
#[cfg(feature = "metrics")]
use crate::metrics;
use crate::{
    context::NodeContext,
    error::Result,
    message::ListMessage,
    peer_table::{ListDecision, TransferOutcome},
    queue::BoundedQueue,
};

/// What happened to one LIST part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListProgress {
    /// Not a LIST, not addressed to us, or from an unknown peer.
    Ignored,
    /// Addressed to us but not needed: the peer is already synchronized.
    Discarded,
    /// Stored; `remaining` distinct parts are still missing.
    Accepted {
        /// Parts still missing.
        remaining: usize,
    },
    /// Last missing part: the peer's dataset is now at `version`.
    Completed {
        /// Version of the installed dataset.
        version: i64,
    },
}

/// In-flight transfer from one peer.
#[derive(Debug)]
struct Assembly {
    sequence: i64,
    parts: Vec<Option<String>>,
    remaining: usize,
}

impl Assembly {
    fn new(sequence: i64, total_parts: usize) -> Self {
        Self {
            sequence,
            parts: vec![None; total_parts],
            remaining: total_parts,
        }
    }

    fn matches(&self, list: &ListMessage) -> bool {
        self.parts.len() == list.total_parts() && self.sequence == list.sequence()
    }

    fn insert(&mut self, index: usize, data: String) {
        let slot = &mut self.parts[index];
        if slot.is_none() {
            self.remaining -= 1;
        }
        *slot = Some(data);
    }

    fn into_records(self) -> Vec<String> {
        self.parts.into_iter().flatten().collect()
    }
}

/// Assembles LIST parts addressed to the local node.
///
/// One buffer per sending peer. A part whose `totalParts` or sequence
/// differs from the buffer in progress starts a new attempt. Only a part
/// filling an empty slot counts towards completion, so a duplicate can never
/// complete a transfer early.
#[derive(Debug, Clone)]
pub struct ListReceiver {
    ctx: NodeContext,
    inbox: BoundedQueue<Inbound>,
    assemblies: Arc<Mutex<HashMap<String, Assembly>>>,
}

impl ListReceiver {
    /// Create a receiver for the node described by `ctx`.
    pub fn new(ctx: NodeContext) -> Self {
        let inbox = BoundedQueue::new(ctx.config().queue_capacity, ctx.shutdown().clone());
        Self {
            ctx,
            inbox,
            assemblies: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub(crate) async fn on_message(&self, msg: &Inbound) -> Result<()> {
        self.inbox.enqueue(msg.clone()).await
    }

    /// Number of payloads waiting in the inbox.
    pub fn pending(&self) -> usize {
        self.inbox.len()
    }

    /// Number of transfers currently being assembled.
    pub fn in_progress(&self) -> usize {
        self.assemblies.lock().len()
    }

    /// Process one payload.
    pub fn handle(&self, msg: &Inbound) -> ListProgress {
        let Ok(list) = ListMessage::parse(&msg.payload) else {
            return ListProgress::Ignored;
        };
        if list.dest_id() != self.ctx.node_id() {
            return ListProgress::Ignored;
        }
        let peer = list.sender_id().to_string();
        let sequence = list.sequence();
        match self.ctx.peers().apply_list(&peer, sequence) {
            ListDecision::UnknownPeer => {
                tracing::debug!(%peer, "LIST from unknown peer ignored");
                return ListProgress::Ignored;
            }
            ListDecision::AlreadySynchronized | ListDecision::UpToDate => {
                self.assemblies.lock().remove(&peer);
                return ListProgress::Discarded;
            }
            ListDecision::Assemble => {}
        }
        #[cfg(feature = "metrics")]
        metrics::record_received(crate::message::MessageKind::List);

        let total = list.total_parts();
        let index = list.part_index();

        let records = {
            let mut assemblies = self.assemblies.lock();
            let assembly = assemblies
                .entry(peer.clone())
                .or_insert_with(|| Assembly::new(sequence, total));
            if !assembly.matches(&list) {
                tracing::debug!(
                    %peer,
                    old_seq = assembly.sequence,
                    new_seq = sequence,
                    old_total = assembly.parts.len(),
                    new_total = total,
                    "transfer restarted"
                );
                #[cfg(feature = "metrics")]
                metrics::record_transfer_restarted();
                *assembly = Assembly::new(sequence, total);
            }
            assembly.insert(index, list.into_data());

            let remaining = assembly.remaining;
            if remaining > 0 {
                tracing::trace!(%peer, index, remaining, "part stored");
                return ListProgress::Accepted { remaining };
            }
            assemblies
                .remove(&peer)
                .map(Assembly::into_records)
                .unwrap_or_default()
        };

        match self.ctx.peers().complete_transfer(&peer, records, sequence) {
            Ok(TransferOutcome::Installed) => {
                self.ctx.retries().cancel(&peer);
                tracing::info!(%peer, version = sequence, parts = total, "transfer completed");
                #[cfg(feature = "metrics")]
                metrics::record_transfer_completed(total);
                ListProgress::Completed { version: sequence }
            }
            Ok(TransferOutcome::AlreadySynchronized) => {
                tracing::debug!(%peer, version = sequence, "peer synchronized during transfer");
                ListProgress::Discarded
            }
            Ok(TransferOutcome::UnknownPeer) => ListProgress::Ignored,
            Err(e) => {
                tracing::error!(%peer, error = %e, "assembled dataset rejected");
                ListProgress::Discarded
            }
        }
    }

    pub(crate) async fn run(self) -> Result<()> {
        loop {
            let msg = self.inbox.dequeue().await?;
            self.handle(&msg);
        }
    }
}
