//! Metrics for the lan-sync protocol.
//!
//! ## Available Metrics
//!
//! ### Counters
//! - `lan_sync_messages_sent_total{kind}` - Payloads broadcast, by message kind
//! - `lan_sync_messages_received_total{kind}` - Payloads accepted by an actor, by message kind
//! - `lan_sync_datagrams_received_total` - Datagrams handed to the dispatcher
//! - `lan_sync_syn_retries_total` - SYN requests sent by retry tasks
//! - `lan_sync_transfers_started_total` - LIST transfers started for a requester
//! - `lan_sync_transfers_completed_total` - Peer datasets fully assembled
//! - `lan_sync_transfers_restarted_total` - Assembly buffers thrown away for a new attempt
//! - `lan_sync_state_transitions_total{from,to}` - Peer state changes
//! - `lan_sync_peer_added_total` - Peers first seen
//! - `lan_sync_peer_evicted_total` - Peers forgotten after expiry
//!
//! ### Gauges
//! - `lan_sync_known_peers` - Current number of non-expired peers
//! - `lan_sync_local_version` - Version of the local dataset last advertised
//!
//! ### Histograms
//! - `lan_sync_transfer_parts` - Number of parts per completed transfer

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

use crate::{message::MessageKind, peer_table::PeerState};

/// Initialize metric descriptions.
///
/// Call this once at application startup.
pub fn init_metrics() {
    describe_counter!(
        "lan_sync_messages_sent_total",
        "Total number of payloads broadcast, by message kind"
    );
    describe_counter!(
        "lan_sync_messages_received_total",
        "Total number of payloads accepted by an actor, by message kind"
    );
    describe_counter!(
        "lan_sync_datagrams_received_total",
        "Total number of datagrams handed to the dispatcher"
    );
    describe_counter!(
        "lan_sync_syn_retries_total",
        "Total number of SYN requests sent by retry tasks"
    );
    describe_counter!(
        "lan_sync_transfers_started_total",
        "Total number of LIST transfers started"
    );
    describe_counter!(
        "lan_sync_transfers_completed_total",
        "Total number of peer datasets fully assembled"
    );
    describe_counter!(
        "lan_sync_transfers_restarted_total",
        "Total number of assembly buffers discarded for a new attempt"
    );
    describe_counter!(
        "lan_sync_state_transitions_total",
        "Total number of peer state changes"
    );
    describe_counter!("lan_sync_peer_added_total", "Total number of peers first seen");
    describe_counter!(
        "lan_sync_peer_evicted_total",
        "Total number of peers forgotten after expiry"
    );

    describe_gauge!("lan_sync_known_peers", "Current number of non-expired peers");
    describe_gauge!(
        "lan_sync_local_version",
        "Version of the local dataset last advertised"
    );

    describe_histogram!(
        "lan_sync_transfer_parts",
        "Number of parts per completed transfer"
    );
}

/// Record a payload broadcast.
pub fn record_sent(kind: Option<MessageKind>) {
    counter!("lan_sync_messages_sent_total", "kind" => kind_label(kind)).increment(1);
}

/// Record a payload accepted by an actor.
pub fn record_received(kind: MessageKind) {
    counter!("lan_sync_messages_received_total", "kind" => kind.tag()).increment(1);
}

/// Record a datagram handed to the dispatcher.
pub fn record_datagram() {
    counter!("lan_sync_datagrams_received_total").increment(1);
}

/// Record a SYN sent by a retry task.
pub fn record_syn_retry() {
    counter!("lan_sync_syn_retries_total").increment(1);
}

/// Record a transfer started for a requester.
pub fn record_transfer_started() {
    counter!("lan_sync_transfers_started_total").increment(1);
}

/// Record a completed transfer of `parts` parts.
pub fn record_transfer_completed(parts: usize) {
    counter!("lan_sync_transfers_completed_total").increment(1);
    histogram!("lan_sync_transfer_parts").record(parts as f64);
}

/// Record an assembly buffer thrown away.
pub fn record_transfer_restarted() {
    counter!("lan_sync_transfers_restarted_total").increment(1);
}

/// Record a peer state change.
pub fn record_state_transition(from: PeerState, to: PeerState) {
    counter!(
        "lan_sync_state_transitions_total",
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
}

/// Record a peer being added.
pub fn record_peer_added() {
    counter!("lan_sync_peer_added_total").increment(1);
}

/// Record a peer being evicted.
pub fn record_peer_evicted() {
    counter!("lan_sync_peer_evicted_total").increment(1);
}

/// Update known peers gauge.
pub fn set_known_peers(count: usize) {
    gauge!("lan_sync_known_peers").set(count as f64);
}

/// Update local version gauge.
pub fn set_local_version(version: i64) {
    gauge!("lan_sync_local_version").set(version as f64);
}

fn kind_label(kind: Option<MessageKind>) -> &'static str {
    kind.map(|k| k.tag()).unwrap_or("UNKNOWN")
}
