//! SYN: request for a peer's dataset.

use std::{fmt, str::FromStr};

use super::{expect_tag, parse_int, parse_node_id, split_fields, MessageKind};
use crate::{
    error::{Error, Result},
    peer_table::PeerTable,
};

/// A reconciliation request: `SYN;senderID;destPeerID;seq`.
///
/// Broadcast on the wire but addressed to `dest_id`. `sequence` is the
/// dataset version the sender currently holds for that peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynMessage {
    sender_id: String,
    dest_id: String,
    sequence: i64,
}

impl SynMessage {
    /// Build a request towards a peer of `peers`.
    ///
    /// Fails with [`Error::UnknownPeer`] if `dest_id` is not (or no longer)
    /// in the peer table.
    pub fn new(
        sender_id: impl Into<String>,
        dest_id: impl Into<String>,
        sequence: i64,
        peers: &PeerTable,
    ) -> Result<Self> {
        let sender_id = sender_id.into();
        let dest_id = dest_id.into();
        super::validate_node_id(&sender_id)?;
        if !peers.contains(&dest_id) {
            return Err(Error::UnknownPeer(dest_id));
        }
        Ok(Self {
            sender_id,
            dest_id,
            sequence,
        })
    }

    /// Parse a request.
    pub fn parse(payload: &str) -> Result<Self> {
        let fields = split_fields(payload);
        if fields.len() != 4 {
            return Err(Error::Decode("wrong format".into()));
        }
        expect_tag(&fields, MessageKind::Syn)?;

        Ok(Self {
            sender_id: parse_node_id(fields[1], "senderID")?,
            dest_id: parse_node_id(fields[2], "peerID")?,
            sequence: parse_int(fields[3], "sequence")?,
        })
    }

    /// Encode for the wire.
    pub fn encode(&self) -> String {
        format!("SYN;{};{};{}", self.sender_id, self.dest_id, self.sequence)
    }

    /// Identifier of the requesting node.
    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    /// Identifier of the node asked to send its dataset.
    pub fn dest_id(&self) -> &str {
        &self.dest_id
    }

    /// Version the requester currently holds for `dest_id`.
    pub fn sequence(&self) -> i64 {
        self.sequence
    }
}

impl FromStr for SynMessage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for SynMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
