//! HELLO: periodic liveness and membership advertisement.

use std::{fmt, str::FromStr};

use super::{expect_tag, parse_bounded, parse_int, parse_node_id, split_fields, MessageKind};
use crate::error::{Error, Result};

/// Maximum number of peers one advertisement can list.
pub const MAX_PEERS: usize = 255;

/// An advertisement: `HELLO;senderID;seq;interval;peerCount;peer1;…;peerN`.
///
/// `sequence` is the sender's dataset version, not a message counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloMessage {
    sender_id: String,
    sequence: i64,
    advertise_interval: u8,
    peers: Vec<String>,
}

impl HelloMessage {
    /// Create an advertisement with no peers listed yet.
    pub fn new(sender_id: impl Into<String>, sequence: i64, advertise_interval: u8) -> Result<Self> {
        let sender_id = sender_id.into();
        super::validate_node_id(&sender_id)?;
        Ok(Self {
            sender_id,
            sequence,
            advertise_interval,
            peers: Vec::new(),
        })
    }

    /// List one more peer.
    pub fn add_peer(&mut self, peer_id: impl Into<String>) -> Result<()> {
        if self.peers.len() >= MAX_PEERS {
            return Err(Error::TooManyPeers);
        }
        let peer_id = peer_id.into();
        super::validate_node_id(&peer_id)?;
        self.peers.push(peer_id);
        Ok(())
    }

    /// List every peer of `peers` (builder pattern).
    pub fn with_peers<I, S>(mut self, peers: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for peer in peers {
            self.add_peer(peer)?;
        }
        Ok(self)
    }

    /// Parse an advertisement.
    pub fn parse(payload: &str) -> Result<Self> {
        let fields = split_fields(payload);
        if fields.len() < 5 {
            return Err(Error::Decode("wrong format".into()));
        }
        expect_tag(&fields, MessageKind::Hello)?;

        let sender_id = parse_node_id(fields[1], "senderID")?;
        let sequence = parse_int(fields[2], "sequence")?;
        let advertise_interval = parse_bounded(fields[3], "HelloInterval", 255)? as u8;
        let peer_count = parse_bounded(fields[4], "NumPeers", MAX_PEERS as i64)? as usize;

        if fields.len() != 5 + peer_count {
            return Err(Error::Decode(format!(
                "wrong number of peers: declared {}, found {}",
                peer_count,
                fields.len() - 5
            )));
        }

        let peers = fields[5..]
            .iter()
            .map(|p| parse_node_id(p, "peerID"))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            sender_id,
            sequence,
            advertise_interval,
            peers,
        })
    }

    /// Encode for the wire.
    pub fn encode(&self) -> String {
        let mut out = format!(
            "HELLO;{};{};{};{}",
            self.sender_id,
            self.sequence,
            self.advertise_interval,
            self.peers.len()
        );
        for peer in &self.peers {
            out.push(';');
            out.push_str(peer);
        }
        out
    }

    /// Identifier of the advertising node.
    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    /// The sender's current dataset version.
    pub fn sequence(&self) -> i64 {
        self.sequence
    }

    /// Seconds the sender may stay silent before peers forget it.
    pub fn advertise_interval(&self) -> u8 {
        self.advertise_interval
    }

    /// Peers the sender currently knows.
    pub fn peers(&self) -> &[String] {
        &self.peers
    }

    /// Check whether `peer_id` is among the listed peers.
    pub fn lists_peer(&self, peer_id: &str) -> bool {
        self.peers.iter().any(|p| p == peer_id)
    }
}

impl FromStr for HelloMessage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for HelloMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
