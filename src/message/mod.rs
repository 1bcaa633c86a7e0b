//! Wire messages of the lan-sync protocol.
//!
//! All three kinds are ASCII, `;`-delimited and share one broadcast channel
//! with no kind discriminator beyond the leading tag:
//!
//! | Kind | Format |
//! |------|--------|
//! | [`HelloMessage`] | `HELLO;senderID;seq;interval;peerCount;peer1;…;peerN` |
//! | [`SynMessage`] | `SYN;senderID;destPeerID;seq` |
//! | [`ListMessage`] | `LIST;senderID;destPeerID;seq;totalParts;partIndex;data;` |
//!
//! Every actor parses every inbound payload as its own kind and drops it on
//! failure. A parse error therefore means "not this kind" and is never
//! surfaced; constructors, on the other hand, fail loudly because an invalid
//! outbound message is a caller bug.

mod hello;
mod list;
mod syn;

pub use hello::{HelloMessage, MAX_PEERS};
pub use list::{ListMessage, MAX_TOTAL_PARTS};
pub use syn::SynMessage;

use crate::error::{Error, Result};

/// Maximum length of a node identifier.
pub const MAX_NODE_ID_LEN: usize = 16;

/// Check whether `id` is a word (`[A-Za-z0-9_]+`) of at most 16 characters.
pub fn is_node_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_NODE_ID_LEN
        && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Validate a node identifier.
pub fn validate_node_id(id: &str) -> Result<()> {
    if is_node_id(id) {
        Ok(())
    } else {
        Err(Error::InvalidNodeId(id.to_string()))
    }
}

/// The three message kinds, identified by their leading tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Liveness advertisement.
    Hello,
    /// Reconciliation request.
    Syn,
    /// One part of a reconciliation transfer.
    List,
}

impl MessageKind {
    /// Wire tag of this kind.
    pub const fn tag(&self) -> &'static str {
        match self {
            MessageKind::Hello => "HELLO",
            MessageKind::Syn => "SYN",
            MessageKind::List => "LIST",
        }
    }

    /// Guess the kind of a payload from its tag, without validating it.
    pub fn detect(payload: &str) -> Option<Self> {
        match payload.split(';').next()? {
            "HELLO" => Some(MessageKind::Hello),
            "SYN" => Some(MessageKind::Syn),
            "LIST" => Some(MessageKind::List),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Split a payload into fields, tolerating a single trailing delimiter.
fn split_fields(payload: &str) -> Vec<&str> {
    payload
        .strip_suffix(';')
        .unwrap_or(payload)
        .split(';')
        .collect()
}

/// Check the leading tag of a split payload.
fn expect_tag(fields: &[&str], kind: MessageKind) -> Result<()> {
    match fields.first() {
        Some(tag) if *tag == kind.tag() => Ok(()),
        _ => Err(Error::Decode(format!("should start with {}", kind.tag()))),
    }
}

fn parse_node_id(field: &str, name: &str) -> Result<String> {
    if is_node_id(field) {
        Ok(field.to_string())
    } else {
        Err(Error::Decode(format!(
            "{} should be a word of at most {} characters ({}={:?})",
            name, MAX_NODE_ID_LEN, name, field
        )))
    }
}

fn parse_int(field: &str, name: &str) -> Result<i64> {
    field
        .parse::<i64>()
        .map_err(|e| Error::Decode(format!("{} is not an integer ({:?}): {}", name, field, e)))
}

fn parse_bounded(field: &str, name: &'static str, max: i64) -> Result<i64> {
    let value = parse_int(field, name)?;
    if (0..=max).contains(&value) {
        Ok(value)
    } else {
        Err(Error::Decode(format!(
            "{} should be in [0;{}] ({}={})",
            name, max, name, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_rules() {
        assert!(is_node_id("A"));
        assert!(is_node_id("Juans_FileServer"));
        assert!(is_node_id("0123456789abcdef"));
        assert!(!is_node_id(""));
        assert!(!is_node_id("0123456789abcdefg"));
        assert!(!is_node_id("has space"));
        assert!(!is_node_id("semi;colon"));
        assert!(!is_node_id("dash-ed"));
        assert!(validate_node_id("ok").is_ok());
        assert!(matches!(
            validate_node_id("no way"),
            Err(Error::InvalidNodeId(_))
        ));
    }

    #[test]
    fn test_detect_kind() {
        assert_eq!(MessageKind::detect("HELLO;A;1;30;0"), Some(MessageKind::Hello));
        assert_eq!(MessageKind::detect("SYN;B;A;5"), Some(MessageKind::Syn));
        assert_eq!(
            MessageKind::detect("LIST;A;B;6;3;0;r0;"),
            Some(MessageKind::List)
        );
        assert_eq!(MessageKind::detect("PING"), None);
        assert_eq!(MessageKind::Syn.to_string(), "SYN");
    }

    #[test]
    fn test_split_fields_trailing_delimiter() {
        assert_eq!(split_fields("SYN;B;A;5;"), vec!["SYN", "B", "A", "5"]);
        assert_eq!(split_fields("SYN;B;A;5"), vec!["SYN", "B", "A", "5"]);
    }

    #[test]
    fn test_parse_bounded() {
        assert_eq!(parse_bounded("255", "interval", 255).unwrap(), 255);
        assert!(parse_bounded("256", "interval", 255).is_err());
        assert!(parse_bounded("-1", "interval", 255).is_err());
        assert!(parse_bounded("x", "interval", 255).is_err());
    }
}
