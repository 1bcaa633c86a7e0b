//! LIST: one part of a multi-part dataset transfer.

use std::{fmt, str::FromStr};

use super::{expect_tag, parse_int, parse_node_id, MessageKind};
use crate::{
    dataset::{validate_record, MAX_RECORD_LEN},
    error::{Error, Result},
};

/// Upper bound on `totalParts`, so a hostile part count cannot make the
/// assembler allocate without limit.
pub const MAX_TOTAL_PARTS: u32 = 1 << 20;

/// One transfer part: `LIST;senderID;destPeerID;seq;totalParts;partIndex;data;`.
///
/// A transfer of a dataset with `n` records is `n` parts, part `i` carrying
/// record `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListMessage {
    sender_id: String,
    dest_id: String,
    sequence: i64,
    total_parts: u32,
    part_index: u32,
    data: String,
}

impl ListMessage {
    /// Create one part of a transfer.
    pub fn new(
        sender_id: impl Into<String>,
        dest_id: impl Into<String>,
        sequence: i64,
        total_parts: usize,
        part_index: usize,
        data: impl Into<String>,
    ) -> Result<Self> {
        let sender_id = sender_id.into();
        let dest_id = dest_id.into();
        let data = data.into();
        super::validate_node_id(&sender_id)?;
        super::validate_node_id(&dest_id)?;
        validate_record(&data)?;

        if total_parts == 0 || total_parts > MAX_TOTAL_PARTS as usize {
            return Err(Error::OutOfRange {
                field: "totalParts",
                value: total_parts as i64,
                max: MAX_TOTAL_PARTS as i64,
            });
        }
        if part_index >= total_parts {
            return Err(Error::OutOfRange {
                field: "partIndex",
                value: part_index as i64,
                max: total_parts as i64 - 1,
            });
        }

        Ok(Self {
            sender_id,
            dest_id,
            sequence,
            total_parts: total_parts as u32,
            part_index: part_index as u32,
            data,
        })
    }

    /// Parse a transfer part.
    ///
    /// The final delimiter is optional. `data` may be empty but may not
    /// contain `;`.
    pub fn parse(payload: &str) -> Result<Self> {
        let body = payload.strip_suffix(';').unwrap_or(payload);
        let fields: Vec<&str> = body.splitn(7, ';').collect();
        if fields.len() != 7 {
            return Err(Error::Decode("wrong format".into()));
        }
        expect_tag(&fields, MessageKind::List)?;

        let sender_id = parse_node_id(fields[1], "senderID")?;
        let dest_id = parse_node_id(fields[2], "peerID")?;
        let sequence = parse_int(fields[3], "sequence")?;
        let total_parts = parse_int(fields[4], "totalParts")?;
        let part_index = parse_int(fields[5], "partIndex")?;
        let data = fields[6];

        if !(1..=MAX_TOTAL_PARTS as i64).contains(&total_parts) {
            return Err(Error::Decode(format!(
                "totalParts should be in [1;{}] (totalParts={})",
                MAX_TOTAL_PARTS, total_parts
            )));
        }
        if !(0..total_parts).contains(&part_index) {
            return Err(Error::Decode(format!(
                "partIndex should be in [0;{}) (partIndex={})",
                total_parts, part_index
            )));
        }
        if data.contains(';') {
            return Err(Error::Decode("too many fields".into()));
        }
        if data.chars().count() > MAX_RECORD_LEN {
            return Err(Error::Decode(format!(
                "data should be at most {} characters",
                MAX_RECORD_LEN
            )));
        }

        Ok(Self {
            sender_id,
            dest_id,
            sequence,
            total_parts: total_parts as u32,
            part_index: part_index as u32,
            data: data.to_string(),
        })
    }

    /// Encode for the wire.
    pub fn encode(&self) -> String {
        format!(
            "LIST;{};{};{};{};{};{};",
            self.sender_id,
            self.dest_id,
            self.sequence,
            self.total_parts,
            self.part_index,
            self.data
        )
    }

    /// Identifier of the node whose dataset is being transferred.
    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    /// Identifier of the node the transfer is for.
    pub fn dest_id(&self) -> &str {
        &self.dest_id
    }

    /// Version of the dataset being transferred.
    pub fn sequence(&self) -> i64 {
        self.sequence
    }

    /// Number of parts in the whole transfer.
    pub fn total_parts(&self) -> usize {
        self.total_parts as usize
    }

    /// Position of this part, in `0..total_parts`.
    pub fn part_index(&self) -> usize {
        self.part_index as usize
    }

    /// The record carried by this part.
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Consume the message, keeping only its record.
    pub fn into_data(self) -> String {
        self.data
    }
}

impl FromStr for ListMessage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ListMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_format() {
        let list = ListMessage::new("A", "B", 6, 3, 0, "r0").unwrap();
        assert_eq!(list.encode(), "LIST;A;B;6;3;0;r0;");
    }

    #[test]
    fn test_parse() {
        let list = ListMessage::parse("LIST;A;B;6;3;1;r1;").unwrap();
        assert_eq!(list.sender_id(), "A");
        assert_eq!(list.dest_id(), "B");
        assert_eq!(list.sequence(), 6);
        assert_eq!(list.total_parts(), 3);
        assert_eq!(list.part_index(), 1);
        assert_eq!(list.data(), "r1");

        // Final delimiter optional.
        let list: ListMessage = "LIST;TzuyiDell;TzuyiHP;7;5;2;ILoveYou".parse().unwrap();
        assert_eq!(list.into_data(), "ILoveYou");
    }

    #[test]
    fn test_empty_record() {
        let list = ListMessage::new("A", "B", 0, 1, 0, "").unwrap();
        assert_eq!(list.encode(), "LIST;A;B;0;1;0;;");
        assert_eq!(ListMessage::parse(&list.encode()).unwrap(), list);
    }

    #[test]
    fn test_round_trip_max_record() {
        let data = "x".repeat(MAX_RECORD_LEN);
        let list = ListMessage::new("A", "B", 9, 10, 9, data).unwrap();
        assert_eq!(ListMessage::parse(&list.encode()).unwrap(), list);
    }

    #[test]
    fn test_rejects_malformed() {
        let long = format!("LIST;A;B;6;3;0;{};", "x".repeat(MAX_RECORD_LEN + 1));
        for bad in [
            "LIST;A;B;6;3;0",
            "LIST;A;B;6;3;0;r0;extra;",
            "LIST;a b;B;6;3;0;r0;",
            "LIST;A;B;six;3;0;r0;",
            "LIST;A;B;6;0;0;r0;",
            "LIST;A;B;6;3;3;r0;",
            "LIST;A;B;6;3;-1;r0;",
            "LIST;A;B;6;99999999999;0;r0;",
            "SYN;B;A;5",
            "HELLO;A;1;30;0",
            long.as_str(),
        ] {
            assert!(ListMessage::parse(bad).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_construction_errors() {
        assert!(matches!(
            ListMessage::new("A", "B", 0, 0, 0, "r"),
            Err(Error::OutOfRange { field: "totalParts", .. })
        ));
        assert!(matches!(
            ListMessage::new("A", "B", 0, 2, 2, "r"),
            Err(Error::OutOfRange { field: "partIndex", .. })
        ));
        assert!(matches!(
            ListMessage::new("A", "B", 0, 1, 0, "a;b"),
            Err(Error::InvalidData(_))
        ));
        assert!(matches!(
            ListMessage::new("A", "B", 0, 1, 0, "x".repeat(256)),
            Err(Error::DataTooLong { .. })
        ));
        assert!(matches!(
            ListMessage::new("A", "not valid", 0, 1, 0, "r"),
            Err(Error::InvalidNodeId(_))
        ));
    }
}
