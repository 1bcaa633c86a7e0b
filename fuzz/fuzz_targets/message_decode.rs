//! Fuzz target for the HELLO, SYN and LIST parsers.
//!
//! Every datagram is handed to all three parsers, so none of them may panic
//! on arbitrary input. Anything a parser accepts must read back
//! unchanged from its encoding.

#![no_main]

use lan_sync::{HelloMessage, ListMessage, SynMessage};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(payload) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(hello) = HelloMessage::parse(payload) {
        assert_eq!(HelloMessage::parse(&hello.encode()).ok(), Some(hello));
    }
    if let Ok(syn) = SynMessage::parse(payload) {
        assert_eq!(SynMessage::parse(&syn.encode()).ok(), Some(syn));
    }
    if let Ok(list) = ListMessage::parse(payload) {
        assert_eq!(ListMessage::parse(&list.encode()).ok(), Some(list));
    }
});
