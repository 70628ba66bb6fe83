// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire message and protocol codes.
//!
//! Every exchange between two nodes is a fixed record:
//!
//! ```text
//! +--------+-------------+-------------+------------------------------+
//! | type   | attr1 (i32) | attr2 (i32) | [len (i32) | payload bytes]  |
//! | 1 byte | big-endian  | big-endian  | payload-bearing types only   |
//! +--------+-------------+-------------+------------------------------+
//! ```
//!
//! `attr1` is usually the destination handle and `attr2` the source handle
//! (or `-1` when unused).

mod wire;

pub use wire::{read_message, write_message};

use std::fmt;

/// Value used for an unused attribute.
pub const NO_ATTR: i32 = -1;

// ============================================================================
// Message Types
// ============================================================================

/// Protocol message kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Send = 1,
    Ack = 2,
    Enroll = 3,
    Resign = 4,
    Sync = 5,
    Release = 6,
    RejectChannel = 7,
    RejectBarrier = 8,
    LinkLost = 9,
    Open = 10,
    AsyncOpen = 11,
    Request = 12,
    AsyncRequest = 13,
    Reply = 14,
    AsyncReply = 15,
    ReplyAndClose = 16,
    AsyncReplyAndClose = 17,
    OpenAck = 18,
    RequestAck = 19,
    ReplyAck = 20,
    RejectConnection = 21,
    AsyncSend = 22,
    Poison = 23,
    Moved = 24,
    Arrived = 25,
}

impl MessageType {
    /// Decode a wire type byte.
    pub fn from_u8(code: u8) -> Option<Self> {
        use MessageType::*;
        let kind = match code {
            1 => Send,
            2 => Ack,
            3 => Enroll,
            4 => Resign,
            5 => Sync,
            6 => Release,
            7 => RejectChannel,
            8 => RejectBarrier,
            9 => LinkLost,
            10 => Open,
            11 => AsyncOpen,
            12 => Request,
            13 => AsyncRequest,
            14 => Reply,
            15 => AsyncReply,
            16 => ReplyAndClose,
            17 => AsyncReplyAndClose,
            18 => OpenAck,
            19 => RequestAck,
            20 => ReplyAck,
            21 => RejectConnection,
            22 => AsyncSend,
            23 => Poison,
            24 => Moved,
            25 => Arrived,
            _ => return None,
        };
        Some(kind)
    }

    /// Wire code of this message type.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// True if the record carries a length-prefixed payload on the wire.
    pub fn has_payload(self) -> bool {
        matches!(
            self,
            MessageType::Send
                | MessageType::AsyncSend
                | MessageType::Arrived
                | MessageType::Open
                | MessageType::AsyncOpen
                | MessageType::Request
                | MessageType::AsyncRequest
                | MessageType::Reply
                | MessageType::AsyncReply
                | MessageType::ReplyAndClose
                | MessageType::AsyncReplyAndClose
        )
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ============================================================================
// Network Message
// ============================================================================

/// A single protocol record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkMessage {
    pub kind: MessageType,
    pub attr1: i32,
    pub attr2: i32,
    pub data: Vec<u8>,
}

impl NetworkMessage {
    /// Message without payload.
    pub fn new(kind: MessageType, attr1: i32, attr2: i32) -> Self {
        Self {
            kind,
            attr1,
            attr2,
            data: Vec::new(),
        }
    }

    /// Message carrying a payload.
    pub fn with_data(kind: MessageType, attr1: i32, attr2: i32, data: Vec<u8>) -> Self {
        Self {
            kind,
            attr1,
            attr2,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        for code in 0..=u8::MAX {
            if let Some(kind) = MessageType::from_u8(code) {
                assert_eq!(kind.code(), code);
            }
        }
        assert_eq!(MessageType::from_u8(0), None);
        assert_eq!(MessageType::from_u8(26), None);
    }

    #[test]
    fn payload_bearing_types() {
        assert!(MessageType::Send.has_payload());
        assert!(MessageType::AsyncSend.has_payload());
        assert!(MessageType::Arrived.has_payload());
        assert!(MessageType::Request.has_payload());
        assert!(!MessageType::Ack.has_payload());
        assert!(!MessageType::Poison.has_payload());
        assert!(!MessageType::Sync.has_payload());
    }
}
