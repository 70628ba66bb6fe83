// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types shared by every networked primitive.

use std::fmt;
use std::io;

use crate::registry::Handle;

/// Result type for cspnet operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by channels, barriers, connections and links.
///
/// Variants fall into three families:
/// - protocol misuse (local programming errors, never retried)
/// - network errors (link lost, endpoint destroyed/broken/rejected, corrupted payload)
/// - poison (a cooperative shutdown signal carrying its strength)
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Protocol misuse
    // ========================================================================
    /// Operation called out of order (e.g. unmatched extended read)
    ProtocolMisuse(&'static str),

    // ========================================================================
    // Network
    // ========================================================================
    /// The link carrying this primitive failed
    LinkLost,
    /// The endpoint has been destroyed
    Destroyed,
    /// The endpoint was broken by an earlier failure
    Broken(&'static str),
    /// The remote end refused the message
    Rejected(&'static str),
    /// A payload could not be encoded or decoded
    Corrupted(String),
    /// Protocol-level failure reported by the remote end
    Network(String),
    /// Could not establish a link
    Connect(String),
    /// Transport I/O error
    Io(io::Error),

    // ========================================================================
    // Poison
    // ========================================================================
    /// Endpoint poisoned with the given strength
    Poisoned(i32),

    // ========================================================================
    // Registries and arguments
    // ========================================================================
    /// Explicit handle already in use
    AlreadyExists(Handle),
    /// Malformed argument (location string, address, counts)
    InvalidArgument(String),
}

impl Error {
    /// True for every network-family error.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Error::LinkLost
                | Error::Destroyed
                | Error::Broken(_)
                | Error::Rejected(_)
                | Error::Corrupted(_)
                | Error::Network(_)
                | Error::Connect(_)
                | Error::Io(_)
        )
    }

    /// Poison strength carried by this error, if it is a poison signal.
    pub fn poison_strength(&self) -> Option<i32> {
        match self {
            Error::Poisoned(strength) => Some(*strength),
            _ => None,
        }
    }

    /// True if the error reports a misuse of the API.
    pub fn is_protocol_misuse(&self) -> bool {
        matches!(self, Error::ProtocolMisuse(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ProtocolMisuse(msg) => write!(f, "protocol misuse: {}", msg),
            Error::LinkLost => write!(f, "link lost"),
            Error::Destroyed => write!(f, "endpoint destroyed"),
            Error::Broken(msg) => write!(f, "endpoint broken: {}", msg),
            Error::Rejected(msg) => write!(f, "rejected: {}", msg),
            Error::Corrupted(msg) => write!(f, "corrupted payload: {}", msg),
            Error::Network(msg) => write!(f, "network error: {}", msg),
            Error::Connect(msg) => write!(f, "connect failed: {}", msg),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Poisoned(strength) => write!(f, "poisoned (strength {})", strength),
            Error::AlreadyExists(handle) => write!(f, "handle {} already in use", handle),
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(Error::LinkLost.is_network());
        assert!(Error::Rejected("channel").is_network());
        assert!(!Error::Poisoned(3).is_network());
        assert_eq!(Error::Poisoned(3).poison_strength(), Some(3));
        assert_eq!(Error::LinkLost.poison_strength(), None);
        assert!(Error::ProtocolMisuse("x").is_protocol_misuse());
    }

    #[test]
    fn link_lost_display() {
        assert_eq!(Error::LinkLost.to_string(), "link lost");
        assert_eq!(
            Error::AlreadyExists(100).to_string(),
            "handle 100 already in use"
        );
    }
}
