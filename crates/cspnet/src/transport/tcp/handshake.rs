// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Link handshake strings.
//!
//! ```text
//! client                                server
//!   |-- utf(client node id) ----------->|
//!   |<-------------- utf("OK"|"EXISTS") |
//!   |<------------ utf(server node id)  |
//! ```
//!
//! A `utf` string is a u16 big-endian byte length followed by UTF-8 bytes.
//! After `EXISTS` the server closes the socket.

use std::io::{self, Read, Write};

pub(crate) const ANSWER_OK: &str = "OK";
pub(crate) const ANSWER_EXISTS: &str = "EXISTS";

pub(crate) fn write_utf<W: Write + ?Sized>(writer: &mut W, value: &str) -> io::Result<()> {
    let len = u16::try_from(value.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "handshake string too long"))?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(value.as_bytes())
}

pub(crate) fn read_utf<R: Read + ?Sized>(reader: &mut R) -> io::Result<String> {
    let mut len = [0u8; 2];
    reader.read_exact(&mut len)?;
    let mut buf = vec![0u8; u16::from_be_bytes(len) as usize];
    reader.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn utf_framing() {
        let mut buf = Vec::new();
        write_utf(&mut buf, ANSWER_EXISTS).unwrap();
        assert_eq!(&buf[..2], &[0, 6]);
        assert_eq!(read_utf(&mut Cursor::new(buf)).unwrap(), "EXISTS");
    }

    #[test]
    fn truncated_string_fails() {
        let buf = vec![0u8, 5, b'a', b'b'];
        assert!(read_utf(&mut Cursor::new(buf)).is_err());
    }
}
