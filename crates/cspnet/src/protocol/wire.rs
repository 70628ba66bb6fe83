// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Blocking serialization of [`NetworkMessage`] records over a byte stream.

use std::io::{self, Read, Write};

use super::{MessageType, NetworkMessage};

/// Write one record. The caller flushes.
pub fn write_message<W: Write + ?Sized>(writer: &mut W, msg: &NetworkMessage) -> io::Result<()> {
    let mut header = [0u8; 9];
    header[0] = msg.kind.code();
    header[1..5].copy_from_slice(&msg.attr1.to_be_bytes());
    header[5..9].copy_from_slice(&msg.attr2.to_be_bytes());
    writer.write_all(&header)?;

    if msg.kind.has_payload() {
        let len = i32::try_from(msg.data.len()).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "payload exceeds i32 length")
        })?;
        writer.write_all(&len.to_be_bytes())?;
        writer.write_all(&msg.data)?;
    }
    Ok(())
}

/// Read one record, rejecting payloads longer than `max_payload`.
///
/// An unknown type byte or an out-of-range length is reported as
/// `InvalidData`; the stream cannot be resynchronised after either.
pub fn read_message<R: Read + ?Sized>(
    reader: &mut R,
    max_payload: usize,
) -> io::Result<NetworkMessage> {
    let mut header = [0u8; 9];
    reader.read_exact(&mut header)?;

    let kind = MessageType::from_u8(header[0]).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unknown message type {}", header[0]),
        )
    })?;
    let attr1 = i32::from_be_bytes([header[1], header[2], header[3], header[4]]);
    let attr2 = i32::from_be_bytes([header[5], header[6], header[7], header[8]]);

    let mut data = Vec::new();
    if kind.has_payload() {
        let mut len_buf = [0u8; 4];
        reader.read_exact(&mut len_buf)?;
        let len = i32::from_be_bytes(len_buf);
        if len < 0 || len as usize > max_payload {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("payload length {} out of range (max {})", len, max_payload),
            ));
        }
        data = vec![0u8; len as usize];
        reader.read_exact(&mut data)?;
    }

    Ok(NetworkMessage {
        kind,
        attr1,
        attr2,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_only_layout() {
        let mut buf = Vec::new();
        write_message(&mut buf, &NetworkMessage::new(MessageType::Ack, 51, -1)).unwrap();
        assert_eq!(buf, vec![2, 0, 0, 0, 51, 0xff, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn send_carries_length_prefix() {
        let msg = NetworkMessage::with_data(MessageType::Send, 50, 52, vec![7, 8, 9]);
        let mut buf = Vec::new();
        write_message(&mut buf, &msg).unwrap();
        assert_eq!(buf.len(), 9 + 4 + 3);
        assert_eq!(&buf[9..13], &3i32.to_be_bytes());

        let decoded = read_message(&mut Cursor::new(buf), 1024).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn payload_dropped_for_headerless_types() {
        let msg = NetworkMessage::with_data(MessageType::Sync, 60, 61, vec![1, 2]);
        let mut buf = Vec::new();
        write_message(&mut buf, &msg).unwrap();
        assert_eq!(buf.len(), 9);
        let decoded = read_message(&mut Cursor::new(buf), 1024).unwrap();
        assert!(decoded.data.is_empty());
    }

    #[test]
    fn back_to_back_records() {
        let mut buf = Vec::new();
        write_message(&mut buf, &NetworkMessage::new(MessageType::Enroll, 50, -1)).unwrap();
        write_message(
            &mut buf,
            &NetworkMessage::with_data(MessageType::AsyncSend, 50, 51, b"hi".to_vec()),
        )
        .unwrap();
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_message(&mut cursor, 16).unwrap().kind, MessageType::Enroll);
        let second = read_message(&mut cursor, 16).unwrap();
        assert_eq!(second.data, b"hi");
        assert!(read_message(&mut cursor, 16).is_err());
    }

    #[test]
    fn unknown_type_rejected() {
        let buf = vec![99u8, 0, 0, 0, 0, 0, 0, 0, 0];
        let err = read_message(&mut Cursor::new(buf), 16).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn oversized_and_negative_lengths_rejected() {
        let mut buf = vec![1u8, 0, 0, 0, 50, 0, 0, 0, 51];
        buf.extend_from_slice(&1000i32.to_be_bytes());
        assert!(read_message(&mut Cursor::new(buf), 16).is_err());

        let mut buf = vec![1u8, 0, 0, 0, 50, 0, 0, 0, 51];
        buf.extend_from_slice(&(-4i32).to_be_bytes());
        assert!(read_message(&mut Cursor::new(buf), 16).is_err());
    }
}
