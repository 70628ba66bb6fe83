// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Payload codecs.
//!
//! Endpoints never look inside payloads; they hand values to a [`Codec`] on
//! the way out and bytes to it on the way in. Failures surface as
//! [`Error::Corrupted`].

use crate::error::{Error, Result};

/// Converts values to and from payload bytes.
pub trait Codec<T>: Send {
    fn encode(&mut self, value: &T) -> Result<Vec<u8>>;
    fn decode(&mut self, bytes: &[u8]) -> Result<T>;
}

/// Pass-through codec for raw byte payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl Codec<Vec<u8>> for RawCodec {
    fn encode(&mut self, value: &Vec<u8>) -> Result<Vec<u8>> {
        Ok(value.clone())
    }

    fn decode(&mut self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}

/// UTF-8 string codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8Codec;

impl Codec<String> for Utf8Codec {
    fn encode(&mut self, value: &String) -> Result<Vec<u8>> {
        Ok(value.as_bytes().to_vec())
    }

    fn decode(&mut self, bytes: &[u8]) -> Result<String> {
        String::from_utf8(bytes.to_vec()).map_err(|e| Error::Corrupted(e.to_string()))
    }
}

/// JSON codec for any serde type.
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl<T> Codec<T> for JsonCodec
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    fn encode(&mut self, value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| Error::Corrupted(e.to_string()))
    }

    fn decode(&mut self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| Error::Corrupted(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_rejects_invalid_bytes() {
        let mut codec = Utf8Codec;
        assert_eq!(codec.decode(b"abc").unwrap(), "abc");
        assert!(matches!(codec.decode(&[0xff, 0xfe]), Err(Error::Corrupted(_))));
    }

    #[cfg(feature = "json")]
    #[test]
    fn json_structs() {
        #[derive(serde::Serialize, serde::Deserialize, Debug, PartialEq)]
        struct Job {
            id: u32,
            tag: String,
        }
        let mut codec = JsonCodec;
        let bytes = codec
            .encode(&Job {
                id: 4,
                tag: "x".into(),
            })
            .unwrap();
        let back: Job = codec.decode(&bytes).unwrap();
        assert_eq!(back.id, 4);
        let err: Result<Job> = codec.decode(b"{");
        assert!(matches!(err, Err(Error::Corrupted(_))));
    }
}
