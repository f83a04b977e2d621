//! Frame Protocol
//!
//! Wire format for bridge messages over a byte stream: length-prefixed JSON
//! with a CRC32 checksum.
//!
//! # Frame Format
//!
//! ```text
//! +----------------+----------------+------------------------------------------+
//! | Length (4)     | Checksum (4)   | JSON Payload (variable)                  |
//! | big-endian u32 | CRC32, BE      | BridgeRequest or BridgeMessage           |
//! +----------------+----------------+------------------------------------------+
//! ```
//!
//! The length covers the payload only. The declared length is checked against
//! [`MAX_FRAME_SIZE`] before any payload is buffered for it.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{de::DeserializeOwned, Serialize};

use super::TransportError;

/// Maximum payload size (10 MiB)
pub const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Length + checksum
const HEADER_SIZE: usize = 8;

/// Encode a message as one frame
///
/// # Errors
///
/// [`TransportError::Serialization`] if the message cannot be serialized, or
/// [`TransportError::FrameTooLarge`] if its JSON exceeds [`MAX_FRAME_SIZE`].
pub fn encode<T: Serialize>(msg: &T) -> Result<Bytes, TransportError> {
    let json = serde_json::to_vec(msg)?;
    let too_large = || TransportError::FrameTooLarge {
        size: json.len(),
        max: MAX_FRAME_SIZE,
    };

    if json.len() > MAX_FRAME_SIZE {
        return Err(too_large());
    }
    let len = u32::try_from(json.len()).map_err(|_| too_large())?;

    let mut frame = BytesMut::with_capacity(HEADER_SIZE + json.len());
    frame.put_u32(len);
    frame.put_u32(crc32fast::hash(&json));
    frame.put_slice(&json);
    Ok(frame.freeze())
}

/// Incremental frame decoder
///
/// Push bytes as they arrive, then call [`FrameDecoder::decode`] until it
/// returns `Ok(None)`.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    /// Create an empty decoder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Bytes buffered but not yet decoded
    #[must_use]
    pub fn available(&self) -> usize {
        self.buffer.len()
    }

    /// Decode the next complete frame, if any
    ///
    /// A frame that fails its checksum or JSON decoding is consumed before the
    /// error is returned.
    ///
    /// # Errors
    ///
    /// [`TransportError::FrameTooLarge`], [`TransportError::ChecksumMismatch`]
    /// or [`TransportError::Serialization`].
    pub fn decode<T: DeserializeOwned>(&mut self) -> Result<Option<T>, TransportError> {
        if self.buffer.len() < HEADER_SIZE {
            return Ok(None);
        }

        let mut header = &self.buffer[..HEADER_SIZE];
        let len = header.get_u32() as usize;
        let expected = header.get_u32();

        if len > MAX_FRAME_SIZE {
            return Err(TransportError::FrameTooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            });
        }
        if self.buffer.len() < HEADER_SIZE + len {
            return Ok(None);
        }

        self.buffer.advance(HEADER_SIZE);
        let payload = self.buffer.split_to(len);

        let actual = crc32fast::hash(&payload);
        if actual != expected {
            return Err(TransportError::ChecksumMismatch { expected, actual });
        }

        Ok(Some(serde_json::from_slice(&payload)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::BridgeRequest;
    use crate::options::ProviderOptions;
    use crate::tasks::TaskId;

    fn start(prompt: &str) -> BridgeRequest {
        BridgeRequest::Start {
            request_id: "r1".to_string(),
            prompt: prompt.to_string(),
            opts: ProviderOptions::new().with_model("m"),
        }
    }

    #[test]
    fn test_header_layout() {
        let frame = encode(&start("hi")).unwrap();
        let payload = &frame[HEADER_SIZE..];

        let mut header = &frame[..HEADER_SIZE];
        assert_eq!(header.get_u32() as usize, payload.len());
        assert_eq!(header.get_u32(), crc32fast::hash(payload));
    }

    #[test]
    fn test_decode_byte_by_byte() {
        let mut wire = encode(&start("one")).unwrap().to_vec();
        wire.extend_from_slice(&encode(&start("two")).unwrap());

        let mut decoder = FrameDecoder::new();
        let mut decoded = Vec::new();
        for byte in wire {
            decoder.push(&[byte]);
            while let Some(request) = decoder.decode::<BridgeRequest>().unwrap() {
                decoded.push(request);
            }
        }

        assert_eq!(decoded, vec![start("one"), start("two")]);
        assert_eq!(decoder.available(), 0);
    }

    #[test]
    fn test_partial_header_needs_more() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&[0, 0, 0, 5]);
        assert!(matches!(decoder.decode::<BridgeRequest>(), Ok(None)));
    }

    #[test]
    fn test_checksum_mismatch_consumes_frame() {
        let mut corrupt = encode(&start("x")).unwrap().to_vec();
        let last = corrupt.len() - 2;
        corrupt[last] ^= 0xff;
        let good = encode(&BridgeRequest::Cancel {
            request_id: "r2".to_string(),
            task_id: TaskId::new("t"),
        })
        .unwrap();

        let mut decoder = FrameDecoder::new();
        decoder.push(&corrupt);
        decoder.push(&good);

        assert!(matches!(
            decoder.decode::<BridgeRequest>(),
            Err(TransportError::ChecksumMismatch { .. })
        ));
        assert!(matches!(
            decoder.decode::<BridgeRequest>(),
            Ok(Some(BridgeRequest::Cancel { .. }))
        ));
    }

    #[test]
    fn test_oversized_length_rejected_early() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&u32::MAX.to_be_bytes());
        decoder.push(&[0, 0, 0, 0]);
        assert!(matches!(
            decoder.decode::<BridgeRequest>(),
            Err(TransportError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_encode_too_large() {
        let huge = "x".repeat(MAX_FRAME_SIZE + 1);
        assert!(matches!(
            encode(&huge),
            Err(TransportError::FrameTooLarge { .. })
        ));
    }
}
