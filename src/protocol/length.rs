//! Length-prefixed framing.
//!
//! Default wire format:
//! ```text
//! ┌──────────────┬──────────────────┐
//! │ Length N     │ Body             │
//! │ 4 bytes      │ exactly N bytes  │
//! │ uint32 BE    │                  │
//! └──────────────┴──────────────────┘
//! ```
//!
//! Header width (2, 4 or 8 bytes) and byte order are configurable so the
//! protocol can interoperate with peers that chose differently.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use super::FramingProtocol;
use crate::codec::{ObjectCodec, RawCodec};
use crate::error::{BusframeError, Result};
use crate::message::Message;
use crate::stream::{BoxFuture, FrameStream};

/// Default maximum frame body size (1 GB).
pub const DEFAULT_MAX_FRAME_SIZE: u64 = 1_073_741_824;

/// Width of the length header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderWidth {
    /// 2-byte header (bodies up to 64KB - 1).
    Two,
    /// 4-byte header.
    #[default]
    Four,
    /// 8-byte header.
    Eight,
}

impl HeaderWidth {
    /// Parse a width given in bytes.
    pub fn from_len(len: u8) -> Result<Self> {
        match len {
            2 => Ok(HeaderWidth::Two),
            4 => Ok(HeaderWidth::Four),
            8 => Ok(HeaderWidth::Eight),
            other => Err(BusframeError::Configuration(format!(
                "Unsupported length header width {} (expected 2, 4 or 8)",
                other
            ))),
        }
    }

    /// Header size in bytes.
    #[inline]
    pub fn len(self) -> usize {
        match self {
            HeaderWidth::Two => 2,
            HeaderWidth::Four => 4,
            HeaderWidth::Eight => 8,
        }
    }

    /// Largest body length the header can express.
    #[inline]
    pub fn max_value(self) -> u64 {
        match self {
            HeaderWidth::Two => u16::MAX as u64,
            HeaderWidth::Four => u32::MAX as u64,
            HeaderWidth::Eight => u64::MAX,
        }
    }
}

/// Byte order of the length header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    /// Network byte order.
    #[default]
    Big,
    /// Little endian.
    Little,
}

/// Length header layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LengthHeader {
    /// Header width.
    pub width: HeaderWidth,
    /// Header byte order.
    pub order: ByteOrder,
}

impl LengthHeader {
    /// Create a header layout.
    pub fn new(width: HeaderWidth, order: ByteOrder) -> Self {
        Self { width, order }
    }

    /// Encode a body length.
    ///
    /// Fails with `Framing` if the length does not fit the header width.
    ///
    /// # Example
    ///
    /// ```
    /// use busframe::protocol::LengthHeader;
    ///
    /// let header = LengthHeader::default();
    /// assert_eq!(header.encode(258).unwrap(), vec![0, 0, 1, 2]);
    /// ```
    pub fn encode(&self, len: u64) -> Result<Vec<u8>> {
        if len > self.width.max_value() {
            return Err(BusframeError::Framing(format!(
                "Body length {} does not fit a {}-byte length header",
                len,
                self.width.len()
            )));
        }
        let bytes = match (self.width, self.order) {
            (HeaderWidth::Two, ByteOrder::Big) => (len as u16).to_be_bytes().to_vec(),
            (HeaderWidth::Two, ByteOrder::Little) => (len as u16).to_le_bytes().to_vec(),
            (HeaderWidth::Four, ByteOrder::Big) => (len as u32).to_be_bytes().to_vec(),
            (HeaderWidth::Four, ByteOrder::Little) => (len as u32).to_le_bytes().to_vec(),
            (HeaderWidth::Eight, ByteOrder::Big) => len.to_be_bytes().to_vec(),
            (HeaderWidth::Eight, ByteOrder::Little) => len.to_le_bytes().to_vec(),
        };
        Ok(bytes)
    }

    /// Decode a body length.
    ///
    /// Returns `None` if `buf` is not exactly the header width.
    ///
    /// # Example
    ///
    /// ```
    /// use busframe::protocol::LengthHeader;
    ///
    /// let header = LengthHeader::default();
    /// assert_eq!(header.decode(&[0, 0, 0, 100]), Some(100));
    /// ```
    pub fn decode(&self, buf: &[u8]) -> Option<u64> {
        match (self.width, self.order) {
            (HeaderWidth::Two, ByteOrder::Big) => buf.try_into().ok().map(u16::from_be_bytes).map(u64::from),
            (HeaderWidth::Two, ByteOrder::Little) => buf.try_into().ok().map(u16::from_le_bytes).map(u64::from),
            (HeaderWidth::Four, ByteOrder::Big) => buf.try_into().ok().map(u32::from_be_bytes).map(u64::from),
            (HeaderWidth::Four, ByteOrder::Little) => buf.try_into().ok().map(u32::from_le_bytes).map(u64::from),
            (HeaderWidth::Eight, ByteOrder::Big) => buf.try_into().ok().map(u64::from_be_bytes),
            (HeaderWidth::Eight, ByteOrder::Little) => buf.try_into().ok().map(u64::from_le_bytes),
        }
    }
}

/// Frames each message as a length header followed by exactly that many bytes.
#[derive(Clone)]
pub struct LengthPrefixedProtocol {
    header: LengthHeader,
    max_frame_size: u64,
    codec: Arc<dyn ObjectCodec>,
}

impl LengthPrefixedProtocol {
    /// 4-byte big-endian header, 1GB limit, [`RawCodec`].
    pub fn new() -> Self {
        Self {
            header: LengthHeader::default(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            codec: Arc::new(RawCodec),
        }
    }

    /// Use a different header layout.
    pub fn with_header(mut self, header: LengthHeader) -> Self {
        self.header = header;
        self
    }

    /// Set the maximum accepted body size.
    pub fn with_max_frame_size(mut self, max: u64) -> Self {
        self.max_frame_size = max;
        self
    }

    /// Use a different codec for structured payloads.
    pub fn with_codec(mut self, codec: Arc<dyn ObjectCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Header layout in use.
    pub fn header(&self) -> LengthHeader {
        self.header
    }

    /// Maximum accepted body size.
    pub fn max_frame_size(&self) -> u64 {
        self.max_frame_size
    }
}

impl Default for LengthPrefixedProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl FramingProtocol for LengthPrefixedProtocol {
    fn name(&self) -> &'static str {
        "length-prefixed"
    }

    fn read<'a>(&'a self, stream: &'a mut FrameStream) -> BoxFuture<'a, Result<Option<Message>>> {
        Box::pin(async move {
            let width = self.header.width.len();
            let header_bytes = stream.read_exact_or_eof(width).await?;
            if header_bytes.is_empty() {
                return Ok(None);
            }
            if header_bytes.len() < width {
                return Err(BusframeError::Framing(format!(
                    "Stream ended inside length header ({} of {} bytes)",
                    header_bytes.len(),
                    width
                )));
            }

            let declared = self.header.decode(&header_bytes).ok_or_else(|| {
                BusframeError::Framing("Invalid length header".to_string())
            })?;
            if declared > self.max_frame_size {
                return Err(BusframeError::Framing(format!(
                    "Declared frame length {} exceeds maximum {}",
                    declared, self.max_frame_size
                )));
            }
            let len = usize::try_from(declared).map_err(|_| {
                BusframeError::Framing(format!(
                    "Declared frame length {} exceeds addressable memory",
                    declared
                ))
            })?;

            let body = stream.read_exact(len).await?;
            self.codec.decode(&body).map(Some)
        })
    }

    fn encode_frame(&self, message: &Message) -> Result<Bytes> {
        let body = self.codec.encode(message)?;
        let len = body.len() as u64;
        if len > self.max_frame_size {
            return Err(BusframeError::Framing(format!(
                "Frame length {} exceeds maximum {}",
                len, self.max_frame_size
            )));
        }

        let header = self.header.encode(len)?;
        let mut frame = BytesMut::with_capacity(header.len() + body.len());
        frame.extend_from_slice(&header);
        frame.extend_from_slice(&body);
        Ok(frame.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MsgPackCodec;
    use crate::stream::ChunkedStream;
    use serde_json::json;

    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut bytes = (payload.len() as u32).to_be_bytes().to_vec();
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn test_header_encode_widths_and_orders() {
        let be2 = LengthHeader::new(HeaderWidth::Two, ByteOrder::Big);
        let le4 = LengthHeader::new(HeaderWidth::Four, ByteOrder::Little);
        let be8 = LengthHeader::new(HeaderWidth::Eight, ByteOrder::Big);

        assert_eq!(be2.encode(0x0102).unwrap(), vec![0x01, 0x02]);
        assert_eq!(le4.encode(0x0102).unwrap(), vec![0x02, 0x01, 0, 0]);
        assert_eq!(be8.encode(1).unwrap(), vec![0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_header_overflow_rejected() {
        let be2 = LengthHeader::new(HeaderWidth::Two, ByteOrder::Big);
        assert!(matches!(be2.encode(70_000), Err(BusframeError::Framing(_))));
    }

    #[test]
    fn test_header_decode_wrong_len() {
        assert_eq!(LengthHeader::default().decode(&[0, 1]), None);
        assert_eq!(
            LengthHeader::new(HeaderWidth::Two, ByteOrder::Little).decode(&[5, 0]),
            Some(5)
        );
    }

    #[test]
    fn test_header_width_from_len() {
        assert_eq!(HeaderWidth::from_len(8).unwrap(), HeaderWidth::Eight);
        assert!(HeaderWidth::from_len(3).is_err());
    }

    #[tokio::test]
    async fn test_reads_fragmented_frame() {
        let bytes = frame(b"fragmented body");
        let mut stream = FrameStream::new(ChunkedStream::trickle(&bytes, 1));

        let message = LengthPrefixedProtocol::new()
            .read(&mut stream)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.as_bytes().unwrap(), b"fragmented body");
    }

    #[tokio::test]
    async fn test_reads_consecutive_frames_without_overreading() {
        let mut bytes = frame(b"one");
        bytes.extend(frame(b"two"));
        bytes.extend(frame(b""));
        let mut stream = FrameStream::new(ChunkedStream::new().chunk(&bytes));
        let protocol = LengthPrefixedProtocol::new();

        let first = protocol.read(&mut stream).await.unwrap().unwrap();
        let second = protocol.read(&mut stream).await.unwrap().unwrap();
        let third = protocol.read(&mut stream).await.unwrap().unwrap();

        assert_eq!(first.as_bytes().unwrap(), b"one");
        assert_eq!(second.as_bytes().unwrap(), b"two");
        assert!(third.as_bytes().unwrap().is_empty());
        assert!(protocol.read(&mut stream).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_truncated_body_is_framing_error() {
        let mut bytes = 10u32.to_be_bytes().to_vec();
        bytes.extend_from_slice(b"short");
        let mut stream = FrameStream::new(ChunkedStream::new().chunk(&bytes));

        let result = LengthPrefixedProtocol::new().read(&mut stream).await;
        assert!(matches!(result, Err(BusframeError::Framing(_))));
    }

    #[tokio::test]
    async fn test_truncated_header_is_framing_error() {
        let mut stream = FrameStream::new(ChunkedStream::new().chunk(&[0, 0]));

        let result = LengthPrefixedProtocol::new().read(&mut stream).await;
        assert!(matches!(result, Err(BusframeError::Framing(_))));
    }

    #[tokio::test]
    async fn test_oversized_header_rejected_before_body() {
        let source = ChunkedStream::new()
            .chunk(&1_000u32.to_be_bytes())
            .chunk(&[0u8; 1_000]);
        let probe = source.probe();
        let mut stream = FrameStream::new(source);
        let protocol = LengthPrefixedProtocol::new().with_max_frame_size(100);

        let result = protocol.read(&mut stream).await;

        assert!(result.unwrap_err().to_string().contains("exceeds maximum"));
        assert_eq!(probe.remaining(), 1_000);
    }

    #[tokio::test]
    async fn test_write_emits_header_then_body() {
        let source = ChunkedStream::new();
        let probe = source.probe();
        let mut stream = FrameStream::new(source);

        LengthPrefixedProtocol::new()
            .write(&mut stream, &Message::from(b"hello".to_vec()))
            .await
            .unwrap();

        assert_eq!(probe.written(), frame(b"hello"));
    }

    #[tokio::test]
    async fn test_write_too_large_for_two_byte_header() {
        let protocol = LengthPrefixedProtocol::new()
            .with_header(LengthHeader::new(HeaderWidth::Two, ByteOrder::Big));
        let mut stream = FrameStream::new(ChunkedStream::new());

        let result = protocol
            .write(&mut stream, &Message::from(vec![0u8; 70_000]))
            .await;
        assert!(matches!(result, Err(BusframeError::Framing(_))));
    }

    #[tokio::test]
    async fn test_decode_failure_leaves_next_frame_intact() {
        let mut bytes = frame(&[0xc1]);
        bytes.extend(frame(&MsgPackCodec::encode_value(&json!({"n": 2})).unwrap()));
        let mut stream = FrameStream::new(ChunkedStream::new().chunk(&bytes));
        let protocol = LengthPrefixedProtocol::new().with_codec(Arc::new(MsgPackCodec));

        let first = protocol.read(&mut stream).await;
        assert!(matches!(first, Err(BusframeError::Serialization { .. })));

        let second = protocol.read(&mut stream).await.unwrap().unwrap();
        assert_eq!(second, Message::Object(json!({"n": 2})));
    }
}
