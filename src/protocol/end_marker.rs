//! End-marker framing.
//!
//! A message is every byte up to the first occurrence of the marker. The
//! marker is not part of the message. Pulls are scanned incrementally and the
//! search always restarts `marker.len() - 1` bytes back, so a marker split
//! across two deliveries is still found. Bytes that arrive after the marker in
//! the same pull stay in the stream's read-ahead buffer for the next read.
//!
//! A payload is only written if the reader will find the marker exactly at
//! its end. That rules out payloads containing the marker, and also payloads
//! whose tail combines with the start of a self-overlapping marker (`a#`
//! followed by `##`).

use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use super::FramingProtocol;
use crate::codec::{ObjectCodec, RawCodec};
use crate::error::{BusframeError, Result};
use crate::message::Message;
use crate::stream::{BoxFuture, FrameStream};

/// Default end marker (CRLF).
pub const DEFAULT_END_MARKER: &[u8] = b"\r\n";

/// Frames each message as payload followed by a marker sequence.
#[derive(Clone)]
pub struct EndMarkerProtocol {
    marker: Bytes,
    max_message_size: Option<usize>,
    codec: Arc<dyn ObjectCodec>,
}

impl EndMarkerProtocol {
    /// CRLF marker, no size limit, [`RawCodec`].
    pub fn new() -> Self {
        Self {
            marker: Bytes::from_static(DEFAULT_END_MARKER),
            max_message_size: None,
            codec: Arc::new(RawCodec),
        }
    }

    /// Use a custom marker. The marker must not be empty.
    pub fn with_marker(mut self, marker: &[u8]) -> Result<Self> {
        if marker.is_empty() {
            return Err(BusframeError::Configuration(
                "End marker must not be empty".to_string(),
            ));
        }
        self.marker = Bytes::copy_from_slice(marker);
        Ok(self)
    }

    /// Reject messages larger than `max` bytes (marker excluded).
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = Some(max);
        self
    }

    /// Use a different codec for structured payloads.
    pub fn with_codec(mut self, codec: Arc<dyn ObjectCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Marker in use.
    pub fn marker(&self) -> &[u8] {
        &self.marker
    }
}

impl Default for EndMarkerProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl FramingProtocol for EndMarkerProtocol {
    fn name(&self) -> &'static str {
        "end-marker"
    }

    fn read<'a>(&'a self, stream: &'a mut FrameStream) -> BoxFuture<'a, Result<Option<Message>>> {
        Box::pin(async move {
            match stream.read_until(&self.marker, self.max_message_size).await? {
                Some(payload) => self.codec.decode(&payload).map(Some),
                None => Ok(None),
            }
        })
    }

    fn encode_frame(&self, message: &Message) -> Result<Bytes> {
        let body = self.codec.encode(message)?;
        let mut frame = BytesMut::with_capacity(body.len() + self.marker.len());
        frame.extend_from_slice(&body);
        frame.extend_from_slice(&self.marker);

        let first = frame
            .windows(self.marker.len())
            .position(|window| window == &self.marker[..]);
        if first != Some(body.len()) {
            return Err(BusframeError::Framing(
                "Payload contains or runs into the end marker".to_string(),
            ));
        }
        Ok(frame.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use crate::stream::ChunkedStream;
    use serde_json::json;

    #[tokio::test]
    async fn test_marker_split_across_deliveries() {
        let source = ChunkedStream::from_slices(&[b"hello\r", b"\nworld\r\n"]);
        let mut stream = FrameStream::new(source);
        let protocol = EndMarkerProtocol::new();

        let first = protocol.read(&mut stream).await.unwrap().unwrap();
        let second = protocol.read(&mut stream).await.unwrap().unwrap();

        assert_eq!(first.as_bytes().unwrap(), b"hello");
        assert_eq!(second.as_bytes().unwrap(), b"world");
        assert!(protocol.read(&mut stream).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_long_marker_split_three_ways() {
        let protocol = EndMarkerProtocol::new().with_marker(b"<END>").unwrap();
        let source = ChunkedStream::from_slices(&[b"abc<E", b"N", b"D>rest<END>"]);
        let mut stream = FrameStream::new(source);

        let first = protocol.read(&mut stream).await.unwrap().unwrap();
        let second = protocol.read(&mut stream).await.unwrap().unwrap();

        assert_eq!(first.as_bytes().unwrap(), b"abc");
        assert_eq!(second.as_bytes().unwrap(), b"rest");
    }

    #[tokio::test]
    async fn test_false_start_is_part_of_payload() {
        let protocol = EndMarkerProtocol::new().with_marker(b"##").unwrap();
        let mut stream = FrameStream::new(ChunkedStream::trickle(b"a#b##", 1));

        let message = protocol.read(&mut stream).await.unwrap().unwrap();
        assert_eq!(message.as_bytes().unwrap(), b"a#b");
    }

    #[tokio::test]
    async fn test_bytes_after_marker_stay_in_stream() {
        let mut stream = FrameStream::new(ChunkedStream::new().chunk(b"one\r\ntwo"));

        let message = EndMarkerProtocol::new().read(&mut stream).await.unwrap().unwrap();

        assert_eq!(message.as_bytes().unwrap(), b"one");
        assert_eq!(stream.buffered(), 3);
    }

    #[tokio::test]
    async fn test_eof_without_marker_is_framing_error() {
        let mut stream = FrameStream::new(ChunkedStream::new().chunk(b"unterminated"));

        let result = EndMarkerProtocol::new().read(&mut stream).await;
        assert!(matches!(result, Err(BusframeError::Framing(_))));
    }

    #[tokio::test]
    async fn test_empty_message_between_markers() {
        let mut stream = FrameStream::new(ChunkedStream::new().chunk(b"\r\nx\r\n"));
        let protocol = EndMarkerProtocol::new();

        let empty = protocol.read(&mut stream).await.unwrap().unwrap();
        assert!(empty.as_bytes().unwrap().is_empty());
        let next = protocol.read(&mut stream).await.unwrap().unwrap();
        assert_eq!(next.as_bytes().unwrap(), b"x");
    }

    #[tokio::test]
    async fn test_max_message_size() {
        let protocol = EndMarkerProtocol::new().with_max_message_size(4);
        let mut stream = FrameStream::new(ChunkedStream::new().chunk(b"way too long\r\n"));

        let result = protocol.read(&mut stream).await;
        assert!(matches!(result, Err(BusframeError::Framing(_))));
    }

    #[test]
    fn test_empty_marker_rejected() {
        assert!(EndMarkerProtocol::new().with_marker(b"").is_err());
    }

    #[tokio::test]
    async fn test_write_appends_marker() {
        let source = ChunkedStream::new();
        let probe = source.probe();
        let mut stream = FrameStream::new(source);

        EndMarkerProtocol::new()
            .write(&mut stream, &Message::from(b"line".to_vec()))
            .await
            .unwrap();

        assert_eq!(probe.written(), b"line\r\n");
    }

    #[tokio::test]
    async fn test_write_rejects_payload_containing_marker() {
        let mut stream = FrameStream::new(ChunkedStream::new());

        let result = EndMarkerProtocol::new()
            .write(&mut stream, &Message::from(b"a\r\nb".to_vec()))
            .await;
        assert!(matches!(result, Err(BusframeError::Framing(_))));
    }

    #[tokio::test]
    async fn test_write_rejects_tail_overlapping_marker() {
        let source = ChunkedStream::new();
        let wire = source.probe();
        let mut stream = FrameStream::new(source);
        let protocol = EndMarkerProtocol::new().with_marker(b"##").unwrap();

        let result = protocol
            .write(&mut stream, &Message::from(b"a#".to_vec()))
            .await;
        assert!(matches!(result, Err(BusframeError::Framing(_))));
        assert!(wire.written().is_empty());

        protocol
            .write(&mut stream, &Message::from(b"#a".to_vec()))
            .await
            .unwrap();
        let mut replay = FrameStream::new(ChunkedStream::new().chunk(&wire.written()));
        let message = protocol.read(&mut replay).await.unwrap().unwrap();
        assert_eq!(message.as_bytes().unwrap(), b"#a");
        assert!(protocol.read(&mut replay).await.unwrap().is_none());
    }

    #[test]
    fn test_overlapping_marker_tail_with_longer_marker() {
        let protocol = EndMarkerProtocol::new().with_marker(b"abab").unwrap();

        assert!(protocol.encode_frame(&Message::from(b"xab".to_vec())).is_err());
        assert!(protocol.encode_frame(&Message::from(b"xa".to_vec())).is_ok());
        assert_eq!(
            &protocol.encode_frame(&Message::from(b"xa".to_vec())).unwrap()[..],
            b"xaabab"
        );
    }

    #[tokio::test]
    async fn test_many_frames_in_one_chunk() {
        const FRAMES: usize = 50_000;
        let bytes = b"x\r\n".repeat(FRAMES);
        let mut stream = FrameStream::with_chunk_size(ChunkedStream::new().chunk(&bytes), bytes.len());
        let protocol = EndMarkerProtocol::new();

        let mut count = 0;
        while let Some(message) = protocol.read(&mut stream).await.unwrap() {
            assert_eq!(message.as_bytes().unwrap(), b"x");
            count += 1;
        }
        assert_eq!(count, FRAMES);
    }

    #[tokio::test]
    async fn test_json_lines() {
        let protocol = EndMarkerProtocol::new()
            .with_marker(b"\n")
            .unwrap()
            .with_codec(Arc::new(JsonCodec));
        let mut stream = FrameStream::new(ChunkedStream::new().chunk(b"{\"a\":1}\n{\"b\":2}\n"));

        let first = protocol.read(&mut stream).await.unwrap().unwrap();
        let second = protocol.read(&mut stream).await.unwrap().unwrap();

        assert_eq!(first, Message::Object(json!({"a": 1})));
        assert_eq!(second, Message::Object(json!({"b": 2})));
    }
}
