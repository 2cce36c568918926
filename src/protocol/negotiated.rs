//! Negotiated framing: a handshake token in front of every inner frame.
//!
//! ```text
//! ┌──────────────────┬──────────────────────────────┐
//! │ Handshake token  │ Inner frame                  │
//! │ (BUSFRAME/1\n)   │ (length-prefixed by default) │
//! └──────────────────┴──────────────────────────────┘
//! ```
//!
//! The token is checked as it arrives. The first wrong byte rejects the
//! frame with `ProtocolMismatch` and the inner protocol is never asked to
//! read. On write, the token goes out only together with a fully encoded
//! inner frame.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use super::{FramingProtocol, LengthPrefixedProtocol};
use crate::error::{BusframeError, Result};
use crate::message::Message;
use crate::stream::{BoxFuture, FrameStream};

/// Default handshake token.
pub const DEFAULT_HANDSHAKE_TOKEN: &[u8] = b"BUSFRAME/1\n";

/// Wraps another protocol and requires a handshake token before each frame.
#[derive(Clone)]
pub struct NegotiatedProtocol {
    token: Bytes,
    inner: Arc<dyn FramingProtocol>,
}

impl NegotiatedProtocol {
    /// Wrap `inner` with the default token.
    pub fn new(inner: Arc<dyn FramingProtocol>) -> Self {
        Self {
            token: Bytes::from_static(DEFAULT_HANDSHAKE_TOKEN),
            inner,
        }
    }

    /// Use a custom token. The token must not be empty.
    pub fn with_token(mut self, token: &[u8]) -> Result<Self> {
        if token.is_empty() {
            return Err(BusframeError::Configuration(
                "Handshake token must not be empty".to_string(),
            ));
        }
        self.token = Bytes::copy_from_slice(token);
        Ok(self)
    }

    /// Token in use.
    pub fn token(&self) -> &[u8] {
        &self.token
    }

    /// Wrapped protocol.
    pub fn inner(&self) -> &Arc<dyn FramingProtocol> {
        &self.inner
    }

    /// Consume and verify one handshake token.
    ///
    /// Returns `Ok(false)` if the stream ended before the first token byte.
    async fn expect_token(&self, stream: &mut FrameStream) -> Result<bool> {
        let mut matched = 0;
        while matched < self.token.len() {
            let chunk = match stream.pull(self.token.len() - matched).await? {
                Some(chunk) => chunk,
                None if matched == 0 => return Ok(false),
                None => {
                    return Err(BusframeError::Framing(format!(
                        "Stream ended inside handshake token ({} of {} bytes)",
                        matched,
                        self.token.len()
                    )))
                }
            };

            for &byte in chunk.iter() {
                if byte != self.token[matched] {
                    tracing::warn!(
                        "Handshake token mismatch at offset {}: expected 0x{:02x}, got 0x{:02x}",
                        matched,
                        self.token[matched],
                        byte
                    );
                    return Err(BusframeError::ProtocolMismatch(format!(
                        "unexpected byte 0x{:02x} at handshake offset {}",
                        byte, matched
                    )));
                }
                matched += 1;
            }
        }
        Ok(true)
    }
}

impl Default for NegotiatedProtocol {
    fn default() -> Self {
        Self::new(Arc::new(LengthPrefixedProtocol::new()))
    }
}

impl FramingProtocol for NegotiatedProtocol {
    fn name(&self) -> &'static str {
        "negotiated"
    }

    fn read<'a>(&'a self, stream: &'a mut FrameStream) -> BoxFuture<'a, Result<Option<Message>>> {
        Box::pin(async move {
            if !self.expect_token(stream).await? {
                return Ok(None);
            }
            match self.inner.read(stream).await? {
                Some(message) => Ok(Some(message)),
                None => Err(BusframeError::Framing(
                    "Stream ended after handshake token".to_string(),
                )),
            }
        })
    }

    fn encode_frame(&self, message: &Message) -> Result<Bytes> {
        let inner = self.inner.encode_frame(message)?;
        let mut frame = BytesMut::with_capacity(self.token.len() + inner.len());
        frame.extend_from_slice(&self.token);
        frame.extend_from_slice(&inner);
        Ok(frame.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::EndMarkerProtocol;
    use crate::stream::ChunkedStream;

    fn framed(payload: &[u8]) -> Vec<u8> {
        let mut bytes = DEFAULT_HANDSHAKE_TOKEN.to_vec();
        bytes.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        bytes.extend_from_slice(payload);
        bytes
    }

    #[tokio::test]
    async fn test_reads_token_then_inner_frame() {
        let mut bytes = framed(b"first");
        bytes.extend(framed(b"second"));
        let mut stream = FrameStream::new(ChunkedStream::trickle(&bytes, 3));
        let protocol = NegotiatedProtocol::default();

        let first = protocol.read(&mut stream).await.unwrap().unwrap();
        let second = protocol.read(&mut stream).await.unwrap().unwrap();

        assert_eq!(first.as_bytes().unwrap(), b"first");
        assert_eq!(second.as_bytes().unwrap(), b"second");
        assert!(protocol.read(&mut stream).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mismatch_rejected_without_inner_read() {
        let source = ChunkedStream::new()
            .chunk(b"HTTP/1.1 20")
            .chunk(&framed(b"never read"));
        let probe = source.probe();
        let mut stream = FrameStream::new(source);

        let result = NegotiatedProtocol::default().read(&mut stream).await;

        assert!(matches!(result, Err(BusframeError::ProtocolMismatch(_))));
        assert_eq!(probe.remaining(), framed(b"never read").len());
    }

    #[tokio::test]
    async fn test_mismatch_on_later_byte() {
        let mut stream = FrameStream::new(ChunkedStream::trickle(b"BUSFRAME/2\n", 1));

        let err = NegotiatedProtocol::default()
            .read(&mut stream)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("offset 9"));
    }

    #[tokio::test]
    async fn test_eof_inside_token() {
        let mut stream = FrameStream::new(ChunkedStream::new().chunk(b"BUSF"));

        let result = NegotiatedProtocol::default().read(&mut stream).await;
        assert!(matches!(result, Err(BusframeError::Framing(_))));
    }

    #[tokio::test]
    async fn test_write_prefixes_token() {
        let source = ChunkedStream::new();
        let probe = source.probe();
        let mut stream = FrameStream::new(source);
        let protocol = NegotiatedProtocol::new(Arc::new(EndMarkerProtocol::new()))
            .with_token(b"HI:")
            .unwrap();

        protocol
            .write(&mut stream, &Message::from(b"x".to_vec()))
            .await
            .unwrap();

        assert_eq!(probe.written(), b"HI:x\r\n");
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_token_behind() {
        let source = ChunkedStream::new();
        let wire = source.probe();
        let mut stream = FrameStream::new(source);
        let protocol = NegotiatedProtocol::default();

        // The raw codec cannot encode structured messages.
        let result = protocol
            .write(&mut stream, &Message::Object(serde_json::json!({"id": 1})))
            .await;
        assert!(matches!(result, Err(BusframeError::Serialization { .. })));
        assert!(wire.written().is_empty());

        protocol
            .write(&mut stream, &Message::from(b"ok".to_vec()))
            .await
            .unwrap();
        assert_eq!(wire.written(), framed(b"ok"));

        let mut replay = FrameStream::new(ChunkedStream::new().chunk(&wire.written()));
        let message = protocol.read(&mut replay).await.unwrap().unwrap();
        assert_eq!(message.as_bytes().unwrap(), b"ok");
    }

    #[tokio::test]
    async fn test_rejected_inner_payload_writes_nothing() {
        let source = ChunkedStream::new();
        let wire = source.probe();
        let mut stream = FrameStream::new(source);
        let protocol = NegotiatedProtocol::new(Arc::new(EndMarkerProtocol::new()));

        let result = protocol
            .write(&mut stream, &Message::from(b"a\r\nb".to_vec()))
            .await;
        assert!(matches!(result, Err(BusframeError::Framing(_))));
        assert!(wire.written().is_empty());
    }

    #[test]
    fn test_empty_token_rejected() {
        assert!(NegotiatedProtocol::default().with_token(b"").is_err());
    }
}
