//! Direct framing: one message per stream, terminated by end-of-stream.
//!
//! The reader keeps pulling whatever is available and appending it until the
//! peer half-closes. Nothing assumes the first pull holds the whole payload,
//! and there is no fixed-size buffer to truncate against.

use std::sync::Arc;

use bytes::Bytes;

use super::FramingProtocol;
use crate::codec::{ObjectCodec, RawCodec};
use crate::error::Result;
use crate::message::Message;
use crate::stream::{BoxFuture, FrameStream};

/// Frames a message as "everything until end-of-stream".
///
/// An empty message cannot be told apart from a stream that carried no
/// message: writing zero bytes reads back as `Ok(None)`, not as an empty
/// message.
#[derive(Clone)]
pub struct DirectProtocol {
    codec: Arc<dyn ObjectCodec>,
    max_message_size: Option<usize>,
}

impl DirectProtocol {
    /// Create a direct protocol using [`RawCodec`] and no size limit.
    pub fn new() -> Self {
        Self {
            codec: Arc::new(RawCodec),
            max_message_size: None,
        }
    }

    /// Use a different codec for structured payloads.
    pub fn with_codec(mut self, codec: Arc<dyn ObjectCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Reject messages larger than `max` bytes.
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = Some(max);
        self
    }

    /// Read the raw bytes of one message, bypassing the codec.
    ///
    /// Returns `Ok(None)` if the stream ended without delivering any byte.
    pub async fn read_raw(&self, stream: &mut FrameStream) -> Result<Option<Bytes>> {
        let bytes = stream.read_to_end(self.max_message_size).await?;
        if bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(bytes))
    }

    /// Write raw bytes, bypassing the codec. No trailer is added.
    pub async fn write_raw(&self, stream: &mut FrameStream, data: &[u8]) -> Result<()> {
        stream.write_all(data).await?;
        stream.flush().await
    }
}

impl Default for DirectProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl FramingProtocol for DirectProtocol {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn read<'a>(&'a self, stream: &'a mut FrameStream) -> BoxFuture<'a, Result<Option<Message>>> {
        Box::pin(async move {
            match self.read_raw(stream).await? {
                Some(bytes) => self.codec.decode(&bytes).map(Some),
                None => Ok(None),
            }
        })
    }

    fn encode_frame(&self, message: &Message) -> Result<Bytes> {
        self.codec.encode(message)
    }
}
