//! Protocol module - message framing strategies.
//!
//! Each variant implements [`FramingProtocol`] and decides where one message
//! ends and the next begins:
//!
//! | Variant | Header | Body | Terminator |
//! |---|---|---|---|
//! | [`DirectProtocol`] | none | raw bytes | end-of-stream |
//! | [`LengthPrefixedProtocol`] | length N (default 4-byte BE) | N bytes | none |
//! | [`EndMarkerProtocol`] | none | payload | marker (default `\r\n`) |
//! | [`NegotiatedProtocol`] | handshake token | inner frame | inner terminator |
//!
//! Protocols hold only immutable configuration and an
//! `Arc<dyn ObjectCodec>`. All per-connection state lives in the
//! [`FrameStream`], so one protocol instance can serve many connections.
//! A protocol never consumes bytes that belong to the next frame.
//!
//! Writes go through [`FramingProtocol::encode_frame`]: the complete frame is
//! built in memory first, so a message that fails to encode leaves nothing
//! on the wire.

mod direct;
mod end_marker;
mod length;
mod negotiated;

use bytes::Bytes;

use crate::error::Result;
use crate::message::Message;
use crate::stream::{BoxFuture, FrameStream};

pub use direct::DirectProtocol;
pub use end_marker::{EndMarkerProtocol, DEFAULT_END_MARKER};
pub use length::{
    ByteOrder, HeaderWidth, LengthHeader, LengthPrefixedProtocol, DEFAULT_MAX_FRAME_SIZE,
};
pub use negotiated::{NegotiatedProtocol, DEFAULT_HANDSHAKE_TOKEN};

/// Implementation ids of the built-in protocols, as used in declarations.
pub mod ids {
    /// [`DirectProtocol`](super::DirectProtocol)
    pub const DIRECT: &str = "busframe.protocol.direct";
    /// [`LengthPrefixedProtocol`](super::LengthPrefixedProtocol)
    pub const LENGTH_PREFIXED: &str = "busframe.protocol.length-prefixed";
    /// [`EndMarkerProtocol`](super::EndMarkerProtocol)
    pub const END_MARKER: &str = "busframe.protocol.end-marker";
    /// [`NegotiatedProtocol`](super::NegotiatedProtocol)
    pub const NEGOTIATED: &str = "busframe.protocol.negotiated";
}

/// Message-delimiting strategy.
///
/// Calls on one stream must come from the single task that owns it;
/// `&mut FrameStream` enforces that.
pub trait FramingProtocol: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Read one message.
    ///
    /// Returns `Ok(None)` when the stream ended cleanly at a frame boundary.
    /// A stream that ends inside a frame fails with `Framing`.
    fn read<'a>(&'a self, stream: &'a mut FrameStream) -> BoxFuture<'a, Result<Option<Message>>>;

    /// Encode one message into a complete frame, ready to be written as is.
    fn encode_frame(&self, message: &Message) -> Result<Bytes>;

    /// Write one message and flush.
    ///
    /// Nothing is written if the message cannot be framed.
    fn write<'a>(
        &'a self,
        stream: &'a mut FrameStream,
        message: &'a Message,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let frame = self.encode_frame(message)?;
            stream.write_all(&frame).await?;
            stream.flush().await
        })
    }
}
