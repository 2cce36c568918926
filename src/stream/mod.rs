//! Stream module - the chunked pull primitive every protocol is built on.
//!
//! - [`ByteStream`] - raw pull/push contract over a transport byte channel
//! - [`IoStream`] - adaptor for any tokio `AsyncRead + AsyncWrite`
//! - [`ChunkedStream`] - scripted in-memory stream (fragmented, slow, idle)
//! - [`FrameStream`] - buffered wrapper with read-ahead and exact reads
//! - [`ByteAccumulator`] - growable buffer for assembling messages
//!
//! # Pull semantics
//!
//! A single pull may return fewer bytes than requested, [`Pull::Idle`] when
//! nothing is available right now, or [`Pull::End`] once the peer has
//! finished sending. No framing code assumes one pull holds a whole message.
//!
//! # Example
//!
//! ```ignore
//! use busframe::stream::{ChunkedStream, FrameStream};
//!
//! let mut stream = FrameStream::new(ChunkedStream::from_slices(&[b"he", b"llo"]));
//! let bytes = stream.read_to_end(None).await?;
//! assert_eq!(&bytes[..], b"hello");
//! ```

mod accumulator;
mod chunked;
mod frame_stream;
mod io;

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;

use crate::error::Result;

pub use accumulator::ByteAccumulator;
pub use chunked::{ChunkedProbe, ChunkedStream};
pub use frame_stream::{FrameStream, DEFAULT_CHUNK_SIZE};
pub use io::{CloseHandle, IoStream};

/// Boxed future used at the object-safe seams of the crate.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outcome of a single pull from a [`ByteStream`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pull {
    /// Between 1 and `max` bytes.
    Data(Bytes),
    /// Nothing available right now; the caller should retry.
    Idle,
    /// The peer finished sending. Every later pull also returns `End`.
    End,
}

/// Chunked, pull-based byte channel.
///
/// Implementations must fail pending and later calls with
/// [`BusframeError::StreamClosed`](crate::BusframeError::StreamClosed) once
/// the stream has been closed locally.
pub trait ByteStream: Send {
    /// Pull at most `max` bytes.
    fn pull(&mut self, max: usize) -> BoxFuture<'_, Result<Pull>>;

    /// Push all of `data`.
    fn push<'a>(&'a mut self, data: &'a [u8]) -> BoxFuture<'a, Result<()>>;

    /// Flush buffered writes.
    fn flush(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Half-close the write side, signalling end-of-stream to the peer.
    fn shutdown(&mut self) -> BoxFuture<'_, Result<()>>;
}
