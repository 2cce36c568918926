//! Buffered stream that framing protocols read and write through.
//!
//! Adds three things on top of a raw [`ByteStream`]:
//! - a read-ahead buffer, so a protocol that pulled past its frame boundary
//!   can hand the surplus back with [`FrameStream::unread`];
//! - transparent retry of [`Pull::Idle`] with a cooperative yield;
//! - exact, to-end and up-to-marker reads that tolerate arbitrarily small
//!   pulls.

use bytes::Bytes;

use super::{ByteAccumulator, ByteStream, Pull};
use crate::error::{BusframeError, Result};

/// Default maximum bytes requested per underlying pull (64KB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Buffered framing view over one connection's byte stream.
pub struct FrameStream {
    inner: Box<dyn ByteStream>,
    read_ahead: ByteAccumulator,
    chunk_size: usize,
    at_end: bool,
}

impl FrameStream {
    /// Wrap a byte stream with the default chunk size.
    pub fn new(inner: impl ByteStream + 'static) -> Self {
        Self::with_chunk_size(inner, DEFAULT_CHUNK_SIZE)
    }

    /// Wrap a byte stream with a custom chunk size.
    pub fn with_chunk_size(inner: impl ByteStream + 'static, chunk_size: usize) -> Self {
        Self::from_boxed(Box::new(inner), chunk_size)
    }

    /// Wrap an already boxed byte stream.
    pub fn from_boxed(inner: Box<dyn ByteStream>, chunk_size: usize) -> Self {
        Self {
            inner,
            read_ahead: ByteAccumulator::default(),
            chunk_size: chunk_size.max(1),
            at_end: false,
        }
    }

    /// Maximum bytes requested per underlying pull.
    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Bytes held in the read-ahead buffer.
    #[inline]
    pub fn buffered(&self) -> usize {
        self.read_ahead.len()
    }

    /// Pull up to `max` bytes, serving the read-ahead buffer first.
    ///
    /// Returns `Ok(None)` at end-of-stream. Idle pulls are retried, so this
    /// only returns once data, end-of-stream, or an error is available.
    pub async fn pull(&mut self, max: usize) -> Result<Option<Bytes>> {
        let max = max.max(1);
        if !self.read_ahead.is_empty() {
            let take = max.min(self.read_ahead.len());
            return Ok(Some(self.read_ahead.split_to(take)));
        }
        self.pull_inner(max).await
    }

    /// Pull from the underlying stream, bypassing the read-ahead buffer.
    async fn pull_inner(&mut self, max: usize) -> Result<Option<Bytes>> {
        if self.at_end {
            return Ok(None);
        }

        loop {
            match self.inner.pull(max).await? {
                Pull::Data(bytes) if bytes.is_empty() => tokio::task::yield_now().await,
                Pull::Data(bytes) => return Ok(Some(bytes)),
                Pull::Idle => tokio::task::yield_now().await,
                Pull::End => {
                    self.at_end = true;
                    return Ok(None);
                }
            }
        }
    }

    /// Pull one chunk of the configured size.
    pub async fn pull_chunk(&mut self) -> Result<Option<Bytes>> {
        self.pull(self.chunk_size).await
    }

    /// Hand bytes back so the next pull returns them first.
    pub fn unread(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        if self.read_ahead.is_empty() {
            self.read_ahead.extend(data);
            return;
        }
        let mut restored = ByteAccumulator::with_capacity(data.len() + self.read_ahead.len());
        restored.extend(data);
        restored.extend(self.read_ahead.as_slice());
        self.read_ahead = restored;
    }

    /// Read up to the next occurrence of `marker` and consume the marker.
    ///
    /// The search runs over the read-ahead buffer in place, and each new pull
    /// is scanned once plus a `marker.len() - 1` overlap, so a marker split
    /// across pulls is still found. Bytes after the marker stay buffered for
    /// the next read.
    ///
    /// Returns `Ok(None)` if the stream ended with nothing buffered. Ending
    /// with a partial message, an empty marker, or more than `limit` bytes
    /// before the marker fails with `Framing`.
    pub async fn read_until(&mut self, marker: &[u8], limit: Option<usize>) -> Result<Option<Bytes>> {
        if marker.is_empty() {
            return Err(BusframeError::Framing("Empty end marker".to_string()));
        }
        let overlap = marker.len() - 1;
        let mut scanned: usize = 0;

        loop {
            if let Some(pos) = self.read_ahead.find(marker, scanned.saturating_sub(overlap)) {
                check_limit(pos, limit)?;
                let payload = self.read_ahead.split_to(pos);
                self.read_ahead.advance(marker.len());
                return Ok(Some(payload));
            }
            scanned = self.read_ahead.len();
            // The last `overlap` bytes may still turn out to be the marker.
            check_limit(scanned.saturating_sub(overlap), limit)?;

            match self.pull_inner(self.chunk_size).await? {
                Some(bytes) => self.read_ahead.extend(&bytes),
                None if self.read_ahead.is_empty() => return Ok(None),
                None => {
                    return Err(BusframeError::Framing(format!(
                        "Stream ended before end marker ({} bytes buffered)",
                        self.read_ahead.len()
                    )))
                }
            }
        }
    }

    /// Read exactly `len` bytes, or fewer only if the stream ended first.
    ///
    /// Never pulls more than the bytes still missing, so nothing past the
    /// requested range is consumed. Callers decide whether a short result is
    /// a clean end or a truncated frame.
    pub async fn read_exact_or_eof(&mut self, len: usize) -> Result<Bytes> {
        let mut acc = ByteAccumulator::with_capacity(len.min(self.chunk_size));
        while acc.len() < len {
            let missing = (len - acc.len()).min(self.chunk_size);
            match self.pull(missing).await? {
                Some(bytes) => acc.extend(&bytes),
                None => break,
            }
        }
        Ok(acc.freeze())
    }

    /// Read exactly `len` bytes. A stream that ends first fails with `Framing`.
    pub async fn read_exact(&mut self, len: usize) -> Result<Bytes> {
        let bytes = self.read_exact_or_eof(len).await?;
        if bytes.len() < len {
            return Err(BusframeError::Framing(format!(
                "Stream ended after {} of {} bytes",
                bytes.len(),
                len
            )));
        }
        Ok(bytes)
    }

    /// Read until end-of-stream.
    ///
    /// Fails with `Framing` if more than `limit` bytes arrive.
    pub async fn read_to_end(&mut self, limit: Option<usize>) -> Result<Bytes> {
        let mut acc = ByteAccumulator::new();
        while let Some(bytes) = self.pull_chunk().await? {
            acc.extend(&bytes);
            check_limit(acc.len(), limit)?;
        }
        Ok(acc.freeze())
    }

    /// Write all bytes.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.inner.push(data).await
    }

    /// Flush the underlying stream.
    pub async fn flush(&mut self) -> Result<()> {
        self.inner.flush().await
    }

    /// Half-close the write side (end-of-stream for the peer).
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await
    }
}

fn check_limit(len: usize, limit: Option<usize>) -> Result<()> {
    match limit {
        Some(max) if len > max => Err(BusframeError::Framing(format!(
            "Message exceeds maximum size {}",
            max
        ))),
        _ => Ok(()),
    }
}
