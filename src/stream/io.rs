//! Tokio transport adaptor.
//!
//! Wraps anything that is `AsyncRead + AsyncWrite` (TCP, Unix sockets,
//! named pipes, `tokio::io::duplex`) as a [`ByteStream`]. A read of zero
//! bytes from the transport is reported as [`Pull::End`].
//!
//! # Example
//!
//! ```ignore
//! use busframe::stream::{FrameStream, IoStream};
//!
//! let socket = tokio::net::TcpStream::connect("127.0.0.1:7000").await?;
//! let io = IoStream::new(socket);
//! let closer = io.close_handle();
//! let mut stream = FrameStream::new(io);
//!
//! // Any pending read fails with StreamClosed once this runs.
//! closer.close();
//! ```

use std::io::ErrorKind;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;

use super::{BoxFuture, ByteStream, Pull};
use crate::error::{BusframeError, Result};

/// Handle that closes a stream from outside the owning worker.
///
/// Cheap to clone; every clone refers to the same stream.
#[derive(Debug, Clone)]
pub struct CloseHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CloseHandle {
    /// Create a handle in the open state.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Close the stream. Idempotent.
    pub fn close(&self) {
        self.tx.send_replace(true);
    }

    /// Check whether `close()` has been called.
    #[inline]
    pub fn is_closed(&self) -> bool {
        *self.tx.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for CloseHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// [`ByteStream`] over a tokio transport.
pub struct IoStream<T> {
    io: T,
    handle: CloseHandle,
    closed: watch::Receiver<bool>,
    write_shut: bool,
}

impl<T> IoStream<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap a transport.
    pub fn new(io: T) -> Self {
        let handle = CloseHandle::new();
        let closed = handle.subscribe();
        Self {
            io,
            handle,
            closed,
            write_shut: false,
        }
    }

    /// Get a handle that closes this stream.
    pub fn close_handle(&self) -> CloseHandle {
        self.handle.clone()
    }

    /// Get a reference to the underlying transport.
    pub fn inner(&self) -> &T {
        &self.io
    }

    /// Unwrap the underlying transport.
    pub fn into_inner(self) -> T {
        self.io
    }

    fn check_open(&self) -> Result<()> {
        if self.handle.is_closed() {
            return Err(BusframeError::StreamClosed);
        }
        Ok(())
    }
}

/// Resolve once the close flag is set.
async fn wait_closed(rx: &mut watch::Receiver<bool>) {
    loop {
        let closed = *rx.borrow_and_update();
        if closed {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender lives in the stream itself; nothing left to wait for.
            std::future::pending::<()>().await;
        }
    }
}

/// Map transport errors that mean "the other side is gone" to `StreamClosed`.
fn map_io(err: std::io::Error) -> BusframeError {
    match err.kind() {
        ErrorKind::BrokenPipe
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::NotConnected => BusframeError::StreamClosed,
        _ => BusframeError::Io(err),
    }
}

impl<T> ByteStream for IoStream<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn pull(&mut self, max: usize) -> BoxFuture<'_, Result<Pull>> {
        Box::pin(async move {
            self.check_open()?;
            let mut buf = vec![0u8; max.max(1)];

            let n = tokio::select! {
                biased;
                _ = wait_closed(&mut self.closed) => {
                    return Err(BusframeError::StreamClosed);
                }
                res = self.io.read(&mut buf) => res.map_err(map_io)?,
            };

            if n == 0 {
                return Ok(Pull::End);
            }
            buf.truncate(n);
            Ok(Pull::Data(Bytes::from(buf)))
        })
    }

    fn push<'a>(&'a mut self, data: &'a [u8]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.check_open()?;
            if self.write_shut {
                return Err(BusframeError::StreamClosed);
            }

            tokio::select! {
                biased;
                _ = wait_closed(&mut self.closed) => Err(BusframeError::StreamClosed),
                res = self.io.write_all(data) => res.map_err(map_io),
            }
        })
    }

    fn flush(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.check_open()?;

            tokio::select! {
                biased;
                _ = wait_closed(&mut self.closed) => Err(BusframeError::StreamClosed),
                res = self.io.flush() => res.map_err(map_io),
            }
        })
    }

    fn shutdown(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.check_open()?;
            if self.write_shut {
                return Ok(());
            }
            self.write_shut = true;
            self.io.shutdown().await.map_err(map_io)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::{duplex, ReadBuf};

    #[tokio::test]
    async fn test_pull_returns_available_bytes() {
        let (client, mut server) = duplex(64);
        let mut stream = IoStream::new(client);

        server.write_all(b"abc").await.unwrap();

        let pull = stream.pull(16).await.unwrap();
        assert_eq!(pull, Pull::Data(Bytes::from_static(b"abc")));
    }

    #[tokio::test]
    async fn test_pull_respects_max() {
        let (client, mut server) = duplex(64);
        let mut stream = IoStream::new(client);

        server.write_all(b"abcdef").await.unwrap();

        let pull = stream.pull(2).await.unwrap();
        assert_eq!(pull, Pull::Data(Bytes::from_static(b"ab")));
    }

    #[tokio::test]
    async fn test_peer_shutdown_is_end() {
        let (client, mut server) = duplex(64);
        let mut stream = IoStream::new(client);

        server.shutdown().await.unwrap();

        assert_eq!(stream.pull(8).await.unwrap(), Pull::End);
        assert_eq!(stream.pull(8).await.unwrap(), Pull::End);
    }

    #[tokio::test]
    async fn test_close_fails_pending_pull() {
        let (client, _server) = duplex(64);
        let mut stream = IoStream::new(client);
        let closer = stream.close_handle();

        let pending = tokio::spawn(async move { stream.pull(8).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        closer.close();

        let result = tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .expect("pull should fail promptly")
            .unwrap();
        assert!(matches!(result, Err(BusframeError::StreamClosed)));
    }

    #[tokio::test]
    async fn test_push_after_close_fails() {
        let (client, _server) = duplex(64);
        let mut stream = IoStream::new(client);
        stream.close_handle().close();

        let result = stream.push(b"late").await;
        assert!(matches!(result, Err(BusframeError::StreamClosed)));
    }

    #[tokio::test]
    async fn test_push_after_shutdown_fails() {
        let (client, _server) = duplex(64);
        let mut stream = IoStream::new(client);

        stream.shutdown().await.unwrap();
        let result = stream.push(b"late").await;
        assert!(matches!(result, Err(BusframeError::StreamClosed)));
    }

    #[tokio::test]
    async fn test_push_to_dropped_peer_is_stream_closed() {
        let (client, server) = duplex(64);
        let mut stream = IoStream::new(client);
        drop(server);

        let result = stream.push(b"nobody listening").await;
        assert!(matches!(result, Err(BusframeError::StreamClosed)));
    }

    /// Transport that accepts writes but never completes a flush.
    struct StuckFlush;

    impl AsyncRead for StuckFlush {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Pending
        }
    }

    impl AsyncWrite for StuckFlush {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Pending
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_close_fails_pending_flush() {
        let mut stream = IoStream::new(StuckFlush);
        let closer = stream.close_handle();
        stream.push(b"queued").await.unwrap();

        let pending = tokio::spawn(async move { stream.flush().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        closer.close();

        let result = tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .expect("flush should fail promptly")
            .unwrap();
        assert!(matches!(result, Err(BusframeError::StreamClosed)));
    }

    #[test]
    fn test_close_handle_clones_share_state() {
        let handle = CloseHandle::new();
        let clone = handle.clone();
        assert!(!clone.is_closed());

        handle.close();
        assert!(clone.is_closed());
    }
}
