//! Framed connections and the per-connection worker loop.
//!
//! A [`FramedConnection`] pairs one [`FrameStream`] with one protocol. It is
//! owned by a single task; reads and writes on it happen in issue order.
//!
//! [`spawn_connection_worker`] runs the read loop:
//! 1. Read a frame through the protocol
//! 2. Hand the message to the [`MessageHandler`]
//! 3. Send the handler's reply, if any
//!
//! Decode failures are logged and the loop continues with the next frame.
//! Framing, handshake, closed-stream and I/O failures end the worker.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use busframe::connection::{spawn_connection_worker, FramedConnection};
//! use busframe::protocol::LengthPrefixedProtocol;
//! use busframe::{ConnectionConfig, Message};
//!
//! let (socket, _) = listener.accept().await?;
//! let conn = FramedConnection::new(
//!     socket,
//!     Arc::new(LengthPrefixedProtocol::new()),
//!     &ConnectionConfig::default(),
//! );
//!
//! async fn echo(message: Message) -> busframe::Result<Option<Message>> {
//!     Ok(Some(message))
//! }
//!
//! let worker = spawn_connection_worker(conn, echo);
//! let summary = worker.await?;
//! ```

use std::future::Future;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;

use crate::config::ConnectionConfig;
use crate::error::{BusframeError, Result};
use crate::message::Message;
use crate::protocol::FramingProtocol;
use crate::stream::{BoxFuture, CloseHandle, FrameStream, IoStream};

/// One stream plus the protocol that frames it.
pub struct FramedConnection {
    stream: FrameStream,
    protocol: Arc<dyn FramingProtocol>,
    close: Option<CloseHandle>,
}

impl FramedConnection {
    /// Wrap a tokio transport.
    pub fn new<T>(io: T, protocol: Arc<dyn FramingProtocol>, config: &ConnectionConfig) -> Self
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let io = IoStream::new(io);
        let close = io.close_handle();
        Self {
            stream: FrameStream::with_chunk_size(io, config.read_chunk_size),
            protocol,
            close: Some(close),
        }
    }

    /// Wrap an existing frame stream.
    pub fn from_stream(stream: FrameStream, protocol: Arc<dyn FramingProtocol>) -> Self {
        Self {
            stream,
            protocol,
            close: None,
        }
    }

    /// Attach the close handle of the stream passed to [`from_stream`](Self::from_stream).
    pub fn with_close_handle(mut self, handle: CloseHandle) -> Self {
        self.close = Some(handle);
        self
    }

    /// Read the next message. `Ok(None)` means the peer finished cleanly.
    pub async fn recv(&mut self) -> Result<Option<Message>> {
        self.protocol.read(&mut self.stream).await
    }

    /// Write one message.
    pub async fn send(&mut self, message: &Message) -> Result<()> {
        self.protocol.write(&mut self.stream, message).await
    }

    /// Handle that fails pending and later reads/writes with `StreamClosed`.
    pub fn close_handle(&self) -> Option<CloseHandle> {
        self.close.clone()
    }

    /// Half-close the write side.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown().await
    }

    /// Protocol in use.
    pub fn protocol(&self) -> &Arc<dyn FramingProtocol> {
        &self.protocol
    }
}

/// Handles one inbound message, optionally producing a reply.
pub trait MessageHandler: Send + Sync + 'static {
    /// Handle a message.
    fn handle(&self, message: Message) -> BoxFuture<'static, Result<Option<Message>>>;
}

impl<F, Fut> MessageHandler for F
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Message>>> + Send + 'static,
{
    fn handle(&self, message: Message) -> BoxFuture<'static, Result<Option<Message>>> {
        Box::pin((self)(message))
    }
}

/// What a worker did before it stopped.
#[derive(Debug, Default)]
pub struct WorkerSummary {
    /// Frames read and handed to the handler.
    pub frames: u64,
    /// Frames skipped because they failed to decode or were refused.
    pub rejected: u64,
    /// Error that ended the worker. `None` after a clean end-of-stream.
    pub error: Option<BusframeError>,
}

impl WorkerSummary {
    /// Whether the peer finished cleanly.
    pub fn is_clean(&self) -> bool {
        self.error.is_none()
    }
}

/// Spawn a task that reads frames from `conn` until the stream ends.
pub fn spawn_connection_worker<H>(conn: FramedConnection, handler: H) -> JoinHandle<WorkerSummary>
where
    H: MessageHandler,
{
    tokio::spawn(run_worker(conn, handler))
}

async fn run_worker<H: MessageHandler>(mut conn: FramedConnection, handler: H) -> WorkerSummary {
    let protocol = conn.protocol.name();
    let mut summary = WorkerSummary::default();
    tracing::debug!("Connection worker started ({})", protocol);

    loop {
        let message = match conn.recv().await {
            Ok(Some(message)) => message,
            Ok(None) => {
                tracing::debug!("Peer closed connection after {} frames", summary.frames);
                break;
            }
            Err(e) if !e.is_fatal_for_connection() => {
                summary.rejected += 1;
                tracing::warn!("Dropping undecodable frame: {}", e);
                continue;
            }
            Err(e) => {
                tracing::error!("Connection worker stopped ({}): {}", protocol, e);
                summary.error = Some(e);
                return summary;
            }
        };
        summary.frames += 1;

        let reply = match handler.handle(message).await {
            Ok(reply) => reply,
            Err(e) if !e.is_fatal_for_connection() => {
                summary.rejected += 1;
                tracing::warn!("Handler refused message: {}", e);
                continue;
            }
            Err(e) => {
                tracing::error!("Handler error, closing connection: {}", e);
                summary.error = Some(e);
                return summary;
            }
        };

        if let Some(reply) = reply {
            if let Err(e) = conn.send(&reply).await {
                tracing::error!("Failed to send reply: {}", e);
                summary.error = Some(e);
                return summary;
            }
        }
    }

    if let Err(e) = conn.shutdown().await {
        tracing::debug!("Shutdown after clean close failed: {}", e);
    }
    summary
}
