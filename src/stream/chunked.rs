//! Scripted in-memory stream.
//!
//! Delivers a fixed script of chunks and idle gaps, then end-of-stream.
//! Useful wherever a transport must be simulated: slow peers that send one
//! byte at a time, markers split across deliveries, transient empty reads.
//! Written bytes are recorded and can be inspected through a [`ChunkedProbe`].
//!
//! # Example
//!
//! ```
//! use busframe::stream::ChunkedStream;
//!
//! let stream = ChunkedStream::new()
//!     .chunk(b"hel")
//!     .idle()
//!     .chunk(b"lo");
//! let probe = stream.probe();
//! assert_eq!(probe.remaining(), 5);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;

use super::{BoxFuture, ByteStream, CloseHandle, Pull};
use crate::error::{BusframeError, Result};

#[derive(Debug)]
enum Step {
    Chunk(Bytes),
    Idle,
}

#[derive(Debug, Default)]
struct State {
    script: VecDeque<Step>,
    written: Vec<u8>,
    pulls: usize,
    write_shut: bool,
}

/// In-memory [`ByteStream`] that replays a script.
#[derive(Debug)]
pub struct ChunkedStream {
    state: Arc<Mutex<State>>,
    handle: CloseHandle,
}

/// Read-only view of a [`ChunkedStream`] that stays usable after the stream
/// has been moved into a protocol.
#[derive(Debug, Clone)]
pub struct ChunkedProbe {
    state: Arc<Mutex<State>>,
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ChunkedStream {
    /// Create an empty script (immediately at end-of-stream).
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            handle: CloseHandle::new(),
        }
    }

    /// Deliver `data` in one chunk (split only if a pull asks for less).
    pub fn chunk(self, data: &[u8]) -> Self {
        if !data.is_empty() {
            lock(&self.state)
                .script
                .push_back(Step::Chunk(Bytes::copy_from_slice(data)));
        }
        self
    }

    /// Insert one pull that returns [`Pull::Idle`].
    pub fn idle(self) -> Self {
        lock(&self.state).script.push_back(Step::Idle);
        self
    }

    /// Deliver each slice as its own chunk.
    pub fn from_slices(slices: &[&[u8]]) -> Self {
        slices
            .iter()
            .fold(Self::new(), |stream, slice| stream.chunk(slice))
    }

    /// Deliver `data` in chunks of at most `chunk_size` bytes.
    pub fn trickle(data: &[u8], chunk_size: usize) -> Self {
        data.chunks(chunk_size.max(1))
            .fold(Self::new(), |stream, chunk| stream.chunk(chunk))
    }

    /// Get a probe for inspecting the stream after it has been moved.
    pub fn probe(&self) -> ChunkedProbe {
        ChunkedProbe {
            state: self.state.clone(),
        }
    }

    /// Get a handle that closes this stream.
    pub fn close_handle(&self) -> CloseHandle {
        self.handle.clone()
    }
}

impl Default for ChunkedStream {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkedProbe {
    /// Number of pulls made so far (including idle and end results).
    pub fn pulls(&self) -> usize {
        lock(&self.state).pulls
    }

    /// Bytes still waiting in the script.
    pub fn remaining(&self) -> usize {
        lock(&self.state)
            .script
            .iter()
            .map(|step| match step {
                Step::Chunk(bytes) => bytes.len(),
                Step::Idle => 0,
            })
            .sum()
    }

    /// Everything pushed into the stream so far.
    pub fn written(&self) -> Vec<u8> {
        lock(&self.state).written.clone()
    }

    /// Check whether the write side was shut down.
    pub fn is_write_shut(&self) -> bool {
        lock(&self.state).write_shut
    }
}

impl ByteStream for ChunkedStream {
    fn pull(&mut self, max: usize) -> BoxFuture<'_, Result<Pull>> {
        let result = if self.handle.is_closed() {
            Err(BusframeError::StreamClosed)
        } else {
            let mut state = lock(&self.state);
            state.pulls += 1;
            let max = max.max(1);
            match state.script.pop_front() {
                None => Ok(Pull::End),
                Some(Step::Idle) => Ok(Pull::Idle),
                Some(Step::Chunk(mut bytes)) => {
                    if bytes.len() > max {
                        let rest = bytes.split_off(max);
                        state.script.push_front(Step::Chunk(rest));
                    }
                    Ok(Pull::Data(bytes))
                }
            }
        };
        Box::pin(async move { result })
    }

    fn push<'a>(&'a mut self, data: &'a [u8]) -> BoxFuture<'a, Result<()>> {
        let result = if self.handle.is_closed() {
            Err(BusframeError::StreamClosed)
        } else {
            let mut state = lock(&self.state);
            if state.write_shut {
                Err(BusframeError::StreamClosed)
            } else {
                state.written.extend_from_slice(data);
                Ok(())
            }
        };
        Box::pin(async move { result })
    }

    fn flush(&mut self) -> BoxFuture<'_, Result<()>> {
        let result = if self.handle.is_closed() {
            Err(BusframeError::StreamClosed)
        } else {
            Ok(())
        };
        Box::pin(async move { result })
    }

    fn shutdown(&mut self) -> BoxFuture<'_, Result<()>> {
        let result = if self.handle.is_closed() {
            Err(BusframeError::StreamClosed)
        } else {
            lock(&self.state).write_shut = true;
            Ok(())
        };
        Box::pin(async move { result })
    }
}
