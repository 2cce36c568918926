//! Growable byte accumulator for assembling messages from fragments.
//!
//! Uses `bytes::BytesMut` so appends are amortized O(1) and the finished
//! message can be frozen into `Bytes` without copying.

use bytes::{Bytes, BytesMut};

/// Initial capacity used by [`ByteAccumulator::new`].
const INITIAL_CAPACITY: usize = 8 * 1024;

/// Buffer that collects pulled chunks until a framing rule is satisfied.
#[derive(Debug, Default)]
pub struct ByteAccumulator {
    buffer: BytesMut,
}

impl ByteAccumulator {
    /// Create an accumulator with the default initial capacity (8KB).
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    /// Create an accumulator with a custom initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Append a chunk.
    #[inline]
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Number of accumulated bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if nothing has been accumulated.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// View the accumulated bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Find `pattern` at or after `from`, returning its absolute offset.
    pub fn find(&self, pattern: &[u8], from: usize) -> Option<usize> {
        if pattern.is_empty() || from >= self.buffer.len() {
            return None;
        }
        self.buffer[from..]
            .windows(pattern.len())
            .position(|window| window == pattern)
            .map(|pos| from + pos)
    }

    /// Remove and return the first `at` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `at > self.len()`.
    pub fn split_to(&mut self, at: usize) -> Bytes {
        self.buffer.split_to(at).freeze()
    }

    /// Discard the first `count` bytes.
    pub fn advance(&mut self, count: usize) {
        let count = count.min(self.buffer.len());
        let _ = self.buffer.split_to(count);
    }

    /// Finish accumulation and return the bytes (zero-copy).
    pub fn freeze(self) -> Bytes {
        self.buffer.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extend_and_freeze() {
        let mut acc = ByteAccumulator::new();
        acc.extend(b"hello ");
        acc.extend(b"world");

        assert_eq!(acc.len(), 11);
        assert_eq!(&acc.freeze()[..], b"hello world");
    }

    #[test]
    fn test_grows_past_initial_capacity() {
        let mut acc = ByteAccumulator::with_capacity(4);
        for _ in 0..1000 {
            acc.extend(&[0xAB; 16]);
        }
        assert_eq!(acc.len(), 16_000);
        assert!(acc.as_slice().iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn test_find_from_offset() {
        let mut acc = ByteAccumulator::new();
        acc.extend(b"ab\r\ncd\r\n");

        assert_eq!(acc.find(b"\r\n", 0), Some(2));
        assert_eq!(acc.find(b"\r\n", 3), Some(6));
        assert_eq!(acc.find(b"\r\n", 7), None);
        assert_eq!(acc.find(b"", 0), None);
    }

    #[test]
    fn test_split_to_and_advance() {
        let mut acc = ByteAccumulator::new();
        acc.extend(b"frame|rest");

        let head = acc.split_to(5);
        assert_eq!(&head[..], b"frame");
        acc.advance(1);
        assert_eq!(acc.as_slice(), b"rest");

        acc.advance(100);
        assert!(acc.is_empty());
    }
}
