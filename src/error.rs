//! Error types for busframe.

use std::fmt;

use thiserror::Error;

/// Which side of a codec failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecSide {
    /// Turning a message into bytes.
    Encode,
    /// Turning framed bytes into a message.
    Decode,
}

impl fmt::Display for CodecSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecSide::Encode => f.write_str("encode"),
            CodecSide::Decode => f.write_str("decode"),
        }
    }
}

/// Main error type for all busframe operations.
#[derive(Debug, Error)]
pub enum BusframeError {
    /// A provider declaration could not be turned into a provider.
    #[error("Discovery error for {contract}: {reason}")]
    Discovery {
        /// Declarative name of the contract being looked up.
        contract: String,
        /// What was wrong with the declaration.
        reason: String,
    },

    /// The stream ended inside a frame, or a frame header was invalid.
    #[error("Framing error: {0}")]
    Framing(String),

    /// The peer did not open with the expected handshake token.
    #[error("Protocol mismatch: {0}")]
    ProtocolMismatch(String),

    /// Payload could not be encoded or decoded.
    #[error("Serialization error ({side}): {reason}")]
    Serialization {
        /// Encode or decode.
        side: CodecSide,
        /// Underlying codec message.
        reason: String,
    },

    /// Read or write attempted on a closed stream.
    #[error("Stream closed")]
    StreamClosed,

    /// Lookup of an unregistered extension or provider.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Process-wide extension registry is not installed.
    #[error("Extension registry not installed")]
    Uninitialized,

    /// Invalid configuration or duplicate registration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// I/O error from the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while reading declarative configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BusframeError {
    pub(crate) fn encode(reason: impl fmt::Display) -> Self {
        BusframeError::Serialization {
            side: CodecSide::Encode,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn decode(reason: impl fmt::Display) -> Self {
        BusframeError::Serialization {
            side: CodecSide::Decode,
            reason: reason.to_string(),
        }
    }

    /// Whether the connection that produced this error must be closed.
    ///
    /// Serialization failures only affect the current message because the
    /// frame was already isolated before decoding.
    pub fn is_fatal_for_connection(&self) -> bool {
        !matches!(self, BusframeError::Serialization { .. })
    }
}

/// Result type alias using BusframeError.
pub type Result<T> = std::result::Result<T, BusframeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_error_mentions_side() {
        let err = BusframeError::decode("bad marker byte");
        assert_eq!(
            err.to_string(),
            "Serialization error (decode): bad marker byte"
        );
        assert!(!err.is_fatal_for_connection());
    }

    #[test]
    fn test_framing_errors_are_fatal() {
        assert!(BusframeError::Framing("short frame".into()).is_fatal_for_connection());
        assert!(BusframeError::StreamClosed.is_fatal_for_connection());
        assert!(BusframeError::ProtocolMismatch("x".into()).is_fatal_for_connection());
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        let err: BusframeError = io.into();
        assert!(matches!(err, BusframeError::Io(_)));
    }
}
