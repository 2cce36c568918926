//! Raw codec - pass-through for binary data.
//!
//! Used when the payload is already serialized or is plain bytes. Encoding
//! a `Message::Bytes` returns the same `Bytes` handle, so no data is copied.
//!
//! # Example
//!
//! ```
//! use busframe::codec::{ObjectCodec, RawCodec};
//! use busframe::Message;
//! use bytes::Bytes;
//!
//! let payload = Bytes::from_static(b"zero copy");
//! let encoded = RawCodec.encode(&Message::Bytes(payload.clone())).unwrap();
//! assert_eq!(encoded.as_ptr(), payload.as_ptr()); // Same memory
//! ```

use bytes::Bytes;

use super::ObjectCodec;
use crate::error::{BusframeError, Result};
use crate::message::Message;

/// Codec that passes bytes through without transformation.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl ObjectCodec for RawCodec {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn encode(&self, message: &Message) -> Result<Bytes> {
        match message {
            Message::Bytes(bytes) => Ok(bytes.clone()),
            Message::Object(_) => Err(BusframeError::encode(
                "raw codec cannot encode a structured message",
            )),
        }
    }

    fn decode(&self, bytes: &[u8]) -> Result<Message> {
        Ok(Message::Bytes(Bytes::copy_from_slice(bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_round_trip() {
        let original = Message::from(b"hello world".to_vec());
        let encoded = RawCodec.encode(&original).unwrap();
        assert_eq!(RawCodec.decode(&encoded).unwrap(), original);
    }

    #[test]
    fn test_empty_payload() {
        let encoded = RawCodec.encode(&Message::Bytes(Bytes::new())).unwrap();
        assert!(encoded.is_empty());
        assert_eq!(RawCodec.decode(&[]).unwrap(), Message::Bytes(Bytes::new()));
    }

    #[test]
    fn test_binary_data_preserved() {
        let all_bytes: Vec<u8> = (0..=255).collect();
        let decoded = RawCodec.decode(&all_bytes).unwrap();
        assert_eq!(decoded.as_bytes().unwrap(), &all_bytes[..]);
    }

    #[test]
    fn test_structured_message_rejected() {
        let result = RawCodec.encode(&Message::Object(json!({"a": 1})));
        assert!(result.is_err());
    }
}
