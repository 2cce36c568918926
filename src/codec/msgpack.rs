//! MsgPack codec using `rmp-serde`.
//!
//! Always encodes with `to_vec_named` so structs are written as maps with
//! field names rather than positional arrays. Peers written in other
//! languages expect the map format.
//!
//! # Example
//!
//! ```
//! use busframe::codec::MsgPackCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Event {
//!     id: u32,
//!     content: String,
//! }
//!
//! let event = Event { id: 42, content: "hello".to_string() };
//! let encoded = MsgPackCodec::encode_value(&event).unwrap();
//! let decoded: Event = MsgPackCodec::decode_value(&encoded).unwrap();
//! assert_eq!(decoded, event);
//! ```

use bytes::Bytes;
use serde_json::Value;

use super::ObjectCodec;
use crate::error::{BusframeError, Result};
use crate::message::Message;

/// MessagePack codec for structured messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a typed value to MsgPack bytes (struct-as-map).
    #[inline]
    pub fn encode_value<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        rmp_serde::to_vec_named(value).map_err(BusframeError::encode)
    }

    /// Decode MsgPack bytes to a typed value.
    #[inline]
    pub fn decode_value<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        rmp_serde::from_slice(bytes).map_err(BusframeError::decode)
    }
}

impl ObjectCodec for MsgPackCodec {
    fn name(&self) -> &'static str {
        "msgpack"
    }

    fn encode(&self, message: &Message) -> Result<Bytes> {
        match message {
            Message::Object(value) => Self::encode_value(value).map(Bytes::from),
            Message::Bytes(_) => Err(BusframeError::encode(
                "msgpack codec expects a structured message",
            )),
        }
    }

    fn decode(&self, bytes: &[u8]) -> Result<Message> {
        Self::decode_value::<Value>(bytes).map(Message::Object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecSide;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct TestStruct {
        id: u32,
        name: String,
        active: bool,
    }

    #[test]
    fn test_encode_decode_struct() {
        let original = TestStruct {
            id: 42,
            name: "test".to_string(),
            active: true,
        };

        let encoded = MsgPackCodec::encode_value(&original).unwrap();
        let decoded: TestStruct = MsgPackCodec::decode_value(&encoded).unwrap();

        assert_eq!(decoded, original);
    }

    #[test]
    fn test_struct_encoded_as_map() {
        let test = TestStruct {
            id: 1,
            name: "x".to_string(),
            active: false,
        };

        let encoded = MsgPackCodec::encode_value(&test).unwrap();

        // fixmap with 3 entries, not fixarray (0x93)
        assert_eq!(encoded[0], 0x83);
    }

    #[test]
    fn test_object_message_round_trip() {
        let codec = MsgPackCodec;
        let message = Message::Object(json!({
            "route": "orders",
            "lines": [1, 2, 3],
            "meta": {"priority": "high"}
        }));

        let encoded = codec.encode(&message).unwrap();
        assert_eq!(codec.decode(&encoded).unwrap(), message);
    }

    #[test]
    fn test_raw_bytes_rejected_on_encode() {
        let result = MsgPackCodec.encode(&Message::from(b"raw".to_vec()));
        assert!(matches!(
            result,
            Err(BusframeError::Serialization {
                side: CodecSide::Encode,
                ..
            })
        ));
    }

    #[test]
    fn test_decode_error_tagged_decode() {
        // 0xc1 is never used in MessagePack
        let result = MsgPackCodec.decode(&[0xc1]);
        assert!(matches!(
            result,
            Err(BusframeError::Serialization {
                side: CodecSide::Decode,
                ..
            })
        ));
    }

    #[test]
    fn test_nil_decodes_to_null() {
        assert_eq!(MsgPackCodec.decode(&[0xc0]).unwrap(), Message::Object(Value::Null));
    }
}
