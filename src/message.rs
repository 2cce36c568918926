//! Message representation shared by codecs and protocols.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{BusframeError, Result};

/// A single framed message.
///
/// Which variant a read produces depends on the codec the protocol was
/// configured with: [`RawCodec`](crate::codec::RawCodec) yields `Bytes`,
/// structured codecs yield `Object`.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Raw byte payload.
    Bytes(Bytes),
    /// Structured payload.
    Object(Value),
}

impl Message {
    /// Build a structured message from any serializable value.
    pub fn object<T: Serialize>(value: &T) -> Result<Self> {
        serde_json::to_value(value)
            .map(Message::Object)
            .map_err(BusframeError::encode)
    }

    /// Convert a structured message into a typed value.
    pub fn to_value<T: DeserializeOwned>(&self) -> Result<T> {
        match self {
            Message::Object(value) => {
                T::deserialize(value).map_err(BusframeError::decode)
            }
            Message::Bytes(_) => Err(BusframeError::decode(
                "expected a structured message, got raw bytes",
            )),
        }
    }

    /// Get the raw payload, if this is a byte message.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Message::Bytes(bytes) => Some(bytes),
            Message::Object(_) => None,
        }
    }

    /// Get the structured payload, if this is an object message.
    pub fn as_object(&self) -> Option<&Value> {
        match self {
            Message::Object(value) => Some(value),
            Message::Bytes(_) => None,
        }
    }

    /// Check if this is a raw byte message.
    #[inline]
    pub fn is_bytes(&self) -> bool {
        matches!(self, Message::Bytes(_))
    }
}

impl From<Bytes> for Message {
    fn from(bytes: Bytes) -> Self {
        Message::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Message {
    fn from(bytes: Vec<u8>) -> Self {
        Message::Bytes(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for Message {
    fn from(bytes: &'static [u8]) -> Self {
        Message::Bytes(Bytes::from_static(bytes))
    }
}

impl From<Value> for Message {
    fn from(value: Value) -> Self {
        Message::Object(value)
    }
}
