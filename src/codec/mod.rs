//! Codec module - serialization/deserialization for framed payloads.
//!
//! This module provides codecs behind the [`ObjectCodec`] trait:
//!
//! - [`RawCodec`] - Pass-through for raw bytes
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde` (struct-as-map)
//! - [`JsonCodec`] - JSON using `serde_json`
//!
//! # Design
//!
//! Protocols hold an `Arc<dyn ObjectCodec>` so the codec can be injected
//! explicitly or resolved at runtime through the
//! [`CapabilityRegistry`](crate::discovery::CapabilityRegistry) under the
//! `dyn ObjectCodec` contract. Codec failures are reported as
//! [`BusframeError::Serialization`](crate::BusframeError::Serialization)
//! tagged with the side that failed.
//!
//! # Example
//!
//! ```
//! use busframe::codec::{MsgPackCodec, ObjectCodec};
//! use busframe::Message;
//! use serde_json::json;
//!
//! let codec = MsgPackCodec;
//! let message = Message::Object(json!({"id": 1, "name": "order"}));
//! let encoded = codec.encode(&message).unwrap();
//! assert_eq!(codec.decode(&encoded).unwrap(), message);
//! ```

mod json;
mod msgpack;
mod raw;

use bytes::Bytes;

use crate::error::Result;
use crate::message::Message;

pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;
pub use raw::RawCodec;

/// Implementation ids of the built-in codecs, as used in declarations.
pub mod ids {
    /// [`RawCodec`](super::RawCodec)
    pub const RAW: &str = "busframe.codec.raw";
    /// [`MsgPackCodec`](super::MsgPackCodec)
    pub const MSGPACK: &str = "busframe.codec.msgpack";
    /// [`JsonCodec`](super::JsonCodec)
    pub const JSON: &str = "busframe.codec.json";
}

/// Pluggable payload (de)serialization.
pub trait ObjectCodec: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Encode a message into payload bytes.
    fn encode(&self, message: &Message) -> Result<Bytes>;

    /// Decode framed payload bytes into a message.
    fn decode(&self, bytes: &[u8]) -> Result<Message>;
}
