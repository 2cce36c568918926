//! JSON codec using `serde_json`.

use bytes::Bytes;

use super::ObjectCodec;
use crate::error::{BusframeError, Result};
use crate::message::Message;

/// UTF-8 JSON codec for structured messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl ObjectCodec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, message: &Message) -> Result<Bytes> {
        match message {
            Message::Object(value) => serde_json::to_vec(value)
                .map(Bytes::from)
                .map_err(BusframeError::encode),
            Message::Bytes(_) => Err(BusframeError::encode(
                "json codec expects a structured message",
            )),
        }
    }

    fn decode(&self, bytes: &[u8]) -> Result<Message> {
        serde_json::from_slice(bytes)
            .map(Message::Object)
            .map_err(BusframeError::decode)
    }
}
