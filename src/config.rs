//! Declarative configuration for protocols, extensions and connections.
//!
//! All types deserialize with serde, so they can be embedded in whatever
//! configuration format the host uses. `from_json` helpers cover the common
//! case.
//!
//! ```
//! use busframe::config::FramingConfig;
//! use busframe::discovery::CapabilityRegistry;
//!
//! let config = FramingConfig::from_json(
//!     r#"{"kind": "length-prefixed", "header_width": 2, "codec": "busframe.codec.json"}"#,
//! )
//! .unwrap();
//! let registry = CapabilityRegistry::with_builtins().unwrap();
//! let protocol = config.build(&registry).unwrap();
//! assert_eq!(protocol.name(), "length-prefixed");
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::codec::{ObjectCodec, RawCodec};
use crate::discovery::CapabilityRegistry;
use crate::error::Result;
use crate::extension::ExtensionDefaults;
use crate::protocol::{
    ByteOrder, DirectProtocol, EndMarkerProtocol, FramingProtocol, HeaderWidth, LengthHeader,
    LengthPrefixedProtocol, NegotiatedProtocol, DEFAULT_END_MARKER, DEFAULT_HANDSHAKE_TOKEN,
    DEFAULT_MAX_FRAME_SIZE,
};
use crate::stream::DEFAULT_CHUNK_SIZE;

fn default_header_width() -> u8 {
    4
}

fn default_max_frame_size() -> u64 {
    DEFAULT_MAX_FRAME_SIZE
}

fn default_marker() -> String {
    String::from_utf8_lossy(DEFAULT_END_MARKER).into_owned()
}

fn default_token() -> String {
    String::from_utf8_lossy(DEFAULT_HANDSHAKE_TOKEN).into_owned()
}

fn default_inner() -> Box<FramingConfig> {
    Box::new(FramingConfig::LengthPrefixed {
        header_width: default_header_width(),
        byte_order: ByteOrder::default(),
        max_frame_size: default_max_frame_size(),
        codec: None,
    })
}

fn default_read_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

/// Framing protocol declaration, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FramingConfig {
    /// One message per stream.
    Direct {
        /// Optional size limit.
        #[serde(default)]
        max_message_size: Option<usize>,
        /// Codec implementation id.
        #[serde(default)]
        codec: Option<String>,
    },
    /// Length header then body.
    LengthPrefixed {
        /// Header width in bytes (2, 4 or 8).
        #[serde(default = "default_header_width")]
        header_width: u8,
        /// Header byte order.
        #[serde(default)]
        byte_order: ByteOrder,
        /// Largest accepted body.
        #[serde(default = "default_max_frame_size")]
        max_frame_size: u64,
        /// Codec implementation id.
        #[serde(default)]
        codec: Option<String>,
    },
    /// Payload then marker.
    EndMarker {
        /// Marker text.
        #[serde(default = "default_marker")]
        marker: String,
        /// Optional size limit.
        #[serde(default)]
        max_message_size: Option<usize>,
        /// Codec implementation id.
        #[serde(default)]
        codec: Option<String>,
    },
    /// Handshake token then an inner frame.
    Negotiated {
        /// Token text.
        #[serde(default = "default_token")]
        token: String,
        /// Inner protocol.
        #[serde(default = "default_inner")]
        inner: Box<FramingConfig>,
    },
    /// Any protocol registered in the capability registry.
    Provider {
        /// Implementation id.
        implementation: String,
    },
}

impl FramingConfig {
    /// Parse a JSON declaration.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Turn the declaration into a protocol, resolving codec and provider
    /// ids through `registry`.
    pub fn build(&self, registry: &CapabilityRegistry) -> Result<Arc<dyn FramingProtocol>> {
        let protocol: Arc<dyn FramingProtocol> = match self {
            FramingConfig::Direct {
                max_message_size,
                codec,
            } => {
                let mut protocol = DirectProtocol::new().with_codec(resolve_codec(registry, codec)?);
                if let Some(max) = max_message_size {
                    protocol = protocol.with_max_message_size(*max);
                }
                Arc::new(protocol)
            }
            FramingConfig::LengthPrefixed {
                header_width,
                byte_order,
                max_frame_size,
                codec,
            } => {
                let header = LengthHeader::new(HeaderWidth::from_len(*header_width)?, *byte_order);
                Arc::new(
                    LengthPrefixedProtocol::new()
                        .with_header(header)
                        .with_max_frame_size(*max_frame_size)
                        .with_codec(resolve_codec(registry, codec)?),
                )
            }
            FramingConfig::EndMarker {
                marker,
                max_message_size,
                codec,
            } => {
                let mut protocol = EndMarkerProtocol::new()
                    .with_marker(marker.as_bytes())?
                    .with_codec(resolve_codec(registry, codec)?);
                if let Some(max) = max_message_size {
                    protocol = protocol.with_max_message_size(*max);
                }
                Arc::new(protocol)
            }
            FramingConfig::Negotiated { token, inner } => {
                let inner = inner.build(registry)?;
                Arc::new(NegotiatedProtocol::new(inner).with_token(token.as_bytes())?)
            }
            FramingConfig::Provider { implementation } => {
                Arc::from(registry.instantiate::<dyn FramingProtocol>(implementation)?)
            }
        };
        tracing::debug!("Built {} protocol from configuration", protocol.name());
        Ok(protocol)
    }
}

impl Default for FramingConfig {
    fn default() -> Self {
        *default_inner()
    }
}

fn resolve_codec(
    registry: &CapabilityRegistry,
    codec: &Option<String>,
) -> Result<Arc<dyn ObjectCodec>> {
    match codec {
        Some(id) => Ok(Arc::from(registry.instantiate::<dyn ObjectCodec>(id)?)),
        None => Ok(Arc::new(RawCodec)),
    }
}

/// Extension declaration resolved through the `dyn ExtensionFactory` contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionDeclaration {
    /// Registered name.
    pub name: String,
    /// Factory implementation id.
    pub implementation: String,
    /// Default exception kind.
    #[serde(default)]
    pub default_exception_kind: Option<String>,
    /// Properties handed to the factory and kept as defaults.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl ExtensionDeclaration {
    /// Parse a JSON array of declarations.
    pub fn list_from_json(json: &str) -> Result<Vec<Self>> {
        Ok(serde_json::from_str(json)?)
    }

    /// Defaults recorded with the descriptor.
    pub fn defaults(&self) -> ExtensionDefaults {
        let mut defaults = ExtensionDefaults::new();
        if let Some(kind) = &self.default_exception_kind {
            defaults = defaults.exception_kind(kind);
        }
        for (key, value) in &self.properties {
            defaults = defaults.property(key, value);
        }
        defaults
    }
}

/// Per-connection settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Maximum bytes requested per transport read.
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,
}

impl ConnectionConfig {
    /// Parse a JSON object.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}
