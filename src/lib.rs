//! # busframe
//!
//! Message framing over continuous byte streams, with runtime capability
//! discovery and named extension descriptors.
//!
//! ## Architecture
//!
//! - **Stream** ([`stream`]): chunked pull/push primitive. One pull may carry
//!   a single byte, nothing at all, or end-of-stream.
//! - **Protocols** ([`protocol`]): Direct, LengthPrefixed, EndMarker and
//!   Negotiated framing behind one [`FramingProtocol`](protocol::FramingProtocol)
//!   trait.
//! - **Codecs** ([`codec`]): raw, MessagePack and JSON payloads.
//! - **Discovery** ([`discovery`]): providers looked up by contract type from
//!   declarative `services/<contract>` resources.
//! - **Extensions** ([`extension`]): named instances with immutable defaults.
//! - **Connections** ([`connection`]): one task per stream running the read
//!   loop.
//!
//! ## Example
//!
//! ```ignore
//! use busframe::config::FramingConfig;
//! use busframe::connection::{spawn_connection_worker, FramedConnection};
//! use busframe::discovery::CapabilityRegistry;
//! use busframe::{ConnectionConfig, Message, Result};
//!
//! async fn echo(message: Message) -> Result<Option<Message>> {
//!     Ok(Some(message))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let registry = CapabilityRegistry::with_builtins()?;
//!     let protocol = FramingConfig::from_json(r#"{"kind": "length-prefixed"}"#)?
//!         .build(&registry)?;
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:7000").await?;
//!     loop {
//!         let (socket, _) = listener.accept().await?;
//!         let conn = FramedConnection::new(socket, protocol.clone(), &ConnectionConfig::default());
//!         spawn_connection_worker(conn, echo);
//!     }
//! }
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod discovery;
pub mod error;
pub mod extension;
pub mod protocol;
pub mod stream;

mod message;

pub use config::{ConnectionConfig, ExtensionDeclaration, FramingConfig};
pub use connection::{spawn_connection_worker, FramedConnection, MessageHandler, WorkerSummary};
pub use discovery::CapabilityRegistry;
pub use error::{BusframeError, Result};
pub use message::Message;
