//! Echo Server - framed TCP echo with configurable framing.
//!
//! This demo shows:
//! - Building a protocol from a JSON declaration
//! - Resolving codecs through the capability registry
//! - Guarding inbound messages with a validation policy extension
//! - One connection worker per accepted socket
//!
//! # Running
//!
//! ```sh
//! RUST_LOG=busframe=debug cargo run --example echo_server -- '{"kind": "end-marker", "marker": "\n"}'
//! printf 'hello\nworld\n' | nc 127.0.0.1 7070
//! ```

use std::sync::Arc;

use busframe::config::FramingConfig;
use busframe::connection::{spawn_connection_worker, FramedConnection};
use busframe::discovery::CapabilityRegistry;
use busframe::extension::{self, ExtensionBootstrap, ExtensionDefaults, ValidationPolicy};
use busframe::{ConnectionConfig, Message, Result};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

const ADDR: &str = "127.0.0.1:7070";

/// Echo every message that passes the installed validation policy.
async fn echo(message: Message) -> Result<Option<Message>> {
    let registry = extension::installed()?;
    let descriptor = registry.get("echoGuard")?;
    let policy = registry.get_as::<ValidationPolicy>("echoGuard")?;

    match policy.validate(&message, descriptor.defaults()) {
        Ok(()) => Ok(Some(message)),
        Err(failure) => {
            tracing::warn!("Rejected message: {}", failure);
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let declaration = std::env::args()
        .nth(1)
        .unwrap_or_else(|| r#"{"kind": "end-marker", "marker": "\n"}"#.to_string());

    let registry = CapabilityRegistry::with_builtins()?;
    let protocol = FramingConfig::from_json(&declaration)?.build(&registry)?;

    let mut bootstrap = ExtensionBootstrap::new();
    bootstrap.register(
        "echoGuard",
        Arc::new(ValidationPolicy::new().max_payload_size(1024)),
        ExtensionDefaults::new().exception_kind("echo.PayloadRejected"),
    )?;
    extension::install(bootstrap.finish())?;

    let listener = TcpListener::bind(ADDR).await?;
    tracing::info!("Listening on {} ({})", ADDR, protocol.name());

    loop {
        let (socket, peer) = listener.accept().await?;
        tracing::info!("Accepted {}", peer);
        let conn = FramedConnection::new(socket, protocol.clone(), &ConnectionConfig::default());
        let worker = spawn_connection_worker(conn, echo);

        tokio::spawn(async move {
            if let Ok(summary) = worker.await {
                tracing::info!(
                    "{} done: {} frames, {} rejected",
                    peer,
                    summary.frames,
                    summary.rejected
                );
            }
        });
    }
}
