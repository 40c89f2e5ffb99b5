//! Transport seam between the session layer and the wire.
//!
//! The session layer only depends on two contracts: opening the transport
//! resolves once, and a closed transport drops the inbound side of every
//! channel so pending requests fail instead of hanging forever. Framing,
//! reconnection and backoff live below this seam.

mod fake;
mod websocket;

pub use fake::{FakeTransport, FakeTransportController};
pub use websocket::WsTransport;

use std::sync::Arc;

use async_trait::async_trait;
use replkit_proto::Frame;
use tokio::sync::mpsc;

use crate::error::Result;

/// Callback the transport uses to (re)fetch the access token lazily.
pub type TokenSupplier = Arc<dyn Fn() -> String + Send + Sync>;

/// Plumbing for one opened channel: the allocated id, the shared outbound
/// frame queue, and this channel's slice of the inbound stream.
pub struct RawChannel {
    pub id: u32,
    pub service: String,
    pub outbound: mpsc::UnboundedSender<Frame>,
    pub inbound: mpsc::UnboundedReceiver<Frame>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens a channel for the named service.
    async fn open_channel(&self, service: &str) -> Result<RawChannel>;

    /// Releases the connection. Safe to call more than once.
    async fn close(&self);
}
