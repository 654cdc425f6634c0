//! Async WebSocket client for the Bitfinex v2 public channels.
//!
//! This module is organized by concern:
//! - [`codec`] - Control message encoding and raw frame decoding
//! - [`registry`] - Channel id to subscription bookkeeping
//! - [`handler`] - Frame routing and the receive loop
//! - [`listeners`] - Per-feed event sinks
//! - [`session`] - Connection lifecycle and the public entry points

pub mod codec;
pub mod handler;
pub mod listeners;
pub mod registry;
pub mod session;

use futures_util::StreamExt;
use futures_util::stream::{SplitSink, SplitStream};
use tokio::net::TcpStream;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::info;
use tungstenite::Message;

use crate::Result;

pub use codec::SubscribeParams;
pub use handler::{Dispatched, FrameDispatcher};
pub use listeners::{ListenerId, Listeners};
pub use registry::SubscriptionRegistry;
pub use session::{SessionState, StreamSession};

/// Write half of a websocket connection.
pub type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Read half of a websocket connection.
pub type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Establishes a WebSocket connection to the given URL.
///
/// # Errors
///
/// Returns a [`TickwireError`](crate::TickwireError) if the connection or TLS handshake fails.
pub async fn connect(url: &str) -> Result<(WsWriter, WsReader)> {
    // Err means a provider is already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let (ws_stream, _) = connect_async(url).await?;
    info!("WebSocket handshake completed");

    Ok(ws_stream.split())
}
