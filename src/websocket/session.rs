//! Stream session lifecycle.
//!
//! [`StreamSession`] owns one websocket connection, the subscription
//! registry, and the background receive task. Subscribe and unsubscribe
//! calls may come from any task while the receive loop is running.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::SinkExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tungstenite::Message;

use super::codec::{self, SubscribeParams};
use super::handler::{DisconnectReason, FrameDispatcher, receive_loop};
use super::listeners::{ListenerId, Listeners};
use super::registry::SubscriptionRegistry;
use super::{WsReader, WsWriter, connect};
use crate::Result;
use crate::config::StreamConfig;
use crate::error::TickwireError;
use crate::models::candle::{Candle, CandleQuery};
use crate::models::trade::Trade;
use crate::models::{ChannelId, FeedType, PingRequest};

/// Lifecycle of a [`StreamSession`]. Sessions are single-use: once
/// `Closed`, build a new one to reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        }
    }
}

/// A multiplexed public market-data stream.
pub struct StreamSession {
    url: String,
    send_timeout: Duration,
    state: Arc<Mutex<SessionState>>,
    writer: Arc<tokio::sync::Mutex<Option<WsWriter>>>,
    registry: Arc<Mutex<SubscriptionRegistry>>,
    listeners: Arc<Listeners>,
    cancel: CancellationToken,
    terminated: CancellationToken,
    reader: Mutex<Option<JoinHandle<()>>>,
    ping_cid: AtomicU64,
}

impl StreamSession {
    /// Creates a disconnected session for `url`.
    #[must_use]
    pub fn new(url: impl Into<String>, send_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            send_timeout,
            state: Arc::new(Mutex::new(SessionState::Disconnected)),
            writer: Arc::new(tokio::sync::Mutex::new(None)),
            registry: Arc::new(Mutex::new(SubscriptionRegistry::new())),
            listeners: Arc::new(Listeners::new()),
            cancel: CancellationToken::new(),
            terminated: CancellationToken::new(),
            reader: Mutex::new(None),
            ping_cid: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub fn from_config(config: &StreamConfig) -> Self {
        Self::new(config.websocket_url.clone(), config.send_timeout)
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    fn set_state(&self, next: SessionState) {
        set_state(&self.state, next);
    }

    /// Opens the transport and starts the receive loop.
    ///
    /// # Errors
    ///
    /// Returns [`TickwireError::InvalidState`] unless the session is
    /// `Disconnected`, and [`TickwireError::Connection`] if the handshake
    /// fails or [`StreamSession::close`] runs before it completes. A failed
    /// handshake returns the session to `Disconnected`; a closed one stays
    /// `Closed`.
    pub async fn connect(&self) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state != SessionState::Disconnected {
                return Err(TickwireError::InvalidState {
                    expected: SessionState::Disconnected.as_str(),
                    actual: state.as_str(),
                });
            }
            *state = SessionState::Connecting;
        }

        info!(url = %self.url, "Connecting to WebSocket");
        let handshake = tokio::select! {
            biased;

            () = self.cancel.cancelled() => None,
            result = connect(&self.url) => Some(result),
        };
        let (write, read) = match handshake {
            Some(Ok(pair)) => pair,
            Some(Err(e)) => {
                self.reset_after_failed_handshake();
                return Err(TickwireError::Connection(e.to_string()));
            }
            None => return Err(closed_during_handshake()),
        };

        {
            // close() takes the writer under this lock, so it either sees the
            // stored writer and reader or we see its cancellation here.
            let mut writer = self.writer.lock().await;
            if self.cancel.is_cancelled() {
                drop(writer);
                self.discard_writer(write).await;
                return Err(closed_during_handshake());
            }
            *writer = Some(write);
            self.spawn_reader(read);
        }

        {
            // A concurrent close() or an early transport failure wins.
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state != SessionState::Connecting {
                return Err(TickwireError::Connection(format!(
                    "session {} during handshake",
                    state.as_str()
                )));
            }
            *state = SessionState::Connected;
        }
        info!("Session connected");

        Ok(())
    }

    /// Back to `Disconnected`, unless close() already moved the session on.
    fn reset_after_failed_handshake(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == SessionState::Connecting {
            debug!(from = "connecting", to = "disconnected", "Session state change");
            *state = SessionState::Disconnected;
        }
    }

    async fn discard_writer(&self, mut write: WsWriter) {
        match tokio::time::timeout(self.send_timeout, write.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Close handshake failed: {e}"),
            Err(_) => debug!("Close handshake timed out"),
        }
    }

    fn spawn_reader(&self, read: WsReader) {
        let dispatcher = FrameDispatcher::new(Arc::clone(&self.registry), Arc::clone(&self.listeners));
        let cancel = self.cancel.clone();
        let terminated = self.terminated.clone();
        let state = Arc::clone(&self.state);
        let writer = Arc::clone(&self.writer);
        let registry = Arc::clone(&self.registry);

        let handle = tokio::spawn(async move {
            let reason = receive_loop(read, dispatcher, cancel).await;
            if reason != DisconnectReason::Cancelled {
                warn!(?reason, "Receive loop terminated, closing session");
                writer.lock().await.take();
                registry
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clear();
                set_state(&state, SessionState::Closed);
            }
            terminated.cancel();
        });

        *self.reader.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    fn ensure_connected(&self) -> Result<()> {
        let state = self.state();
        if state != SessionState::Connected {
            return Err(TickwireError::InvalidState {
                expected: SessionState::Connected.as_str(),
                actual: state.as_str(),
            });
        }
        Ok(())
    }

    /// Sends one text frame, bounded by the send timeout. Resolves once the
    /// transport has accepted the frame.
    async fn send_text(&self, json: String) -> Result<()> {
        self.ensure_connected()?;
        let mut guard = self.writer.lock().await;
        let Some(write) = guard.as_mut() else {
            return Err(TickwireError::InvalidState {
                expected: SessionState::Connected.as_str(),
                actual: self.state().as_str(),
            });
        };

        debug!("Sending frame: {}", json);
        match tokio::time::timeout(self.send_timeout, write.send(Message::Text(json.into()))).await {
            Ok(result) => result.map_err(TickwireError::from),
            Err(_) => Err(TickwireError::SendTimeout(self.send_timeout)),
        }
    }

    /// Requests a subscription. Does not wait for the acknowledgement; the
    /// channel is registered when the server's `subscribed` event arrives.
    ///
    /// # Errors
    ///
    /// Returns [`TickwireError::InvalidState`] when not connected, or the
    /// transport error if the frame could not be sent.
    pub async fn subscribe(&self, params: &SubscribeParams) -> Result<()> {
        self.ensure_connected()?;
        let json = codec::encode_subscribe(params)?;
        self.send_text(json).await?;
        info!(?params, "Subscribe request sent");

        Ok(())
    }

    /// # Errors
    ///
    /// See [`StreamSession::subscribe`].
    pub async fn subscribe_trades(&self, symbol: &str) -> Result<()> {
        self.subscribe(&SubscribeParams::Trades {
            symbol: symbol.to_string(),
        })
        .await
    }

    /// # Errors
    ///
    /// See [`StreamSession::subscribe`].
    pub async fn subscribe_candles(&self, query: &CandleQuery) -> Result<()> {
        self.subscribe(&SubscribeParams::Candles(query.clone())).await
    }

    /// Releases the channel bound to `(symbol, feed)` and tells the server.
    ///
    /// Returns `Ok(false)` without sending anything when no channel is
    /// bound to the key.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the unsubscribe frame could not be
    /// sent. The local binding is released either way.
    pub async fn unsubscribe(&self, symbol: &str, feed: FeedType) -> Result<bool> {
        let chan_id = {
            let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry.remove_by_key(symbol, feed)
        };
        let Some(chan_id) = chan_id else {
            debug!(symbol, feed = feed.as_str(), "No active channel, nothing to unsubscribe");
            return Ok(false);
        };

        let json = codec::encode_unsubscribe(chan_id)?;
        self.send_text(json).await?;
        info!(chan_id, symbol, feed = feed.as_str(), "Unsubscribed from channel");

        Ok(true)
    }

    /// # Errors
    ///
    /// See [`StreamSession::unsubscribe`].
    pub async fn unsubscribe_trades(&self, symbol: &str) -> Result<bool> {
        self.unsubscribe(symbol, FeedType::Trades).await
    }

    /// # Errors
    ///
    /// See [`StreamSession::unsubscribe`].
    pub async fn unsubscribe_candles(&self, symbol: &str) -> Result<bool> {
        self.unsubscribe(symbol, FeedType::Candles).await
    }

    /// Sends a `ping` control event; the server answers with `pong`.
    ///
    /// # Errors
    ///
    /// Returns [`TickwireError::InvalidState`] when not connected, or the
    /// transport error if the frame could not be sent.
    pub async fn ping(&self) -> Result<()> {
        let cid = self.ping_cid.fetch_add(1, Ordering::Relaxed);
        let json = serde_json::to_string(&PingRequest::new(cid))?;
        self.send_text(json).await?;
        debug!(cid, "Sent ping");

        Ok(())
    }

    /// Channel currently bound to `(symbol, feed)`, if acknowledged.
    pub fn channel_for(&self, symbol: &str, feed: FeedType) -> Option<ChannelId> {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .channel_of(symbol, feed)
    }

    pub fn on_buy_trade<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&Trade) + Send + Sync + 'static,
    {
        self.listeners.on_buy_trade(callback)
    }

    pub fn on_sell_trade<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&Trade) + Send + Sync + 'static,
    {
        self.listeners.on_sell_trade(callback)
    }

    pub fn on_candle<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&Candle) + Send + Sync + 'static,
    {
        self.listeners.on_candle(callback)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Resolves once the receive loop has stopped, whether through
    /// [`StreamSession::close`] or because the transport ended.
    pub async fn closed(&self) {
        self.terminated.cancelled().await;
    }

    /// Stops the receive loop, closes the transport and drops all channel
    /// bindings. Calling it again, or on a session that never connected, is
    /// a no-op beyond reaching `Closed`.
    pub async fn close(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            match *state {
                SessionState::Closing | SessionState::Closed => return,
                SessionState::Disconnected => {
                    *state = SessionState::Closed;
                    self.cancel.cancel();
                    self.terminated.cancel();
                    return;
                }
                SessionState::Connecting | SessionState::Connected => {
                    *state = SessionState::Closing;
                }
            }
        }

        info!("Closing session");
        self.cancel.cancel();

        let write = self.writer.lock().await.take();
        if let Some(write) = write {
            self.discard_writer(write).await;
        }

        let handle = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Receive task failed: {e}");
            }
        } else {
            self.terminated.cancel();
        }

        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.set_state(SessionState::Closed);
        info!("Session closed");
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn closed_during_handshake() -> TickwireError {
    TickwireError::Connection("session closed during handshake".to_string())
}

fn set_state(state: &Mutex<SessionState>, next: SessionState) {
    let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
    debug!(from = guard.as_str(), to = next.as_str(), "Session state change");
    *guard = next;
}
