//! Incoming frame classification, routing, and the receive loop.

use std::sync::{Arc, Mutex, PoisonError};

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use tungstenite::Message;

use super::WsReader;
use super::codec::{self, DataPayload, FrameKind};
use super::listeners::Listeners;
use super::registry::SubscriptionRegistry;
use crate::Result;
use crate::error::TickwireError;
use crate::models::candle::Candle;
use crate::models::trade::Trade;
use crate::models::{ChannelId, ControlMessage, FeedType, Side, SubscriptionKey};

/// What a single frame turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    /// A `subscribed` event bound a channel id.
    Acknowledged { chan_id: ChannelId, key: SubscriptionKey },
    /// Any other control event, by name.
    Control(String),
    Heartbeat(ChannelId),
    /// A `"tu"` repeat of an execution that was already published.
    Repeated(ChannelId),
    /// A data frame: `published` events went out, `rejected` elements were
    /// dropped by the feed decoder.
    Data {
        chan_id: ChannelId,
        published: usize,
        rejected: usize,
    },
}

/// Routes decoded frames to the registry or to the feed decoders and sinks.
#[derive(Clone)]
pub struct FrameDispatcher {
    registry: Arc<Mutex<SubscriptionRegistry>>,
    listeners: Arc<Listeners>,
}

impl FrameDispatcher {
    pub fn new(registry: Arc<Mutex<SubscriptionRegistry>>, listeners: Arc<Listeners>) -> Self {
        Self {
            registry,
            listeners,
        }
    }

    /// Handles one complete inbound message.
    ///
    /// # Errors
    ///
    /// Returns the frame-level error that caused the frame to be dropped:
    /// [`TickwireError::Decode`], [`TickwireError::UnknownChannel`],
    /// [`TickwireError::DuplicateChannel`] or
    /// [`TickwireError::DuplicateSubscription`]. Malformed elements inside a
    /// data frame are not errors; they are counted in [`Dispatched::Data`].
    pub fn dispatch(&self, text: &str) -> Result<Dispatched> {
        match codec::classify(text)? {
            FrameKind::ControlObject => self.handle_control(codec::decode_control(text)?),
            FrameKind::DataArray => {
                let (chan_id, payload) = codec::decode_data_array(text)?;
                self.handle_data(chan_id, payload)
            }
        }
    }

    fn handle_control(&self, control: ControlMessage) -> Result<Dispatched> {
        match control.event.as_str() {
            "subscribed" => self.handle_subscribed(&control),
            "error" => {
                warn!(code = ?control.code, msg = ?control.msg, "Server reported error");
                Ok(Dispatched::Control(control.event))
            }
            "info" => {
                info!(version = ?control.version, msg = ?control.msg, "Server info");
                Ok(Dispatched::Control(control.event))
            }
            other => {
                debug!(event = other, chan_id = ?control.chan_id, "Ignoring control event");
                Ok(Dispatched::Control(control.event))
            }
        }
    }

    fn handle_subscribed(&self, control: &ControlMessage) -> Result<Dispatched> {
        let chan_id = control
            .chan_id
            .ok_or_else(|| TickwireError::Decode("subscribed event without chanId".to_string()))?;
        let channel = control
            .channel
            .as_deref()
            .ok_or_else(|| TickwireError::Decode("subscribed event without channel".to_string()))?;
        let feed = FeedType::from_wire(channel)
            .ok_or_else(|| TickwireError::Decode(format!("unsupported channel {channel:?}")))?;
        let symbol = control.instrument().ok_or_else(|| {
            TickwireError::Decode("subscribed event without instrument".to_string())
        })?;

        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record_acknowledgement(chan_id, &symbol, feed)?;
        info!(chan_id, symbol, feed = feed.as_str(), "Subscription acknowledged");

        Ok(Dispatched::Acknowledged {
            chan_id,
            key: SubscriptionKey::new(symbol, feed),
        })
    }

    fn handle_data(&self, chan_id: ChannelId, payload: DataPayload) -> Result<Dispatched> {
        if payload == DataPayload::Heartbeat {
            trace!(chan_id, "Received heartbeat");
            return Ok(Dispatched::Heartbeat(chan_id));
        }
        if payload == DataPayload::ExecutionUpdate {
            trace!(chan_id, "Skipped execution update");
            return Ok(Dispatched::Repeated(chan_id));
        }

        // Clone the key so no lock is held while sinks run.
        let key = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .resolve(chan_id)?
            .clone();

        let mut published = 0;
        let mut rejected = 0;
        for values in payload.into_elements() {
            match self.publish_element(&key, &values) {
                Ok(()) => published += 1,
                Err(e) => {
                    rejected += 1;
                    warn!(chan_id, symbol = key.symbol, error = %e, "Dropped malformed element");
                }
            }
        }

        Ok(Dispatched::Data {
            chan_id,
            published,
            rejected,
        })
    }

    fn publish_element(&self, key: &SubscriptionKey, values: &[serde_json::Value]) -> Result<()> {
        match key.feed {
            FeedType::Trades => {
                let trade = Trade::from_positional(&key.symbol, values)?;
                match trade.side {
                    Side::Buy => self.listeners.buy_trades.publish(&trade),
                    Side::Sell => self.listeners.sell_trades.publish(&trade),
                }
            }
            FeedType::Candles => {
                let candle = Candle::from_positional(&key.symbol, values)?;
                self.listeners.candles.publish(&candle);
            }
        }
        Ok(())
    }

    /// Dispatches a frame and logs, rather than returns, any failure.
    pub fn process_frame(&self, text: &str) {
        match self.dispatch(text) {
            Ok(outcome) => trace!(?outcome, "Dispatched frame"),
            Err(TickwireError::UnknownChannel(chan_id)) => {
                warn!(chan_id, "Dropped frame for unknown channel");
            }
            Err(
                e @ (TickwireError::DuplicateChannel(_)
                | TickwireError::DuplicateSubscription { .. }),
            ) => {
                warn!(error = %e, "Rejected acknowledgement");
            }
            Err(e) => warn!(error = %e, "Dropped malformed frame"),
        }
    }
}

/// Why the receive loop exited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The session was closed locally.
    Cancelled,
    /// The server sent a close frame or the stream ended.
    ServerClosed,
    /// Reading from the transport failed.
    ConnectionError(String),
}

/// Reads frames until cancelled or the transport ends.
///
/// Per-frame failures are logged and skipped; only the transport ending
/// stops the loop. Fragmented messages arrive here already reassembled.
pub async fn receive_loop(
    mut read: WsReader,
    dispatcher: FrameDispatcher,
    cancel: CancellationToken,
) -> DisconnectReason {
    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => return DisconnectReason::Cancelled,

            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => dispatcher.process_frame(text.as_str()),
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => dispatcher.process_frame(text),
                    Err(e) => warn!(error = %e, "Dropped non UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    info!(?frame, "Server closed the stream");
                    return DisconnectReason::ServerClosed;
                }
                Some(Ok(_)) => {} // Ping/Pong/Frame
                Some(Err(e)) => {
                    warn!("WebSocket error: {e}");
                    return DisconnectReason::ConnectionError(e.to_string());
                }
                None => {
                    warn!("WebSocket stream ended");
                    return DisconnectReason::ServerClosed;
                }
            }
        }
    }
}
