//! Shared models for the Bitfinex v2 public websocket feeds.
//!
//! Contains feed definitions, subscription keys, control request types,
//! and the positional-array readers the feed decoders are built on.

pub mod candle;
pub mod trade;

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;
use crate::error::TickwireError;

/// Server-issued identifier of one active subscription on the shared stream.
pub type ChannelId = u64;

/// Market-data feeds the multiplexer can route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedType {
    Trades,
    Candles,
}

impl FeedType {
    /// Returns the wire-format channel name expected by the Bitfinex API.
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedType::Trades => "trades",
            FeedType::Candles => "candles",
        }
    }

    /// Maps a wire channel name back to a feed, if it is one we route.
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "trades" => Some(FeedType::Trades),
            "candles" => Some(FeedType::Candles),
            _ => None,
        }
    }
}

impl fmt::Display for FeedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-facing identity of a subscription: one instrument on one feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub symbol: String,
    pub feed: FeedType,
}

impl SubscriptionKey {
    pub fn new(symbol: impl Into<String>, feed: FeedType) -> Self {
        Self {
            symbol: symbol.into(),
            feed,
        }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.feed, self.symbol)
    }
}

/// Trade direction, inferred from the sign of the traded amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

/// A `subscribe` control message for the trades channel.
#[derive(Debug, Serialize)]
pub struct TradesSubscribeRequest {
    pub event: String,
    pub channel: String,
    pub symbol: String,
}

impl TradesSubscribeRequest {
    pub fn new(symbol: &str) -> Self {
        Self {
            event: "subscribe".to_string(),
            channel: FeedType::Trades.as_str().to_string(),
            symbol: symbol.to_string(),
        }
    }
}

/// A `subscribe` control message for the candles channel.
#[derive(Debug, Serialize)]
pub struct CandlesSubscribeRequest {
    pub event: String,
    pub channel: String,
    /// Composite `trade:<timeframe>:<symbol>/hist` key.
    pub key: String,
}

impl CandlesSubscribeRequest {
    pub fn new(key: String) -> Self {
        Self {
            event: "subscribe".to_string(),
            channel: FeedType::Candles.as_str().to_string(),
            key,
        }
    }
}

/// An `unsubscribe` control message, addressed by channel id.
#[derive(Debug, Serialize)]
pub struct UnsubscribeRequest {
    pub event: String,
    #[serde(rename = "chanId")]
    pub chan_id: ChannelId,
}

impl UnsubscribeRequest {
    pub fn new(chan_id: ChannelId) -> Self {
        Self {
            event: "unsubscribe".to_string(),
            chan_id,
        }
    }
}

/// A `ping` control message used to test connection liveness.
#[derive(Debug, Serialize)]
pub struct PingRequest {
    pub event: String,
    pub cid: u64,
}

impl PingRequest {
    pub fn new(cid: u64) -> Self {
        Self {
            event: "ping".to_string(),
            cid,
        }
    }
}

/// Any control object received from the server (`subscribed`, `error`,
/// `info`, ...). Fields absent from a given event are left as `None`.
#[derive(Debug, Clone, Deserialize)]
pub struct ControlMessage {
    pub event: String,
    #[serde(rename = "chanId")]
    pub chan_id: Option<ChannelId>,
    pub channel: Option<String>,
    pub symbol: Option<String>,
    pub pair: Option<String>,
    pub key: Option<String>,
    pub code: Option<i64>,
    pub msg: Option<String>,
    pub version: Option<u64>,
}

impl ControlMessage {
    /// Instrument named by a `subscribed` acknowledgement.
    ///
    /// Prefers `symbol`, then the instrument embedded in a candle `key`,
    /// then `pair`, so the result matches what the subscriber sent.
    pub fn instrument(&self) -> Option<String> {
        if let Some(symbol) = &self.symbol {
            return Some(symbol.clone());
        }
        if let Some(symbol) = self.key.as_deref().and_then(candle::symbol_from_key) {
            return Some(symbol.to_string());
        }
        self.pair.clone()
    }
}

/// Reads a positional field as an exact decimal.
///
/// Numbers are parsed from their JSON text, so `-0.0066` stays `-0.0066`.
pub(crate) fn decimal_at(values: &[Value], index: usize, feed: FeedType) -> Result<Decimal> {
    let text = match &values[index] {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => return Err(field_error(feed, index, "a number", other)),
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| TickwireError::MalformedPayload {
            feed,
            reason: format!("index {index}: {e}"),
        })
}

/// Reads a positional field through `f64`, matching the exchange's own
/// double round-trip for volumes.
pub(crate) fn float_decimal_at(values: &[Value], index: usize, feed: FeedType) -> Result<Decimal> {
    let value = &values[index];
    value
        .as_f64()
        .and_then(Decimal::from_f64)
        .ok_or_else(|| field_error(feed, index, "a finite number", value))
}

/// Reads a positional field as integer milliseconds.
pub(crate) fn millis_at(values: &[Value], index: usize, feed: FeedType) -> Result<i64> {
    let value = &values[index];
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
        .ok_or_else(|| field_error(feed, index, "integer milliseconds", value))
}

pub(crate) fn field_error(feed: FeedType, index: usize, expected: &str, got: &Value) -> TickwireError {
    TickwireError::MalformedPayload {
        feed,
        reason: format!("index {index}: expected {expected}, got {got}"),
    }
}
