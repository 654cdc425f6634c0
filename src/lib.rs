//! Bitfinex v2 public market-data client.
//!
//! Multiplexes trades and candles subscriptions over one websocket,
//! maps server-issued channel ids back to `(instrument, feed)` pairs, and
//! republishes each decoded update to registered listeners.

pub mod config;
pub mod error;
pub mod models;
pub mod websocket;

pub use error::{Result, TickwireError};
