//! Crate-level error types.
//!
//! [`TickwireError`] unifies every error source (configuration, transport,
//! JSON, frame decoding) behind a single enum so callers can match on the
//! variant they care about while still using the `?` operator for easy
//! propagation.
//!
//! Only [`TickwireError::Connection`], [`TickwireError::WebSocket`] and the
//! send-path variants ever reach callers of the session. The frame-level
//! variants are produced inside the receive loop, logged there, and the
//! offending frame or element is dropped.

use crate::models::{ChannelId, FeedType, SubscriptionKey};

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TickwireError>;

/// Top-level error type returned by all public APIs.
#[derive(Debug, thiserror::Error)]
pub enum TickwireError {
    /// An environment variable held an unusable value.
    #[error("configuration error: {0}")]
    Config(String),

    /// The transport could not be opened or was lost.
    #[error("connection error: {0}")]
    Connection(String),

    /// A WebSocket operation (connect, send, receive) failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A frame did not have any recognised top-level shape.
    #[error("malformed frame: {0}")]
    Decode(String),

    /// A data frame referenced a channel with no registry entry.
    #[error("unknown channel {0}")]
    UnknownChannel(ChannelId),

    /// A feed decoder rejected one positional element.
    #[error("malformed {feed} payload: {reason}")]
    MalformedPayload { feed: FeedType, reason: String },

    /// The server acknowledged a channel id that is already registered.
    #[error("channel {0} is already registered")]
    DuplicateChannel(ChannelId),

    /// The server acknowledged a second channel for an already-active key.
    #[error("{key} is already bound to channel {existing}, rejected channel {rejected}")]
    DuplicateSubscription {
        key: SubscriptionKey,
        existing: ChannelId,
        rejected: ChannelId,
    },

    /// The operation is not valid in the session's current state.
    #[error("session is {actual}, operation requires {expected}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    /// An outbound frame was not accepted by the transport in time.
    #[error("send timed out after {0:?}")]
    SendTimeout(std::time::Duration),
}
