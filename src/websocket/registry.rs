//! Channel-id to subscription-key bookkeeping.

use std::collections::HashMap;

use tracing::debug;

use crate::Result;
use crate::error::TickwireError;
use crate::models::{ChannelId, FeedType, SubscriptionKey};

/// Maps server-issued channel ids to the subscription they carry.
///
/// Not synchronized on its own; the session wraps it in a mutex shared by
/// the receive loop and caller-facing operations.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    channels: HashMap<ChannelId, SubscriptionKey>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `chan_id` to `(symbol, feed)` after a `subscribed` event.
    ///
    /// # Errors
    ///
    /// Returns [`TickwireError::DuplicateChannel`] if the id is already bound
    /// and [`TickwireError::DuplicateSubscription`] if the key already has a
    /// channel. The existing entry is kept in both cases.
    pub fn record_acknowledgement(
        &mut self,
        chan_id: ChannelId,
        symbol: &str,
        feed: FeedType,
    ) -> Result<()> {
        if self.channels.contains_key(&chan_id) {
            return Err(TickwireError::DuplicateChannel(chan_id));
        }

        let key = SubscriptionKey::new(symbol, feed);
        if let Some(existing) = self.channel_of(&key.symbol, feed) {
            return Err(TickwireError::DuplicateSubscription {
                key,
                existing,
                rejected: chan_id,
            });
        }

        debug!(chan_id, %key, "Registered channel");
        self.channels.insert(chan_id, key);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`TickwireError::UnknownChannel`] if `chan_id` is not bound.
    pub fn resolve_feed_type(&self, chan_id: ChannelId) -> Result<FeedType> {
        self.resolve(chan_id).map(|key| key.feed)
    }

    /// # Errors
    ///
    /// Returns [`TickwireError::UnknownChannel`] if `chan_id` is not bound.
    pub fn resolve_instrument(&self, chan_id: ChannelId) -> Result<&str> {
        self.resolve(chan_id).map(|key| key.symbol.as_str())
    }

    /// # Errors
    ///
    /// Returns [`TickwireError::UnknownChannel`] if `chan_id` is not bound.
    pub fn resolve(&self, chan_id: ChannelId) -> Result<&SubscriptionKey> {
        self.channels
            .get(&chan_id)
            .ok_or(TickwireError::UnknownChannel(chan_id))
    }

    /// Removes the channel bound to `(symbol, feed)` and returns its id.
    ///
    /// Returns `None` when nothing matches; callers treat that as a no-op.
    pub fn remove_by_key(&mut self, symbol: &str, feed: FeedType) -> Option<ChannelId> {
        let chan_id = self.channel_of(symbol, feed)?;
        self.channels.remove(&chan_id);
        debug!(chan_id, symbol, %feed, "Released channel");
        Some(chan_id)
    }

    /// Channel bound to `(symbol, feed)`, if any.
    ///
    /// Linear scan: channels of the right feed first, then the symbol match.
    /// Channel counts per session are small.
    pub fn channel_of(&self, symbol: &str, feed: FeedType) -> Option<ChannelId> {
        self.channels
            .iter()
            .filter(|(_, key)| key.feed == feed)
            .find(|(_, key)| key.symbol == symbol)
            .map(|(chan_id, _)| *chan_id)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn clear(&mut self) {
        self.channels.clear();
    }
}
