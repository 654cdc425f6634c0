//! Per-feed event sinks.
//!
//! Callbacks run synchronously on the receive task, in registration order.
//! The sink list is snapshotted before invoking, so a callback may register
//! or remove listeners without deadlocking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::models::candle::Candle;
use crate::models::trade::Trade;

/// Handle returned by a registration, used to unregister later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Ordered list of callbacks for one event category.
pub struct Sinks<T> {
    entries: Mutex<Vec<(ListenerId, Callback<T>)>>,
}

impl<T> Default for Sinks<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl<T> Sinks<T> {
    fn add(&self, id: ListenerId, callback: Callback<T>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, callback));
    }

    fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    /// Invokes every registered callback with `event`.
    pub fn publish(&self, event: &T) {
        let snapshot: Vec<Callback<T>> = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in snapshot {
            callback(event);
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Event sinks for every published category.
#[derive(Default)]
pub struct Listeners {
    next_id: AtomicU64,
    pub buy_trades: Sinks<Trade>,
    pub sell_trades: Sinks<Trade>,
    pub candles: Sinks<Candle>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn on_buy_trade<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&Trade) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.buy_trades.add(id, Arc::new(callback));
        id
    }

    pub fn on_sell_trade<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&Trade) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.sell_trades.add(id, Arc::new(callback));
        id
    }

    pub fn on_candle<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&Candle) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.candles.add(id, Arc::new(callback));
        id
    }

    /// Unregisters a callback. Returns `false` if `id` was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        self.buy_trades.remove(id) || self.sell_trades.remove(id) || self.candles.remove(id)
    }
}
