//! Trades channel models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

use super::{FeedType, Side, decimal_at, field_error, millis_at};
use crate::Result;
use crate::error::TickwireError;

/// A single executed trade.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub symbol: String,
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Signed amount: positive for buys, negative for sells.
    pub amount: Decimal,
    pub price: Decimal,
    pub side: Side,
}

impl Trade {
    /// Decodes `[id, mts, amount, price]`.
    ///
    /// A fifth trailing element (sent on some funding feeds) is accepted and
    /// ignored. Any other length is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`TickwireError::MalformedPayload`] on a wrong length or when a
    /// field has the wrong type.
    pub fn from_positional(symbol: &str, values: &[Value]) -> Result<Self> {
        if !matches!(values.len(), 4 | 5) {
            return Err(TickwireError::MalformedPayload {
                feed: FeedType::Trades,
                reason: format!("expected 4 or 5 fields, got {}", values.len()),
            });
        }

        let id = match &values[0] {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            other => return Err(field_error(FeedType::Trades, 0, "a trade id", other)),
        };
        let millis = millis_at(values, 1, FeedType::Trades)?;
        let timestamp = DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| field_error(FeedType::Trades, 1, "a valid timestamp", &values[1]))?;
        let amount = decimal_at(values, 2, FeedType::Trades)?;
        let price = decimal_at(values, 3, FeedType::Trades)?;

        Ok(Self {
            symbol: symbol.to_string(),
            id,
            timestamp,
            amount,
            price,
            side: side_of(amount),
        })
    }
}

/// Positive amounts are buys; zero and negative amounts are sells.
pub fn side_of(amount: Decimal) -> Side {
    if amount > Decimal::ZERO {
        Side::Buy
    } else {
        Side::Sell
    }
}
