//! Candles channel models and candle-key construction.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

use super::{FeedType, decimal_at, field_error, float_decimal_at, millis_at};
use crate::Result;
use crate::error::TickwireError;

/// A single OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candle {
    pub symbol: String,
    /// Start of the candle's time window, truncated to whole seconds.
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    /// Decodes `[mts, open, close, high, low, volume]`.
    ///
    /// # Errors
    ///
    /// Returns [`TickwireError::MalformedPayload`] unless exactly six fields
    /// are present and each has the expected type.
    pub fn from_positional(symbol: &str, values: &[Value]) -> Result<Self> {
        if values.len() != 6 {
            return Err(TickwireError::MalformedPayload {
                feed: FeedType::Candles,
                reason: format!("expected 6 fields, got {}", values.len()),
            });
        }

        let secs = millis_at(values, 0, FeedType::Candles)? / 1000;
        let open_time = DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| field_error(FeedType::Candles, 0, "a valid timestamp", &values[0]))?;

        Ok(Self {
            symbol: symbol.to_string(),
            open_time,
            open: decimal_at(values, 1, FeedType::Candles)?,
            close: decimal_at(values, 2, FeedType::Candles)?,
            high: decimal_at(values, 3, FeedType::Candles)?,
            low: decimal_at(values, 4, FeedType::Candles)?,
            volume: float_decimal_at(values, 5, FeedType::Candles)?,
        })
    }
}

/// Candle intervals accepted by the exchange, in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeframe {
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    ThreeHours,
    SixHours,
    TwelveHours,
    OneDay,
    OneWeek,
    FourteenDays,
    OneMonth,
}

impl Timeframe {
    pub const ALL: [Timeframe; 12] = [
        Timeframe::OneMinute,
        Timeframe::FiveMinutes,
        Timeframe::FifteenMinutes,
        Timeframe::ThirtyMinutes,
        Timeframe::OneHour,
        Timeframe::ThreeHours,
        Timeframe::SixHours,
        Timeframe::TwelveHours,
        Timeframe::OneDay,
        Timeframe::OneWeek,
        Timeframe::FourteenDays,
        Timeframe::OneMonth,
    ];

    /// Returns the wire-format interval name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::OneMinute => "1m",
            Timeframe::FiveMinutes => "5m",
            Timeframe::FifteenMinutes => "15m",
            Timeframe::ThirtyMinutes => "30m",
            Timeframe::OneHour => "1h",
            Timeframe::ThreeHours => "3h",
            Timeframe::SixHours => "6h",
            Timeframe::TwelveHours => "12h",
            Timeframe::OneDay => "1D",
            Timeframe::OneWeek => "1W",
            Timeframe::FourteenDays => "14D",
            Timeframe::OneMonth => "1M",
        }
    }

    pub fn seconds(&self) -> u64 {
        match self {
            Timeframe::OneMinute => 60,
            Timeframe::FiveMinutes => 300,
            Timeframe::FifteenMinutes => 900,
            Timeframe::ThirtyMinutes => 1_800,
            Timeframe::OneHour => 3_600,
            Timeframe::ThreeHours => 10_800,
            Timeframe::SixHours => 21_600,
            Timeframe::TwelveHours => 43_200,
            Timeframe::OneDay => 86_400,
            Timeframe::OneWeek => 604_800,
            Timeframe::FourteenDays => 1_209_600,
            Timeframe::OneMonth => 2_592_000,
        }
    }

    /// Picks the interval whose length is closest to `seconds`.
    ///
    /// Ties go to the shorter interval.
    pub fn nearest(seconds: u64) -> Self {
        let mut best = Timeframe::OneMinute;
        for tf in Self::ALL {
            if tf.seconds().abs_diff(seconds) < best.seconds().abs_diff(seconds) {
                best = tf;
            }
        }
        best
    }
}

/// Parameters for a candles subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandleQuery {
    pub symbol: String,
    /// Requested candle length; snapped to the nearest [`Timeframe`].
    pub period_secs: Option<u64>,
}

impl CandleQuery {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            period_secs: None,
        }
    }

    #[must_use]
    pub fn with_period_secs(mut self, secs: u64) -> Self {
        self.period_secs = Some(secs);
        self
    }

    pub fn timeframe(&self) -> Timeframe {
        self.period_secs
            .map_or(Timeframe::OneMinute, Timeframe::nearest)
    }

    /// Builds the `trade:<timeframe>:<symbol>/hist` subscription key.
    pub fn key(&self) -> String {
        format!("trade:{}:{}/hist", self.timeframe().as_str(), self.symbol)
    }
}

/// Extracts the instrument from a candle key such as `trade:1m:tBTCUSD/hist`.
pub fn symbol_from_key(key: &str) -> Option<&str> {
    let rest = key.strip_prefix("trade:")?;
    let (_, symbol) = rest.split_once(':')?;
    let symbol = symbol.strip_suffix("/hist").unwrap_or(symbol);
    (!symbol.is_empty()).then_some(symbol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn decodes_six_field_candle() {
        let values = json!([1700000000000_i64, 100, 105, 110, 95, 12.5]);
        let candle = Candle::from_positional("tBTCUSD", values.as_array().unwrap()).unwrap();

        assert_eq!(candle.open_time.timestamp(), 1_700_000_000);
        assert_eq!(candle.open, dec!(100));
        assert_eq!(candle.close, dec!(105));
        assert_eq!(candle.high, dec!(110));
        assert_eq!(candle.low, dec!(95));
        assert_eq!(candle.volume, dec!(12.5));
    }

    #[test]
    fn rejects_short_candle() {
        let values = json!([1700000000000_i64, 100, 105, 110, 95]);
        let err = Candle::from_positional("tBTCUSD", values.as_array().unwrap()).unwrap_err();
        assert!(err.to_string().contains("expected 6 fields, got 5"));
    }

    #[test]
    fn nearest_timeframe() {
        assert_eq!(Timeframe::nearest(50), Timeframe::OneMinute);
        assert_eq!(Timeframe::nearest(0), Timeframe::OneMinute);
        assert_eq!(Timeframe::nearest(3_000), Timeframe::OneHour);
        assert_eq!(Timeframe::nearest(90_000), Timeframe::OneDay);
        assert_eq!(Timeframe::nearest(u64::MAX), Timeframe::OneMonth);
    }

    #[test]
    fn equidistant_period_picks_shorter_interval() {
        // 180 is 120s from both 1m and 5m.
        assert_eq!(Timeframe::nearest(180), Timeframe::OneMinute);
    }

    #[test]
    fn candle_key_defaults_to_one_minute() {
        assert_eq!(CandleQuery::new("tBTCUSD").key(), "trade:1m:tBTCUSD/hist");
        assert_eq!(
            CandleQuery::new("tETHUSD").with_period_secs(4_000).key(),
            "trade:1h:tETHUSD/hist"
        );
    }

    #[test]
    fn symbol_from_candle_key() {
        assert_eq!(symbol_from_key("trade:1m:tBTCUSD/hist"), Some("tBTCUSD"));
        assert_eq!(symbol_from_key("trade:1D:tETHUSD"), Some("tETHUSD"));
        assert_eq!(symbol_from_key("funding:1m"), None);
        assert_eq!(symbol_from_key("trade:1m:"), None);
    }
}
