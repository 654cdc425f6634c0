//! Serialization tests for control requests and the feed enum.

use tickwire::models::candle::{CandleQuery, Timeframe};
use tickwire::models::{FeedType, PingRequest, SubscriptionKey};
use tickwire::websocket::codec::{
    FrameKind, SubscribeParams, classify, encode_subscribe, encode_unsubscribe,
};
use tickwire::websocket::{Dispatched, FrameDispatcher, Listeners, SubscriptionRegistry};

#[test]
fn test_feed_type_wire_names() {
    assert_eq!(FeedType::Trades.as_str(), "trades");
    assert_eq!(FeedType::Candles.as_str(), "candles");
    assert_eq!(FeedType::from_wire("trades"), Some(FeedType::Trades));
    assert_eq!(FeedType::from_wire("candles"), Some(FeedType::Candles));
    assert_eq!(FeedType::from_wire("book"), None);
}

#[test]
fn test_ping_request_serializes() {
    let json = serde_json::to_string(&PingRequest::new(7)).expect("Failed to serialize ping");
    let value: serde_json::Value = serde_json::from_str(&json).expect("Failed to parse JSON");

    assert_eq!(value["event"], "ping");
    assert_eq!(value["cid"], 7);
}

#[test]
fn test_candle_subscribe_snaps_every_period() {
    let cases = [
        (None, "1m"),
        (Some(1), "1m"),
        (Some(240), "5m"),
        (Some(7_200), "1h"),
        (Some(15_000), "3h"),
        (Some(700_000), "1W"),
        (Some(2_000_000), "1M"),
    ];

    for (period, timeframe) in cases {
        let mut query = CandleQuery::new("tETHUSD");
        query.period_secs = period;
        let json = encode_subscribe(&SubscribeParams::Candles(query)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(
            value["key"],
            format!("trade:{timeframe}:tETHUSD/hist"),
            "period {period:?}"
        );
    }
}

#[test]
fn test_timeframes_are_ascending() {
    let seconds: Vec<u64> = Timeframe::ALL.iter().map(Timeframe::seconds).collect();
    assert!(seconds.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_unsubscribe_uses_chan_id_field() {
    let json = encode_unsubscribe(343351).unwrap();
    assert_eq!(json, r#"{"event":"unsubscribe","chanId":343351}"#);
}

#[test]
fn test_classify_tolerates_leading_whitespace() {
    assert_eq!(classify("\r\n\t{}").unwrap(), FrameKind::ControlObject);
    assert_eq!(classify(" []").unwrap(), FrameKind::DataArray);
}

#[test]
fn test_subscribe_acknowledge_round_trip_for_every_feed() {
    let registry = std::sync::Arc::new(std::sync::Mutex::new(SubscriptionRegistry::new()));
    let dispatcher =
        FrameDispatcher::new(std::sync::Arc::clone(&registry), std::sync::Arc::new(Listeners::new()));

    let subscriptions = [
        (
            SubscribeParams::Trades {
                symbol: "tBTCUSD".to_string(),
            },
            SubscriptionKey::new("tBTCUSD", FeedType::Trades),
        ),
        (
            SubscribeParams::Candles(CandleQuery::new("tETHUSD").with_period_secs(3_600)),
            SubscriptionKey::new("tETHUSD", FeedType::Candles),
        ),
    ];

    for (chan_id, (params, expected)) in (1_u64..).zip(subscriptions) {
        // Echo the request back the way the exchange acknowledges it.
        let request: serde_json::Value =
            serde_json::from_str(&encode_subscribe(&params).unwrap()).unwrap();
        let mut ack = request.clone();
        ack["event"] = "subscribed".into();
        ack["chanId"] = chan_id.into();

        let outcome = dispatcher.dispatch(&ack.to_string()).unwrap();
        assert_eq!(
            outcome,
            Dispatched::Acknowledged {
                chan_id,
                key: expected.clone(),
            }
        );
        assert_eq!(registry.lock().unwrap().resolve(chan_id).unwrap(), &expected);
    }
}
