//! Wire codec: control message encoding and raw frame decoding.
//!
//! Inbound frames come in two top-level shapes. Control objects carry an
//! `event` field. Data arrays start with a channel id, followed by either a
//! batch of positional arrays, a single positional array, an update tag plus
//! a positional array, or the heartbeat marker `"hb"`. A trade execution is
//! sent twice, as `"te"` and then as `"tu"`; only the `"te"` copy is kept.

use serde_json::Value;

use crate::Result;
use crate::error::TickwireError;
use crate::models::candle::CandleQuery;
use crate::models::{
    CandlesSubscribeRequest, ChannelId, ControlMessage, TradesSubscribeRequest,
    UnsubscribeRequest,
};

/// Top-level shape of an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    ControlObject,
    DataArray,
}

/// Payload carried by a data array.
#[derive(Debug, Clone, PartialEq)]
pub enum DataPayload {
    /// One positional value array.
    Single(Vec<Value>),
    /// A snapshot of positional value arrays, in wire order.
    Batch(Vec<Vec<Value>>),
    /// `[chanId, "hb"]` keep-alive.
    Heartbeat,
    /// `[chanId, "tu", [..]]`, the second copy of an execution already
    /// delivered under `"te"`.
    ExecutionUpdate,
}

impl DataPayload {
    /// Positional arrays in the payload, in wire order.
    pub fn into_elements(self) -> Vec<Vec<Value>> {
        match self {
            DataPayload::Single(values) => vec![values],
            DataPayload::Batch(elements) => elements,
            DataPayload::Heartbeat | DataPayload::ExecutionUpdate => Vec::new(),
        }
    }
}

/// Subscription parameters, one variant per feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeParams {
    Trades { symbol: String },
    Candles(CandleQuery),
}

/// Encodes a `subscribe` control message.
///
/// # Errors
///
/// Returns [`TickwireError::Json`] if serialization fails.
pub fn encode_subscribe(params: &SubscribeParams) -> Result<String> {
    let json = match params {
        SubscribeParams::Trades { symbol } => {
            serde_json::to_string(&TradesSubscribeRequest::new(symbol))?
        }
        SubscribeParams::Candles(query) => {
            serde_json::to_string(&CandlesSubscribeRequest::new(query.key()))?
        }
    };
    Ok(json)
}

/// Encodes an `unsubscribe` control message for `chan_id`.
///
/// # Errors
///
/// Returns [`TickwireError::Json`] if serialization fails.
pub fn encode_unsubscribe(chan_id: ChannelId) -> Result<String> {
    Ok(serde_json::to_string(&UnsubscribeRequest::new(chan_id))?)
}

/// Classifies a frame by its first non-whitespace character.
///
/// # Errors
///
/// Returns [`TickwireError::Decode`] for empty text or any other leading
/// character.
pub fn classify(text: &str) -> Result<FrameKind> {
    match text.trim_start().chars().next() {
        Some('{') => Ok(FrameKind::ControlObject),
        Some('[') => Ok(FrameKind::DataArray),
        Some(c) => Err(TickwireError::Decode(format!("unexpected leading character {c:?}"))),
        None => Err(TickwireError::Decode("empty frame".to_string())),
    }
}

/// Decodes a control object.
///
/// # Errors
///
/// Returns [`TickwireError::Decode`] if the text is not a JSON object with a
/// string `event` field.
pub fn decode_control(text: &str) -> Result<ControlMessage> {
    serde_json::from_str(text).map_err(|e| TickwireError::Decode(format!("control object: {e}")))
}

/// Decodes a data array into its channel id and payload.
///
/// # Errors
///
/// Returns [`TickwireError::Decode`] when the text is not an array, the
/// first element is not a channel id, or the remainder matches no known
/// payload shape.
pub fn decode_data_array(text: &str) -> Result<(ChannelId, DataPayload)> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| TickwireError::Decode(format!("data array: {e}")))?;
    let Value::Array(mut items) = value else {
        return Err(TickwireError::Decode("data frame is not an array".to_string()));
    };

    let chan_id = items
        .first()
        .and_then(Value::as_u64)
        .ok_or_else(|| TickwireError::Decode("data frame has no channel id".to_string()))?;

    let payload = match items.len() {
        2 => match items.pop() {
            Some(Value::String(tag)) if tag == "hb" => DataPayload::Heartbeat,
            Some(Value::Array(inner)) => payload_from_array(inner)?,
            other => return Err(shape_error(other.as_ref())),
        },
        3 => {
            let inner = items.pop();
            let tag = items.pop();
            match (tag, inner) {
                (Some(Value::String(tag)), Some(Value::Array(_))) if tag == "tu" => {
                    DataPayload::ExecutionUpdate
                }
                (_, Some(Value::Array(inner))) => DataPayload::Single(inner),
                (_, other) => return Err(shape_error(other.as_ref())),
            }
        }
        n => {
            return Err(TickwireError::Decode(format!(
                "data frame has {n} elements, expected 2 or 3"
            )));
        }
    };

    Ok((chan_id, payload))
}

/// An array of arrays is a batch; an array of scalars is one update.
fn payload_from_array(inner: Vec<Value>) -> Result<DataPayload> {
    if inner.iter().all(Value::is_array) {
        let elements = inner
            .into_iter()
            .filter_map(|v| match v {
                Value::Array(values) => Some(values),
                _ => None,
            })
            .collect();
        return Ok(DataPayload::Batch(elements));
    }
    if inner.iter().any(Value::is_array) {
        return Err(TickwireError::Decode(
            "payload mixes arrays and scalars".to_string(),
        ));
    }
    Ok(DataPayload::Single(inner))
}

fn shape_error(got: Option<&Value>) -> TickwireError {
    match got {
        Some(v) => TickwireError::Decode(format!("unexpected payload {v}")),
        None => TickwireError::Decode("missing payload".to_string()),
    }
}
