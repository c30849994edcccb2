//! Protocol codec (§4.3). The wire envelope is a positional, heterogeneously
//! typed JSON array — decode by inspecting the first element before
//! interpreting the rest, rather than deriving over a fixed-shape struct
//! (the Go original's `relay/helpers.go` `filters()`/`event()` do the same:
//! walk `[]*json.RawMessage` by array position).

use serde_json::Value;

use crate::error::CodecError;
use crate::model::{Event, Filter};

#[derive(Debug)]
pub enum ClientMessage {
    Event(Box<Event>),
    Req { sub_id: String, filters: Vec<Filter> },
    Close { sub_id: String },
    Count { sub_id: String, filters: Vec<Filter> },
}

/// Parses one WebSocket text frame into a command, or fails with a reason
/// suitable for a `NOTICE` (decoding failure, per §4.3, is never `OK`/`CLOSED`
/// — those are for structurally valid but semantically invalid commands).
pub fn decode(text: &str) -> Result<ClientMessage, CodecError> {
    let value: Value = serde_json::from_str(text).map_err(|e| CodecError::Malformed(e.to_string()))?;
    let arr = value
        .as_array()
        .ok_or_else(|| CodecError::Malformed("expected a JSON array".to_string()))?;
    let command = arr
        .first()
        .and_then(Value::as_str)
        .ok_or_else(|| CodecError::Malformed("missing command word".to_string()))?;

    match command {
        "EVENT" => {
            let evt_value = arr.get(1).ok_or_else(|| CodecError::Malformed("EVENT missing payload".to_string()))?;
            let event: Event = serde_json::from_value(evt_value.clone())
                .map_err(|e| CodecError::Malformed(format!("EVENT: {e}")))?;
            Ok(ClientMessage::Event(Box::new(event)))
        }
        "REQ" => {
            let sub_id = arr
                .get(1)
                .and_then(Value::as_str)
                .ok_or_else(|| CodecError::Malformed("REQ missing subscription id".to_string()))?
                .to_string();
            let filters = decode_filters(&arr[2..])?;
            Ok(ClientMessage::Req { sub_id, filters })
        }
        "CLOSE" => {
            let sub_id = arr
                .get(1)
                .and_then(Value::as_str)
                .ok_or_else(|| CodecError::Malformed("CLOSE missing subscription id".to_string()))?
                .to_string();
            Ok(ClientMessage::Close { sub_id })
        }
        "COUNT" => {
            let sub_id = arr
                .get(1)
                .and_then(Value::as_str)
                .ok_or_else(|| CodecError::Malformed("COUNT missing subscription id".to_string()))?
                .to_string();
            let filters = decode_filters(&arr[2..])?;
            Ok(ClientMessage::Count { sub_id, filters })
        }
        other => Err(CodecError::Malformed(format!("unknown command {other}"))),
    }
}

fn decode_filters(rest: &[Value]) -> Result<Vec<Filter>, CodecError> {
    rest.iter()
        .map(|v| serde_json::from_value(v.clone()).map_err(|e| CodecError::Malformed(format!("filter: {e}"))))
        .collect()
}

/// Response envelopes the relay may emit (§4.3). Each serializes to exactly
/// one JSON array; `RelayMessage::NOTICE` is the catch-all for codec and
/// out-of-band failures.
#[derive(Debug)]
pub enum RelayMessage<'a> {
    Event { sub_id: &'a str, event: &'a Event },
    Ok { event_id: &'a str, accepted: bool, reason: String },
    Eose { sub_id: &'a str },
    Closed { sub_id: &'a str, reason: String },
    Count { sub_id: &'a str, count: i64 },
    Notice { text: String },
}

impl<'a> RelayMessage<'a> {
    pub fn to_text(&self) -> String {
        let value = match self {
            RelayMessage::Event { sub_id, event } => serde_json::json!(["EVENT", sub_id, event]),
            RelayMessage::Ok { event_id, accepted, reason } => {
                serde_json::json!(["OK", event_id, accepted, reason])
            }
            RelayMessage::Eose { sub_id } => serde_json::json!(["EOSE", sub_id]),
            RelayMessage::Closed { sub_id, reason } => serde_json::json!(["CLOSED", sub_id, reason]),
            RelayMessage::Count { sub_id, count } => {
                serde_json::json!(["COUNT", sub_id, { "count": count }])
            }
            RelayMessage::Notice { text } => serde_json::json!(["NOTICE", text]),
        };
        value.to_string()
    }
}
