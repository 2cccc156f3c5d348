use std::collections::HashMap;

use landscape_schema::Value;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// One call across the broker↔plugin socket, spec §6.2. Plugins send
/// these as one JSON object per line; the broker answers with one
/// [`Response`] object per line.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum Request {
    SendMessage {
        message: Json,
        session_id: Option<String>,
        #[serde(default)]
        urgent: bool,
    },
    RegisterClientAcceptedMessageType {
        #[serde(rename = "type")]
        message_type: String,
    },
    RegisterClient {
        name: String,
    },
    Ping,
    StopExchanger,
    FireEvent {
        name: String,
        #[serde(default)]
        args: Vec<Json>,
    },
    /// `{event_name: handler_id}`: subscribe this connection to each
    /// named event under the given opaque handler id.
    CallOnEvent {
        handlers: HashMap<String, String>,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Ok { result: Json },
    Error { message: String },
}

impl Response {
    pub fn ok(result: impl Into<Json>) -> Self {
        Response::Ok { result: result.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Response::Error { message: message.into() }
    }
}

/// `landscape_schema::Value` has no `serde` impl of its own -- the wire
/// codec in `landscape-transport` handles its own binary format instead
/// -- so the JSON-line RPC protocol converts through `serde_json::Value`
/// at the boundary.
pub fn json_to_value(json: Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or_default())
            }
        }
        Json::String(s) => Value::Text(s),
        Json::Array(items) => Value::List(items.into_iter().map(json_to_value).collect()),
        Json::Object(map) => Value::map(map.into_iter().map(|(k, v)| (k, json_to_value(v)))),
    }
}

pub fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::Number((*i).into()),
        Value::Float(f) => serde_json::Number::from_f64(*f).map(Json::Number).unwrap_or(Json::Null),
        Value::Bytes(bytes) => Json::String(hex::encode(bytes)),
        Value::Text(text) => Json::String(text.clone()),
        Value::List(items) => Json::Array(items.iter().map(value_to_json).collect()),
        Value::Map(map) => Json::Object(map.iter().map(|(k, v)| (k.clone(), value_to_json(v))).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn round_trips_a_message_map() {
        let value = Value::map([
            ("type".to_string(), Value::Text("event".to_string())),
            ("count".to_string(), Value::Int(3)),
        ]);
        let json = value_to_json(&value);
        assert_eq!(json_to_value(json), value);
    }

    #[test]
    fn bytes_encode_as_hex() {
        let value = Value::Bytes(vec![0xde, 0xad]);
        assert_eq!(value_to_json(&value), Json::String("dead".to_string()));
    }

    #[test]
    fn parses_send_message_request() {
        let line = r#"{"method":"send_message","params":{"message":{"type":"x"},"session_id":null,"urgent":true}}"#;
        let request: Request = serde_json::from_str(line).unwrap();
        match request {
            Request::SendMessage { urgent, session_id, .. } => {
                assert!(urgent);
                assert_eq!(session_id, None);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }
}
