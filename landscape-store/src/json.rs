//! On-disk message encoding. `landscape_schema::Value` has no `serde`
//! derive (it's the pure, hand-coerced wire/schema type), so messages are
//! translated through `serde_json::Value` for the durable file format.
//! Raw byte strings, which JSON has no native representation for, are
//! encoded as `{"__bytes__": "<hex>"}`.

use landscape_schema::Value;
use serde_json::Value as Json;

const BYTES_KEY: &str = "__bytes__";

pub fn to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::from(*i),
        Value::Float(f) => serde_json::json!(f),
        Value::Bytes(bytes) => {
            serde_json::json!({ BYTES_KEY: hex::encode(bytes) })
        }
        Value::Text(text) => Json::String(text.clone()),
        Value::List(items) => Json::Array(items.iter().map(to_json).collect()),
        Value::Map(map) => {
            Json::Object(map.iter().map(|(k, v)| (k.clone(), to_json(v))).collect())
        }
    }
}

pub fn from_json(json: &Json) -> Option<Value> {
    match json {
        Json::Null => Some(Value::Null),
        Json::Bool(b) => Some(Value::Bool(*b)),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Value::Int(i))
            } else {
                n.as_f64().map(Value::Float)
            }
        }
        Json::String(s) => Some(Value::Text(s.clone())),
        Json::Array(items) => items.iter().map(from_json).collect::<Option<Vec<_>>>().map(Value::List),
        Json::Object(map) => {
            if map.len() == 1 {
                if let Some(Json::String(hex_str)) = map.get(BYTES_KEY) {
                    return hex::decode(hex_str).ok().map(Value::Bytes);
                }
            }
            let mut out = std::collections::BTreeMap::new();
            for (k, v) in map {
                out.insert(k.clone(), from_json(v)?);
            }
            Some(Value::Map(out))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_a_message_shaped_value() {
        let value = Value::map([
            ("type".to_string(), Value::Text("ping".to_string())),
            ("n".to_string(), Value::Int(3)),
            ("payload".to_string(), Value::Bytes(vec![0, 1, 255])),
        ]);
        let json = to_json(&value);
        assert_eq!(from_json(&json), Some(value));
    }

    #[test]
    fn roundtrips_nested_lists_and_floats() {
        let value = Value::List(vec![Value::Float(1.5), Value::Null, Value::Bool(true)]);
        assert_eq!(from_json(&to_json(&value)), Some(value));
    }
}
