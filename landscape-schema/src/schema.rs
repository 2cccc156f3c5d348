use std::collections::{BTreeMap, BTreeSet};

use crate::error::{InvalidSchema, Result};
use crate::value::Value;

/// The charset a `BytesOrText` schema coerces byte strings into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Utf8,
}

impl Charset {
    fn decode(self, bytes: &[u8]) -> Result<String> {
        match self {
            Charset::Utf8 => String::from_utf8(bytes.to_vec()).map_err(|source| {
                InvalidSchema::Charset {
                    charset: "utf-8",
                    source,
                }
            }),
        }
    }
}

/// A composable schema descriptor, mirroring `landscape/schema.py`'s
/// variant set one-to-one.
#[derive(Debug, Clone)]
pub enum Schema {
    Constant(Value),
    AnyOf(Vec<Schema>),
    Bool,
    Int,
    Float,
    Bytes,
    Text,
    BytesOrText(Charset),
    List(Box<Schema>),
    Tuple(Vec<Schema>),
    /// A map with a fixed, known set of keys; `optional` names the keys
    /// that may be absent.
    KeyDict {
        schema: BTreeMap<String, Schema>,
        optional: BTreeSet<String>,
    },
    /// A map with arbitrary keys, each validated against `key_schema` /
    /// `value_schema`.
    Dict {
        key_schema: Box<Schema>,
        value_schema: Box<Schema>,
    },
    /// A `KeyDict` that additionally pins `type` to a constant and adds
    /// the implicit `timestamp`/`api` keys every message carries.
    Message {
        message_type: String,
        schema: BTreeMap<String, Schema>,
        optional: BTreeSet<String>,
    },
}

impl Schema {
    pub fn message(
        message_type: impl Into<String>,
        fields: impl IntoIterator<Item = (String, Schema)>,
        optional: impl IntoIterator<Item = String>,
    ) -> Schema {
        Schema::Message {
            message_type: message_type.into(),
            schema: fields.into_iter().collect(),
            optional: optional.into_iter().collect(),
        }
    }

    pub fn key_dict(
        fields: impl IntoIterator<Item = (String, Schema)>,
        optional: impl IntoIterator<Item = String>,
    ) -> Schema {
        Schema::KeyDict {
            schema: fields.into_iter().collect(),
            optional: optional.into_iter().collect(),
        }
    }

    /// Coerce `value` against this schema. Pure: returns a new value, never
    /// mutates the input.
    pub fn coerce(&self, value: &Value) -> Result<Value> {
        match self {
            Schema::Constant(expected) => {
                if value == expected {
                    Ok(value.clone())
                } else {
                    Err(InvalidSchema::NotConstant(format!("{value:?}")))
                }
            }
            Schema::AnyOf(schemas) => {
                for schema in schemas {
                    if let Ok(coerced) = schema.coerce(value) {
                        return Ok(coerced);
                    }
                }
                Err(InvalidSchema::NoneMatched)
            }
            Schema::Bool => match value {
                Value::Bool(_) => Ok(value.clone()),
                other => Err(wrong_variant("bool", other)),
            },
            Schema::Int => match value {
                Value::Int(_) => Ok(value.clone()),
                other => Err(wrong_variant("int", other)),
            },
            Schema::Float => match value {
                Value::Int(i) => Ok(Value::Float(*i as f64)),
                Value::Float(_) => Ok(value.clone()),
                other => Err(wrong_variant("float", other)),
            },
            Schema::Bytes => match value {
                Value::Bytes(_) => Ok(value.clone()),
                other => Err(wrong_variant("bytes", other)),
            },
            Schema::Text => match value {
                Value::Text(_) => Ok(value.clone()),
                other => Err(wrong_variant("text", other)),
            },
            Schema::BytesOrText(charset) => match value {
                Value::Text(_) => Ok(value.clone()),
                Value::Bytes(bytes) => Ok(Value::Text(charset.decode(bytes)?)),
                other => Err(wrong_variant("bytes-or-text", other)),
            },
            Schema::List(inner) => match value {
                Value::List(items) => {
                    let mut coerced = Vec::with_capacity(items.len());
                    for (index, item) in items.iter().enumerate() {
                        coerced.push(inner.coerce(item).map_err(|source| {
                            InvalidSchema::AtIndex {
                                index,
                                source: Box::new(source),
                            }
                        })?);
                    }
                    Ok(Value::List(coerced))
                }
                other => Err(wrong_variant("list", other)),
            },
            Schema::Tuple(schemas) => match value {
                Value::List(items) => {
                    if items.len() != schemas.len() {
                        return Err(InvalidSchema::WrongTupleLength {
                            expected: schemas.len(),
                            found: items.len(),
                        });
                    }
                    let mut coerced = Vec::with_capacity(items.len());
                    for (index, (schema, item)) in schemas.iter().zip(items.iter()).enumerate() {
                        coerced.push(schema.coerce(item).map_err(|source| {
                            InvalidSchema::AtIndex {
                                index,
                                source: Box::new(source),
                            }
                        })?);
                    }
                    Ok(Value::List(coerced))
                }
                other => Err(wrong_variant("tuple", other)),
            },
            Schema::KeyDict { schema, optional } => coerce_key_dict(schema, optional, value),
            Schema::Dict {
                key_schema,
                value_schema,
            } => match value {
                Value::Map(entries) => {
                    let mut coerced = BTreeMap::new();
                    for (key, val) in entries {
                        let coerced_key = key_schema
                            .coerce(&Value::Text(key.clone()))
                            .map_err(|source| InvalidSchema::AtKey {
                                key: key.clone(),
                                source: Box::new(source),
                            })?;
                        let key_text = coerced_key.as_text().unwrap_or(key).to_string();
                        let coerced_val =
                            value_schema.coerce(val).map_err(|source| InvalidSchema::AtKey {
                                key: key.clone(),
                                source: Box::new(source),
                            })?;
                        coerced.insert(key_text, coerced_val);
                    }
                    Ok(Value::Map(coerced))
                }
                other => Err(wrong_variant("map", other)),
            },
            Schema::Message {
                message_type,
                schema,
                optional,
            } => coerce_message(message_type, schema, optional, value),
        }
    }
}

fn wrong_variant(expected: &'static str, found: &Value) -> InvalidSchema {
    InvalidSchema::WrongVariant {
        expected,
        found: found.type_name(),
    }
}

fn coerce_key_dict(
    schema: &BTreeMap<String, Schema>,
    optional: &BTreeSet<String>,
    value: &Value,
) -> Result<Value> {
    let entries = match value {
        Value::Map(entries) => entries,
        other => return Err(wrong_variant("map", other)),
    };

    let mut coerced = BTreeMap::new();
    for (key, val) in entries {
        let field_schema = schema
            .get(key)
            .ok_or_else(|| InvalidSchema::UnknownKey(key.clone()))?;
        let coerced_val = field_schema
            .coerce(val)
            .map_err(|source| InvalidSchema::AtKey {
                key: key.clone(),
                source: Box::new(source),
            })?;
        coerced.insert(key.clone(), coerced_val);
    }

    let required: BTreeSet<&String> = schema.keys().filter(|k| !optional.contains(*k)).collect();
    let present: BTreeSet<&String> = coerced.keys().collect();
    let missing: Vec<String> = required
        .difference(&present)
        .map(|s| s.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(InvalidSchema::MissingKeys(missing));
    }

    Ok(Value::Map(coerced))
}

/// Coerce a message body. `api` is metadata, not payload: it is passed
/// through unvalidated (per spec §4.2) rather than checked against a
/// sub-schema, and `type`/`timestamp` are enforced as in `KeyDict`.
fn coerce_message(
    message_type: &str,
    schema: &BTreeMap<String, Schema>,
    optional: &BTreeSet<String>,
    value: &Value,
) -> Result<Value> {
    let entries = match value {
        Value::Map(entries) => entries,
        other => return Err(wrong_variant("map", other)),
    };

    let api_value = entries.get("api").cloned();

    let mut without_api = entries.clone();
    without_api.remove("api");
    without_api.insert("type".to_string(), Value::Text(message_type.to_string()));

    let mut full_schema = schema.clone();
    full_schema.insert(
        "type".to_string(),
        Schema::Constant(Value::Text(message_type.to_string())),
    );
    full_schema
        .entry("timestamp".to_string())
        .or_insert(Schema::Float);

    let mut full_optional = optional.clone();
    full_optional.insert("timestamp".to_string());

    let mut coerced = match coerce_key_dict(&full_schema, &full_optional, &Value::Map(without_api))? {
        Value::Map(m) => m,
        _ => unreachable!(),
    };

    if let Some(api) = api_value {
        coerced.insert("api".to_string(), api);
    }

    Ok(Value::Map(coerced))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_message_schema() -> Schema {
        Schema::message(
            "test",
            [("n".to_string(), Schema::Int)],
            [],
        )
    }

    #[test]
    fn coerces_a_valid_message() {
        let schema = sample_message_schema();
        let value = Value::map([
            ("type".to_string(), Value::Text("test".to_string())),
            ("n".to_string(), Value::Int(1)),
        ]);
        let coerced = schema.coerce(&value).unwrap();
        let map = coerced.as_map().unwrap();
        assert_eq!(map.get("n").unwrap().as_int(), Some(1));
        assert!(map.contains_key("type"));
    }

    #[test]
    fn rejects_unknown_keys() {
        let schema = sample_message_schema();
        let value = Value::map([
            ("type".to_string(), Value::Text("test".to_string())),
            ("n".to_string(), Value::Int(1)),
            ("bogus".to_string(), Value::Int(2)),
        ]);
        assert!(matches!(
            schema.coerce(&value),
            Err(InvalidSchema::UnknownKey(key)) if key == "bogus"
        ));
    }

    #[test]
    fn rejects_missing_required_keys() {
        let schema = sample_message_schema();
        let value = Value::map([("type".to_string(), Value::Text("test".to_string()))]);
        assert!(matches!(schema.coerce(&value), Err(InvalidSchema::MissingKeys(_))));
    }

    #[test]
    fn api_field_is_passed_through_unvalidated() {
        let schema = sample_message_schema();
        let value = Value::map([
            ("type".to_string(), Value::Text("test".to_string())),
            ("n".to_string(), Value::Int(1)),
            ("api".to_string(), Value::Text("3.3".to_string())),
        ]);
        let coerced = schema.coerce(&value).unwrap();
        assert_eq!(
            coerced.as_map().unwrap().get("api").unwrap().as_text(),
            Some("3.3")
        );
    }

    #[test]
    fn bytes_or_text_decodes_bytes_with_charset() {
        let schema = Schema::BytesOrText(Charset::Utf8);
        let coerced = schema.coerce(&Value::Bytes(b"hello".to_vec())).unwrap();
        assert_eq!(coerced.as_text(), Some("hello"));
    }

    #[test]
    fn bytes_or_text_rejects_invalid_utf8() {
        let schema = Schema::BytesOrText(Charset::Utf8);
        assert!(schema.coerce(&Value::Bytes(vec![0xff, 0xfe])).is_err());
    }

    #[test]
    fn any_of_tries_each_schema() {
        let schema = Schema::AnyOf(vec![Schema::Int, Schema::Text]);
        assert!(schema.coerce(&Value::Int(1)).is_ok());
        assert!(schema.coerce(&Value::Text("x".into())).is_ok());
        assert!(schema.coerce(&Value::Bool(true)).is_err());
    }

    #[test]
    fn coercion_is_pure() {
        let schema = sample_message_schema();
        let value = Value::map([
            ("type".to_string(), Value::Text("test".to_string())),
            ("n".to_string(), Value::Int(1)),
        ]);
        let original = value.clone();
        let _ = schema.coerce(&value).unwrap();
        assert_eq!(value, original);
    }
}
