//! A byte-exact implementation of the historical tagged, recursive,
//! length-prefixed serialization grammar described in spec §6.1:
//!
//! ```text
//! i<ascii-decimal>;          integer
//! f<ascii-decimal>;          float
//! u<byte-length>:<utf-8>     text
//! s<byte-length>:<bytes>     byte string
//! b<0|1>                     boolean
//! n                           null
//! l<len>;<elt>*               list
//! d<len>;<key><val>*           map
//! ```
//!
//! An existing server depends on this exact byte layout, so every change
//! here must keep the grammar intact rather than switch to a more
//! "idiomatic" encoding.

use std::collections::BTreeMap;

use landscape_schema::Value;

use super::error::{Result, WireError};

pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(value, &mut out);
    out
}

fn encode_into(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.push(b'n'),
        Value::Bool(b) => {
            out.push(b'b');
            out.push(if *b { b'1' } else { b'0' });
        }
        Value::Int(i) => {
            out.push(b'i');
            out.extend(i.to_string().into_bytes());
            out.push(b';');
        }
        Value::Float(f) => {
            out.push(b'f');
            out.extend(format_float(*f).into_bytes());
            out.push(b';');
        }
        Value::Bytes(bytes) => {
            out.push(b's');
            out.extend(bytes.len().to_string().into_bytes());
            out.push(b':');
            out.extend(bytes);
        }
        Value::Text(text) => {
            let bytes = text.as_bytes();
            out.push(b'u');
            out.extend(bytes.len().to_string().into_bytes());
            out.push(b':');
            out.extend(bytes);
        }
        Value::List(items) => {
            out.push(b'l');
            out.extend(items.len().to_string().into_bytes());
            out.push(b';');
            for item in items {
                encode_into(item, out);
            }
        }
        Value::Map(entries) => {
            out.push(b'd');
            out.extend(entries.len().to_string().into_bytes());
            out.push(b';');
            for (key, val) in entries {
                encode_into(&Value::Text(key.clone()), out);
                encode_into(val, out);
            }
        }
    }
}

fn format_float(f: f64) -> String {
    if f.fract() == 0.0 && f.is_finite() {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

/// Decode exactly one value from `input`, requiring the entire slice to be
/// consumed.
pub fn decode(input: &[u8]) -> Result<Value> {
    let (value, rest) = decode_value(input)?;
    if !rest.is_empty() {
        return Err(WireError::TrailingBytes);
    }
    Ok(value)
}

fn decode_value(input: &[u8]) -> Result<(Value, &[u8])> {
    let (&tag, rest) = input.split_first().ok_or(WireError::UnexpectedEof)?;
    match tag {
        b'n' => Ok((Value::Null, rest)),
        b'b' => {
            let (&flag, rest) = rest.split_first().ok_or(WireError::UnexpectedEof)?;
            let value = match flag {
                b'0' => false,
                b'1' => true,
                other => return Err(WireError::MalformedNumber((other as char).to_string())),
            };
            Ok((Value::Bool(value), rest))
        }
        b'i' => {
            let (digits, rest) = read_until(rest, b';')?;
            let n: i64 = digits
                .parse()
                .map_err(|_| WireError::MalformedNumber(digits.to_string()))?;
            Ok((Value::Int(n), rest))
        }
        b'f' => {
            let (digits, rest) = read_until(rest, b';')?;
            let n: f64 = digits
                .parse()
                .map_err(|_| WireError::MalformedNumber(digits.to_string()))?;
            Ok((Value::Float(n), rest))
        }
        b'u' => {
            let (len_str, rest) = read_until(rest, b':')?;
            let len: usize = len_str
                .parse()
                .map_err(|_| WireError::MalformedNumber(len_str.to_string()))?;
            let (bytes, rest) = split_len(rest, len)?;
            let text = std::str::from_utf8(bytes)?.to_string();
            Ok((Value::Text(text), rest))
        }
        b's' => {
            let (len_str, rest) = read_until(rest, b':')?;
            let len: usize = len_str
                .parse()
                .map_err(|_| WireError::MalformedNumber(len_str.to_string()))?;
            let (bytes, rest) = split_len(rest, len)?;
            Ok((Value::Bytes(bytes.to_vec()), rest))
        }
        b'l' => {
            let (len_str, mut rest) = read_until(rest, b';')?;
            let len: usize = len_str
                .parse()
                .map_err(|_| WireError::MalformedNumber(len_str.to_string()))?;
            let mut items = Vec::with_capacity(len);
            for _ in 0..len {
                let (item, next_rest) = decode_value(rest)?;
                items.push(item);
                rest = next_rest;
            }
            Ok((Value::List(items), rest))
        }
        b'd' => {
            let (len_str, mut rest) = read_until(rest, b';')?;
            let len: usize = len_str
                .parse()
                .map_err(|_| WireError::MalformedNumber(len_str.to_string()))?;
            let mut entries = BTreeMap::new();
            for _ in 0..len {
                let (key, next_rest) = decode_value(rest)?;
                let key_text = key.as_text().ok_or(WireError::NonTextMapKey)?.to_string();
                let (value, next_rest) = decode_value(next_rest)?;
                entries.insert(key_text, value);
                rest = next_rest;
            }
            Ok((Value::Map(entries), rest))
        }
        other => Err(WireError::UnknownTag(other as char)),
    }
}

fn read_until(input: &[u8], delimiter: u8) -> Result<(&str, &[u8])> {
    let pos = input
        .iter()
        .position(|&b| b == delimiter)
        .ok_or(WireError::UnexpectedEof)?;
    let (field, rest) = input.split_at(pos);
    let text = std::str::from_utf8(field)?;
    Ok((text, &rest[1..]))
}

fn split_len(input: &[u8], len: usize) -> Result<(&[u8], &[u8])> {
    if input.len() < len {
        return Err(WireError::LengthOutOfBounds {
            declared: len,
            remaining: input.len(),
        });
    }
    Ok(input.split_at(len))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: Value) {
        let encoded = encode(&value);
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn roundtrips_null() {
        roundtrip(Value::Null);
    }

    #[test]
    fn roundtrips_bool() {
        roundtrip(Value::Bool(true));
        roundtrip(Value::Bool(false));
    }

    #[test]
    fn roundtrips_int() {
        roundtrip(Value::Int(0));
        roundtrip(Value::Int(-42));
        roundtrip(Value::Int(i64::MAX));
    }

    #[test]
    fn roundtrips_float() {
        roundtrip(Value::Float(1.5));
        roundtrip(Value::Float(0.0));
    }

    #[test]
    fn roundtrips_text_and_bytes() {
        roundtrip(Value::Text("hello, world".to_string()));
        roundtrip(Value::Bytes(vec![0, 1, 2, 255]));
    }

    #[test]
    fn roundtrips_nested_list_and_map() {
        roundtrip(Value::List(vec![Value::Int(1), Value::Text("a".into())]));
        roundtrip(Value::map([
            ("a".to_string(), Value::Int(1)),
            ("b".to_string(), Value::List(vec![Value::Bool(true)])),
        ]));
    }

    #[test]
    fn exact_byte_layout_for_integer() {
        assert_eq!(encode(&Value::Int(42)), b"i42;");
    }

    #[test]
    fn exact_byte_layout_for_text() {
        assert_eq!(encode(&Value::Text("hi".to_string())), b"u2:hi");
    }

    #[test]
    fn exact_byte_layout_for_list_and_map() {
        assert_eq!(
            encode(&Value::List(vec![Value::Int(1)])),
            b"l1;i1;"
        );
        assert_eq!(
            encode(&Value::map([("k".to_string(), Value::Int(1))])),
            b"d1;u1:ki1;"
        );
    }

    #[test]
    fn rejects_truncated_input() {
        assert_eq!(decode(b"u5:hi"), Err(WireError::LengthOutOfBounds { declared: 5, remaining: 2 }));
    }

    #[test]
    fn rejects_unknown_tag() {
        assert_eq!(decode(b"z"), Err(WireError::UnknownTag('z')));
    }

    #[test]
    fn rejects_trailing_bytes() {
        assert_eq!(decode(b"n n"), Err(WireError::TrailingBytes));
    }

    #[test]
    fn rejects_non_text_map_key() {
        assert!(matches!(decode(b"d1;i1;i2;"), Err(WireError::NonTextMapKey)));
    }
}
