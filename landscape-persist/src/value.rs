use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A node in the persisted tree.
///
/// Mirrors the handful of primitives the historical `bpickle` tree could
/// hold: scalars, an ordered list, and a string-keyed map. We serialize this
/// with `serde_json` rather than reproducing the Python wire format, since
/// only the network payload (see `landscape-transport::wire`) needs to be
/// byte-exact with the existing server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PersistValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Bytes(Vec<u8>),
    Text(String),
    List(Vec<PersistValue>),
    Map(BTreeMap<String, PersistValue>),
}

impl PersistValue {
    pub fn as_map(&self) -> Option<&BTreeMap<String, PersistValue>> {
        match self {
            PersistValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut BTreeMap<String, PersistValue>> {
        match self {
            PersistValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[PersistValue]> {
        match self {
            PersistValue::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PersistValue::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PersistValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PersistValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn empty_map() -> Self {
        PersistValue::Map(BTreeMap::new())
    }
}

impl From<&str> for PersistValue {
    fn from(value: &str) -> Self {
        PersistValue::Text(value.to_string())
    }
}

impl From<String> for PersistValue {
    fn from(value: String) -> Self {
        PersistValue::Text(value)
    }
}

impl From<i64> for PersistValue {
    fn from(value: i64) -> Self {
        PersistValue::Int(value)
    }
}

impl From<bool> for PersistValue {
    fn from(value: bool) -> Self {
        PersistValue::Bool(value)
    }
}
