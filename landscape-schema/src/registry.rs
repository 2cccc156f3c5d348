use std::collections::BTreeMap;

use crate::error::{InvalidSchema, Result};
use crate::schema::Schema;
use crate::value::Value;

/// Owns every registered message schema and validates/coerces messages
/// passed to `Store::add` against them.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, Schema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `schema` under the message type it names. A later
    /// registration for the same type replaces the earlier one.
    pub fn add_schema(&mut self, message_type: impl Into<String>, schema: Schema) {
        self.schemas.insert(message_type.into(), schema);
    }

    pub fn has_schema(&self, message_type: &str) -> bool {
        self.schemas.contains_key(message_type)
    }

    /// Coerce `message` against the schema registered for its `type`.
    pub fn coerce(&self, message_type: &str, message: &Value) -> Result<Value> {
        let schema = self
            .schemas
            .get(message_type)
            .ok_or_else(|| InvalidSchema::UnknownMessageType(message_type.to_string()))?;
        schema.coerce(message)
    }
}
