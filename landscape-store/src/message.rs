use landscape_schema::Value;

/// A message as it lives in the store: its stable id plus the coerced
/// value (a `Value::Map` carrying `type`, `timestamp`, `api`, and the
/// type-specific payload fields).
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: u64,
    pub value: Value,
}

impl Message {
    pub fn message_type(&self) -> Option<&str> {
        self.value.as_map()?.get("type")?.as_text()
    }

    pub fn api(&self) -> Option<&str> {
        self.value.as_map()?.get("api")?.as_text()
    }

    pub fn timestamp(&self) -> Option<f64> {
        self.value.as_map()?.get("timestamp")?.as_float()
    }
}
