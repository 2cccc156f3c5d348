use landscape_schema::{Schema, Value};

/// The schema for the `register` message the handler enqueues on
/// `pre-exchange`. Registered into the broker's `SchemaRegistry` at
/// startup alongside every other built-in message type.
pub fn register_message_schema() -> Schema {
    Schema::message(
        "register",
        [
            ("computer_title".to_string(), Schema::Text),
            ("account_name".to_string(), Schema::Text),
            (
                "registration_password".to_string(),
                Schema::AnyOf(vec![Schema::Text, Schema::Constant(Value::Null)]),
            ),
            ("hostname".to_string(), Schema::Text),
            (
                "tags".to_string(),
                Schema::AnyOf(vec![Schema::List(Box::new(Schema::Text)), Schema::Constant(Value::Null)]),
            ),
            ("access_group".to_string(), Schema::Text),
        ],
        [
            "registration_password".to_string(),
            "tags".to_string(),
            "access_group".to_string(),
        ],
    )
}
