use landscape_schema::Schema;

/// The schema for the `resynchronize` message this crate queues on the
/// client's own behalf -- either echoing a server-requested
/// `operation-id`, or bare when the store detects an ancient sequence on
/// its own (§4.6). Registered into the broker's `SchemaRegistry`
/// alongside `register` and every other built-in type.
pub fn resynchronize_message_schema() -> Schema {
    Schema::message(
        "resynchronize",
        [("operation-id".to_string(), Schema::Int)],
        ["operation-id".to_string()],
    )
}
