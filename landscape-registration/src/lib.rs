//! Acquires a server-assigned identity on first exchange (or after an
//! `unknown-id` signal) and gates all other exchange activity on it.
//! Grounded on `landscape.broker.registration`.

mod error;
mod handler;
mod schema;
mod watcher;

pub use error::RegistrationError;
pub use handler::RegistrationHandler;
pub use schema::register_message_schema;
pub use watcher::{request_registration, watch_registration};
