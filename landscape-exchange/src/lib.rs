//! Schedules exchanges between the store and the server, builds
//! payloads, interprets responses (including resynchronization and
//! sequence-reset directives), dispatches server-originated messages,
//! and regulates cadence between normal and urgent. Grounded on
//! `landscape.broker.exchange.MessageExchange`.

mod config;
mod error;
mod exchange;
mod schema;

pub use config::ExchangeConfig;
pub use error::{ExchangeError, Result};
pub use exchange::MessageExchange;
pub use schema::resynchronize_message_schema;
