//! A cheap periodic probe of the server's ping endpoint that requests an
//! urgent exchange when it reports pending data. Grounded on spec §2's
//! pinger sketch and `landscape-exchange`'s reactor-driven component
//! shape.

mod config;
mod error;
mod ping;

pub use config::PingerConfig;
pub use error::{PingerError, Result};
pub use ping::Pinger;
