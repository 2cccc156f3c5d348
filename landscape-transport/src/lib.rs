//! The HTTPS transport: a byte-exact wire codec plus an HTTP client built
//! on `reqwest`/`reqwest-middleware`, the way `api-client-framework`'s
//! `HttpApiClient` is built.

mod client;
mod error;
pub mod wire;

pub use client::{Transport, TransportConfig};
pub use error::{Result, TransportError};
