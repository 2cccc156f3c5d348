//! Declarative message schemas: composable descriptors plus pure coercion.

mod error;
mod registry;
mod schema;
mod value;

pub use error::{InvalidSchema, Result};
pub use registry::SchemaRegistry;
pub use schema::{Charset, Schema};
pub use value::Value;
