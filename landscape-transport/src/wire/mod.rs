mod codec;
mod error;

pub use codec::{decode, encode};
pub use error::{Result, WireError};
