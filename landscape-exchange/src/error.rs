use thiserror::Error;

/// Errors this crate surfaces to its own callers. Most failures (schema
/// rejection on `send`, transport failures during `exchange`) are instead
/// absorbed and turned into reactor events per spec §7 -- this enum is
/// only for the handful of calls with a direct `Result` return.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("message rejected by the schema registry: {0}")]
    Schema(#[from] landscape_store::StoreError),
}

pub type Result<T> = std::result::Result<T, ExchangeError>;
