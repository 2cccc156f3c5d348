use thiserror::Error;

#[derive(Debug, Error)]
pub enum PingerError {
    #[error("network error talking to the ping endpoint: {0}")]
    Network(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, PingerError>;
