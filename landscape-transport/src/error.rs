use crate::wire::WireError;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("network error talking to the server: {0}")]
    Network(#[from] reqwest_middleware::Error),

    #[error("server returned a non-success status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response body: {0}")]
    Protocol(#[from] WireError),

    #[error("could not read response body: {0}")]
    Body(#[source] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
