use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("message is missing a `type` field")]
    MissingType,

    #[error("schema validation failed: {0}")]
    Schema(#[from] landscape_schema::InvalidSchema),

    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write message file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to rename message file into place at {path}: {source}")]
    Rename {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize message: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("failed to persist store metadata: {0}")]
    Persist(#[from] landscape_persist::PersistError),
}

pub type Result<T> = std::result::Result<T, StoreError>;
