use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("failed to write persist file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read persist file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to rename temporary persist file into place at {path}: {source}")]
    Rename {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize persist tree: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("path {0:?} does not address a map")]
    NotAMap(String),

    #[error("path {0:?} does not address a list")]
    NotAList(String),

    #[error("empty path")]
    EmptyPath,
}

pub type Result<T> = std::result::Result<T, PersistError>;
