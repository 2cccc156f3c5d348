#[derive(Debug, thiserror::Error, PartialEq)]
pub enum InvalidSchema {
    #[error("expected {expected}, found {found}")]
    WrongVariant {
        expected: &'static str,
        found: &'static str,
    },

    #[error("value {0:?} does not match the constant schema")]
    NotConstant(String),

    #[error("value did not match any schema in an any-of")]
    NoneMatched,

    #[error("unknown key {0:?}")]
    UnknownKey(String),

    #[error("missing required keys: {0:?}")]
    MissingKeys(Vec<String>),

    #[error("expected exactly {expected} tuple elements, found {found}")]
    WrongTupleLength { expected: usize, found: usize },

    #[error("could not decode bytes as {charset}: {source}")]
    Charset {
        charset: &'static str,
        #[source]
        source: std::string::FromUtf8Error,
    },

    #[error("in list element {index}: {source}")]
    AtIndex {
        index: usize,
        #[source]
        source: Box<InvalidSchema>,
    },

    #[error("in key {key:?}: {source}")]
    AtKey {
        key: String,
        #[source]
        source: Box<InvalidSchema>,
    },

    #[error("no schema registered for message type {0:?}")]
    UnknownMessageType(String),
}

pub type Result<T> = std::result::Result<T, InvalidSchema>;
