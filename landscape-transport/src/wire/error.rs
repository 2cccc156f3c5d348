#[derive(Debug, thiserror::Error, PartialEq)]
pub enum WireError {
    #[error("unexpected end of input while decoding")]
    UnexpectedEof,

    #[error("unknown type tag {0:?}")]
    UnknownTag(char),

    #[error("malformed length/integer field: {0:?}")]
    MalformedNumber(String),

    #[error("declared length {declared} exceeds remaining input of {remaining} bytes")]
    LengthOutOfBounds { declared: usize, remaining: usize },

    #[error("text field is not valid utf-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("map key did not decode to text")]
    NonTextMapKey,

    #[error("trailing bytes after decoding a complete value")]
    TrailingBytes,
}

pub type Result<T> = std::result::Result<T, WireError>;
