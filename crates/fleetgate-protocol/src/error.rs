use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FrameError {
    #[error("no end marker within {max} bytes")]
    Oversize { max: usize },

    #[error("empty frame")]
    Empty,

    #[error("frame is not valid UTF-8")]
    NotUtf8,

    #[error("unknown frame type: {0:?}")]
    UnknownType(char),

    #[error("missing or invalid device identity: {0:?}")]
    InvalidIdentity(String),

    #[error("expected {expected} fields, got {actual}")]
    FieldCount { expected: usize, actual: usize },

    #[error("invalid {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },

    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("CAN payload must be 1-8 bytes, got {0}")]
    BadPayloadLength(usize),
}
