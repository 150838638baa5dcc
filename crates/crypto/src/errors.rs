use thiserror::Error;

/// Errors raised by the registry cipher codec.
///
/// `Encode` and `Decode` are per-entry failures: callers skip the entry and
/// keep processing the batch. `InvalidConfig` is raised while building a codec
/// and is fatal at startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("encode error: {0}")]
    Encode(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("invalid cipher configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, CodecError>;
