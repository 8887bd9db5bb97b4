use thiserror::Error;

/// Crate-wide error type.
///
/// Every fallible operation in the runtime surfaces one of these variants;
/// there are no panics on library paths and no partial-success results.
/// Destructors never fail.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid argument: {0}")]
    Invalid(String),

    #[error("out of memory")]
    OutOfMemory,

    #[error("operation timed out")]
    Timeout,

    #[error("capacity exhausted")]
    Full,

    #[error("no data available")]
    Empty,

    #[error("shutting down")]
    Shutdown,

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Convenience constructor for `Invalid` with a formatted message.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::Invalid(msg.into())
    }
}
