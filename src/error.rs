use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A referenced row is still in use (e.g. a waste type with detail rows).
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Extract a domain error from an `anyhow` chain, if one is there.
    pub fn from_anyhow(err: &anyhow::Error) -> Option<&Error> {
        err.downcast_ref::<Error>()
    }
}
