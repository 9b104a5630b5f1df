use thiserror::Error;

/// Errors that abort an index build.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("document '{name}' registered twice")]
    DuplicateDocument { name: String },
    #[error("object '{object}' refers to unknown document '{name}'")]
    UnknownDocument { name: String, object: String },
}

/// Errors raised while reading or writing a persisted index.
#[derive(Debug, Error)]
pub enum IndexFileError {
    /// The file parsed but violates the index invariants.
    #[error("malformed index file: {0}")]
    Malformed(String),
    #[error("syntax error at byte {offset}: {message}")]
    Syntax { offset: usize, message: String },
    #[error("binary index: {0}")]
    Binary(#[from] bincode::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl IndexFileError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        IndexFileError::Malformed(msg.into())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("malformed query: {reason}")]
    MalformedQuery { reason: String },
}
