use thiserror::Error;

/// Everything that can abort a single aggregation run.
#[derive(Debug, Error)]
pub enum Error {
    /// The object is not valid delimited text, or it has no header row.
    #[error("{0}")]
    Parse(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// The notification event did not carry a usable bucket/key.
    #[error("{0}")]
    Trigger(String),

    #[error("failed to read {location}: {message}")]
    Storage { location: String, message: String },

    #[error("{0}")]
    Internal(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("required column `{0}` not found after normalization")]
    MissingColumn(String),

    #[error("columns {first:?} and {second:?} both normalize to `{normalized}`")]
    DuplicateColumn {
        normalized: String,
        first: String,
        second: String,
    },
}

impl Error {
    /// Stable kind name used in failure responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Parse(_) => "ParseError",
            Error::Schema(_) => "SchemaError",
            Error::Trigger(_) => "TriggerError",
            Error::Storage { .. } => "StorageError",
            Error::Internal(_) => "InternalError",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
