use std::error::Error as StdError;

use thiserror::Error;

use crate::persistence::PersistenceError;
use crate::vector::VectorError;

pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error raised by an embedding adapter.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors surfaced by every public database operation.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad name, mismatched list lengths, invalid filter or argument combination.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("collection '{0}' not found")]
    CollectionNotFound(String),

    #[error("collection '{0}' already exists")]
    CollectionAlreadyExists(String),

    /// The embedding adapter is missing, failed, or returned a malformed batch.
    #[error("embedding error: {message}")]
    Embedding {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Raised while ranking, e.g. when stored and query dimensions differ.
    #[error("vector search error: {0}")]
    VectorSearch(#[source] VectorError),

    /// The backing store could not persist or load state.
    #[error("storage error: {0}")]
    Storage(#[from] PersistenceError),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// An async façade worker did not complete.
    #[error("worker error: {0}")]
    Worker(String),
}

impl Error {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
            source: None,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::CollectionNotFound(_))
    }
}

impl From<VectorError> for Error {
    fn from(value: VectorError) -> Self {
        Self::VectorSearch(value)
    }
}
