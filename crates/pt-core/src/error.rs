//! Errors surfaced by reconciliation queries.

use thiserror::Error;

use crate::types::ValidationError;

/// Failure of a query against the event log or measurement store.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The request or the stored history failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The storage collaborator could not serve the read. Not retried here.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl QueryError {
    pub(crate) fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::StorageUnavailable(Box::new(err))
    }
}
