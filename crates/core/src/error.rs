use thiserror::Error;

/// Failures raised by a [`crate::ReconStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend failure: {0}")]
    Backend(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Error taxonomy of the reconciliation operations. The boundary layer
/// translates these into user-facing responses.
#[derive(Debug, Error)]
pub enum ReconError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl ReconError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        ReconError::NotFound { entity, id }
    }
}
