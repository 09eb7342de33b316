use thiserror::Error;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failures of the show catalog store.
///
/// `Io` and `Serialization` mean the store itself is unusable and abort a
/// batch; the remaining variants are local to a single show.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store file is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Show already exists: {0}")]
    DuplicateShow(String),

    #[error("Show has no name on disk")]
    MissingDiskName,

    #[error("Show not found: {0}")]
    NotFound(String),
}
