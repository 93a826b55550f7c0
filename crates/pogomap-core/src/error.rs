//! Error types for pogomap-core.
//!
//! The pipeline distinguishes three failure classes:
//!
//! - [`Error::MalformedResponse`]: the scan response is structurally
//!   invalid. Fatal to that single parse call; nothing from the call
//!   is persisted.
//! - [`Error::Storage`]: the engine rejected a batch. Fatal to the
//!   `bulk_upsert` call; chunks committed earlier in the same call
//!   stay committed.
//! - Notification failures are not represented here at all: they are
//!   logged and swallowed at the dispatch site (see [`crate::notify`]).

use thiserror::Error;

/// Result alias used throughout pogomap-core.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the scan pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// The scan response is missing required structure (e.g. the
    /// `responses.GET_MAP_OBJECTS.map_cells` path or a required
    /// entity field).
    #[error("malformed map response: {0}")]
    MalformedResponse(String),

    /// Persistence failure from the storage layer.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Configuration could not be loaded or failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Storage-layer errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying SQLite failure (open, statement, or I/O).
    #[error("database error: {0}")]
    Database(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_error_converts_to_pipeline_error() {
        let err: Error = StorageError::Database("disk full".to_string()).into();
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn malformed_response_mentions_cause() {
        let err = Error::MalformedResponse("missing field `map_cells`".to_string());
        assert!(err.to_string().contains("map_cells"));
    }
}
