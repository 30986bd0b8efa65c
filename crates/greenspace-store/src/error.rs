//! Error types for the storage layer.

use greenspace_core::{ErrorKind, ServiceError};
use thiserror::Error;

/// A result type using `StoreError`.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested record was not found.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind, e.g. `tree`.
        entity: &'static str,
        /// Identifier as text.
        id: String,
    },

    /// A latitude outside `[-90, 90]`.
    #[error("invalid latitude: {0}")]
    InvalidLatitude(f64),

    /// A longitude outside `[-180, 180]`.
    #[error("invalid longitude: {0}")]
    InvalidLongitude(f64),

    /// A record failed a storage-level constraint.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A unique key is already taken.
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// A concurrent transaction touched the same rows.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A create callback declined to proceed.
    #[error("operation aborted by callback")]
    Aborted,

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Shorthand for a missing record.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns true if this is a missing-record error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<rocksdb::Error> for StoreError {
    fn from(err: rocksdb::Error) -> Self {
        match err.kind() {
            rocksdb::ErrorKind::Busy | rocksdb::ErrorKind::TryAgain | rocksdb::ErrorKind::TimedOut => {
                Self::Conflict(err.into_string())
            }
            _ => Self::Database(err.into_string()),
        }
    }
}

impl From<greenspace_core::CoordinateError> for StoreError {
    fn from(err: greenspace_core::CoordinateError) -> Self {
        match err {
            greenspace_core::CoordinateError::InvalidLatitude(v) => Self::InvalidLatitude(v),
            greenspace_core::CoordinateError::InvalidLongitude(v) => Self::InvalidLongitude(v),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        let kind = match &err {
            StoreError::NotFound { .. } => ErrorKind::NotFound,
            StoreError::InvalidLatitude(_)
            | StoreError::InvalidLongitude(_)
            | StoreError::Validation(_) => ErrorKind::BadRequest,
            StoreError::Duplicate(_) | StoreError::Conflict(_) => ErrorKind::Conflict,
            StoreError::Aborted | StoreError::Database(_) | StoreError::Serialization(_) => {
                ErrorKind::Internal
            }
        };
        Self::new(kind, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_to_service_kinds() {
        let cases = [
            (StoreError::not_found("tree", 3), ErrorKind::NotFound),
            (StoreError::InvalidLatitude(91.0), ErrorKind::BadRequest),
            (StoreError::Duplicate("plate".into()), ErrorKind::Conflict),
            (StoreError::Database("io".into()), ErrorKind::Internal),
            (StoreError::Aborted, ErrorKind::Internal),
        ];
        for (err, kind) in cases {
            assert_eq!(ServiceError::from(err).kind(), kind);
        }
    }

    #[test]
    fn not_found_message() {
        let err = StoreError::not_found("sensor", "abc");
        assert_eq!(err.to_string(), "sensor abc not found");
        assert!(err.is_not_found());
    }
}
