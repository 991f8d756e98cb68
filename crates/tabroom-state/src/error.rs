//! Error types for tabroom-state

use thiserror::Error;

/// Errors raised while connecting to or preparing the database.
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

/// Errors returned by the storage and provider traits.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    /// A referenced record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A write collided with a unique constraint at commit time.
    #[error("unique constraint {constraint} violated by key {key}")]
    UniqueViolation { constraint: String, key: String },

    /// The transaction read data that a concurrent transaction changed.
    #[error("transaction could not be serialized: {detail}")]
    SerializationFailure { detail: String },

    /// Any other backend failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        StorageError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// True when the failure was caused by a concurrent writer and the
    /// operation may succeed if retried.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StorageError::UniqueViolation { .. } | StorageError::SerializationFailure { .. }
        )
    }
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        classify_backend_message(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Backend(format!("serialization: {err}"))
    }
}

/// Map a SurrealDB error message onto the storage error taxonomy.
///
/// SurrealDB reports index collisions as "Database index `<name>` already
/// contains <key>", optimistic transaction failures as "... read or write
/// conflict ...", and our own in-transaction guards surface through `THROW`.
pub(crate) fn classify_backend_message(msg: String) -> StorageError {
    if msg.contains("already contains") {
        let constraint = msg
            .split('`')
            .nth(1)
            .unwrap_or("unknown_index")
            .to_string();
        return StorageError::UniqueViolation {
            constraint,
            key: msg,
        };
    }
    if msg.contains("capacity_exceeded")
        || msg.contains("session_conflict")
        || msg.contains("read or write conflict")
        || msg.contains("Resource busy")
    {
        return StorageError::SerializationFailure { detail: msg };
    }
    StorageError::Backend(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_collision_message_becomes_unique_violation() {
        let err = classify_backend_message(
            "Database index `idx_participant_slot` already contains 'd1/t1/FIRST_SPEAKER'"
                .to_string(),
        );
        match err {
            StorageError::UniqueViolation { constraint, .. } => {
                assert_eq!(constraint, "idx_participant_slot")
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn thrown_guards_become_serialization_failures() {
        let err = classify_backend_message("An error occurred: capacity_exceeded".to_string());
        assert!(matches!(err, StorageError::SerializationFailure { .. }));
        assert!(err.is_conflict());
    }

    #[test]
    fn other_messages_stay_backend_errors() {
        let err = classify_backend_message("connection reset".to_string());
        assert_eq!(err, StorageError::Backend("connection reset".to_string()));
        assert!(!err.is_conflict());
    }
}
