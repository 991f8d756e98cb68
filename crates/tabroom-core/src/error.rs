//! Error taxonomy for the draw and allocation engines.

use tabroom_state::{RoundId, StorageError};

/// Tabroom draw and allocation errors.
#[derive(Debug, thiserror::Error)]
pub enum TabError {
    #[error("insufficient teams: need at least 2, found {found}")]
    InsufficientTeams { found: usize },

    #[error("round not found: {0}")]
    RoundNotFound(RoundId),

    #[error("round {0} is published and cannot be redrawn")]
    RoundPublished(RoundId),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl TabError {
    /// Map a storage `NotFound` for the round onto `RoundNotFound`; every other
    /// storage failure keeps its kind.
    pub(crate) fn from_round_lookup(round_id: &RoundId, err: StorageError) -> Self {
        match err {
            StorageError::NotFound { entity: "round", .. } => {
                TabError::RoundNotFound(round_id.clone())
            }
            other => TabError::Storage(other),
        }
    }
}

/// Result type for draw and allocation operations.
pub type TabResult<T> = std::result::Result<T, TabError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_teams_display() {
        let err = TabError::InsufficientTeams { found: 1 };
        assert!(err.to_string().contains("found 1"));
    }

    #[test]
    fn round_lookup_keeps_storage_kind() {
        let id = RoundId::from("r9");
        let err = TabError::from_round_lookup(&id, StorageError::not_found("round", &id));
        assert!(matches!(err, TabError::RoundNotFound(_)));

        let err =
            TabError::from_round_lookup(&id, StorageError::Backend("socket closed".to_string()));
        assert!(matches!(err, TabError::Storage(StorageError::Backend(_))));
    }
}
