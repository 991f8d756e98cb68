//! Reservation error taxonomy.

use serde::Serialize;
use tabroom_state::{DebateId, ParticipantRole, StorageError, TeamId, UserId};

use super::roles::RoleRequestError;

/// Every way a reservation can fail. Callers branch on [`ReservationError::kind`].
#[derive(Debug, thiserror::Error)]
pub enum ReservationError {
    #[error("invalid role request: {0}")]
    Validation(#[from] RoleRequestError),

    #[error("user {user_id} is neither a judge nor a debater in debate {debate_id}")]
    Permission {
        debate_id: DebateId,
        user_id: UserId,
    },

    #[error("team {team_id} already has {limit} debaters in debate {debate_id}")]
    Capacity {
        debate_id: DebateId,
        team_id: TeamId,
        limit: usize,
    },

    #[error("{role} for team {team_id} is already held by another user")]
    RoleTaken {
        team_id: TeamId,
        role: ParticipantRole,
    },

    #[error("reservation lost a race with a concurrent request: {0}")]
    Conflict(StorageError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("storage error: {0}")]
    Storage(StorageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationErrorKind {
    Validation,
    Permission,
    Capacity,
    RoleTaken,
    Conflict,
    NotFound,
    Storage,
}

impl ReservationErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationErrorKind::Validation => "validation",
            ReservationErrorKind::Permission => "permission",
            ReservationErrorKind::Capacity => "capacity",
            ReservationErrorKind::RoleTaken => "role_taken",
            ReservationErrorKind::Conflict => "conflict",
            ReservationErrorKind::NotFound => "not_found",
            ReservationErrorKind::Storage => "storage",
        }
    }
}

impl std::fmt::Display for ReservationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ReservationError {
    pub fn kind(&self) -> ReservationErrorKind {
        match self {
            ReservationError::Validation(_) => ReservationErrorKind::Validation,
            ReservationError::Permission { .. } => ReservationErrorKind::Permission,
            ReservationError::Capacity { .. } => ReservationErrorKind::Capacity,
            ReservationError::RoleTaken { .. } => ReservationErrorKind::RoleTaken,
            ReservationError::Conflict(_) => ReservationErrorKind::Conflict,
            ReservationError::NotFound { .. } => ReservationErrorKind::NotFound,
            ReservationError::Storage(_) => ReservationErrorKind::Storage,
        }
    }

    /// True when retrying, possibly with a different role selection, can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ReservationErrorKind::RoleTaken | ReservationErrorKind::Conflict
        )
    }
}

impl From<StorageError> for ReservationError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { entity, id } => ReservationError::NotFound { entity, id },
            conflict if conflict.is_conflict() => ReservationError::Conflict(conflict),
            other => ReservationError::Storage(other),
        }
    }
}
