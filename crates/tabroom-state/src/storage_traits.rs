//! Storage trait definitions for Tabroom
//!
//! Collaborator-facing providers (read-only input to the engines):
//! - `RosterProvider`: teams and team membership
//! - `ResultsProvider`: confirmed results
//! - `JudgePoolProvider`: candidate judges, feedback counts, judging history
//!
//! Engine-owned persistence:
//! - `DrawStore`: rounds and their debates
//! - `AllocationStore`: judge assignments
//! - `ReservationRepository` / `ReservationTx`: transactional role claims
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::schema::{
    DebateId, DebateRecord, DebateResult, JudgeAssignment, JudgeId, JudgeRecord,
    ParticipantRecord, RoundId, RoundRecord, RoundStatus, SessionId, TeamId, TeamRecord,
    TournamentId, UserId,
};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// Team roster lookups.
#[async_trait]
pub trait RosterProvider: Send + Sync {
    /// All teams entered in a tournament, in roster order.
    async fn list_teams(&self, tournament_id: &TournamentId) -> StorageResult<Vec<TeamRecord>>;

    /// Teams the user is registered on (any tournament).
    async fn teams_of_user(&self, user_id: &UserId) -> StorageResult<Vec<TeamId>>;
}

/// Past debate outcomes.
#[async_trait]
pub trait ResultsProvider: Send + Sync {
    /// Confirmed results only; unpublished ballots never leave the provider.
    async fn list_confirmed_results(
        &self,
        tournament_id: &TournamentId,
    ) -> StorageResult<Vec<DebateResult>>;
}

/// Judge pool lookups.
#[async_trait]
pub trait JudgePoolProvider: Send + Sync {
    /// Judges eligible for allocation, in pool order. Active team members are
    /// excluded by the provider.
    async fn list_candidate_judges(
        &self,
        tournament_id: &TournamentId,
    ) -> StorageResult<Vec<JudgeRecord>>;

    /// Number of feedback submissions received about this judge.
    async fn feedback_count(&self, judge_id: &JudgeId) -> StorageResult<u32>;

    /// Every team this judge has judged before, from either side, across all
    /// tournaments.
    async fn judged_teams(&self, judge_id: &JudgeId) -> StorageResult<Vec<TeamId>>;
}

// ---------------------------------------------------------------------------
// Draw and allocation persistence
// ---------------------------------------------------------------------------

/// Round and debate persistence.
///
/// Guarantees:
/// - `save_draw` replaces the round's debates, and any judge assignments and
///   claims attached to the old debates, as one atomic write.
#[async_trait]
pub trait DrawStore: Send + Sync {
    async fn find_round(
        &self,
        tournament_id: &TournamentId,
        round_number: u32,
    ) -> StorageResult<Option<RoundRecord>>;

    /// Returns `StorageError::NotFound` if absent.
    async fn get_round(&self, round_id: &RoundId) -> StorageResult<RoundRecord>;

    async fn save_draw(&self, round: &RoundRecord, debates: Vec<DebateRecord>)
        -> StorageResult<()>;

    async fn set_round_status(&self, round_id: &RoundId, status: RoundStatus)
        -> StorageResult<()>;

    async fn list_debates(&self, round_id: &RoundId) -> StorageResult<Vec<DebateRecord>>;

    /// Returns `StorageError::NotFound` if absent.
    async fn get_debate(&self, debate_id: &DebateId) -> StorageResult<DebateRecord>;
}

/// Judge assignment persistence.
#[async_trait]
pub trait AllocationStore: Send + Sync {
    /// Clear every assignment on `debate_ids`, then insert `assignments`, as
    /// one atomic batch.
    async fn replace_assignments(
        &self,
        round_id: &RoundId,
        debate_ids: &[DebateId],
        assignments: Vec<JudgeAssignment>,
    ) -> StorageResult<()>;

    async fn list_assignments(&self, debate_id: &DebateId) -> StorageResult<Vec<JudgeAssignment>>;
}

// ---------------------------------------------------------------------------
// Role claims
// ---------------------------------------------------------------------------

/// Entry point for role-claim transactions.
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    /// Open a serializable transaction. Dropping the returned handle without
    /// calling `commit` discards every staged write.
    async fn begin(&self) -> StorageResult<Box<dyn ReservationTx>>;

    /// Committed claims for a debate.
    async fn list_claims(&self, debate_id: &DebateId) -> StorageResult<Vec<ParticipantRecord>>;
}

/// One open role-claim transaction.
///
/// Reads observe the transaction's own staged writes. Conflicts with
/// concurrent transactions surface from `commit` as
/// `StorageError::UniqueViolation` or `StorageError::SerializationFailure`.
#[async_trait]
pub trait ReservationTx: Send {
    /// Returns `StorageError::NotFound` if the debate does not exist.
    async fn debate(&mut self, debate_id: &DebateId) -> StorageResult<DebateRecord>;

    async fn user_claims(
        &mut self,
        debate_id: &DebateId,
        user_id: &UserId,
    ) -> StorageResult<Vec<ParticipantRecord>>;

    async fn team_claims(
        &mut self,
        debate_id: &DebateId,
        team_id: &TeamId,
    ) -> StorageResult<Vec<ParticipantRecord>>;

    /// Remove the user's non-judge claims in this debate. Returns how many
    /// rows were staged for deletion.
    async fn delete_user_claims(
        &mut self,
        debate_id: &DebateId,
        user_id: &UserId,
    ) -> StorageResult<usize>;

    /// Return the debate's session id, staging a fresh one if it has none.
    async fn ensure_session(&mut self, debate_id: &DebateId) -> StorageResult<SessionId>;

    async fn insert_claims(&mut self, claims: Vec<ParticipantRecord>) -> StorageResult<()>;

    async fn commit(self: Box<Self>) -> StorageResult<()>;
}
