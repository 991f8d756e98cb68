//! The role reservation transaction.

use std::collections::BTreeSet;

use serde::Serialize;
use tabroom_state::{
    AllocationStore, DebateId, DebateRecord, DrawStore, ParticipantRecord, ParticipantRole,
    ReservationRepository, ReservationTx, RosterProvider, SessionId, StorageError, TeamId,
    UserId, MAX_DEBATERS_PER_TEAM,
};
use tracing::{debug, error, instrument};

use super::error::ReservationError;
use super::roles::{RoleRequest, RoleRequestError};
use crate::metrics::METRICS;
use crate::obs;

/// A granted reservation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reservation {
    pub debate_id: DebateId,
    pub user_id: UserId,
    pub session_id: SessionId,
    pub claims: Vec<ParticipantRecord>,
    /// True when a judge reconnected to an existing reservation
    pub reconnected: bool,
}

impl Reservation {
    pub fn roles(&self) -> Vec<ParticipantRole> {
        self.claims.iter().map(|c| c.role).collect()
    }
}

/// How the requester relates to the debate.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Requester {
    Judge,
    Debater(TeamId),
}

/// Reservation API over a store that can read rosters, judge assignments and
/// debates, and run role-claim transactions.
pub struct RoleReservation<S> {
    store: S,
}

impl<S> RoleReservation<S>
where
    S: ReservationRepository + AllocationStore + RosterProvider + DrawStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Claim `roles` for `user_id` in `debate_id`.
    ///
    /// Judges holding a claim get it back unchanged. Debaters replace any
    /// claim they already hold in this debate.
    #[instrument(skip_all, fields(debate_id = %debate_id, user_id = %user_id))]
    pub async fn reserve_roles<R: AsRef<str>>(
        &self,
        debate_id: &DebateId,
        user_id: &UserId,
        roles: &[R],
    ) -> Result<Reservation, ReservationError> {
        match self.try_reserve(debate_id, user_id, roles).await {
            Ok(reservation) => {
                METRICS.inc_reservations();
                obs::emit_reservation_granted(
                    debate_id,
                    user_id,
                    reservation.claims.len(),
                    reservation.reconnected,
                );
                Ok(reservation)
            }
            Err(err) => {
                if err.is_retryable() {
                    METRICS.inc_conflicts();
                }
                if let ReservationError::Storage(cause) = &err {
                    error!(error = %cause, "Reservation failed in storage");
                }
                obs::emit_reservation_rejected(debate_id, user_id, err.kind().as_str(), &err);
                Err(err)
            }
        }
    }

    async fn try_reserve<R: AsRef<str>>(
        &self,
        debate_id: &DebateId,
        user_id: &UserId,
        roles: &[R],
    ) -> Result<Reservation, ReservationError> {
        let request = RoleRequest::parse(roles)?;
        let debate = self.store.get_debate(debate_id).await?;
        let requester = self.classify(&debate, user_id).await?;
        debug!(?requester, roles = ?request.roles(), "Requester classified");

        let mut tx = self.store.begin().await?;
        match requester {
            Requester::Judge => self.reserve_as_judge(tx, debate_id, user_id, &request).await,
            Requester::Debater(team_id) => {
                if request.contains(ParticipantRole::Judge) {
                    return Err(ReservationError::Permission {
                        debate_id: debate_id.clone(),
                        user_id: user_id.clone(),
                    });
                }
                let replaced = tx.delete_user_claims(debate_id, user_id).await?;
                if replaced > 0 {
                    debug!(replaced, "Dropped previous debater claims");
                }
                self.reserve_as_debater(tx, debate_id, user_id, team_id, &request)
                    .await
            }
        }
    }

    /// Judges take precedence over team membership.
    async fn classify(
        &self,
        debate: &DebateRecord,
        user_id: &UserId,
    ) -> Result<Requester, ReservationError> {
        let assignments = self.store.list_assignments(&debate.debate_id).await?;
        if assignments.iter().any(|a| &a.user_id == user_id) {
            return Ok(Requester::Judge);
        }

        let teams = self.store.teams_of_user(user_id).await?;
        [&debate.proposition, &debate.opposition]
            .into_iter()
            .find(|team| teams.contains(*team))
            .map(|team| Requester::Debater(team.clone()))
            .ok_or_else(|| ReservationError::Permission {
                debate_id: debate.debate_id.clone(),
                user_id: user_id.clone(),
            })
    }

    async fn reserve_as_judge(
        &self,
        mut tx: Box<dyn ReservationTx>,
        debate_id: &DebateId,
        user_id: &UserId,
        request: &RoleRequest,
    ) -> Result<Reservation, ReservationError> {
        let held: Vec<ParticipantRecord> = tx
            .user_claims(debate_id, user_id)
            .await?
            .into_iter()
            .filter(ParticipantRecord::is_judge)
            .collect();
        if let Some(first) = held.first() {
            debug!("Judge reconnected to existing reservation");
            return Ok(Reservation {
                debate_id: debate_id.clone(),
                user_id: user_id.clone(),
                session_id: first.session_id.clone(),
                claims: held,
                reconnected: true,
            });
        }

        if !request.is_judge_only() {
            return Err(RoleRequestError::JudgeOnly.into());
        }

        let session_id = tx.ensure_session(debate_id).await?;
        let claims = vec![ParticipantRecord::reserved(
            debate_id.clone(),
            user_id.clone(),
            None,
            ParticipantRole::Judge,
            session_id.clone(),
        )];
        tx.insert_claims(claims.clone()).await?;
        commit(tx).await?;

        Ok(Reservation {
            debate_id: debate_id.clone(),
            user_id: user_id.clone(),
            session_id,
            claims,
            reconnected: false,
        })
    }

    async fn reserve_as_debater(
        &self,
        mut tx: Box<dyn ReservationTx>,
        debate_id: &DebateId,
        user_id: &UserId,
        team_id: TeamId,
        request: &RoleRequest,
    ) -> Result<Reservation, ReservationError> {
        let team_claims: Vec<ParticipantRecord> = tx
            .team_claims(debate_id, &team_id)
            .await?
            .into_iter()
            .filter(|c| !c.is_judge())
            .collect();

        let others: BTreeSet<&UserId> = team_claims
            .iter()
            .map(|c| &c.user_id)
            .filter(|u| *u != user_id)
            .collect();
        if others.len() + 1 > MAX_DEBATERS_PER_TEAM {
            return Err(ReservationError::Capacity {
                debate_id: debate_id.clone(),
                team_id,
                limit: MAX_DEBATERS_PER_TEAM,
            });
        }

        for role in request.main_roles() {
            if team_claims
                .iter()
                .any(|c| c.role == role && &c.user_id != user_id)
            {
                return Err(ReservationError::RoleTaken { team_id, role });
            }
        }

        let session_id = tx.ensure_session(debate_id).await?;
        let claims: Vec<ParticipantRecord> = request
            .roles()
            .iter()
            .map(|role| {
                ParticipantRecord::reserved(
                    debate_id.clone(),
                    user_id.clone(),
                    Some(team_id.clone()),
                    *role,
                    session_id.clone(),
                )
            })
            .collect();
        tx.insert_claims(claims.clone()).await?;
        commit(tx).await?;

        Ok(Reservation {
            debate_id: debate_id.clone(),
            user_id: user_id.clone(),
            session_id,
            claims,
            reconnected: false,
        })
    }

    /// Drop the user's debater claims in this debate. Judge claims stay.
    #[instrument(skip_all, fields(debate_id = %debate_id, user_id = %user_id))]
    pub async fn release_roles(
        &self,
        debate_id: &DebateId,
        user_id: &UserId,
    ) -> Result<usize, ReservationError> {
        let mut tx = self.store.begin().await?;
        tx.debate(debate_id).await?;
        let released = tx.delete_user_claims(debate_id, user_id).await?;
        if released > 0 {
            commit(tx).await?;
        }
        obs::emit_reservation_released(debate_id, user_id, released);
        Ok(released)
    }

    /// Current claims in a debate.
    pub async fn debate_roster(
        &self,
        debate_id: &DebateId,
    ) -> Result<Vec<ParticipantRecord>, ReservationError> {
        self.store.get_debate(debate_id).await?;
        Ok(self.store.list_claims(debate_id).await?)
    }
}

/// Commit, turning a lost race into `Conflict`.
async fn commit(tx: Box<dyn ReservationTx>) -> Result<(), ReservationError> {
    tx.commit().await.map_err(|err| match err {
        StorageError::UniqueViolation { .. } | StorageError::SerializationFailure { .. } => {
            debug!(error = %err, "Commit lost a race");
            ReservationError::Conflict(err)
        }
        other => ReservationError::from(other),
    })
}
