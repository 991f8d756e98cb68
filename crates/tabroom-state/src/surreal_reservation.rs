//! SurrealDB-backed role-claim transactions
//!
//! Reads go straight to the database and are cached per debate for the life
//! of the transaction. Writes are staged in memory and shipped as a single
//! `BEGIN TRANSACTION ... COMMIT TRANSACTION` query, where three guards run:
//! - the `idx_participant_slot` unique index rejects a taken main role
//! - a `session_conflict` throw when another writer created the session first
//! - a `capacity_exceeded` throw when a team ends up with too many debaters

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, instrument};

use crate::error::StorageError;
use crate::handle::{check_response, SurrealHandle};
use crate::schema::{
    DebateId, DebateRecord, ParticipantRecord, SessionId, TeamId, UserId, MAX_DEBATERS_PER_TEAM,
};
use crate::storage_traits::{ReservationRepository, ReservationTx, StorageResult};

const COMMIT_SQL: &str = r#"
    BEGIN TRANSACTION;
    FOR $d IN $deletes {
        DELETE participants WHERE debate_id = $d.debate_id AND user_id = $d.user_id AND role != 'JUDGE';
    };
    FOR $s IN $sessions {
        UPDATE debates SET session_id = $s.session_id
            WHERE debate_id = $s.debate_id AND (session_id = NONE OR session_id = NULL);
        IF (SELECT VALUE session_id FROM debates WHERE debate_id = $s.debate_id)[0] != $s.session_id {
            THROW "session_conflict";
        };
    };
    FOR $p IN $inserts {
        CREATE participants CONTENT $p;
    };
    FOR $g IN $guards {
        IF array::len(array::distinct((SELECT VALUE user_id FROM participants
            WHERE debate_id = $g.debate_id AND team_id = $g.team_id AND role != 'JUDGE'))) > $limit {
            THROW "capacity_exceeded";
        };
    };
    COMMIT TRANSACTION;
"#;

#[derive(Debug, Clone, Serialize)]
struct StagedDelete {
    debate_id: DebateId,
    user_id: UserId,
}

#[derive(Debug, Clone, Serialize)]
struct StagedSession {
    debate_id: DebateId,
    session_id: SessionId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct CapacityGuard {
    debate_id: DebateId,
    team_id: TeamId,
}

#[async_trait]
impl ReservationRepository for SurrealHandle {
    async fn begin(&self) -> StorageResult<Box<dyn ReservationTx>> {
        Ok(Box::new(SurrealReservationTx {
            db: self.db.clone(),
            claims: HashMap::new(),
            deletes: Vec::new(),
            sessions: Vec::new(),
            inserts: Vec::new(),
            guards: Vec::new(),
        }))
    }

    #[instrument(skip(self))]
    async fn list_claims(&self, debate_id: &DebateId) -> StorageResult<Vec<ParticipantRecord>> {
        fetch_claims(&self.db, debate_id).await
    }
}

async fn fetch_claims(
    db: &Surreal<Any>,
    debate_id: &DebateId,
) -> StorageResult<Vec<ParticipantRecord>> {
    let mut res = db
        .query("SELECT * FROM participants WHERE debate_id = $id ORDER BY reserved_at")
        .bind(("id", debate_id.to_string()))
        .await?;
    let claims: Vec<ParticipantRecord> = res.take(0)?;
    Ok(claims)
}

struct SurrealReservationTx {
    db: Surreal<Any>,
    /// Claims per debate as first read, with this transaction's writes applied
    claims: HashMap<DebateId, Vec<ParticipantRecord>>,
    deletes: Vec<StagedDelete>,
    sessions: Vec<StagedSession>,
    inserts: Vec<ParticipantRecord>,
    guards: Vec<CapacityGuard>,
}

impl SurrealReservationTx {
    async fn claims_for(&mut self, debate_id: &DebateId) -> StorageResult<&mut Vec<ParticipantRecord>> {
        if !self.claims.contains_key(debate_id) {
            let loaded = fetch_claims(&self.db, debate_id).await?;
            self.claims.insert(debate_id.clone(), loaded);
        }
        self.claims
            .get_mut(debate_id)
            .ok_or_else(|| StorageError::not_found("debate", debate_id))
    }
}

#[async_trait]
impl ReservationTx for SurrealReservationTx {
    async fn debate(&mut self, debate_id: &DebateId) -> StorageResult<DebateRecord> {
        let mut res = self
            .db
            .query("SELECT * FROM debates WHERE debate_id = $id")
            .bind(("id", debate_id.to_string()))
            .await?;
        let debates: Vec<DebateRecord> = res.take(0)?;
        let mut debate = debates
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::not_found("debate", debate_id))?;
        if debate.session_id.is_none() {
            debate.session_id = self
                .sessions
                .iter()
                .find(|s| &s.debate_id == debate_id)
                .map(|s| s.session_id.clone());
        }
        Ok(debate)
    }

    async fn user_claims(
        &mut self,
        debate_id: &DebateId,
        user_id: &UserId,
    ) -> StorageResult<Vec<ParticipantRecord>> {
        Ok(self
            .claims_for(debate_id)
            .await?
            .iter()
            .filter(|p| &p.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn team_claims(
        &mut self,
        debate_id: &DebateId,
        team_id: &TeamId,
    ) -> StorageResult<Vec<ParticipantRecord>> {
        Ok(self
            .claims_for(debate_id)
            .await?
            .iter()
            .filter(|p| p.team_id.as_ref() == Some(team_id))
            .cloned()
            .collect())
    }

    async fn delete_user_claims(
        &mut self,
        debate_id: &DebateId,
        user_id: &UserId,
    ) -> StorageResult<usize> {
        let claims = self.claims_for(debate_id).await?;
        let before = claims.len();
        claims.retain(|p| !(&p.user_id == user_id && !p.is_judge()));
        let removed = before - claims.len();
        self.deletes.push(StagedDelete {
            debate_id: debate_id.clone(),
            user_id: user_id.clone(),
        });
        Ok(removed)
    }

    async fn ensure_session(&mut self, debate_id: &DebateId) -> StorageResult<SessionId> {
        let debate = self.debate(debate_id).await?;
        if let Some(existing) = debate.session_id {
            return Ok(existing);
        }
        let session_id = SessionId::generate();
        self.sessions.push(StagedSession {
            debate_id: debate_id.clone(),
            session_id: session_id.clone(),
        });
        Ok(session_id)
    }

    async fn insert_claims(&mut self, claims: Vec<ParticipantRecord>) -> StorageResult<()> {
        for claim in claims {
            if let (Some(team_id), false) = (&claim.team_id, claim.is_judge()) {
                let guard = CapacityGuard {
                    debate_id: claim.debate_id.clone(),
                    team_id: team_id.clone(),
                };
                if !self.guards.contains(&guard) {
                    self.guards.push(guard);
                }
            }
            self.claims_for(&claim.debate_id).await?.push(claim.clone());
            self.inserts.push(claim);
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        let tx = *self;
        if tx.deletes.is_empty() && tx.sessions.is_empty() && tx.inserts.is_empty() {
            debug!("Nothing staged, commit is a no-op");
            return Ok(());
        }
        debug!(
            inserts = tx.inserts.len(),
            deletes = tx.deletes.len(),
            "Committing reservation"
        );
        let response = tx
            .db
            .query(COMMIT_SQL)
            .bind(("deletes", tx.deletes))
            .bind(("sessions", tx.sessions))
            .bind(("inserts", tx.inserts))
            .bind(("guards", tx.guards))
            .bind(("limit", MAX_DEBATERS_PER_TEAM as u64))
            .await?;
        check_response(response)?;
        debug!("Reservation committed");
        Ok(())
    }
}
