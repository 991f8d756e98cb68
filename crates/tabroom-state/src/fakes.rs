//! In-memory fakes for storage traits (testing only)
//!
//! `MemoryStore` implements every provider and store trait over one shared
//! set of tables, so a test can seed a roster, run a draw, allocate judges
//! and race reservations against the same state.
//!
//! Reservation transactions take a snapshot at `begin` and validate at
//! `commit`: first the participant slot unique constraint, then a
//! per-debate version counter (first committer wins). Both `begin` and
//! `commit` yield to the scheduler so concurrently polled futures interleave.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::schema::*;
use crate::storage_traits::*;

#[derive(Debug, Default)]
struct Tables {
    teams: Vec<TeamRecord>,
    results: Vec<DebateResult>,
    judges: Vec<JudgeRecord>,
    feedback: HashMap<JudgeId, u32>,
    judged: HashMap<JudgeId, Vec<TeamId>>,
    rounds: Vec<RoundRecord>,
    debates: Vec<DebateRecord>,
    assignments: Vec<JudgeAssignment>,
    participants: Vec<ParticipantRecord>,
    versions: HashMap<DebateId, u64>,
    /// When set, draw and allocation writes fail with this backend message
    write_fault: Option<String>,
}

impl Tables {
    fn check_write(&self) -> StorageResult<()> {
        match &self.write_fault {
            Some(message) => Err(StorageError::Backend(message.clone())),
            None => Ok(()),
        }
    }

    fn bump(&mut self, debate_id: &DebateId) {
        *self.versions.entry(debate_id.clone()).or_insert(0) += 1;
    }
}

/// In-memory tournament store. Clones share the same tables.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -- seeding ------------------------------------------------------------

    pub fn add_team(&self, team: TeamRecord) {
        self.lock().teams.push(team);
    }

    pub fn add_result(&self, result: DebateResult) {
        self.lock().results.push(result);
    }

    /// Register a judge with its feedback count and judging history.
    pub fn add_judge(&self, judge: JudgeRecord, feedback_count: u32, judged_teams: Vec<TeamId>) {
        let mut tables = self.lock();
        tables
            .feedback
            .insert(judge.judge_id.clone(), feedback_count);
        tables.judged.insert(judge.judge_id.clone(), judged_teams);
        tables.judges.push(judge);
    }

    /// Insert a debate directly, bypassing the draw.
    pub fn insert_debate(&self, debate: DebateRecord) {
        self.lock().debates.push(debate);
    }

    /// Seat a judge directly, bypassing allocation.
    pub fn insert_assignment(&self, assignment: JudgeAssignment) {
        self.lock().assignments.push(assignment);
    }

    /// Make every later draw and allocation write fail with `message`.
    pub fn fail_writes(&self, message: impl Into<String>) {
        self.lock().write_fault = Some(message.into());
    }

    /// Every committed claim across all debates.
    pub fn all_claims(&self) -> Vec<ParticipantRecord> {
        self.lock().participants.clone()
    }
}

#[async_trait]
impl RosterProvider for MemoryStore {
    async fn list_teams(&self, tournament_id: &TournamentId) -> StorageResult<Vec<TeamRecord>> {
        Ok(self
            .lock()
            .teams
            .iter()
            .filter(|t| &t.tournament_id == tournament_id)
            .cloned()
            .collect())
    }

    async fn teams_of_user(&self, user_id: &UserId) -> StorageResult<Vec<TeamId>> {
        Ok(self
            .lock()
            .teams
            .iter()
            .filter(|t| t.members.contains(user_id))
            .map(|t| t.team_id.clone())
            .collect())
    }
}

#[async_trait]
impl ResultsProvider for MemoryStore {
    async fn list_confirmed_results(
        &self,
        tournament_id: &TournamentId,
    ) -> StorageResult<Vec<DebateResult>> {
        Ok(self
            .lock()
            .results
            .iter()
            .filter(|r| &r.tournament_id == tournament_id && r.confirmed)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl JudgePoolProvider for MemoryStore {
    async fn list_candidate_judges(
        &self,
        tournament_id: &TournamentId,
    ) -> StorageResult<Vec<JudgeRecord>> {
        let tables = self.lock();
        let competing: HashSet<&UserId> = tables
            .teams
            .iter()
            .filter(|t| &t.tournament_id == tournament_id)
            .flat_map(|t| t.members.iter())
            .collect();
        Ok(tables
            .judges
            .iter()
            .filter(|j| &j.tournament_id == tournament_id && !competing.contains(&j.user_id))
            .cloned()
            .collect())
    }

    async fn feedback_count(&self, judge_id: &JudgeId) -> StorageResult<u32> {
        Ok(self.lock().feedback.get(judge_id).copied().unwrap_or(0))
    }

    async fn judged_teams(&self, judge_id: &JudgeId) -> StorageResult<Vec<TeamId>> {
        Ok(self.lock().judged.get(judge_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl DrawStore for MemoryStore {
    async fn find_round(
        &self,
        tournament_id: &TournamentId,
        round_number: u32,
    ) -> StorageResult<Option<RoundRecord>> {
        Ok(self
            .lock()
            .rounds
            .iter()
            .find(|r| &r.tournament_id == tournament_id && r.round_number == round_number)
            .cloned())
    }

    async fn get_round(&self, round_id: &RoundId) -> StorageResult<RoundRecord> {
        self.lock()
            .rounds
            .iter()
            .find(|r| &r.round_id == round_id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("round", round_id))
    }

    async fn save_draw(
        &self,
        round: &RoundRecord,
        debates: Vec<DebateRecord>,
    ) -> StorageResult<()> {
        let mut tables = self.lock();
        tables.check_write()?;
        let stale: HashSet<DebateId> = tables
            .debates
            .iter()
            .filter(|d| d.round_id == round.round_id)
            .map(|d| d.debate_id.clone())
            .collect();

        tables.debates.retain(|d| d.round_id != round.round_id);
        tables
            .assignments
            .retain(|a| !stale.contains(&a.debate_id));
        tables
            .participants
            .retain(|p| !stale.contains(&p.debate_id));
        for id in &stale {
            tables.bump(id);
        }

        tables.rounds.retain(|r| r.round_id != round.round_id);
        tables.rounds.push(round.clone());
        tables.debates.extend(debates);
        Ok(())
    }

    async fn set_round_status(
        &self,
        round_id: &RoundId,
        status: RoundStatus,
    ) -> StorageResult<()> {
        let mut tables = self.lock();
        tables.check_write()?;
        let round = tables
            .rounds
            .iter_mut()
            .find(|r| &r.round_id == round_id)
            .ok_or_else(|| StorageError::not_found("round", round_id))?;
        round.status = status;
        Ok(())
    }

    async fn list_debates(&self, round_id: &RoundId) -> StorageResult<Vec<DebateRecord>> {
        Ok(self
            .lock()
            .debates
            .iter()
            .filter(|d| &d.round_id == round_id)
            .cloned()
            .collect())
    }

    async fn get_debate(&self, debate_id: &DebateId) -> StorageResult<DebateRecord> {
        self.lock()
            .debates
            .iter()
            .find(|d| &d.debate_id == debate_id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("debate", debate_id))
    }
}

#[async_trait]
impl AllocationStore for MemoryStore {
    async fn replace_assignments(
        &self,
        _round_id: &RoundId,
        debate_ids: &[DebateId],
        assignments: Vec<JudgeAssignment>,
    ) -> StorageResult<()> {
        let mut tables = self.lock();
        tables.check_write()?;
        tables
            .assignments
            .retain(|a| !debate_ids.contains(&a.debate_id));
        tables.assignments.extend(assignments);
        Ok(())
    }

    async fn list_assignments(&self, debate_id: &DebateId) -> StorageResult<Vec<JudgeAssignment>> {
        Ok(self
            .lock()
            .assignments
            .iter()
            .filter(|a| &a.debate_id == debate_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ReservationRepository for MemoryStore {
    async fn begin(&self) -> StorageResult<Box<dyn ReservationTx>> {
        let tx = {
            let tables = self.lock();
            MemoryReservationTx {
                tables: Arc::clone(&self.tables),
                debates: tables.debates.clone(),
                working: tables.participants.clone(),
                base_versions: tables.versions.clone(),
                touched: HashSet::new(),
                deletes: Vec::new(),
                inserts: Vec::new(),
                sessions: Vec::new(),
            }
        };
        tokio::task::yield_now().await;
        Ok(Box::new(tx))
    }

    async fn list_claims(&self, debate_id: &DebateId) -> StorageResult<Vec<ParticipantRecord>> {
        Ok(self
            .lock()
            .participants
            .iter()
            .filter(|p| &p.debate_id == debate_id)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MemoryReservationTx
// ---------------------------------------------------------------------------

struct MemoryReservationTx {
    tables: Arc<Mutex<Tables>>,
    debates: Vec<DebateRecord>,
    /// Snapshot taken at `begin` with this transaction's writes applied
    working: Vec<ParticipantRecord>,
    base_versions: HashMap<DebateId, u64>,
    touched: HashSet<DebateId>,
    deletes: Vec<(DebateId, UserId)>,
    inserts: Vec<ParticipantRecord>,
    sessions: Vec<(DebateId, SessionId)>,
}

impl MemoryReservationTx {
    fn staged_session(&self, debate_id: &DebateId) -> Option<SessionId> {
        self.sessions
            .iter()
            .find(|(d, _)| d == debate_id)
            .map(|(_, s)| s.clone())
    }
}

#[async_trait]
impl ReservationTx for MemoryReservationTx {
    async fn debate(&mut self, debate_id: &DebateId) -> StorageResult<DebateRecord> {
        let mut debate = self
            .debates
            .iter()
            .find(|d| &d.debate_id == debate_id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("debate", debate_id))?;
        if debate.session_id.is_none() {
            debate.session_id = self.staged_session(debate_id);
        }
        Ok(debate)
    }

    async fn user_claims(
        &mut self,
        debate_id: &DebateId,
        user_id: &UserId,
    ) -> StorageResult<Vec<ParticipantRecord>> {
        Ok(self
            .working
            .iter()
            .filter(|p| &p.debate_id == debate_id && &p.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn team_claims(
        &mut self,
        debate_id: &DebateId,
        team_id: &TeamId,
    ) -> StorageResult<Vec<ParticipantRecord>> {
        Ok(self
            .working
            .iter()
            .filter(|p| &p.debate_id == debate_id && p.team_id.as_ref() == Some(team_id))
            .cloned()
            .collect())
    }

    async fn delete_user_claims(
        &mut self,
        debate_id: &DebateId,
        user_id: &UserId,
    ) -> StorageResult<usize> {
        let before = self.working.len();
        self.working.retain(|p| {
            !(&p.debate_id == debate_id && &p.user_id == user_id && !p.is_judge())
        });
        self.deletes.push((debate_id.clone(), user_id.clone()));
        self.touched.insert(debate_id.clone());
        Ok(before - self.working.len())
    }

    async fn ensure_session(&mut self, debate_id: &DebateId) -> StorageResult<SessionId> {
        let debate = self.debate(debate_id).await?;
        if let Some(existing) = debate.session_id {
            return Ok(existing);
        }
        let session = SessionId::generate();
        self.sessions.push((debate_id.clone(), session.clone()));
        self.touched.insert(debate_id.clone());
        Ok(session)
    }

    async fn insert_claims(&mut self, claims: Vec<ParticipantRecord>) -> StorageResult<()> {
        for claim in claims {
            self.touched.insert(claim.debate_id.clone());
            self.working.push(claim.clone());
            self.inserts.push(claim);
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        tokio::task::yield_now().await;
        let tx = *self;
        let mut tables = tx.tables.lock().unwrap_or_else(PoisonError::into_inner);

        let mut next: Vec<ParticipantRecord> = tables
            .participants
            .iter()
            .filter(|p| {
                !tx.deletes
                    .iter()
                    .any(|(d, u)| &p.debate_id == d && &p.user_id == u && !p.is_judge())
            })
            .cloned()
            .collect();
        for row in &tx.inserts {
            if next.iter().any(|p| p.slot_key == row.slot_key) {
                return Err(StorageError::UniqueViolation {
                    constraint: "participant_slot".to_string(),
                    key: row.slot_key.clone(),
                });
            }
            next.push(row.clone());
        }

        for debate_id in &tx.touched {
            let live = tables.versions.get(debate_id).copied().unwrap_or(0);
            let base = tx.base_versions.get(debate_id).copied().unwrap_or(0);
            if live != base {
                return Err(StorageError::SerializationFailure {
                    detail: format!("debate {debate_id} changed since transaction began"),
                });
            }
        }

        for (debate_id, session) in &tx.sessions {
            let debate = tables
                .debates
                .iter()
                .find(|d| &d.debate_id == debate_id)
                .ok_or_else(|| StorageError::not_found("debate", debate_id))?;
            if matches!(&debate.session_id, Some(existing) if existing != session) {
                return Err(StorageError::SerializationFailure {
                    detail: format!("session for debate {debate_id} created concurrently"),
                });
            }
        }

        for (debate_id, session) in &tx.sessions {
            if let Some(debate) = tables
                .debates
                .iter_mut()
                .find(|d| &d.debate_id == debate_id)
            {
                debate.session_id = Some(session.clone());
            }
        }
        tables.participants = next;
        for debate_id in &tx.touched {
            tables.bump(debate_id);
        }
        Ok(())
    }
}
