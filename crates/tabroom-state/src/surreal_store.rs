//! SurrealDB-backed providers, `DrawStore` and `AllocationStore`
//!
//! Roster order for the SurrealDB backend is `team_id` order; record ids are
//! random so insertion order is not recoverable.

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use crate::error::StorageError;
use crate::handle::{check_response, DbJudge, SurrealHandle};
use crate::schema::{
    DebateId, DebateRecord, DebateResult, JudgeAssignment, JudgeId, JudgeRecord, RoundId,
    RoundRecord, RoundStatus, TeamId, TeamRecord, TournamentId, UserId,
};
use crate::storage_traits::{
    AllocationStore, DrawStore, JudgePoolProvider, ResultsProvider, RosterProvider,
    StorageResult,
};

impl SurrealHandle {
    async fn fetch_judge(&self, judge_id: &JudgeId) -> StorageResult<DbJudge> {
        let mut res = self
            .db
            .query("SELECT * FROM judges WHERE judge_id = $id")
            .bind(("id", judge_id.to_string()))
            .await?;
        let rows: Vec<DbJudge> = res.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::not_found("judge", judge_id))
    }
}

#[async_trait]
impl RosterProvider for SurrealHandle {
    #[instrument(skip(self))]
    async fn list_teams(&self, tournament_id: &TournamentId) -> StorageResult<Vec<TeamRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM teams WHERE tournament_id = $t ORDER BY team_id")
            .bind(("t", tournament_id.to_string()))
            .await?;
        let teams: Vec<TeamRecord> = res.take(0)?;
        debug!(count = teams.len(), "Loaded teams");
        Ok(teams)
    }

    #[instrument(skip(self))]
    async fn teams_of_user(&self, user_id: &UserId) -> StorageResult<Vec<TeamId>> {
        let mut res = self
            .db
            .query("SELECT VALUE team_id FROM teams WHERE members CONTAINS $user")
            .bind(("user", user_id.to_string()))
            .await?;
        let teams: Vec<TeamId> = res.take(0)?;
        Ok(teams)
    }
}

#[async_trait]
impl ResultsProvider for SurrealHandle {
    #[instrument(skip(self))]
    async fn list_confirmed_results(
        &self,
        tournament_id: &TournamentId,
    ) -> StorageResult<Vec<DebateResult>> {
        let mut res = self
            .db
            .query("SELECT * FROM results WHERE tournament_id = $t AND confirmed = true")
            .bind(("t", tournament_id.to_string()))
            .await?;
        let results: Vec<DebateResult> = res.take(0)?;
        Ok(results)
    }
}

#[async_trait]
impl JudgePoolProvider for SurrealHandle {
    #[instrument(skip(self))]
    async fn list_candidate_judges(
        &self,
        tournament_id: &TournamentId,
    ) -> StorageResult<Vec<JudgeRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM judges WHERE tournament_id = $t ORDER BY judge_id")
            .bind(("t", tournament_id.to_string()))
            .await?;
        let judges: Vec<DbJudge> = res.take(0)?;

        let competing: HashSet<UserId> = self
            .list_teams(tournament_id)
            .await?
            .into_iter()
            .flat_map(|t| t.members)
            .collect();

        Ok(judges
            .into_iter()
            .filter(|j| !competing.contains(&j.user_id))
            .map(DbJudge::into_record)
            .collect())
    }

    async fn feedback_count(&self, judge_id: &JudgeId) -> StorageResult<u32> {
        Ok(self.fetch_judge(judge_id).await?.feedback_count)
    }

    async fn judged_teams(&self, judge_id: &JudgeId) -> StorageResult<Vec<TeamId>> {
        Ok(self.fetch_judge(judge_id).await?.judged_teams)
    }
}

#[async_trait]
impl DrawStore for SurrealHandle {
    #[instrument(skip(self))]
    async fn find_round(
        &self,
        tournament_id: &TournamentId,
        round_number: u32,
    ) -> StorageResult<Option<RoundRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM rounds WHERE tournament_id = $t AND round_number = $n")
            .bind(("t", tournament_id.to_string()))
            .bind(("n", round_number))
            .await?;
        let rounds: Vec<RoundRecord> = res.take(0)?;
        Ok(rounds.into_iter().next())
    }

    #[instrument(skip(self))]
    async fn get_round(&self, round_id: &RoundId) -> StorageResult<RoundRecord> {
        let mut res = self
            .db
            .query("SELECT * FROM rounds WHERE round_id = $id")
            .bind(("id", round_id.to_string()))
            .await?;
        let rounds: Vec<RoundRecord> = res.take(0)?;
        rounds
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::not_found("round", round_id))
    }

    #[instrument(skip(self, round, debates), fields(round_id = %round.round_id, debates = debates.len()))]
    async fn save_draw(
        &self,
        round: &RoundRecord,
        debates: Vec<DebateRecord>,
    ) -> StorageResult<()> {
        let stale: Vec<String> = self
            .list_debates(&round.round_id)
            .await?
            .into_iter()
            .map(|d| d.debate_id.to_string())
            .collect();

        let sql = r#"
            BEGIN TRANSACTION;
            DELETE judge_assignments WHERE debate_id IN $stale;
            DELETE participants WHERE debate_id IN $stale;
            DELETE debates WHERE round_id = $round_id;
            DELETE rounds WHERE round_id = $round_id;
            CREATE rounds CONTENT $round;
            FOR $debate IN $debates {
                CREATE debates CONTENT $debate;
            };
            COMMIT TRANSACTION;
        "#;
        let response = self
            .db
            .query(sql)
            .bind(("stale", stale))
            .bind(("round_id", round.round_id.to_string()))
            .bind(("round", round.clone()))
            .bind(("debates", debates))
            .await?;
        check_response(response)?;
        info!("Draw saved");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn set_round_status(
        &self,
        round_id: &RoundId,
        status: RoundStatus,
    ) -> StorageResult<()> {
        let mut res = self
            .db
            .query("UPDATE rounds SET status = $status WHERE round_id = $id")
            .bind(("status", status))
            .bind(("id", round_id.to_string()))
            .await?;
        let updated: Vec<RoundRecord> = res.take(0)?;
        if updated.is_empty() {
            return Err(StorageError::not_found("round", round_id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_debates(&self, round_id: &RoundId) -> StorageResult<Vec<DebateRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM debates WHERE round_id = $id ORDER BY debate_id")
            .bind(("id", round_id.to_string()))
            .await?;
        let debates: Vec<DebateRecord> = res.take(0)?;
        Ok(debates)
    }

    #[instrument(skip(self))]
    async fn get_debate(&self, debate_id: &DebateId) -> StorageResult<DebateRecord> {
        let mut res = self
            .db
            .query("SELECT * FROM debates WHERE debate_id = $id")
            .bind(("id", debate_id.to_string()))
            .await?;
        let debates: Vec<DebateRecord> = res.take(0)?;
        debates
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::not_found("debate", debate_id))
    }
}

#[async_trait]
impl AllocationStore for SurrealHandle {
    #[instrument(skip(self, debate_ids, assignments), fields(assignments = assignments.len()))]
    async fn replace_assignments(
        &self,
        round_id: &RoundId,
        debate_ids: &[DebateId],
        assignments: Vec<JudgeAssignment>,
    ) -> StorageResult<()> {
        let debate_ids: Vec<String> = debate_ids.iter().map(ToString::to_string).collect();
        let sql = r#"
            BEGIN TRANSACTION;
            DELETE judge_assignments WHERE debate_id IN $debates;
            FOR $assignment IN $assignments {
                CREATE judge_assignments CONTENT $assignment;
            };
            COMMIT TRANSACTION;
        "#;
        let response = self
            .db
            .query(sql)
            .bind(("debates", debate_ids))
            .bind(("assignments", assignments))
            .await?;
        check_response(response)?;
        info!(%round_id, "Judge assignments replaced");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_assignments(&self, debate_id: &DebateId) -> StorageResult<Vec<JudgeAssignment>> {
        let mut res = self
            .db
            .query("SELECT * FROM judge_assignments WHERE debate_id = $id ORDER BY judge_id")
            .bind(("id", debate_id.to_string()))
            .await?;
        let assignments: Vec<JudgeAssignment> = res.take(0)?;
        Ok(assignments)
    }
}
