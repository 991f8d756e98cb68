//! Tournament service: fetch inputs, run an engine, persist its output.

use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tabroom_state::{
    AllocationStore, DebateId, DebateRecord, DrawStore, JudgeAssignment, JudgePoolProvider,
    ParticipantRecord, ReservationRepository, ResultsProvider, RosterProvider, RoundId,
    RoundRecord, RoundStatus, TeamId, TournamentId, UserId,
};
use tracing::{debug, error, info, instrument};

use crate::allocation::{allocate, AllocationConfig, AllocationWeights, CandidateJudge, DebateSlot};
use crate::draw::generate_draw;
use crate::error::{TabError, TabResult};
use crate::history::{aggregate_history, standings, HistoryMap, Standing};
use crate::metrics::METRICS;
use crate::obs::{self, RoundSpan};
use crate::reservation::{Reservation, ReservationError, RoleReservation};

/// Everything the service needs from storage.
pub trait TournamentStore:
    RosterProvider
    + ResultsProvider
    + JudgePoolProvider
    + DrawStore
    + AllocationStore
    + ReservationRepository
    + Clone
{
}

impl<T> TournamentStore for T where
    T: RosterProvider
        + ResultsProvider
        + JudgePoolProvider
        + DrawStore
        + AllocationStore
        + ReservationRepository
        + Clone
{
}

/// A persisted draw.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrawOutcome {
    pub round_id: RoundId,
    pub round_number: u32,
    pub pairings: Vec<DebateRecord>,
    pub unpaired: Vec<TeamId>,
}

/// A persisted allocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationOutcome {
    pub round_id: RoundId,
    pub assignments: Vec<JudgeAssignment>,
    pub unallocated: Vec<DebateId>,
}

pub struct TournamentService<S> {
    store: S,
    reservations: RoleReservation<S>,
    rng: Mutex<StdRng>,
    allocation: AllocationConfig,
}

impl<S: TournamentStore> TournamentService<S> {
    /// Service with an entropy-seeded draw RNG.
    pub fn new(store: S) -> Self {
        Self::with_rng(store, StdRng::from_entropy())
    }

    /// Service whose draws are reproducible from `seed`.
    pub fn with_seed(store: S, seed: u64) -> Self {
        Self::with_rng(store, StdRng::seed_from_u64(seed))
    }

    fn with_rng(store: S, rng: StdRng) -> Self {
        Self {
            reservations: RoleReservation::new(store.clone()),
            store,
            rng: Mutex::new(rng),
            allocation: AllocationConfig::default(),
        }
    }

    pub fn with_allocation_config(mut self, config: AllocationConfig) -> Self {
        self.allocation = config;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn history(&self, tournament_id: &TournamentId) -> TabResult<(Vec<TeamId>, HistoryMap)> {
        let teams: Vec<TeamId> = self
            .store
            .list_teams(tournament_id)
            .await?
            .into_iter()
            .map(|t| t.team_id)
            .collect();
        let results = self.store.list_confirmed_results(tournament_id).await?;
        let history = aggregate_history(&teams, &results);
        Ok((teams, history))
    }

    /// Generate and persist the draw for `round_number`.
    ///
    /// A draft round is redrawn in place under the same round id. A
    /// published round is refused.
    #[instrument(skip(self), fields(tournament_id = %tournament_id))]
    pub async fn generate_round_draw(
        &self,
        tournament_id: &TournamentId,
        round_number: u32,
    ) -> TabResult<DrawOutcome> {
        surface(self.draw_round(tournament_id, round_number).await)
    }

    async fn draw_round(
        &self,
        tournament_id: &TournamentId,
        round_number: u32,
    ) -> TabResult<DrawOutcome> {
        let round = match self.store.find_round(tournament_id, round_number).await? {
            Some(existing) if existing.status == RoundStatus::Published => {
                return Err(TabError::RoundPublished(existing.round_id));
            }
            Some(existing) => {
                debug!(round_id = %existing.round_id, "Redrawing draft round");
                RoundRecord {
                    status: RoundStatus::Draft,
                    ..existing
                }
            }
            None => RoundRecord::new(tournament_id.clone(), round_number),
        };

        let (teams, history) = self.history(tournament_id).await?;
        let draw = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            generate_draw(round_number, &teams, &history, &mut *rng)?
        };

        let debates: Vec<DebateRecord> = draw
            .pairings
            .into_iter()
            .map(|p| DebateRecord {
                debate_id: DebateId::generate(),
                round_id: round.round_id.clone(),
                proposition: p.proposition,
                opposition: p.opposition,
                importance: p.importance,
                session_id: None,
            })
            .collect();
        self.store.save_draw(&round, debates.clone()).await?;

        METRICS.inc_draws();
        obs::emit_draw_generated(&round.round_id, round_number, debates.len(), draw.unpaired.len());

        Ok(DrawOutcome {
            round_id: round.round_id,
            round_number,
            pairings: debates,
            unpaired: draw.unpaired,
        })
    }

    /// Allocate judges for every debate in the round and replace any
    /// previous allocation. `weights` overrides the configured weights.
    #[instrument(skip(self, weights), fields(round_id = %round_id))]
    pub async fn auto_allocate_judges(
        &self,
        round_id: &RoundId,
        weights: Option<AllocationWeights>,
    ) -> TabResult<AllocationOutcome> {
        surface(self.allocate_round(round_id, weights).await)
    }

    async fn allocate_round(
        &self,
        round_id: &RoundId,
        weights: Option<AllocationWeights>,
    ) -> TabResult<AllocationOutcome> {
        let round = self
            .store
            .get_round(round_id)
            .await
            .map_err(|e| TabError::from_round_lookup(round_id, e))?;
        let config = AllocationConfig {
            weights: weights.unwrap_or(self.allocation.weights),
            ..self.allocation
        };

        let records = self.store.list_debates(round_id).await?;
        let (_, history) = self.history(&round.tournament_id).await?;
        let debates: Vec<DebateSlot> = records
            .iter()
            .map(|d| DebateSlot::from_record(d, round.round_number, &history))
            .collect();

        let pool = self.store.list_candidate_judges(&round.tournament_id).await?;
        let mut judges = Vec::with_capacity(pool.len());
        for judge in &pool {
            let feedback = self.store.feedback_count(&judge.judge_id).await?;
            let judged = self.store.judged_teams(&judge.judge_id).await?;
            judges.push(CandidateJudge::new(judge, feedback, judged));
        }
        debug!(debates = debates.len(), judges = judges.len(), "Allocating");

        let plan = {
            let _span = RoundSpan::enter(round_id);
            allocate(&debates, &judges, &config)
        };
        let debate_ids: Vec<DebateId> = records.into_iter().map(|d| d.debate_id).collect();
        self.store
            .replace_assignments(round_id, &debate_ids, plan.assignments.clone())
            .await?;

        METRICS.add_judges_assigned(plan.assignments.len() as u64);
        obs::emit_allocation_persisted(round_id, plan.assignments.len(), plan.unallocated.len());

        Ok(AllocationOutcome {
            round_id: round_id.clone(),
            assignments: plan.assignments,
            unallocated: plan.unallocated,
        })
    }

    /// Mark a round's draw as published. Published rounds cannot be redrawn.
    #[instrument(skip(self), fields(round_id = %round_id))]
    pub async fn publish_round(&self, round_id: &RoundId) -> TabResult<()> {
        surface(self.mark_published(round_id).await)
    }

    async fn mark_published(&self, round_id: &RoundId) -> TabResult<()> {
        self.store
            .get_round(round_id)
            .await
            .map_err(|e| TabError::from_round_lookup(round_id, e))?;
        self.store
            .set_round_status(round_id, RoundStatus::Published)
            .await?;
        info!("Round published");
        Ok(())
    }

    #[instrument(skip(self), fields(tournament_id = %tournament_id))]
    pub async fn standings(&self, tournament_id: &TournamentId) -> TabResult<Vec<Standing>> {
        let history = surface(self.history(tournament_id).await)?.1;
        Ok(standings(&history))
    }

    pub async fn reserve_roles<R: AsRef<str>>(
        &self,
        debate_id: &DebateId,
        user_id: &UserId,
        roles: &[R],
    ) -> Result<Reservation, ReservationError> {
        self.reservations
            .reserve_roles(debate_id, user_id, roles)
            .await
    }

    pub async fn release_roles(
        &self,
        debate_id: &DebateId,
        user_id: &UserId,
    ) -> Result<usize, ReservationError> {
        self.reservations.release_roles(debate_id, user_id).await
    }

    pub async fn debate_roster(
        &self,
        debate_id: &DebateId,
    ) -> Result<Vec<ParticipantRecord>, ReservationError> {
        self.reservations.debate_roster(debate_id).await
    }
}

/// Log a storage failure before handing it to the caller.
fn surface<T>(result: TabResult<T>) -> TabResult<T> {
    if let Err(TabError::Storage(cause)) = &result {
        error!(error = %cause, "Tournament operation failed in storage");
    }
    result
}
