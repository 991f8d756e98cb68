//! Tabroom Core Library
//!
//! Debate tournament engines:
//! - `history`: confirmed results folded into per-team history
//! - `draw`: Swiss power pairing with pull-ups, rematch avoidance and side balancing
//! - `allocation`: judge allocation by cost minimisation
//! - `reservation`: transactional role claims at join time
//! - `service`: `TournamentService`, which wires the engines to storage

pub mod allocation;
pub mod draw;
pub mod error;
pub mod history;
pub mod metrics;
pub mod obs;
pub mod reservation;
pub mod service;
pub mod telemetry;

pub use allocation::{
    allocate, assignment_cost, debate_importance, judge_strength, AllocationConfig,
    AllocationPlan, AllocationWeights, CandidateJudge, DebateSlot, CONFLICT_PENALTY_ENV,
    JUDGE_CAPACITY, LOAD_WEIGHT, STRENGTH_WEIGHT_ENV,
};
pub use draw::{generate_draw, Draw, Pairing};
pub use error::{TabError, TabResult};
pub use metrics::METRICS;
pub use history::{aggregate_history, has_rematch, standings, HistoryMap, Standing, TeamHistory};
pub use reservation::{
    Reservation, ReservationError, ReservationErrorKind, RoleRequest, RoleRequestError,
    RoleReservation,
};
pub use service::{AllocationOutcome, DrawOutcome, TournamentService, TournamentStore};
pub use telemetry::init_tracing;

pub use tabroom_state::{
    DebateId, DebateRecord, JudgeAssignment, JudgeId, ParticipantRecord, ParticipantRole,
    RoundId, RoundStatus, SessionId, TeamId, TournamentId, UserId,
};
