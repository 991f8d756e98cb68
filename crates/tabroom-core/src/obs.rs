//! Structured observability hooks for draw, allocation and reservation
//! events.
//!
//! This module provides:
//! - Round-scoped tracing spans via the `RoundSpan` RAII guard
//! - Emission functions for the lifecycle events operators alert on
//!
//! Every event carries an `event` field so log pipelines can filter on it.

use tabroom_state::{DebateId, RoundId, TeamId, UserId};
use tracing::{info, warn};

/// RAII guard that enters a round-scoped span for its lifetime.
///
/// ```ignore
/// let _span = RoundSpan::enter(&round_id);
/// // every event below carries round_id
/// ```
pub struct RoundSpan {
    _span: tracing::span::EnteredSpan,
}

impl RoundSpan {
    pub fn enter(round_id: &RoundId) -> Self {
        let span = tracing::info_span!("tabroom.round", round_id = %round_id);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_draw_generated(round_id: &RoundId, round_number: u32, pairings: usize, unpaired: usize) {
    info!(
        event = "draw.generated",
        round_id = %round_id,
        round_number,
        pairings,
        unpaired,
    );
}

pub fn emit_team_unpaired(round_number: u32, team_id: &TeamId) {
    warn!(event = "draw.team_unpaired", round_number, team_id = %team_id);
}

pub fn emit_allocation_persisted(round_id: &RoundId, assignments: usize, unallocated: usize) {
    info!(
        event = "allocation.persisted",
        round_id = %round_id,
        assignments,
        unallocated,
    );
}

pub fn emit_debate_unallocated(debate_id: &DebateId, seated: usize, panel_size: usize) {
    warn!(
        event = "allocation.debate_unallocated",
        debate_id = %debate_id,
        seated,
        panel_size,
    );
}

pub fn emit_reservation_granted(debate_id: &DebateId, user_id: &UserId, roles: usize, reconnected: bool) {
    info!(
        event = "reservation.granted",
        debate_id = %debate_id,
        user_id = %user_id,
        roles,
        reconnected,
    );
}

/// Logged at `warn!` with the error kind.
pub fn emit_reservation_rejected(debate_id: &DebateId, user_id: &UserId, kind: &str, error: &dyn std::fmt::Display) {
    warn!(
        event = "reservation.rejected",
        debate_id = %debate_id,
        user_id = %user_id,
        kind,
        error = %error,
    );
}

pub fn emit_reservation_released(debate_id: &DebateId, user_id: &UserId, released: usize) {
    info!(
        event = "reservation.released",
        debate_id = %debate_id,
        user_id = %user_id,
        released,
    );
}
