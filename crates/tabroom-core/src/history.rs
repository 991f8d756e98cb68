//! Team history aggregation.
//!
//! Turns confirmed results into per-team wins, side counts and opponents.
//! Everything here is a pure function of its inputs.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tabroom_state::{DebateResult, Side, TeamId};

/// Competitive history of one team entering a round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TeamHistory {
    pub wins: u32,
    pub prop_count: u32,
    pub opp_count: u32,
    pub opponents: BTreeSet<TeamId>,
}

impl TeamHistory {
    /// `prop_count - opp_count`; negative means opposition-heavy.
    pub fn balance(&self) -> i64 {
        i64::from(self.prop_count) - i64::from(self.opp_count)
    }

    pub fn side_imbalance(&self) -> u64 {
        self.balance().unsigned_abs()
    }

    pub fn has_faced(&self, other: &TeamId) -> bool {
        self.opponents.contains(other)
    }

    fn record(&mut self, side: Side, opponent: &TeamId, won: bool) {
        match side {
            Side::Proposition => self.prop_count += 1,
            Side::Opposition => self.opp_count += 1,
        }
        if won {
            self.wins += 1;
        }
        self.opponents.insert(opponent.clone());
    }
}

pub type HistoryMap = BTreeMap<TeamId, TeamHistory>;

/// Aggregate confirmed results into history for the requested teams.
///
/// Every requested team gets an entry. Unconfirmed results are skipped.
/// Teams outside the set get no entry but still count as opponents.
pub fn aggregate_history<'a, I>(team_ids: I, results: &[DebateResult]) -> HistoryMap
where
    I: IntoIterator<Item = &'a TeamId>,
{
    let mut history: HistoryMap = team_ids
        .into_iter()
        .map(|id| (id.clone(), TeamHistory::default()))
        .collect();

    for result in results.iter().filter(|r| r.confirmed) {
        if let Some(entry) = history.get_mut(&result.proposition) {
            entry.record(
                Side::Proposition,
                &result.opposition,
                result.winner == Side::Proposition,
            );
        }
        if let Some(entry) = history.get_mut(&result.opposition) {
            entry.record(
                Side::Opposition,
                &result.proposition,
                result.winner == Side::Opposition,
            );
        }
    }

    history
}

/// True if either team has faced the other.
pub fn has_rematch(history: &HistoryMap, a: &TeamId, b: &TeamId) -> bool {
    history.get(a).is_some_and(|h| h.has_faced(b))
        || history.get(b).is_some_and(|h| h.has_faced(a))
}

/// One row of the standings table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Standing {
    pub team_id: TeamId,
    pub wins: u32,
    pub prop_count: u32,
    pub opp_count: u32,
}

/// Teams by wins descending, ties broken by team id.
pub fn standings(history: &HistoryMap) -> Vec<Standing> {
    let mut rows: Vec<Standing> = history
        .iter()
        .map(|(team_id, h)| Standing {
            team_id: team_id.clone(),
            wins: h.wins,
            prop_count: h.prop_count,
            opp_count: h.opp_count,
        })
        .collect();
    // BTreeMap iteration already orders by team id; the sort is stable.
    rows.sort_by(|a, b| b.wins.cmp(&a.wins));
    rows
}
