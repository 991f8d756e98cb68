//! Judge allocation by greedy cost minimisation.
//!
//! Debates are visited from most to least important. Each one gets the
//! cheapest judge that still has capacity, where cost penalises a strength
//! shortfall, a conflict with either team, and the judge's current load.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tabroom_state::{DebateId, DebateRecord, JudgeAssignment, JudgeId, JudgeRecord, TeamId, UserId};
use tracing::{debug, warn};

use crate::history::HistoryMap;
use crate::obs;

/// Cost per debate a judge is already allocated to. Not configurable.
pub const LOAD_WEIGHT: f64 = 2.0;

/// Maximum debates per judge per round.
pub const JUDGE_CAPACITY: usize = 3;

const MIN_STRENGTH: u32 = 5;
const MAX_STRENGTH: u32 = 10;
const FEEDBACK_PER_STRENGTH_POINT: u32 = 5;

pub const STRENGTH_WEIGHT_ENV: &str = "TABROOM_STRENGTH_MISMATCH_WEIGHT";
pub const CONFLICT_PENALTY_ENV: &str = "TABROOM_CONFLICT_PENALTY";

/// Tunable cost weights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AllocationWeights {
    pub strength_mismatch_weight: f64,
    pub conflict_penalty: f64,
}

impl Default for AllocationWeights {
    fn default() -> Self {
        Self {
            strength_mismatch_weight: 10.0,
            conflict_penalty: 1000.0,
        }
    }
}

impl AllocationWeights {
    /// Read weights from the environment, falling back to the defaults.
    ///
    /// Reads:
    /// - TABROOM_STRENGTH_MISMATCH_WEIGHT
    /// - TABROOM_CONFLICT_PENALTY
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`AllocationWeights::from_env`], reading through `lookup`.
    /// Unparseable or non-finite values are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let read = |key: &str| {
            let raw = lookup(key)?;
            match raw.trim().parse::<f64>() {
                Ok(v) if v.is_finite() => Some(v),
                _ => {
                    warn!(key, value = %raw, "Ignoring unparseable weight");
                    None
                }
            }
        };
        Self {
            strength_mismatch_weight: read(STRENGTH_WEIGHT_ENV)
                .unwrap_or(defaults.strength_mismatch_weight),
            conflict_penalty: read(CONFLICT_PENALTY_ENV).unwrap_or(defaults.conflict_penalty),
        }
    }

    /// Replace whichever weights are given explicitly.
    pub fn with_overrides(
        self,
        strength_mismatch_weight: Option<f64>,
        conflict_penalty: Option<f64>,
    ) -> Self {
        Self {
            strength_mismatch_weight: strength_mismatch_weight
                .unwrap_or(self.strength_mismatch_weight),
            conflict_penalty: conflict_penalty.unwrap_or(self.conflict_penalty),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AllocationConfig {
    pub weights: AllocationWeights,
    /// Judges per debate
    pub panel_size: usize,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            weights: AllocationWeights::default(),
            panel_size: 1,
        }
    }
}

/// `min(5 + floor(feedback / 5), 10)`
pub fn judge_strength(feedback_count: u32) -> f64 {
    f64::from((MIN_STRENGTH + feedback_count / FEEDBACK_PER_STRENGTH_POINT).min(MAX_STRENGTH))
}

/// `round * 2 + average(wins) * 3`, with wins entering the round.
pub fn debate_importance(round_number: u32, team_wins: &[u32]) -> f64 {
    let average = if team_wins.is_empty() {
        0.0
    } else {
        team_wins.iter().map(|w| f64::from(*w)).sum::<f64>() / team_wins.len() as f64
    };
    f64::from(round_number) * 2.0 + average * 3.0
}

/// A judge as the allocator sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateJudge {
    pub judge_id: JudgeId,
    pub user_id: UserId,
    pub strength: f64,
    /// Every team this judge has judged before
    pub conflicts: BTreeSet<TeamId>,
}

impl CandidateJudge {
    pub fn new(judge: &JudgeRecord, feedback_count: u32, judged_teams: Vec<TeamId>) -> Self {
        Self {
            judge_id: judge.judge_id.clone(),
            user_id: judge.user_id.clone(),
            strength: judge_strength(feedback_count),
            conflicts: judged_teams.into_iter().collect(),
        }
    }

    pub fn conflicts_with(&self, debate: &DebateSlot) -> bool {
        self.conflicts.contains(&debate.proposition) || self.conflicts.contains(&debate.opposition)
    }
}

/// A debate awaiting judges.
#[derive(Debug, Clone, PartialEq)]
pub struct DebateSlot {
    pub debate_id: DebateId,
    pub proposition: TeamId,
    pub opposition: TeamId,
    pub importance: f64,
}

impl DebateSlot {
    /// Use the importance stored with the debate, or recompute it from the
    /// history entering the round.
    pub fn from_record(debate: &DebateRecord, round_number: u32, history: &HistoryMap) -> Self {
        let importance = debate.importance.unwrap_or_else(|| {
            let wins = |t: &TeamId| history.get(t).map_or(0, |h| h.wins);
            debate_importance(round_number, &[wins(&debate.proposition), wins(&debate.opposition)])
        });
        Self {
            debate_id: debate.debate_id.clone(),
            proposition: debate.proposition.clone(),
            opposition: debate.opposition.clone(),
            importance,
        }
    }
}

/// Cost of seating `judge` on `debate` given `allocated` debates so far.
pub fn assignment_cost(
    judge: &CandidateJudge,
    allocated: usize,
    debate: &DebateSlot,
    weights: &AllocationWeights,
) -> f64 {
    let shortfall = (debate.importance - judge.strength).max(0.0);
    let conflict = if judge.conflicts_with(debate) {
        weights.conflict_penalty
    } else {
        0.0
    };
    shortfall * weights.strength_mismatch_weight + conflict + allocated as f64 * LOAD_WEIGHT
}

/// Output of one allocation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AllocationPlan {
    pub assignments: Vec<JudgeAssignment>,
    /// Debates left short of a full panel because every judge was at capacity
    pub unallocated: Vec<DebateId>,
}

/// Allocate judges to debates.
pub fn allocate(
    debates: &[DebateSlot],
    judges: &[CandidateJudge],
    config: &AllocationConfig,
) -> AllocationPlan {
    let mut order: Vec<&DebateSlot> = debates.iter().collect();
    order.sort_by(|a, b| b.importance.total_cmp(&a.importance));

    let mut load = vec![0usize; judges.len()];
    let mut plan = AllocationPlan::default();

    for debate in order {
        let mut seated: Vec<usize> = Vec::with_capacity(config.panel_size);
        for _ in 0..config.panel_size {
            let mut best: Option<(usize, f64)> = None;
            for (idx, judge) in judges.iter().enumerate() {
                if load[idx] >= JUDGE_CAPACITY || seated.contains(&idx) {
                    continue;
                }
                let cost = assignment_cost(judge, load[idx], debate, &config.weights);
                if best.map_or(true, |(_, lowest)| cost < lowest) {
                    best = Some((idx, cost));
                }
            }
            let Some((idx, cost)) = best else {
                break;
            };
            debug!(
                debate_id = %debate.debate_id,
                judge_id = %judges[idx].judge_id,
                cost,
                "Judge seated"
            );
            load[idx] += 1;
            seated.push(idx);
            plan.assignments.push(JudgeAssignment {
                debate_id: debate.debate_id.clone(),
                judge_id: judges[idx].judge_id.clone(),
                user_id: judges[idx].user_id.clone(),
            });
        }

        if seated.len() < config.panel_size {
            warn!(
                debate_id = %debate.debate_id,
                seated = seated.len(),
                panel_size = config.panel_size,
                "Debate left short of judges"
            );
            obs::emit_debate_unallocated(&debate.debate_id, seated.len(), config.panel_size);
            plan.unallocated.push(debate.debate_id.clone());
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn judge(id: &str, strength: f64, conflicts: &[&str]) -> CandidateJudge {
        CandidateJudge {
            judge_id: JudgeId::from(id),
            user_id: UserId::from(format!("user-{id}")),
            strength,
            conflicts: conflicts.iter().map(|c| TeamId::from(*c)).collect(),
        }
    }

    fn slot(id: &str, prop: &str, opp: &str, importance: f64) -> DebateSlot {
        DebateSlot {
            debate_id: DebateId::from(id),
            proposition: TeamId::from(prop),
            opposition: TeamId::from(opp),
            importance,
        }
    }

    #[test]
    fn strength_is_bounded() {
        assert_eq!(judge_strength(0), 5.0);
        assert_eq!(judge_strength(4), 5.0);
        assert_eq!(judge_strength(5), 6.0);
        assert_eq!(judge_strength(24), 9.0);
        assert_eq!(judge_strength(25), 10.0);
        assert_eq!(judge_strength(10_000), 10.0);
    }

    #[test]
    fn importance_formula() {
        assert_eq!(debate_importance(1, &[0, 0]), 2.0);
        assert_eq!(debate_importance(3, &[2, 1]), 6.0 + 4.5);
        assert_eq!(debate_importance(2, &[]), 4.0);
    }

    #[test]
    fn cost_example_prefers_conflict_free_debate() {
        let j = judge("j", 6.0, &["team1"]);
        let weights = AllocationWeights::default();
        let a = slot("A", "team1", "team2", 8.0);
        let b = slot("B", "team3", "team4", 5.0);

        assert_eq!(assignment_cost(&j, 1, &a, &weights), 1022.0);
        assert_eq!(assignment_cost(&j, 1, &b, &weights), 2.0);
    }

    #[test]
    fn conflicted_judge_loses_to_clean_one() {
        let judges = vec![judge("conflicted", 10.0, &["a"]), judge("clean", 5.0, &[])];
        let plan = allocate(
            &[slot("d1", "a", "b", 8.0)],
            &judges,
            &AllocationConfig::default(),
        );
        assert_eq!(plan.assignments.len(), 1);
        assert_eq!(plan.assignments[0].judge_id, JudgeId::from("clean"));
    }

    #[test]
    fn ties_go_to_pool_order() {
        let judges = vec![judge("first", 7.0, &[]), judge("second", 7.0, &[])];
        let plan = allocate(
            &[slot("d1", "a", "b", 4.0)],
            &judges,
            &AllocationConfig::default(),
        );
        assert_eq!(plan.assignments[0].judge_id, JudgeId::from("first"));
    }

    #[test]
    fn most_important_debate_gets_first_pick() {
        let judges = vec![judge("strong", 10.0, &[]), judge("weak", 5.0, &[])];
        let debates = vec![slot("quiet", "a", "b", 4.0), slot("final", "c", "d", 12.0)];
        let plan = allocate(&debates, &judges, &AllocationConfig::default());

        let by_debate: HashMap<&str, &str> = plan
            .assignments
            .iter()
            .map(|a| (a.debate_id.as_str(), a.judge_id.as_str()))
            .collect();
        assert_eq!(by_debate["final"], "strong");
        assert_eq!(plan.assignments[0].debate_id, DebateId::from("final"));
    }

    #[test]
    fn capacity_is_never_exceeded() {
        let judges = vec![judge("only", 10.0, &[]), judge("spare", 5.0, &[])];
        let debates: Vec<DebateSlot> = (0..8)
            .map(|i| slot(&format!("d{i}"), &format!("p{i}"), &format!("o{i}"), 6.0))
            .collect();
        let plan = allocate(&debates, &judges, &AllocationConfig::default());

        let mut counts: HashMap<JudgeId, usize> = HashMap::new();
        for a in &plan.assignments {
            *counts.entry(a.judge_id.clone()).or_default() += 1;
        }
        assert!(counts.values().all(|c| *c <= JUDGE_CAPACITY));
        assert_eq!(plan.assignments.len(), 6);
        assert_eq!(plan.unallocated.len(), 2);
    }

    #[test]
    fn load_spreads_work_between_equal_judges() {
        let judges = vec![judge("x", 10.0, &[]), judge("y", 10.0, &[])];
        let debates = vec![slot("d1", "a", "b", 4.0), slot("d2", "c", "d", 4.0)];
        let plan = allocate(&debates, &judges, &AllocationConfig::default());
        let used: BTreeSet<&str> = plan.assignments.iter().map(|a| a.judge_id.as_str()).collect();
        assert_eq!(used.len(), 2);
    }

    #[test]
    fn panels_seat_distinct_judges() {
        let judges = vec![judge("a", 8.0, &[]), judge("b", 8.0, &[]), judge("c", 8.0, &[])];
        let config = AllocationConfig {
            panel_size: 3,
            ..Default::default()
        };
        let plan = allocate(&[slot("d1", "p", "o", 6.0)], &judges, &config);
        let seated: BTreeSet<&str> = plan.assignments.iter().map(|a| a.judge_id.as_str()).collect();
        assert_eq!(seated.len(), 3);
        assert!(plan.unallocated.is_empty());
    }

    #[test]
    fn empty_pool_leaves_every_debate_unallocated() {
        let plan = allocate(
            &[slot("d1", "a", "b", 4.0)],
            &[],
            &AllocationConfig::default(),
        );
        assert!(plan.assignments.is_empty());
        assert_eq!(plan.unallocated, vec![DebateId::from("d1")]);
    }

    #[test]
    fn stored_importance_wins_over_recomputation() {
        let record = DebateRecord {
            debate_id: DebateId::from("d"),
            round_id: tabroom_state::RoundId::from("r"),
            proposition: TeamId::from("a"),
            opposition: TeamId::from("b"),
            importance: Some(42.0),
            session_id: None,
        };
        assert_eq!(DebateSlot::from_record(&record, 3, &HistoryMap::new()).importance, 42.0);

        let fresh = DebateRecord {
            importance: None,
            ..record
        };
        assert_eq!(DebateSlot::from_record(&fresh, 3, &HistoryMap::new()).importance, 6.0);
    }

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key: &str| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn weights_parse_from_variables() {
        let weights = AllocationWeights::from_lookup(lookup(&[
            (STRENGTH_WEIGHT_ENV, " 4.5 "),
            (CONFLICT_PENALTY_ENV, "250"),
        ]));
        assert_eq!(weights.strength_mismatch_weight, 4.5);
        assert_eq!(weights.conflict_penalty, 250.0);
    }

    #[test]
    fn missing_variables_keep_defaults() {
        let weights = AllocationWeights::from_lookup(lookup(&[(CONFLICT_PENALTY_ENV, "7")]));
        assert_eq!(weights.strength_mismatch_weight, 10.0);
        assert_eq!(weights.conflict_penalty, 7.0);
        assert_eq!(AllocationWeights::from_lookup(|_| None), AllocationWeights::default());
    }

    #[tracing_test::traced_test]
    #[test]
    fn bad_values_are_logged_and_ignored() {
        let weights = AllocationWeights::from_lookup(lookup(&[
            (STRENGTH_WEIGHT_ENV, "heavy"),
            (CONFLICT_PENALTY_ENV, "inf"),
        ]));
        assert_eq!(weights, AllocationWeights::default());
        assert!(logs_contain("Ignoring unparseable weight"));
        assert!(logs_contain("heavy"));
    }

    #[test]
    fn explicit_weights_override_the_base() {
        let base = AllocationWeights {
            strength_mismatch_weight: 3.0,
            conflict_penalty: 90.0,
        };
        let weights = base.with_overrides(None, Some(5.0));
        assert_eq!(weights.strength_mismatch_weight, 3.0);
        assert_eq!(weights.conflict_penalty, 5.0);
        assert_eq!(base.with_overrides(None, None), base);
    }
}
