//! Within-bracket matching with rematch avoidance.

use tabroom_state::TeamId;

use crate::history::{has_rematch, HistoryMap};

/// Pairs from one bracket, plus the team left over when the bracket is odd.
#[derive(Debug, Default, PartialEq)]
pub struct BracketMatch {
    pub pairs: Vec<(TeamId, TeamId)>,
    pub leftover: Option<TeamId>,
}

/// Match a bracket, most side-imbalanced teams first.
///
/// Each unpaired team takes the first later unpaired team it has not faced.
/// When every remaining candidate is a rematch it takes the first of them.
pub fn match_bracket(members: &[TeamId], history: &HistoryMap) -> BracketMatch {
    let imbalance = |team: &TeamId| history.get(team).map_or(0, |h| h.side_imbalance());

    let mut order: Vec<&TeamId> = members.iter().collect();
    order.sort_by_key(|team| std::cmp::Reverse(imbalance(team)));

    let mut paired = vec![false; order.len()];
    let mut result = BracketMatch::default();

    for i in 0..order.len() {
        if paired[i] {
            continue;
        }
        let open: Vec<usize> = (i + 1..order.len()).filter(|&j| !paired[j]).collect();
        let fresh = open
            .iter()
            .copied()
            .find(|&j| !has_rematch(history, order[i], order[j]));
        let Some(j) = fresh.or_else(|| open.first().copied()) else {
            result.leftover = Some(order[i].clone());
            continue;
        };
        paired[i] = true;
        paired[j] = true;
        result.pairs.push((order[i].clone(), order[j].clone()));
    }

    result
}
