//! Bracket formation and pull-ups.

use std::collections::BTreeMap;

use tabroom_state::TeamId;

use crate::history::HistoryMap;

/// Win count mapped to the teams on that many wins, in roster order.
pub type Brackets = BTreeMap<u32, Vec<TeamId>>;

/// Group teams by wins entering the round. Teams without history sit on 0.
pub fn form_brackets(teams: &[TeamId], history: &HistoryMap) -> Brackets {
    let mut brackets = Brackets::new();
    for team in teams {
        let wins = history.get(team).map_or(0, |h| h.wins);
        brackets.entry(wins).or_default().push(team.clone());
    }
    brackets
}

/// Even out brackets from the top down.
///
/// Each odd bracket takes the last team of the next lower non-empty bracket.
/// Afterwards only the lowest bracket can be odd. Emptied brackets are
/// removed.
pub fn apply_pull_ups(brackets: &mut Brackets) {
    let keys: Vec<u32> = brackets.keys().rev().copied().collect();
    for (i, wins) in keys.iter().enumerate() {
        let odd = brackets.get(wins).is_some_and(|b| b.len() % 2 == 1);
        if !odd {
            continue;
        }
        let donor = keys[i + 1..]
            .iter()
            .find(|lower| brackets.get(*lower).is_some_and(|b| !b.is_empty()))
            .copied();
        let Some(donor) = donor else {
            continue;
        };
        let pulled = brackets.get_mut(&donor).and_then(Vec::pop);
        if let (Some(team), Some(bracket)) = (pulled, brackets.get_mut(wins)) {
            bracket.push(team);
        }
    }
    brackets.retain(|_, teams| !teams.is_empty());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::TeamHistory;

    fn ids(names: &[&str]) -> Vec<TeamId> {
        names.iter().map(|n| TeamId::from(*n)).collect()
    }

    fn with_wins(pairs: &[(&str, u32)]) -> HistoryMap {
        pairs
            .iter()
            .map(|(id, wins)| {
                (
                    TeamId::from(*id),
                    TeamHistory {
                        wins: *wins,
                        ..Default::default()
                    },
                )
            })
            .collect()
    }

    #[test]
    fn pull_up_takes_last_team_of_lower_bracket() {
        let mut brackets = Brackets::new();
        brackets.insert(3, ids(&["A", "B", "C"]));
        brackets.insert(2, ids(&["D", "E"]));

        apply_pull_ups(&mut brackets);

        assert_eq!(brackets[&3], ids(&["A", "B", "C", "E"]));
        assert_eq!(brackets[&2], ids(&["D"]));
    }

    #[test]
    fn pull_up_skips_empty_gaps() {
        let mut brackets = Brackets::new();
        brackets.insert(4, ids(&["A"]));
        brackets.insert(3, vec![]);
        brackets.insert(1, ids(&["B", "C", "D"]));

        apply_pull_ups(&mut brackets);

        assert_eq!(brackets[&4], ids(&["A", "D"]));
        assert_eq!(brackets[&1], ids(&["B", "C"]));
        assert!(!brackets.contains_key(&3));
    }

    #[test]
    fn only_lowest_bracket_may_stay_odd() {
        let history = with_wins(&[
            ("a", 3),
            ("b", 2),
            ("c", 2),
            ("d", 2),
            ("e", 1),
            ("f", 0),
            ("g", 0),
        ]);
        let teams: Vec<TeamId> = history.keys().cloned().collect();
        let mut brackets = form_brackets(&teams, &history);
        apply_pull_ups(&mut brackets);

        let lowest = *brackets.keys().next().unwrap();
        for (wins, members) in &brackets {
            if *wins != lowest {
                assert_eq!(members.len() % 2, 0, "bracket {wins} is odd");
            }
        }
        let total: usize = brackets.values().map(Vec::len).sum();
        assert_eq!(total, 7);
    }

    #[test]
    fn teams_without_history_start_on_zero() {
        let brackets = form_brackets(&ids(&["new"]), &HistoryMap::new());
        assert_eq!(brackets[&0], ids(&["new"]));
    }
}
