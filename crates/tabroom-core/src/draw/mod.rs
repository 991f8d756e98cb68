//! Swiss power pairing.
//!
//! Round 1 is a shuffle paired in order. Later rounds group teams into win
//! brackets, even the brackets out with pull-ups from below, match within
//! each bracket while avoiding rematches, then balance sides.
//!
//! Only the round-1 shuffle and side tie-breaks consume randomness, so a
//! later-round draw is reproducible from its history and a seeded source.

pub mod brackets;
pub mod matching;
pub mod sides;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use tabroom_state::TeamId;
use tracing::{debug, warn};

use crate::allocation::debate_importance;
use crate::error::{TabError, TabResult};
use crate::history::HistoryMap;
use crate::obs;

pub use brackets::{apply_pull_ups, form_brackets, Brackets};
pub use matching::{match_bracket, BracketMatch};
pub use sides::assign_sides;

/// One proposed debate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pairing {
    pub proposition: TeamId,
    pub opposition: TeamId,
    pub importance: Option<f64>,
}

impl Pairing {
    pub fn involves(&self, team: &TeamId) -> bool {
        &self.proposition == team || &self.opposition == team
    }
}

/// A round's pairings plus any team the draw could not place.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Draw {
    pub pairings: Vec<Pairing>,
    pub unpaired: Vec<TeamId>,
}

/// Generate one round's draw.
///
/// `teams` is the roster in roster order; it decides bracket order and thus
/// which team a pull-up takes. `history` is the history entering the round.
pub fn generate_draw<R: Rng + ?Sized>(
    round_number: u32,
    teams: &[TeamId],
    history: &HistoryMap,
    rng: &mut R,
) -> TabResult<Draw> {
    if teams.len() < 2 {
        return Err(TabError::InsufficientTeams { found: teams.len() });
    }

    let mut draw = if round_number <= 1 {
        random_draw(teams, rng)
    } else {
        power_pair(teams, history, rng)
    };

    for pairing in &mut draw.pairings {
        let wins = |t: &TeamId| history.get(t).map_or(0, |h| h.wins);
        pairing.importance = Some(debate_importance(
            round_number,
            &[wins(&pairing.proposition), wins(&pairing.opposition)],
        ));
    }

    for team in &draw.unpaired {
        warn!(round = round_number, team = %team, "Team left without an opponent");
        obs::emit_team_unpaired(round_number, team);
    }

    debug!(
        round = round_number,
        pairings = draw.pairings.len(),
        unpaired = draw.unpaired.len(),
        "Draw generated"
    );
    Ok(draw)
}

fn random_draw<R: Rng + ?Sized>(teams: &[TeamId], rng: &mut R) -> Draw {
    let mut shuffled = teams.to_vec();
    shuffled.shuffle(rng);

    let mut draw = Draw::default();
    let mut chunks = shuffled.chunks_exact(2);
    for pair in chunks.by_ref() {
        draw.pairings.push(Pairing {
            proposition: pair[0].clone(),
            opposition: pair[1].clone(),
            importance: None,
        });
    }
    draw.unpaired.extend(chunks.remainder().iter().cloned());
    draw
}

fn power_pair<R: Rng + ?Sized>(teams: &[TeamId], history: &HistoryMap, rng: &mut R) -> Draw {
    let mut brackets = form_brackets(teams, history);
    apply_pull_ups(&mut brackets);

    let mut draw = Draw::default();
    for (wins, members) in brackets.iter().rev() {
        debug!(wins, size = members.len(), "Pairing bracket");
        let matched = match_bracket(members, history);
        for (a, b) in matched.pairs {
            let (proposition, opposition) = assign_sides(a, b, history, rng);
            draw.pairings.push(Pairing {
                proposition,
                opposition,
                importance: None,
            });
        }
        draw.unpaired.extend(matched.leftover);
    }
    draw
}
