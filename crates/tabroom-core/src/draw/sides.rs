//! Side assignment.

use rand::Rng;
use tabroom_state::TeamId;

use crate::history::HistoryMap;

/// Return `(proposition, opposition)`.
///
/// The team with the lower `prop - opp` balance goes on proposition. Exact
/// ties are a coin flip.
pub fn assign_sides<R: Rng + ?Sized>(
    a: TeamId,
    b: TeamId,
    history: &HistoryMap,
    rng: &mut R,
) -> (TeamId, TeamId) {
    let balance = |team: &TeamId| history.get(team).map_or(0, |h| h.balance());
    let (ba, bb) = (balance(&a), balance(&b));

    let a_proposes = match ba.cmp(&bb) {
        std::cmp::Ordering::Less => true,
        std::cmp::Ordering::Greater => false,
        std::cmp::Ordering::Equal => rng.gen_bool(0.5),
    };
    if a_proposes {
        (a, b)
    } else {
        (b, a)
    }
}
