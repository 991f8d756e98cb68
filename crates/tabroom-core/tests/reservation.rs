//! Role reservation rules and concurrent join races over the in-memory store.

use std::collections::BTreeSet;

use futures::future::join_all;
use tabroom_core::{
    ReservationError, ReservationErrorKind, RoleRequestError, RoleReservation,
};
use tabroom_state::fakes::MemoryStore;
use tabroom_state::{
    DebateId, DebateRecord, DrawStore, JudgeAssignment, JudgeId, ParticipantRole, RoundId,
    TeamId, TeamRecord, TournamentId, UserId, MAX_DEBATERS_PER_TEAM,
};

const DEBATE: &str = "final";

fn debate_id() -> DebateId {
    DebateId::from(DEBATE)
}

fn user(id: &str) -> UserId {
    UserId::from(id)
}

/// One debate between `prop` (members p1..p5) and `opp` (members o1..o3),
/// with `adj` seated as judge. `both` is on `prop` and also seated.
fn setup() -> (MemoryStore, RoleReservation<MemoryStore>) {
    let store = MemoryStore::new();
    let team = |id: &str, members: &[&str]| TeamRecord {
        team_id: TeamId::from(id),
        tournament_id: TournamentId::from("open"),
        name: id.to_string(),
        members: members.iter().map(|m| UserId::from(*m)).collect(),
    };
    store.add_team(team("prop", &["p1", "p2", "p3", "p4", "p5", "both"]));
    store.add_team(team("opp", &["o1", "o2", "o3"]));
    store.insert_debate(DebateRecord {
        debate_id: debate_id(),
        round_id: RoundId::from("round-1"),
        proposition: TeamId::from("prop"),
        opposition: TeamId::from("opp"),
        importance: Some(2.0),
        session_id: None,
    });
    for (judge, user_id) in [("j-adj", "adj"), ("j-both", "both")] {
        store.insert_assignment(JudgeAssignment {
            debate_id: debate_id(),
            judge_id: JudgeId::from(judge),
            user_id: UserId::from(user_id),
        });
    }
    let api = RoleReservation::new(store.clone());
    (store, api)
}

fn team_users(store: &MemoryStore, team: &str) -> BTreeSet<UserId> {
    store
        .all_claims()
        .into_iter()
        .filter(|c| c.team_id == Some(TeamId::from(team)) && !c.is_judge())
        .map(|c| c.user_id)
        .collect()
}

// ===========================================================================
// Validation and classification
// ===========================================================================

#[tokio::test]
async fn reply_with_third_is_rejected_before_any_write() {
    let (store, api) = setup();
    let err = api
        .reserve_roles(&debate_id(), &user("p1"), &["THIRD_SPEAKER", "REPLY_SPEAKER"])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReservationError::Validation(RoleRequestError::ReplyWithThird)
    ));
    assert!(store.all_claims().is_empty());
}

#[tokio::test]
async fn empty_and_unknown_roles_are_validation_errors() {
    let (_, api) = setup();
    let none: [&str; 0] = [];
    let err = api
        .reserve_roles(&debate_id(), &user("p1"), &none)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ReservationErrorKind::Validation);

    let err = api
        .reserve_roles(&debate_id(), &user("p1"), &["WHIP"])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ReservationErrorKind::Validation);
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn strangers_are_refused() {
    let (_, api) = setup();
    let err = api
        .reserve_roles(&debate_id(), &user("spectator"), &["FIRST_SPEAKER"])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ReservationErrorKind::Permission);
}

#[tokio::test]
async fn unknown_debate_is_not_found() {
    let (_, api) = setup();
    let err = api
        .reserve_roles(&DebateId::from("nope"), &user("p1"), &["FIRST_SPEAKER"])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ReservationErrorKind::NotFound);
}

#[tokio::test]
async fn debater_cannot_claim_judge() {
    let (_, api) = setup();
    let err = api
        .reserve_roles(&debate_id(), &user("o1"), &["JUDGE"])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ReservationErrorKind::Permission);
}

#[tokio::test]
async fn judge_cannot_claim_speaking_roles() {
    let (_, api) = setup();
    let err = api
        .reserve_roles(&debate_id(), &user("adj"), &["FIRST_SPEAKER"])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReservationError::Validation(RoleRequestError::JudgeOnly)
    ));

    let err = api
        .reserve_roles(&debate_id(), &user("adj"), &["JUDGE", "FIRST_SPEAKER"])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ReservationErrorKind::Validation);
}

#[tokio::test]
async fn seated_team_member_is_treated_as_judge() {
    let (_, api) = setup();
    let err = api
        .reserve_roles(&debate_id(), &user("both"), &["FIRST_SPEAKER"])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ReservationErrorKind::Validation);

    let granted = api
        .reserve_roles(&debate_id(), &user("both"), &["JUDGE"])
        .await
        .unwrap();
    assert_eq!(granted.roles(), vec![ParticipantRole::Judge]);
    assert_eq!(granted.claims[0].team_id, None);
}

// ===========================================================================
// Granting
// ===========================================================================

#[tokio::test]
async fn lead_and_reply_join_a_team_with_two_debaters() {
    let (store, api) = setup();
    api.reserve_roles(&debate_id(), &user("p1"), &["SECOND_SPEAKER"])
        .await
        .unwrap();
    api.reserve_roles(&debate_id(), &user("p2"), &["THIRD_SPEAKER"])
        .await
        .unwrap();

    let granted = api
        .reserve_roles(
            &debate_id(),
            &user("p3"),
            &["FIRST_SPEAKER", "REPLY_SPEAKER"],
        )
        .await
        .unwrap();

    assert_eq!(
        granted.roles(),
        vec![ParticipantRole::FirstSpeaker, ParticipantRole::ReplySpeaker]
    );
    assert!(!granted.reconnected);
    assert!(granted
        .claims
        .iter()
        .all(|c| c.session_id == granted.session_id));

    let debate = store.get_debate(&debate_id()).await.unwrap();
    assert_eq!(debate.session_id, Some(granted.session_id.clone()));
    assert_eq!(team_users(&store, "prop").len(), 3);
}

#[tokio::test]
async fn everyone_converges_on_one_session() {
    let (_, api) = setup();
    let a = api
        .reserve_roles(&debate_id(), &user("p1"), &["FIRST_SPEAKER"])
        .await
        .unwrap();
    let b = api
        .reserve_roles(&debate_id(), &user("o1"), &["FIRST_SPEAKER"])
        .await
        .unwrap();
    let c = api
        .reserve_roles(&debate_id(), &user("adj"), &["JUDGE"])
        .await
        .unwrap();
    assert_eq!(a.session_id, b.session_id);
    assert_eq!(b.session_id, c.session_id);
}

#[tokio::test]
async fn fourth_debater_hits_capacity() {
    let (store, api) = setup();
    for (u, role) in [
        ("p1", "FIRST_SPEAKER"),
        ("p2", "SECOND_SPEAKER"),
        ("p3", "THIRD_SPEAKER"),
    ] {
        api.reserve_roles(&debate_id(), &user(u), &[role])
            .await
            .unwrap();
    }

    let err = api
        .reserve_roles(&debate_id(), &user("p4"), &["FIRST_SPEAKER", "REPLY_SPEAKER"])
        .await
        .unwrap_err();
    assert!(matches!(err, ReservationError::Capacity { limit: 3, .. }));
    assert!(!err.is_retryable());
    assert_eq!(team_users(&store, "prop").len(), MAX_DEBATERS_PER_TEAM);
}

#[tokio::test]
async fn taken_role_is_retryable() {
    let (_, api) = setup();
    api.reserve_roles(&debate_id(), &user("o1"), &["FIRST_SPEAKER"])
        .await
        .unwrap();

    let err = api
        .reserve_roles(&debate_id(), &user("o2"), &["FIRST_SPEAKER"])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ReservationErrorKind::RoleTaken);
    assert!(err.is_retryable());

    api.reserve_roles(&debate_id(), &user("o2"), &["SECOND_SPEAKER"])
        .await
        .unwrap();
}

#[tokio::test]
async fn same_role_on_other_team_is_free() {
    let (_, api) = setup();
    api.reserve_roles(&debate_id(), &user("p1"), &["FIRST_SPEAKER"])
        .await
        .unwrap();
    api.reserve_roles(&debate_id(), &user("o1"), &["FIRST_SPEAKER"])
        .await
        .unwrap();
}

#[tokio::test]
async fn rejoining_debater_replaces_own_claims() {
    let (store, api) = setup();
    for (u, role) in [
        ("p1", "FIRST_SPEAKER"),
        ("p2", "SECOND_SPEAKER"),
        ("p3", "THIRD_SPEAKER"),
    ] {
        api.reserve_roles(&debate_id(), &user(u), &[role])
            .await
            .unwrap();
    }

    // Full team, but p1's own claim does not count against p1.
    let granted = api
        .reserve_roles(&debate_id(), &user("p1"), &["FIRST_SPEAKER", "REPLY_SPEAKER"])
        .await
        .unwrap();
    assert_eq!(granted.claims.len(), 2);

    let p1_rows = store
        .all_claims()
        .into_iter()
        .filter(|c| c.user_id == user("p1"))
        .count();
    assert_eq!(p1_rows, 2);
}

#[tokio::test]
async fn judge_reconnect_is_idempotent() {
    let (store, api) = setup();
    let first = api
        .reserve_roles(&debate_id(), &user("adj"), &["JUDGE"])
        .await
        .unwrap();
    let again = api
        .reserve_roles(&debate_id(), &user("adj"), &["JUDGE"])
        .await
        .unwrap();

    assert!(again.reconnected);
    assert_eq!(again.session_id, first.session_id);
    assert_eq!(again.claims, first.claims);
    let judge_rows = store.all_claims().into_iter().filter(|c| c.is_judge()).count();
    assert_eq!(judge_rows, 1);
}

#[tokio::test]
async fn release_drops_debater_claims_but_keeps_judges() {
    let (store, api) = setup();
    api.reserve_roles(&debate_id(), &user("p1"), &["FIRST_SPEAKER", "REPLY_SPEAKER"])
        .await
        .unwrap();
    api.reserve_roles(&debate_id(), &user("adj"), &["JUDGE"])
        .await
        .unwrap();

    assert_eq!(api.release_roles(&debate_id(), &user("p1")).await.unwrap(), 2);
    assert_eq!(api.release_roles(&debate_id(), &user("adj")).await.unwrap(), 0);

    let roster = api.debate_roster(&debate_id()).await.unwrap();
    assert_eq!(roster.len(), 1);
    assert!(roster[0].is_judge());
    assert_eq!(store.all_claims().len(), 1);
}

// ===========================================================================
// Races
// ===========================================================================

#[tokio::test]
async fn concurrent_claims_for_one_slot_have_one_winner() {
    let (store, api) = setup();
    let debate = debate_id();
    let users = ["p1", "p2", "p3"].map(user);

    let outcomes = join_all(
        users
            .iter()
            .map(|u| api.reserve_roles(&debate, u, &["FIRST_SPEAKER"])),
    )
    .await;

    let winners = outcomes.iter().filter(|o| o.is_ok()).count();
    assert_eq!(winners, 1);
    for loser in outcomes.iter().filter_map(|o| o.as_ref().err()) {
        assert_eq!(loser.kind(), ReservationErrorKind::Conflict);
        assert!(loser.is_retryable());
    }

    let first_speakers = store
        .all_claims()
        .into_iter()
        .filter(|c| c.role == ParticipantRole::FirstSpeaker)
        .count();
    assert_eq!(first_speakers, 1);
}

#[tokio::test]
async fn racing_debaters_never_overfill_a_team() {
    let (store, api) = setup();
    let requests: Vec<(UserId, Vec<&str>)> = vec![
        (user("p1"), vec!["FIRST_SPEAKER"]),
        (user("p2"), vec!["SECOND_SPEAKER"]),
        (user("p3"), vec!["THIRD_SPEAKER"]),
        (user("p4"), vec!["FIRST_SPEAKER", "REPLY_SPEAKER"]),
        (user("p5"), vec!["SECOND_SPEAKER", "REPLY_SPEAKER"]),
    ];

    let attempts = requests.iter().map(|(u, roles)| {
        let api = &api;
        async move {
            for _ in 0..10 {
                match api.reserve_roles(&debate_id(), u, roles.as_slice()).await {
                    Ok(granted) => return Ok(granted),
                    Err(err) if err.kind() == ReservationErrorKind::Conflict => continue,
                    Err(err) => return Err(err),
                }
            }
            panic!("{u} kept losing races");
        }
    });
    let outcomes = join_all(attempts).await;

    let granted = outcomes.iter().filter(|o| o.is_ok()).count();
    assert!(granted <= MAX_DEBATERS_PER_TEAM);
    assert!(team_users(&store, "prop").len() <= MAX_DEBATERS_PER_TEAM);

    let mut slots = BTreeSet::new();
    for claim in store.all_claims() {
        if claim.role.is_main_speaker() {
            assert!(
                slots.insert((claim.team_id.clone(), claim.role)),
                "{:?} held twice",
                claim.role
            );
        }
    }
}

#[tokio::test]
async fn concurrent_judge_joins_share_one_session() {
    let (store, api) = setup();
    let (d1, u1, d2, u2) = (debate_id(), user("adj"), debate_id(), user("o1"));
    let (judge, debater) = futures::join!(
        api.reserve_roles(&d1, &u1, &["JUDGE"]),
        api.reserve_roles(&d2, &u2, &["FIRST_SPEAKER"]),
    );

    // One may lose the session race; a retry converges.
    let judge = match judge {
        Ok(r) => r,
        Err(err) => {
            assert!(err.is_retryable());
            api.reserve_roles(&debate_id(), &user("adj"), &["JUDGE"])
                .await
                .unwrap()
        }
    };
    let debater = match debater {
        Ok(r) => r,
        Err(err) => {
            assert!(err.is_retryable());
            api.reserve_roles(&debate_id(), &user("o1"), &["FIRST_SPEAKER"])
                .await
                .unwrap()
        }
    };
    assert_eq!(judge.session_id, debater.session_id);
    let stored = store.get_debate(&debate_id()).await.unwrap();
    assert_eq!(stored.session_id, Some(judge.session_id));
}
