//! Record shapes shared by the engines and the storage backends
//!
//! Tables:
//! - teams: Team roster entries (owned by the roster collaborator)
//! - results: Confirmed and unconfirmed debate outcomes
//! - judges: Candidate judges per tournament
//! - rounds / debates: Draw output, replaced wholesale on redraw
//! - judge_assignments: Allocation output, replaced wholesale on reallocation
//! - participants: Role claims made at join time

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s)
            }
        }
    };
}

macro_rules! generated_id {
    ($name:ident) => {
        impl $name {
            /// Generate a new random identifier
            pub fn generate() -> Self {
                $name(uuid::Uuid::new_v4().to_string())
            }
        }
    };
}

string_id!(
    /// Tournament identifier
    TournamentId
);
string_id!(
    /// Team identifier
    TeamId
);
string_id!(
    /// User identifier (debaters and judges alike)
    UserId
);
string_id!(
    /// Judge identifier within the judge pool
    JudgeId
);
string_id!(
    /// Round identifier
    RoundId
);
string_id!(
    /// Debate instance identifier (one persisted pairing)
    DebateId
);
string_id!(
    /// Shared communication session for everyone in one debate
    SessionId
);

generated_id!(RoundId);
generated_id!(DebateId);
generated_id!(SessionId);

// ---------------------------------------------------------------------------
// Roster input
// ---------------------------------------------------------------------------

/// A team as supplied by the roster collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamRecord {
    pub team_id: TeamId,
    pub tournament_id: TournamentId,
    pub name: String,
    /// Users registered on this team
    #[serde(default)]
    pub members: Vec<UserId>,
}

/// Which bench a team sat on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Proposition,
    Opposition,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Proposition => write!(f, "proposition"),
            Side::Opposition => write!(f, "opposition"),
        }
    }
}

/// Outcome of one past debate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateResult {
    pub debate_id: DebateId,
    pub tournament_id: TournamentId,
    pub proposition: TeamId,
    pub opposition: TeamId,
    pub winner: Side,
    /// Only confirmed (published) results feed team history
    pub confirmed: bool,
}

impl DebateResult {
    /// The team that won this debate.
    pub fn winning_team(&self) -> &TeamId {
        match self.winner {
            Side::Proposition => &self.proposition,
            Side::Opposition => &self.opposition,
        }
    }
}

/// A candidate judge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeRecord {
    pub judge_id: JudgeId,
    pub user_id: UserId,
    pub tournament_id: TournamentId,
    pub name: String,
}

// ---------------------------------------------------------------------------
// Draw and allocation output
// ---------------------------------------------------------------------------

/// Publication state of a round's draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundStatus {
    Draft,
    Published,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub round_id: RoundId,
    pub tournament_id: TournamentId,
    pub round_number: u32,
    pub status: RoundStatus,
    pub created_at: DateTime<Utc>,
}

impl RoundRecord {
    /// Create a new draft round
    pub fn new(tournament_id: TournamentId, round_number: u32) -> Self {
        Self {
            round_id: RoundId::generate(),
            tournament_id,
            round_number,
            status: RoundStatus::Draft,
            created_at: Utc::now(),
        }
    }
}

/// A persisted pairing; the debate instance participants join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateRecord {
    pub debate_id: DebateId,
    pub round_id: RoundId,
    pub proposition: TeamId,
    pub opposition: TeamId,
    pub importance: Option<f64>,
    #[serde(default)]
    pub session_id: Option<SessionId>,
}

/// One judge seated on one debate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeAssignment {
    pub debate_id: DebateId,
    pub judge_id: JudgeId,
    pub user_id: UserId,
}

// ---------------------------------------------------------------------------
// Role claims
// ---------------------------------------------------------------------------

/// Distinct users that may hold speaking claims for one team in one debate.
pub const MAX_DEBATERS_PER_TEAM: usize = 3;

/// A role a participant can hold inside a debate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantRole {
    FirstSpeaker,
    SecondSpeaker,
    ThirdSpeaker,
    ReplySpeaker,
    Judge,
}

impl ParticipantRole {
    pub const ALL: [ParticipantRole; 5] = [
        ParticipantRole::FirstSpeaker,
        ParticipantRole::SecondSpeaker,
        ParticipantRole::ThirdSpeaker,
        ParticipantRole::ReplySpeaker,
        ParticipantRole::Judge,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantRole::FirstSpeaker => "FIRST_SPEAKER",
            ParticipantRole::SecondSpeaker => "SECOND_SPEAKER",
            ParticipantRole::ThirdSpeaker => "THIRD_SPEAKER",
            ParticipantRole::ReplySpeaker => "REPLY_SPEAKER",
            ParticipantRole::Judge => "JUDGE",
        }
    }

    /// First, second and third speaker: one holder per team per debate.
    pub fn is_main_speaker(&self) -> bool {
        matches!(
            self,
            ParticipantRole::FirstSpeaker
                | ParticipantRole::SecondSpeaker
                | ParticipantRole::ThirdSpeaker
        )
    }
}

impl std::fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ParticipantRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ParticipantRole::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| s.to_string())
    }
}

/// Lifecycle of a claim. This core only creates `Reserved` rows; the call
/// session layer promotes them to `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimStatus {
    Reserved,
    Active,
}

/// One claimed role for one user in one debate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub debate_id: DebateId,
    pub user_id: UserId,
    pub team_id: Option<TeamId>,
    pub role: ParticipantRole,
    pub status: ClaimStatus,
    pub session_id: SessionId,
    /// Storage-level uniqueness key, see [`ParticipantRecord::slot_key_for`]
    pub slot_key: String,
    pub reserved_at: DateTime<Utc>,
}

impl ParticipantRecord {
    /// Build a new `Reserved` claim.
    pub fn reserved(
        debate_id: DebateId,
        user_id: UserId,
        team_id: Option<TeamId>,
        role: ParticipantRole,
        session_id: SessionId,
    ) -> Self {
        let slot_key = Self::slot_key_for(&debate_id, &user_id, team_id.as_ref(), role);
        Self {
            debate_id,
            user_id,
            team_id,
            role,
            status: ClaimStatus::Reserved,
            session_id,
            slot_key,
            reserved_at: Utc::now(),
        }
    }

    /// Main speaking roles are keyed by team so a second holder collides;
    /// reply and judge claims are keyed by user and never collide across users.
    pub fn slot_key_for(
        debate_id: &DebateId,
        user_id: &UserId,
        team_id: Option<&TeamId>,
        role: ParticipantRole,
    ) -> String {
        match team_id {
            Some(team) if role.is_main_speaker() => format!("{debate_id}/{team}/{role}"),
            _ => format!("{debate_id}/{user_id}/{role}"),
        }
    }

    pub fn is_judge(&self) -> bool {
        self.role == ParticipantRole::Judge
    }
}
