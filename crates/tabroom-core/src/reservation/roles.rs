//! Role request parsing and validation.

use tabroom_state::ParticipantRole;

/// Why a requested role set was rejected before touching storage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoleRequestError {
    #[error("no roles requested")]
    Empty,

    #[error("unknown role: {0}")]
    UnknownRole(String),

    #[error("role requested more than once: {0}")]
    Duplicate(ParticipantRole),

    #[error("REPLY_SPEAKER cannot be combined with THIRD_SPEAKER")]
    ReplyWithThird,

    #[error("REPLY_SPEAKER requires FIRST_SPEAKER or SECOND_SPEAKER")]
    ReplyWithoutLead,

    #[error("a judge may only request the JUDGE role")]
    JudgeOnly,
}

/// A validated, duplicate-free set of requested roles in request order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRequest {
    roles: Vec<ParticipantRole>,
}

impl RoleRequest {
    /// Parse raw role names (case-insensitive) and check the combination rules.
    pub fn parse<S: AsRef<str>>(raw: &[S]) -> Result<Self, RoleRequestError> {
        if raw.is_empty() {
            return Err(RoleRequestError::Empty);
        }

        let mut roles = Vec::with_capacity(raw.len());
        for name in raw {
            let role: ParticipantRole = name
                .as_ref()
                .parse()
                .map_err(RoleRequestError::UnknownRole)?;
            if roles.contains(&role) {
                return Err(RoleRequestError::Duplicate(role));
            }
            roles.push(role);
        }

        let request = Self { roles };
        if request.contains(ParticipantRole::ReplySpeaker) {
            if request.contains(ParticipantRole::ThirdSpeaker) {
                return Err(RoleRequestError::ReplyWithThird);
            }
            if !request.contains(ParticipantRole::FirstSpeaker)
                && !request.contains(ParticipantRole::SecondSpeaker)
            {
                return Err(RoleRequestError::ReplyWithoutLead);
            }
        }
        Ok(request)
    }

    pub fn roles(&self) -> &[ParticipantRole] {
        &self.roles
    }

    pub fn contains(&self, role: ParticipantRole) -> bool {
        self.roles.contains(&role)
    }

    /// Exactly `[JUDGE]`.
    pub fn is_judge_only(&self) -> bool {
        self.roles == [ParticipantRole::Judge]
    }

    /// Requested roles that admit one holder per team.
    pub fn main_roles(&self) -> impl Iterator<Item = ParticipantRole> + '_ {
        self.roles.iter().copied().filter(ParticipantRole::is_main_speaker)
    }
}
