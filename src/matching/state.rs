// Match existence state machine - pure transitions, no side effects
use chrono::{DateTime, Utc};
use std::fmt;

use crate::models::{Match, MatchId, PostId};

/// Absent -> PendingCreate -> Active -> Deleted.
///
/// PendingCreate only spans the write-then-reread window of creation. There
/// is no Active -> Active edge: a match's snapshot content is never rewritten.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchState {
    Absent,
    PendingCreate {
        user_post: PostId,
        candidate_post: PostId,
        started_at: DateTime<Utc>,
    },
    Active {
        match_id: MatchId,
        created_at: DateTime<Utc>,
    },
    Deleted {
        match_id: MatchId,
        deleted_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvalidTransition(pub String);

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for InvalidTransition {}

impl MatchState {
    /// State implied by a read of the store.
    pub fn observe(found: Option<&Match>) -> Self {
        match found {
            Some(m) => Self::Active {
                match_id: m.id.clone(),
                created_at: m.created_at,
            },
            None => Self::Absent,
        }
    }

    pub fn state_name(&self) -> &'static str {
        match self {
            Self::Absent => "Absent",
            Self::PendingCreate { .. } => "PendingCreate",
            Self::Active { .. } => "Active",
            Self::Deleted { .. } => "Deleted",
        }
    }

    pub fn match_id(&self) -> Option<&MatchId> {
        match self {
            Self::Active { match_id, .. } | Self::Deleted { match_id, .. } => Some(match_id),
            _ => None,
        }
    }

    /// Transition: Absent -> PendingCreate
    pub fn begin_create(
        self,
        user_post: PostId,
        candidate_post: PostId,
        now: DateTime<Utc>,
    ) -> Result<Self, InvalidTransition> {
        match self {
            Self::Absent => Ok(Self::PendingCreate {
                user_post,
                candidate_post,
                started_at: now,
            }),
            other => Err(InvalidTransition(format!(
                "Cannot start creating a match from {} state",
                other.state_name()
            ))),
        }
    }

    /// Transition: PendingCreate -> Active, once the stored record is read back.
    pub fn confirm(self, stored: &Match) -> Result<Self, InvalidTransition> {
        match self {
            Self::PendingCreate { .. } => Ok(Self::Active {
                match_id: stored.id.clone(),
                created_at: stored.created_at,
            }),
            other => Err(InvalidTransition(format!(
                "Cannot confirm a match from {} state",
                other.state_name()
            ))),
        }
    }

    /// Transition: Active -> Deleted. Deleting an absent or already deleted
    /// match is a no-op that stays put.
    pub fn delete(self, now: DateTime<Utc>) -> Result<Self, InvalidTransition> {
        match self {
            Self::Active { match_id, .. } => Ok(Self::Deleted {
                match_id,
                deleted_at: now,
            }),
            Self::Absent | Self::Deleted { .. } => Ok(self),
            other => Err(InvalidTransition(format!(
                "Cannot delete a match from {} state",
                other.state_name()
            ))),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }
}
