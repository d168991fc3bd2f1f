// Persisted entities - field names match the store's camelCase documents
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::store::{collections, Document};

/// Reviews written by a deleted account are re-attributed to this identity.
pub const DELETED_USER_ID: &str = "deleted-user";
pub const DELETED_USER_NAME: &str = "Deleted User";

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Opaque identifier issued by the identity provider.
    UserId
);
string_id!(PostId);
string_id!(MatchId);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub username: String,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub profile_image_url: Option<String>,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub review_count: u32,
}

impl Document for User {
    const COLLECTION: &'static str = collections::USERS;

    fn id(&self) -> &str {
        self.id.as_str()
    }
}

/// A teach/learn advertisement. Immutable after creation apart from `is_active`.
///
/// Owner name and image are snapshots taken when the post was created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillPost {
    pub id: PostId,
    pub user_id: UserId,
    pub user_name: String,
    #[serde(default)]
    pub user_image_url: Option<String>,
    pub teach: String,
    pub teach_category: String,
    #[serde(default)]
    pub teach_proficiency: String,
    pub learn: String,
    pub learn_category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

impl Document for SkillPost {
    const COLLECTION: &'static str = collections::POSTS;

    fn id(&self) -> &str {
        self.id.as_str()
    }
}

/// Caller input for a new post; the repository normalizes and stamps it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSkillPost {
    pub user_id: UserId,
    pub user_name: String,
    pub user_image_url: Option<String>,
    pub teach: String,
    pub teach_category: String,
    pub teach_proficiency: String,
    pub learn: String,
    pub learn_category: String,
    pub description: String,
    pub location: Option<String>,
}

/// Which participant slot a user occupies in a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    User1,
    User2,
}

/// A confirmed pairing. Either participant may sit in either slot.
///
/// Names, images and skills are point-in-time snapshots taken from the two
/// posts at creation; they are never rewritten. Use the live resolver when
/// current skills matter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: MatchId,
    pub user1_id: UserId,
    pub user1_name: String,
    #[serde(default)]
    pub user1_image_url: Option<String>,
    pub user1_teach: String,
    pub user1_learn: String,
    pub user2_id: UserId,
    pub user2_name: String,
    #[serde(default)]
    pub user2_image_url: Option<String>,
    pub user2_teach: String,
    pub user2_learn: String,
    #[serde(default)]
    pub user1_post_id: Option<PostId>,
    #[serde(default)]
    pub user2_post_id: Option<PostId>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unread_count: u32,
}

impl Match {
    pub fn involves(&self, user_id: &UserId) -> bool {
        &self.user1_id == user_id || &self.user2_id == user_id
    }

    pub fn side_of(&self, user_id: &UserId) -> Option<Side> {
        if &self.user1_id == user_id {
            Some(Side::User1)
        } else if &self.user2_id == user_id {
            Some(Side::User2)
        } else {
            None
        }
    }

    pub fn other_participant(&self, user_id: &UserId) -> Option<&UserId> {
        match self.side_of(user_id)? {
            Side::User1 => Some(&self.user2_id),
            Side::User2 => Some(&self.user1_id),
        }
    }

    pub fn post_id(&self, side: Side) -> Option<&PostId> {
        match side {
            Side::User1 => self.user1_post_id.as_ref(),
            Side::User2 => self.user2_post_id.as_ref(),
        }
    }

    /// Snapshot (teach, learn) for one side.
    pub fn skills(&self, side: Side) -> (&str, &str) {
        match side {
            Side::User1 => (&self.user1_teach, &self.user1_learn),
            Side::User2 => (&self.user2_teach, &self.user2_learn),
        }
    }

    pub fn references_post(&self, post_id: &PostId) -> bool {
        self.user1_post_id.as_ref() == Some(post_id) || self.user2_post_id.as_ref() == Some(post_id)
    }

    /// Records created before post linkage existed carry no post ids.
    pub fn is_legacy(&self) -> bool {
        self.user1_post_id.is_none() && self.user2_post_id.is_none()
    }
}

impl Document for Match {
    const COLLECTION: &'static str = collections::MATCHES;

    fn id(&self) -> &str {
        self.id.as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub match_id: MatchId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
}

impl Document for ChatMessage {
    const COLLECTION: &'static str = collections::CHAT_MESSAGES;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: String,
    pub reviewer_id: UserId,
    pub reviewer_name: String,
    pub reviewed_user_id: UserId,
    #[serde(default)]
    pub match_id: Option<MatchId>,
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl Review {
    pub fn is_from_deleted_user(&self) -> bool {
        self.reviewer_id.as_str() == DELETED_USER_ID
    }
}

impl Document for Review {
    const COLLECTION: &'static str = collections::REVIEWS;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    #[serde(rename = "match")]
    NewMatch,
    #[serde(rename = "message")]
    NewMessage,
    #[serde(rename = "review")]
    NewReview,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NewMatch => write!(f, "match"),
            Self::NewMessage => write!(f, "message"),
            Self::NewReview => write!(f, "review"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserNotification {
    pub id: String,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub related_id: Option<String>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl Document for UserNotification {
    const COLLECTION: &'static str = collections::NOTIFICATIONS;

    fn id(&self) -> &str {
        &self.id
    }
}
