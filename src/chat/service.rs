use chrono::Utc;

use super::repository::ChatRepository;
use crate::error::{EngineError, EngineResult};
use crate::identity::{require_user, DynIdentityProvider};
use crate::matching::MatchRepository;
use crate::models::{ChatMessage, Match, MatchId, NotificationKind, Side, UserId};
use crate::notify::{DynNotificationSink, NotificationRequest};

pub const MAX_MESSAGE_LEN: usize = 4000;

/// Conversation operations for the signed-in user.
#[derive(Clone)]
pub struct ChatService {
    identity: DynIdentityProvider,
    matches: MatchRepository,
    chat: ChatRepository,
    notifier: DynNotificationSink,
}

impl ChatService {
    pub fn new(
        identity: DynIdentityProvider,
        matches: MatchRepository,
        chat: ChatRepository,
        notifier: DynNotificationSink,
    ) -> Self {
        Self {
            identity,
            matches,
            chat,
            notifier,
        }
    }

    /// Send a message in a live match. The receiver is the other participant.
    pub async fn send_message(&self, match_id: &MatchId, content: &str) -> EngineResult<ChatMessage> {
        let sender = require_user(self.identity.as_ref())?;

        let content = content.trim();
        if content.is_empty() {
            return Err(EngineError::validation("message cannot be empty"));
        }
        if content.len() > MAX_MESSAGE_LEN {
            return Err(EngineError::validation(format!(
                "message is limited to {} characters",
                MAX_MESSAGE_LEN
            )));
        }

        let m = self.participant_match(match_id, &sender).await?;
        let receiver = m
            .other_participant(&sender)
            .cloned()
            .ok_or_else(|| EngineError::validation("not a participant of this match"))?;

        let mut message = ChatMessage {
            id: String::new(),
            match_id: match_id.clone(),
            sender_id: sender.clone(),
            receiver_id: receiver.clone(),
            content: content.to_string(),
            timestamp: Utc::now(),
            is_read: false,
        };
        message.id = self.chat.insert(&message).await?;

        // The match may have been deleted between the check and the insert
        if !self
            .matches
            .record_message(match_id, content, message.timestamp)
            .await?
        {
            tracing::warn!(
                "Match {} vanished while sending; removing message {}",
                match_id,
                message.id
            );
            self.chat.delete_ids(&[message.id.clone()]).await?;
            return Err(EngineError::not_found("match", match_id.as_str()));
        }

        let sender_name = match m.side_of(&sender) {
            Some(Side::User1) => &m.user1_name,
            _ => &m.user2_name,
        };
        self.notifier.emit(NotificationRequest {
            target: receiver,
            kind: NotificationKind::NewMessage,
            title: format!("New message from {}", sender_name),
            message: preview(content),
            related_id: Some(match_id.to_string()),
        });

        Ok(message)
    }

    /// Full history of a match, oldest first.
    pub async fn conversation(&self, match_id: &MatchId) -> EngineResult<Vec<ChatMessage>> {
        let reader = require_user(self.identity.as_ref())?;
        self.participant_match(match_id, &reader).await?;
        Ok(self.chat.list_for_match(match_id).await?)
    }

    /// Mark everything addressed to the signed-in user as read.
    pub async fn mark_read(&self, match_id: &MatchId) -> EngineResult<u64> {
        let reader = require_user(self.identity.as_ref())?;
        self.participant_match(match_id, &reader).await?;

        let unread = self.chat.unread_ids(match_id, &reader).await?;
        let updated = self.chat.mark_read(&unread).await?;
        self.matches.reset_unread(match_id).await?;
        Ok(updated)
    }

    async fn participant_match(&self, match_id: &MatchId, user: &UserId) -> EngineResult<Match> {
        let m = self
            .matches
            .get(match_id)
            .await?
            .ok_or_else(|| EngineError::not_found("match", match_id.as_str()))?;
        if !m.involves(user) {
            return Err(EngineError::validation("not a participant of this match"));
        }
        Ok(m)
    }
}

fn preview(content: &str) -> String {
    const PREVIEW_CHARS: usize = 80;
    if content.chars().count() <= PREVIEW_CHARS {
        content.to_string()
    } else {
        let cut: String = content.chars().take(PREVIEW_CHARS).collect();
        format!("{}…", cut)
    }
}
