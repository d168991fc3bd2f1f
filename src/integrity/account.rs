// Account deletion - remove everything the user owns, then the identity itself
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::cascade::Cascade;
use crate::chat::ChatRepository;
use crate::error::EngineResult;
use crate::identity::{require_user, DynIdentityProvider};
use crate::matching::MatchRepository;
use crate::models::{MatchId, PostId, UserId};
use crate::notify::NotificationRepository;
use crate::posts::PostRepository;
use crate::reviews::ReviewRepository;
use crate::users::UserRepository;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDeletionReport {
    pub user_id: UserId,
    pub posts_deleted: u64,
    pub matches_deleted: u64,
    pub messages_deleted: u64,
    pub reviews_anonymized: u64,
    pub notifications_deleted: u64,
    pub identity_deleted: bool,
}

#[derive(Clone)]
pub struct AccountDeletion {
    identity: DynIdentityProvider,
    users: UserRepository,
    posts: PostRepository,
    matches: MatchRepository,
    chat: ChatRepository,
    reviews: ReviewRepository,
    notifications: NotificationRepository,
}

impl AccountDeletion {
    pub fn new(
        identity: DynIdentityProvider,
        users: UserRepository,
        posts: PostRepository,
        matches: MatchRepository,
        chat: ChatRepository,
        reviews: ReviewRepository,
        notifications: NotificationRepository,
    ) -> Self {
        Self {
            identity,
            users,
            posts,
            matches,
            chat,
            reviews,
            notifications,
        }
    }

    /// Delete the signed-in user's account and everything hanging off it.
    ///
    /// Steps run strictly in order: posts, matches with their messages,
    /// review anonymisation, notifications, the user document, and last the
    /// identity account. A failure anywhere before the last step leaves the
    /// identity intact, and the whole cascade can be run again.
    pub async fn delete_account(&self) -> EngineResult<AccountDeletionReport> {
        let user_id = require_user(self.identity.as_ref())?;
        tracing::info!("Deleting account {}", user_id);

        let report = Arc::new(Mutex::new(AccountDeletionReport {
            user_id: user_id.clone(),
            ..Default::default()
        }));

        let (posts, user, out) = (self.posts.clone(), user_id.clone(), report.clone());
        let (matches, chat, user2, out2) = (
            self.matches.clone(),
            self.chat.clone(),
            user_id.clone(),
            report.clone(),
        );
        let (reviews, user3, out3) = (self.reviews.clone(), user_id.clone(), report.clone());
        let (notifications, user4, out4) = (
            self.notifications.clone(),
            user_id.clone(),
            report.clone(),
        );
        let (users, user5) = (self.users.clone(), user_id.clone());
        let (identity, out6) = (self.identity.clone(), report.clone());

        Cascade::new(format!("delete account {}", user_id))
            .step("delete_posts", move || delete_posts(posts, user, out))
            .step("delete_matches", move || {
                delete_matches(matches, chat, user2, out2)
            })
            .step("anonymize_reviews", move || {
                anonymize_reviews(reviews, user3, out3)
            })
            .step("delete_notifications", move || {
                delete_notifications(notifications, user4, out4)
            })
            .step("delete_user", move || async move {
                users.delete(&user5).await?;
                Ok(())
            })
            .step("delete_identity", move || async move {
                identity.delete_current_account().await?;
                out6.lock().await.identity_deleted = true;
                Ok(())
            })
            .run_to_completion()
            .await?;

        let report = report.lock().await.clone();
        tracing::info!(
            "Account {} deleted: {} post(s), {} match(es), {} message(s), {} review(s) anonymized, {} notification(s)",
            report.user_id,
            report.posts_deleted,
            report.matches_deleted,
            report.messages_deleted,
            report.reviews_anonymized,
            report.notifications_deleted
        );
        Ok(report)
    }
}

type SharedReport = Arc<Mutex<AccountDeletionReport>>;

async fn delete_posts(posts: PostRepository, user: UserId, out: SharedReport) -> EngineResult<()> {
    let ids: Vec<PostId> = posts
        .list_by_owner(&user)
        .await?
        .into_iter()
        .map(|p| p.id)
        .collect();
    let removed = posts.delete_many(&ids).await?;
    out.lock().await.posts_deleted = removed;
    Ok(())
}

/// Messages of every match first, then the matches.
async fn delete_matches(
    matches: MatchRepository,
    chat: ChatRepository,
    user: UserId,
    out: SharedReport,
) -> EngineResult<()> {
    let ids: Vec<MatchId> = matches
        .find_for_user(&user)
        .await?
        .into_iter()
        .map(|m| m.id)
        .collect();
    let messages = chat.delete_for_matches(&ids).await?;
    let removed = matches.delete_many(&ids).await?;

    let mut report = out.lock().await;
    report.messages_deleted = messages;
    report.matches_deleted = removed;
    Ok(())
}

async fn anonymize_reviews(
    reviews: ReviewRepository,
    user: UserId,
    out: SharedReport,
) -> EngineResult<()> {
    let rewritten = reviews.anonymize_author(&user).await?;
    out.lock().await.reviews_anonymized = rewritten;
    Ok(())
}

async fn delete_notifications(
    notifications: NotificationRepository,
    user: UserId,
    out: SharedReport,
) -> EngineResult<()> {
    let removed = notifications.delete_for_user(&user).await?;
    out.lock().await.notifications_deleted = removed;
    Ok(())
}
