use anyhow::Context;
use std::sync::Arc;

use crate::chat::{ChatRepository, ChatService};
use crate::config::Config;
use crate::db;
use crate::identity::DynIdentityProvider;
use crate::integrity::{AccountDeletion, Sweeper};
use crate::matching::{CompatibilityMatcher, CompatibilityMode, MatchLifecycle, MatchRepository};
use crate::models::{PostId, SkillPost};
use crate::notify::{
    DynNotificationSink, NoopNotificationSink, NotificationRepository, StoreNotificationSink,
};
use crate::posts::PostRepository;
use crate::reviews::{ReviewRepository, ReviewService};
use crate::store::{DynDocumentStore, SqliteDocumentStore};
use crate::users::UserRepository;

/// Every service, wired against one store and one identity provider.
#[derive(Clone)]
pub struct Engine {
    pub store: DynDocumentStore,
    pub identity: DynIdentityProvider,
    pub users: UserRepository,
    pub posts: PostRepository,
    pub notifications: NotificationRepository,
    pub matcher: CompatibilityMatcher,
    pub lifecycle: MatchLifecycle,
    pub chat: ChatService,
    pub reviews: ReviewService,
    pub sweeper: Arc<Sweeper>,
    pub accounts: AccountDeletion,
}

impl Engine {
    pub fn new(
        store: DynDocumentStore,
        identity: DynIdentityProvider,
        notifier: DynNotificationSink,
        mode: CompatibilityMode,
    ) -> Self {
        let users = UserRepository::new(store.clone());
        let posts = PostRepository::new(store.clone());
        let matches = MatchRepository::new(store.clone());
        let chat = ChatRepository::new(store.clone());
        let reviews = ReviewRepository::new(store.clone());
        let notifications = NotificationRepository::new(store.clone());

        let sweeper = Arc::new(Sweeper::new(
            users.clone(),
            posts.clone(),
            matches.clone(),
            chat.clone(),
        ));

        Self {
            matcher: CompatibilityMatcher::new(
                posts.clone(),
                matches.clone(),
                sweeper.clone(),
                mode,
            ),
            lifecycle: MatchLifecycle::new(
                identity.clone(),
                users.clone(),
                posts.clone(),
                matches.clone(),
                chat.clone(),
                sweeper.clone(),
                notifier.clone(),
            ),
            chat: ChatService::new(
                identity.clone(),
                matches.clone(),
                chat.clone(),
                notifier.clone(),
            ),
            reviews: ReviewService::new(
                identity.clone(),
                users.clone(),
                matches.clone(),
                reviews.clone(),
                notifier,
            ),
            accounts: AccountDeletion::new(
                identity.clone(),
                users.clone(),
                posts.clone(),
                matches,
                chat,
                reviews,
                notifications.clone(),
            ),
            sweeper,
            store,
            identity,
            users,
            posts,
            notifications,
        }
    }

    /// Open the SQLite store named by `config`, migrate it, and wire the
    /// engine on top.
    pub fn open(config: &Config, identity: DynIdentityProvider) -> anyhow::Result<Self> {
        let db_path = config.db_path()?;
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let pool = db::create_pool(db_path)?;
        db::run_migrations(&pool)?;
        tracing::debug!("Database ready at {}", db_path.display());

        let store: DynDocumentStore = Arc::new(SqliteDocumentStore::with_change_buffer(
            pool,
            config.store.change_buffer,
        ));
        let notifier: DynNotificationSink = if config.notifications.enabled {
            Arc::new(StoreNotificationSink::new(store.clone()))
        } else {
            Arc::new(NoopNotificationSink)
        };

        Ok(Self::new(store, identity, notifier, config.matching.mode))
    }

    /// Both posts by id, read concurrently. Missing posts are an error.
    pub async fn post_pair(&self, first: &str, second: &str) -> anyhow::Result<(SkillPost, SkillPost)> {
        let (first_id, second_id) = (PostId::new(first), PostId::new(second));
        let (a, b) = tokio::try_join!(self.posts.get(&first_id), self.posts.get(&second_id))?;
        let a = a.with_context(|| format!("post {} not found", first))?;
        let b = b.with_context(|| format!("post {} not found", second))?;
        Ok((a, b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::identity::LocalIdentityProvider;

    #[tokio::test]
    async fn open_creates_database_under_nested_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.database.path = Some(tmp.path().join("nested").join("swap.db"));

        let engine = Engine::open(&config, Arc::new(LocalIdentityProvider::new())).unwrap();
        assert!(tmp.path().join("nested").join("swap.db").exists());
        assert_eq!(engine.matcher.default_mode(), CompatibilityMode::Category);
        assert!(engine.users.list_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn post_pair_loads_both_or_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.database.path = Some(tmp.path().join("swap.db"));
        let engine = Engine::open(&config, Arc::new(LocalIdentityProvider::new())).unwrap();

        let mut created = Vec::new();
        for (owner, teach, learn) in [("a", "guitar", "spanish"), ("b", "spanish", "guitar")] {
            let post = engine
                .posts
                .create(crate::models::NewSkillPost {
                    user_id: crate::models::UserId::new(owner),
                    user_name: owner.to_string(),
                    teach: teach.to_string(),
                    teach_category: "music".to_string(),
                    learn: learn.to_string(),
                    learn_category: "languages".to_string(),
                    ..Default::default()
                })
                .await
                .unwrap();
            created.push(post);
        }

        let (first, second) = engine
            .post_pair(created[0].id.as_str(), created[1].id.as_str())
            .await
            .unwrap();
        assert_eq!(first.id, created[0].id);
        assert_eq!(second.id, created[1].id);

        let missing = engine.post_pair(created[0].id.as_str(), "nope").await;
        assert!(missing.unwrap_err().to_string().contains("nope"));
    }
}
