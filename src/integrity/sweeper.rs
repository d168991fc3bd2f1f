// Referential integrity sweeps - remove records that point at missing users or matches
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::chat::ChatRepository;
use crate::error::EngineResult;
use crate::matching::{match_removal, MatchRepository};
use crate::models::{Match, MatchId, PostId, UserId};
use crate::posts::PostRepository;
use crate::store::StoreResult;
use crate::users::UserRepository;

/// Snapshot of existing user ids. Never authoritative past `fetched_at`.
#[derive(Debug, Clone)]
pub struct ValidUsers {
    pub ids: Arc<HashSet<UserId>>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub valid_users: usize,
    pub orphan_posts: usize,
    pub orphan_matches: usize,
    pub orphan_messages: usize,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.orphan_posts == 0 && self.orphan_matches == 0 && self.orphan_messages == 0
    }
}

pub struct Sweeper {
    users: UserRepository,
    posts: PostRepository,
    matches: MatchRepository,
    chat: ChatRepository,
    cache: RwLock<Option<ValidUsers>>,
}

impl Sweeper {
    pub fn new(
        users: UserRepository,
        posts: PostRepository,
        matches: MatchRepository,
        chat: ChatRepository,
    ) -> Self {
        Self {
            users,
            posts,
            matches,
            chat,
            cache: RwLock::new(None),
        }
    }

    /// Re-list every user document and replace the cached snapshot.
    pub async fn refresh(&self) -> StoreResult<Arc<HashSet<UserId>>> {
        let ids = Arc::new(self.users.list_ids().await?);
        *self.cache.write().await = Some(ValidUsers {
            ids: ids.clone(),
            fetched_at: Utc::now(),
        });
        tracing::debug!("Valid-user set refreshed: {} user(s)", ids.len());
        Ok(ids)
    }

    /// Last snapshot, if any. Callers deciding deletions should `refresh`.
    pub async fn cached(&self) -> Option<ValidUsers> {
        self.cache.read().await.clone()
    }

    /// Of the users missing from a snapshot, keep those a direct lookup also
    /// cannot find. Guards against a snapshot older than a sign-up.
    async fn confirm_missing(&self, suspects: HashSet<UserId>) -> StoreResult<HashSet<UserId>> {
        let suspects: Vec<UserId> = suspects.into_iter().collect();
        let present = try_join_all(suspects.iter().map(|id| self.users.exists(id))).await?;

        Ok(suspects
            .into_iter()
            .zip(present)
            .filter(|(_, exists)| !exists)
            .map(|(id, _)| id)
            .collect())
    }

    /// Delete every post whose owner no longer exists.
    pub async fn sweep_orphan_posts(&self) -> EngineResult<usize> {
        let (valid, posts) = tokio::try_join!(self.refresh(), self.posts.list_all())?;

        let suspects: HashSet<UserId> = posts
            .iter()
            .filter(|p| !valid.contains(&p.user_id))
            .map(|p| p.user_id.clone())
            .collect();
        if suspects.is_empty() {
            return Ok(0);
        }
        let missing = self.confirm_missing(suspects).await?;

        let orphans: Vec<PostId> = posts
            .into_iter()
            .filter(|p| missing.contains(&p.user_id))
            .map(|p| p.id)
            .collect();
        if orphans.is_empty() {
            return Ok(0);
        }

        self.posts.delete_many(&orphans).await?;
        tracing::info!("Removed {} orphan post(s)", orphans.len());
        Ok(orphans.len())
    }

    /// Split fetched matches into those whose participants both exist and
    /// those that reference a deleted user. The latter are deleted, messages
    /// first, and only the valid ones are returned.
    pub async fn sweep_orphan_matches(&self, candidates: Vec<Match>) -> EngineResult<Vec<Match>> {
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let valid = self.refresh().await?;
        let suspects: HashSet<UserId> = candidates
            .iter()
            .flat_map(|m| [&m.user1_id, &m.user2_id])
            .filter(|id| !valid.contains(*id))
            .cloned()
            .collect();
        if suspects.is_empty() {
            return Ok(candidates);
        }
        let missing = self.confirm_missing(suspects).await?;

        let (invalid, kept): (Vec<Match>, Vec<Match>) = candidates
            .into_iter()
            .partition(|m| missing.contains(&m.user1_id) || missing.contains(&m.user2_id));
        if invalid.is_empty() {
            return Ok(kept);
        }

        let ids: Vec<MatchId> = invalid.into_iter().map(|m| m.id).collect();
        self.delete_matches(ids).await?;
        Ok(kept)
    }

    /// Delete messages whose match is gone.
    pub async fn sweep_orphan_messages(&self) -> EngineResult<usize> {
        let messages = self.chat.list_all().await?;

        let mut by_match: HashMap<MatchId, Vec<String>> = HashMap::new();
        for message in messages {
            by_match.entry(message.match_id).or_default().push(message.id);
        }
        if by_match.is_empty() {
            return Ok(0);
        }

        let match_ids: Vec<MatchId> = by_match.keys().cloned().collect();
        let found = try_join_all(match_ids.iter().map(|id| self.matches.get(id))).await?;

        let orphans: Vec<String> = match_ids
            .into_iter()
            .zip(found)
            .filter(|(_, m)| m.is_none())
            .flat_map(|(id, _)| by_match.remove(&id).unwrap_or_default())
            .collect();
        if orphans.is_empty() {
            return Ok(0);
        }

        self.chat.delete_ids(&orphans).await?;
        tracing::info!("Removed {} orphan message(s)", orphans.len());
        Ok(orphans.len())
    }

    /// Full reconciliation pass: users, then posts, then matches, then messages.
    pub async fn sweep(&self) -> EngineResult<SweepReport> {
        let orphan_posts = self.sweep_orphan_posts().await?;

        let all_matches = self.matches.list_all().await?;
        let before = all_matches.len();
        let kept = self.sweep_orphan_matches(all_matches).await?;
        let orphan_matches = before - kept.len();

        let orphan_messages = self.sweep_orphan_messages().await?;
        let valid_users = self
            .cached()
            .await
            .map(|v| v.ids.len())
            .unwrap_or_default();

        let report = SweepReport {
            valid_users,
            orphan_posts,
            orphan_matches,
            orphan_messages,
        };
        tracing::info!(
            "Sweep complete: {} valid user(s), removed {} post(s), {} match(es), {} message(s)",
            report.valid_users,
            report.orphan_posts,
            report.orphan_matches,
            report.orphan_messages
        );
        Ok(report)
    }

    /// Sweep on a fixed period until `shutdown` resolves. A sweep already in
    /// progress is allowed to finish.
    pub async fn run_every<F>(&self, period: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Periodic sweeper stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep().await {
                        tracing::warn!("Periodic sweep failed (will retry next tick): {}", e);
                    }
                }
            }
        }
    }

    async fn delete_matches(&self, ids: Vec<MatchId>) -> EngineResult<()> {
        let count = ids.len();
        match_removal(
            &self.chat,
            &self.matches,
            ids,
            format!("sweep {} orphan match(es)", count),
        )
        .run_to_completion()
        .await?;

        tracing::info!("Removed {} orphan match(es)", count);
        Ok(())
    }
}
