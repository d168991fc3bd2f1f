// Match persistence - the store has no OR, so unions are assembled here
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde_json::json;
use std::collections::HashSet;

use crate::models::{Match, MatchId, PostId, UserId};
use crate::store::{decode, encode, Document, DynDocumentStore, Query, StoreResult};

#[derive(Clone)]
pub struct MatchRepository {
    store: DynDocumentStore,
}

impl MatchRepository {
    pub fn new(store: DynDocumentStore) -> Self {
        Self { store }
    }

    pub async fn get(&self, id: &MatchId) -> StoreResult<Option<Match>> {
        self.store
            .get(Match::COLLECTION, id.as_str())
            .await?
            .map(decode)
            .transpose()
    }

    /// Persist a new match; the id on `m` is ignored and the store's is returned.
    pub async fn insert(&self, m: &Match) -> StoreResult<MatchId> {
        let id = self.store.insert(Match::COLLECTION, encode(m)?).await?;
        Ok(MatchId(id))
    }

    /// Persist a new match for the post pair `a`/`b` unless one already
    /// covers it in either order. None when the pair is taken.
    pub async fn insert_for_pair(
        &self,
        m: &Match,
        a: &PostId,
        b: &PostId,
    ) -> StoreResult<Option<MatchId>> {
        let id = self
            .store
            .insert_unless(Match::COLLECTION, encode(m)?, &pair_queries(a, b))
            .await?;
        Ok(id.map(MatchId))
    }

    /// Matches where the user is in either slot.
    pub async fn find_for_user(&self, user_id: &UserId) -> StoreResult<Vec<Match>> {
        self.union(vec![
            Query::new().where_eq("user1Id", user_id.as_str()),
            Query::new().where_eq("user2Id", user_id.as_str()),
        ])
        .await
    }

    /// Matches linked to a post from either side.
    pub async fn find_by_post(&self, post_id: &PostId) -> StoreResult<Vec<Match>> {
        self.union(vec![
            Query::new().where_eq("user1PostId", post_id.as_str()),
            Query::new().where_eq("user2PostId", post_id.as_str()),
        ])
        .await
    }

    /// The match covering this unordered post pair, if any.
    pub async fn find_by_post_pair(&self, a: &PostId, b: &PostId) -> StoreResult<Option<Match>> {
        let found = self.union(pair_queries(a, b)).await?;
        Ok(found.into_iter().next())
    }

    pub async fn list_all(&self) -> StoreResult<Vec<Match>> {
        self.union(vec![Query::all()]).await
    }

    pub async fn delete(&self, id: &MatchId) -> StoreResult<bool> {
        self.store.delete(Match::COLLECTION, id.as_str()).await
    }

    pub async fn delete_many(&self, ids: &[MatchId]) -> StoreResult<u64> {
        let ids: Vec<String> = ids.iter().map(|id| id.0.clone()).collect();
        self.store.batch_delete(Match::COLLECTION, &ids).await
    }

    /// Update the soft last-message fields and bump the unread counter.
    /// Returns false when the match no longer exists.
    pub async fn record_message(
        &self,
        id: &MatchId,
        content: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let Some(current) = self.get(id).await? else {
            return Ok(false);
        };
        self.store
            .update(
                Match::COLLECTION,
                id.as_str(),
                json!({
                    "lastMessage": content,
                    "lastMessageAt": at.timestamp_millis(),
                    "unreadCount": current.unread_count.saturating_add(1),
                }),
            )
            .await
    }

    pub async fn reset_unread(&self, id: &MatchId) -> StoreResult<bool> {
        self.store
            .update(Match::COLLECTION, id.as_str(), json!({ "unreadCount": 0 }))
            .await
    }

    /// Issue all queries concurrently, wait for every one, and merge by id.
    /// Newest first.
    async fn union(&self, queries: Vec<Query>) -> StoreResult<Vec<Match>> {
        let results = try_join_all(
            queries
                .iter()
                .map(|q| self.store.query(Match::COLLECTION, q)),
        )
        .await?;

        let mut seen = HashSet::new();
        let mut merged = Vec::new();
        for doc in results.into_iter().flatten() {
            if seen.insert(doc.id.clone()) {
                merged.push(decode::<Match>(doc)?);
            }
        }

        merged.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(merged)
    }
}

fn pair_queries(a: &PostId, b: &PostId) -> Vec<Query> {
    vec![
        Query::new()
            .where_eq("user1PostId", a.as_str())
            .where_eq("user2PostId", b.as_str()),
        Query::new()
            .where_eq("user1PostId", b.as_str())
            .where_eq("user2PostId", a.as_str()),
    ]
}
