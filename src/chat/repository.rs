use futures::future::try_join_all;
use serde_json::json;

use crate::models::{ChatMessage, MatchId, UserId};
use crate::store::{decode, encode, Direction, Document, DynDocumentStore, Query, StoreResult};

#[derive(Clone)]
pub struct ChatRepository {
    store: DynDocumentStore,
}

impl ChatRepository {
    pub fn new(store: DynDocumentStore) -> Self {
        Self { store }
    }

    pub async fn insert(&self, message: &ChatMessage) -> StoreResult<String> {
        self.store
            .insert(ChatMessage::COLLECTION, encode(message)?)
            .await
    }

    /// Oldest first.
    pub async fn list_for_match(&self, match_id: &MatchId) -> StoreResult<Vec<ChatMessage>> {
        self.fetch(
            Query::new()
                .where_eq("matchId", match_id.as_str())
                .order_by("timestamp", Direction::Asc),
        )
        .await
    }

    pub async fn list_all(&self) -> StoreResult<Vec<ChatMessage>> {
        self.fetch(Query::all()).await
    }

    pub async fn ids_for_match(&self, match_id: &MatchId) -> StoreResult<Vec<String>> {
        let docs = self
            .store
            .query(
                ChatMessage::COLLECTION,
                &Query::new().where_eq("matchId", match_id.as_str()),
            )
            .await?;
        Ok(docs.into_iter().map(|d| d.id).collect())
    }

    /// Delete every message of one match in a single atomic batch.
    /// Zero messages is not an error.
    pub async fn delete_for_match(&self, match_id: &MatchId) -> StoreResult<u64> {
        let ids = self.ids_for_match(match_id).await?;
        let deleted = self.delete_ids(&ids).await?;
        tracing::debug!("Deleted {} message(s) of match {}", deleted, match_id);
        Ok(deleted)
    }

    /// Collect the messages of several matches concurrently, then delete them
    /// in one batch.
    pub async fn delete_for_matches(&self, match_ids: &[MatchId]) -> StoreResult<u64> {
        let groups = try_join_all(match_ids.iter().map(|id| self.ids_for_match(id))).await?;
        let ids: Vec<String> = groups.into_iter().flatten().collect();
        self.delete_ids(&ids).await
    }

    pub async fn delete_ids(&self, ids: &[String]) -> StoreResult<u64> {
        self.store.batch_delete(ChatMessage::COLLECTION, ids).await
    }

    /// Unread messages addressed to `reader` within one match.
    pub async fn unread_ids(&self, match_id: &MatchId, reader: &UserId) -> StoreResult<Vec<String>> {
        let messages = self
            .fetch(
                Query::new()
                    .where_eq("matchId", match_id.as_str())
                    .where_eq("receiverId", reader.as_str()),
            )
            .await?;
        Ok(messages
            .into_iter()
            .filter(|m| !m.is_read)
            .map(|m| m.id)
            .collect())
    }

    pub async fn mark_read(&self, ids: &[String]) -> StoreResult<u64> {
        self.store
            .batch_update(ChatMessage::COLLECTION, ids, json!({ "isRead": true }))
            .await
    }

    async fn fetch(&self, query: Query) -> StoreResult<Vec<ChatMessage>> {
        self.store
            .query(ChatMessage::COLLECTION, &query)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }
}
