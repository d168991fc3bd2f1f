// Skill post persistence - create, query, soft toggles; no edits to skills
use chrono::Utc;
use serde_json::json;

use super::domain::prepare_post;
use crate::error::EngineResult;
use crate::models::{NewSkillPost, PostId, SkillPost, UserId};
use crate::store::{decode, encode, Document, DynDocumentStore, Query, StoreResult};

#[derive(Clone)]
pub struct PostRepository {
    store: DynDocumentStore,
}

impl PostRepository {
    pub fn new(store: DynDocumentStore) -> Self {
        Self { store }
    }

    /// Validate, normalize and persist a new post. Returns it with the
    /// store-assigned id.
    pub async fn create(&self, input: NewSkillPost) -> EngineResult<SkillPost> {
        let mut post = prepare_post(input, Utc::now())?;
        let id = self.store.insert(SkillPost::COLLECTION, encode(&post)?).await?;
        post.id = PostId(id);

        tracing::info!(
            "Post {} created by {}: teach {} ({}), learn {} ({})",
            post.id,
            post.user_id,
            post.teach,
            post.teach_category,
            post.learn,
            post.learn_category
        );
        Ok(post)
    }

    pub async fn get(&self, id: &PostId) -> StoreResult<Option<SkillPost>> {
        self.store
            .get(SkillPost::COLLECTION, id.as_str())
            .await?
            .map(decode)
            .transpose()
    }

    pub async fn list_by_owner(&self, user_id: &UserId) -> StoreResult<Vec<SkillPost>> {
        self.fetch(Query::new().where_eq("userId", user_id.as_str()))
            .await
    }

    pub async fn list_active_by_owner(&self, user_id: &UserId) -> StoreResult<Vec<SkillPost>> {
        self.fetch(
            Query::new()
                .where_eq("userId", user_id.as_str())
                .where_eq("isActive", true),
        )
        .await
    }

    pub async fn list_active(&self) -> StoreResult<Vec<SkillPost>> {
        self.fetch(Query::new().where_eq("isActive", true)).await
    }

    pub async fn list_all(&self) -> StoreResult<Vec<SkillPost>> {
        self.fetch(Query::all()).await
    }

    /// The only permitted mutation of a post after creation.
    pub async fn set_active(&self, id: &PostId, active: bool) -> StoreResult<bool> {
        self.store
            .update(SkillPost::COLLECTION, id.as_str(), json!({ "isActive": active }))
            .await
    }

    /// Remove the post document only. Dependent matches are the caller's job.
    pub async fn delete(&self, id: &PostId) -> StoreResult<bool> {
        self.store.delete(SkillPost::COLLECTION, id.as_str()).await
    }

    pub async fn delete_many(&self, ids: &[PostId]) -> StoreResult<u64> {
        let ids: Vec<String> = ids.iter().map(|id| id.0.clone()).collect();
        self.store.batch_delete(SkillPost::COLLECTION, &ids).await
    }

    async fn fetch(&self, query: Query) -> StoreResult<Vec<SkillPost>> {
        self.store
            .query(SkillPost::COLLECTION, &query)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::testing::{new_post, temp_store};

    #[tokio::test]
    async fn test_create_assigns_id_and_normalizes() {
        let (store, _temp) = temp_store();
        let repo = PostRepository::new(store);

        let post = repo
            .create(new_post("alice", "Guitar", "music", "Spanish", "languages"))
            .await
            .unwrap();
        assert!(!post.id.as_str().is_empty());
        assert_eq!(post.teach, "guitar");

        let loaded = repo.get(&post.id).await.unwrap().unwrap();
        assert_eq!(loaded, post);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_input_without_writing() {
        let (store, _temp) = temp_store();
        let repo = PostRepository::new(store);

        let result = repo
            .create(new_post("alice", "guitar", "music", "", "languages"))
            .await;
        assert!(matches!(result, Err(EngineError::Validation(_))));
        assert!(repo.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_active_filters() {
        let (store, _temp) = temp_store();
        let repo = PostRepository::new(store);

        let a1 = repo
            .create(new_post("alice", "guitar", "music", "spanish", "languages"))
            .await
            .unwrap();
        repo.create(new_post("alice", "piano", "music", "french", "languages"))
            .await
            .unwrap();
        repo.create(new_post("bob", "spanish", "languages", "guitar", "music"))
            .await
            .unwrap();

        assert!(repo.set_active(&a1.id, false).await.unwrap());

        let alice = UserId::new("alice");
        assert_eq!(repo.list_by_owner(&alice).await.unwrap().len(), 2);
        assert_eq!(repo.list_active_by_owner(&alice).await.unwrap().len(), 1);
        assert_eq!(repo.list_active().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_many_is_idempotent() {
        let (store, _temp) = temp_store();
        let repo = PostRepository::new(store);

        let p = repo
            .create(new_post("alice", "guitar", "music", "spanish", "languages"))
            .await
            .unwrap();

        assert_eq!(repo.delete_many(&[p.id.clone()]).await.unwrap(), 1);
        assert_eq!(repo.delete_many(&[p.id.clone()]).await.unwrap(), 0);
        assert!(!repo.delete(&p.id).await.unwrap());
    }
}
