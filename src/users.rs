use serde_json::json;
use std::collections::HashSet;

use crate::models::{User, UserId};
use crate::store::{decode, encode, Document, DynDocumentStore, Query, StoreResult};

/// Access to `users` documents. Profiles are owned elsewhere; the engine
/// reads them for validity checks and writes only aggregates and deletions.
#[derive(Clone)]
pub struct UserRepository {
    store: DynDocumentStore,
}

impl UserRepository {
    pub fn new(store: DynDocumentStore) -> Self {
        Self { store }
    }

    pub async fn get(&self, id: &UserId) -> StoreResult<Option<User>> {
        self.store
            .get(User::COLLECTION, id.as_str())
            .await?
            .map(decode)
            .transpose()
    }

    pub async fn exists(&self, id: &UserId) -> StoreResult<bool> {
        Ok(self.store.get(User::COLLECTION, id.as_str()).await?.is_some())
    }

    /// Create or replace a profile (sign-up and profile edits).
    pub async fn put(&self, user: &User) -> StoreResult<()> {
        self.store
            .put(User::COLLECTION, user.id.as_str(), encode(user)?)
            .await
    }

    pub async fn delete(&self, id: &UserId) -> StoreResult<bool> {
        self.store.delete(User::COLLECTION, id.as_str()).await
    }

    /// Every user id currently present.
    pub async fn list_ids(&self) -> StoreResult<HashSet<UserId>> {
        let docs = self.store.query(User::COLLECTION, &Query::all()).await?;
        Ok(docs.into_iter().map(|d| UserId(d.id)).collect())
    }

    pub async fn set_rating(&self, id: &UserId, rating: f64, review_count: u32) -> StoreResult<bool> {
        self.store
            .update(
                User::COLLECTION,
                id.as_str(),
                json!({ "rating": rating, "reviewCount": review_count }),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::store::SqliteDocumentStore;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn create_test_repo() -> (UserRepository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = db::create_pool(&temp_dir.path().join("test.db")).unwrap();
        db::run_migrations(&pool).unwrap();
        (
            UserRepository::new(Arc::new(SqliteDocumentStore::new(pool))),
            temp_dir,
        )
    }

    fn user(id: &str) -> User {
        User {
            id: UserId::new(id),
            name: id.to_uppercase(),
            username: id.to_string(),
            is_verified: false,
            bio: String::new(),
            profile_image_url: None,
            rating: 0.0,
            review_count: 0,
        }
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let (repo, _temp) = create_test_repo();

        repo.put(&user("alice")).await.unwrap();
        let loaded = repo.get(&UserId::new("alice")).await.unwrap().unwrap();
        assert_eq!(loaded.username, "alice");
        assert!(repo.exists(&UserId::new("alice")).await.unwrap());

        assert!(repo.delete(&UserId::new("alice")).await.unwrap());
        assert!(repo.get(&UserId::new("alice")).await.unwrap().is_none());
        assert!(!repo.delete(&UserId::new("alice")).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_ids() {
        let (repo, _temp) = create_test_repo();

        repo.put(&user("alice")).await.unwrap();
        repo.put(&user("bob")).await.unwrap();

        let ids = repo.list_ids().await.unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&UserId::new("bob")));
    }

    #[tokio::test]
    async fn test_set_rating_keeps_profile() {
        let (repo, _temp) = create_test_repo();

        repo.put(&user("alice")).await.unwrap();
        assert!(repo.set_rating(&UserId::new("alice"), 4.5, 2).await.unwrap());

        let loaded = repo.get(&UserId::new("alice")).await.unwrap().unwrap();
        assert_eq!(loaded.rating, 4.5);
        assert_eq!(loaded.review_count, 2);
        assert_eq!(loaded.username, "alice");

        assert!(!repo.set_rating(&UserId::new("ghost"), 5.0, 1).await.unwrap());
    }
}
