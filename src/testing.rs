// Shared fixtures for unit tests
use std::sync::Arc;
use tempfile::TempDir;

use crate::db;
use crate::models::{NewSkillPost, User, UserId};
use crate::store::{DynDocumentStore, SqliteDocumentStore};
use crate::users::UserRepository;

pub fn temp_store() -> (DynDocumentStore, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let pool = db::create_pool(&temp_dir.path().join("test.db")).unwrap();
    db::run_migrations(&pool).unwrap();
    (Arc::new(SqliteDocumentStore::new(pool)), temp_dir)
}

pub fn user(id: &str) -> User {
    User {
        id: UserId::new(id),
        name: format!("{} name", id),
        username: id.to_string(),
        is_verified: false,
        bio: String::new(),
        profile_image_url: None,
        rating: 0.0,
        review_count: 0,
    }
}

pub async fn seed_users(store: &DynDocumentStore, ids: &[&str]) {
    let users = UserRepository::new(store.clone());
    for id in ids {
        users.put(&user(id)).await.unwrap();
    }
}

pub fn new_post(owner: &str, teach: &str, teach_cat: &str, learn: &str, learn_cat: &str) -> NewSkillPost {
    NewSkillPost {
        user_id: UserId::new(owner),
        user_name: format!("{} name", owner),
        teach: teach.to_string(),
        teach_category: teach_cat.to_string(),
        teach_proficiency: "intermediate".to_string(),
        learn: learn.to_string(),
        learn_category: learn_cat.to_string(),
        ..Default::default()
    }
}
