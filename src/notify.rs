// Notification sink - fire-and-forget side effects
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;

use crate::models::{NotificationKind, UserId, UserNotification};
use crate::store::{decode, encode, Direction, Document, DynDocumentStore, Query, StoreResult};

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRequest {
    pub target: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub related_id: Option<String>,
}

/// Output port for user notifications.
///
/// `emit` returns nothing: a failed delivery cannot change the outcome of
/// the operation that requested it. Implementations log their own failures.
pub trait NotificationSink: Send + Sync + 'static {
    fn emit(&self, request: NotificationRequest);
}

pub type DynNotificationSink = Arc<dyn NotificationSink>;

/// Discards every request.
pub struct NoopNotificationSink;

impl NotificationSink for NoopNotificationSink {
    fn emit(&self, request: NotificationRequest) {
        tracing::debug!("Dropping {} notification for {}", request.kind, request.target);
    }
}

/// Writes notifications to the `notifications` collection on a detached task.
pub struct StoreNotificationSink {
    store: DynDocumentStore,
}

impl StoreNotificationSink {
    pub fn new(store: DynDocumentStore) -> Self {
        Self { store }
    }
}

impl NotificationSink for StoreNotificationSink {
    fn emit(&self, request: NotificationRequest) {
        let store = self.store.clone();
        let body = match encode(&UserNotification {
            id: String::new(),
            user_id: request.target.clone(),
            kind: request.kind,
            title: request.title,
            message: request.message,
            related_id: request.related_id,
            is_read: false,
            timestamp: Utc::now(),
        }) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("Could not encode notification for {}: {}", request.target, e);
                return;
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(write_notification(store, request.target, body));
            }
            Err(_) => tracing::warn!(
                "No runtime available, dropping notification for {}",
                request.target
            ),
        }
    }
}

async fn write_notification(store: DynDocumentStore, target: UserId, body: Value) {
    match store.insert(UserNotification::COLLECTION, body).await {
        Ok(id) => tracing::debug!("Notification {} queued for {}", id, target),
        Err(e) => tracing::warn!("Notification for {} failed (ignored): {}", target, e),
    }
}

/// Read and cleanup access to stored notifications.
#[derive(Clone)]
pub struct NotificationRepository {
    store: DynDocumentStore,
}

impl NotificationRepository {
    pub fn new(store: DynDocumentStore) -> Self {
        Self { store }
    }

    /// Newest first.
    pub async fn list_for_user(&self, user_id: &UserId) -> StoreResult<Vec<UserNotification>> {
        self.store
            .query(
                UserNotification::COLLECTION,
                &Query::new()
                    .where_eq("userId", user_id.as_str())
                    .order_by("timestamp", Direction::Desc),
            )
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    pub async fn delete_for_user(&self, user_id: &UserId) -> StoreResult<u64> {
        let ids: Vec<String> = self
            .store
            .query(
                UserNotification::COLLECTION,
                &Query::new().where_eq("userId", user_id.as_str()),
            )
            .await?
            .into_iter()
            .map(|d| d.id)
            .collect();
        self.store
            .batch_delete(UserNotification::COLLECTION, &ids)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::store::SqliteDocumentStore;
    use tempfile::TempDir;

    #[tokio::test]
    async fn store_sink_persists_notification() {
        let temp = TempDir::new().unwrap();
        let pool = db::create_pool(&temp.path().join("test.db")).unwrap();
        db::run_migrations(&pool).unwrap();
        let store: DynDocumentStore = Arc::new(SqliteDocumentStore::new(pool));

        let sink = StoreNotificationSink::new(store.clone());
        sink.emit(NotificationRequest {
            target: UserId::new("bob"),
            kind: NotificationKind::NewMatch,
            title: "New Match!".to_string(),
            message: "You matched with Ana".to_string(),
            related_id: Some("m1".to_string()),
        });

        // Delivery is asynchronous
        let mut stored = Vec::new();
        for _ in 0..50 {
            stored = store
                .query(UserNotification::COLLECTION, &Query::new().where_eq("userId", "bob"))
                .await
                .unwrap();
            if !stored.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        assert_eq!(stored.len(), 1);
        let notification: UserNotification = decode(stored.remove(0)).unwrap();
        assert_eq!(notification.kind, NotificationKind::NewMatch);
        assert_eq!(notification.related_id.as_deref(), Some("m1"));
        assert!(!notification.is_read);
    }

    #[tokio::test]
    async fn repository_deletes_only_target_user() {
        let temp = TempDir::new().unwrap();
        let pool = db::create_pool(&temp.path().join("test.db")).unwrap();
        db::run_migrations(&pool).unwrap();
        let store: DynDocumentStore = Arc::new(SqliteDocumentStore::new(pool));

        for target in ["carol", "carol", "dan"] {
            let body = encode(&UserNotification {
                id: String::new(),
                user_id: UserId::new(target),
                kind: NotificationKind::NewMessage,
                title: "New message".to_string(),
                message: "hi".to_string(),
                related_id: None,
                is_read: false,
                timestamp: Utc::now(),
            })
            .unwrap();
            store.insert(UserNotification::COLLECTION, body).await.unwrap();
        }

        let repo = NotificationRepository::new(store);
        assert_eq!(repo.delete_for_user(&UserId::new("carol")).await.unwrap(), 2);
        assert_eq!(repo.delete_for_user(&UserId::new("carol")).await.unwrap(), 0);
        assert_eq!(repo.list_for_user(&UserId::new("dan")).await.unwrap().len(), 1);
    }
}
