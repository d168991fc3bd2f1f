// Shared harness for integration tests: a temp SQLite store behind a
// wrapper that can be told to fail chosen operations.
#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use skillswap::db;
use skillswap::identity::LocalIdentityProvider;
use skillswap::matching::CompatibilityMode;
use skillswap::models::{NewSkillPost, SkillPost, User, UserId};
use skillswap::notify::{NotificationRequest, NotificationSink};
use skillswap::store::{
    Change, DocumentStore, DynDocumentStore, Query, SqliteDocumentStore, StoreError, StoreResult,
    StoredDocument,
};
use skillswap::Engine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Get,
    Query,
    Insert,
    Put,
    Update,
    Delete,
    BatchDelete,
    BatchUpdate,
}

#[derive(Debug, Clone)]
struct Rule {
    op: Option<Op>,
    collection: Option<String>,
}

/// Delegates to a real store unless a failure rule matches.
pub struct FlakyStore {
    inner: DynDocumentStore,
    rules: Mutex<Vec<Rule>>,
    calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: DynDocumentStore) -> Self {
        Self {
            inner,
            rules: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Fail `op` on `collection`. `None` matches anything.
    pub fn fail(&self, op: Option<Op>, collection: Option<&str>) {
        self.rules.lock().unwrap().push(Rule {
            op,
            collection: collection.map(str::to_string),
        });
    }

    pub fn heal(&self) {
        self.rules.lock().unwrap().clear();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self, op: Op, collection: &str) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let rules = self.rules.lock().unwrap();
        let hit = rules.iter().any(|r| {
            r.op.map_or(true, |o| o == op)
                && r.collection.as_deref().map_or(true, |c| c == collection)
        });
        if hit {
            Err(StoreError::Unavailable(format!(
                "injected {:?} failure on {}",
                op, collection
            )))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<StoredDocument>> {
        self.check(Op::Get, collection)?;
        self.inner.get(collection, id).await
    }

    async fn query(&self, collection: &str, query: &Query) -> StoreResult<Vec<StoredDocument>> {
        self.check(Op::Query, collection)?;
        self.inner.query(collection, query).await
    }

    async fn insert(&self, collection: &str, data: Value) -> StoreResult<String> {
        self.check(Op::Insert, collection)?;
        self.inner.insert(collection, data).await
    }

    async fn insert_unless(
        &self,
        collection: &str,
        data: Value,
        conflicts: &[Query],
    ) -> StoreResult<Option<String>> {
        self.check(Op::Insert, collection)?;
        self.inner.insert_unless(collection, data, conflicts).await
    }

    async fn put(&self, collection: &str, id: &str, data: Value) -> StoreResult<()> {
        self.check(Op::Put, collection)?;
        self.inner.put(collection, id, data).await
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> StoreResult<bool> {
        self.check(Op::Update, collection)?;
        self.inner.update(collection, id, patch).await
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<bool> {
        self.check(Op::Delete, collection)?;
        self.inner.delete(collection, id).await
    }

    async fn batch_delete(&self, collection: &str, ids: &[String]) -> StoreResult<u64> {
        self.check(Op::BatchDelete, collection)?;
        self.inner.batch_delete(collection, ids).await
    }

    async fn batch_update(
        &self,
        collection: &str,
        ids: &[String],
        patch: Value,
    ) -> StoreResult<u64> {
        self.check(Op::BatchUpdate, collection)?;
        self.inner.batch_update(collection, ids, patch).await
    }

    fn subscribe(&self, collection: &str, query: Query) -> BoxStream<'static, Change> {
        self.inner.subscribe(collection, query)
    }
}

/// Records every notification request instead of delivering it.
#[derive(Default)]
pub struct RecordingSink {
    requests: Mutex<Vec<NotificationRequest>>,
}

impl RecordingSink {
    pub fn requests(&self) -> Vec<NotificationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl NotificationSink for RecordingSink {
    fn emit(&self, request: NotificationRequest) {
        self.requests.lock().unwrap().push(request);
    }
}

pub struct Harness {
    pub engine: Engine,
    pub flaky: Arc<FlakyStore>,
    pub identity: Arc<LocalIdentityProvider>,
    pub sink: Arc<RecordingSink>,
    _temp: TempDir,
}

pub fn harness() -> Harness {
    harness_with_mode(CompatibilityMode::Category)
}

pub fn harness_with_mode(mode: CompatibilityMode) -> Harness {
    let temp = TempDir::new().unwrap();
    let pool = db::create_pool(&temp.path().join("test.db")).unwrap();
    db::run_migrations(&pool).unwrap();

    let flaky = Arc::new(FlakyStore::new(Arc::new(SqliteDocumentStore::new(pool))));
    let identity = Arc::new(LocalIdentityProvider::new());
    let sink = Arc::new(RecordingSink::default());
    let engine = Engine::new(flaky.clone(), identity.clone(), sink.clone(), mode);

    Harness {
        engine,
        flaky,
        identity,
        sink,
        _temp: temp,
    }
}

impl Harness {
    pub fn sign_in(&self, user: &str) {
        self.identity.sign_in(user);
    }

    pub async fn seed_users(&self, ids: &[&str]) {
        for id in ids {
            self.engine
                .users
                .put(&User {
                    id: UserId::new(*id),
                    name: format!("{} name", id),
                    username: id.to_string(),
                    is_verified: false,
                    bio: String::new(),
                    profile_image_url: None,
                    rating: 0.0,
                    review_count: 0,
                })
                .await
                .unwrap();
        }
    }

    /// Publish a post for `owner`: (teach, category) and (learn, category).
    pub async fn post(&self, owner: &str, teach: (&str, &str), learn: (&str, &str)) -> SkillPost {
        self.engine
            .posts
            .create(NewSkillPost {
                user_id: UserId::new(owner),
                user_name: format!("{} name", owner),
                teach: teach.0.to_string(),
                teach_category: teach.1.to_string(),
                learn: learn.0.to_string(),
                learn_category: learn.1.to_string(),
                ..Default::default()
            })
            .await
            .unwrap()
    }
}
