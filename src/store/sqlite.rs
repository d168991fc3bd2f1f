// SQLite implementation - JSON documents keyed by (collection, id)
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use super::{
    Change, ChangeKind, Direction, DocumentStore, Filter, Query, StoreError, StoreResult,
    StoredDocument,
};
use crate::db::DbPool;

pub const DEFAULT_CHANGE_BUFFER: usize = 256;

pub struct SqliteDocumentStore {
    pool: DbPool,
    changes: broadcast::Sender<Change>,
}

impl SqliteDocumentStore {
    pub fn new(pool: DbPool) -> Self {
        Self::with_change_buffer(pool, DEFAULT_CHANGE_BUFFER)
    }

    /// Subscribers lagging by more than `capacity` deltas miss the oldest ones.
    pub fn with_change_buffer(pool: DbPool, capacity: usize) -> Self {
        let (changes, _rx) = broadcast::channel(capacity.max(1));
        Self { pool, changes }
    }

    /// Run a closure against a pooled connection off the async executor.
    async fn blocking<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await?
    }

    fn publish(&self, changes: Vec<Change>) {
        for change in changes {
            // No subscribers is fine
            let _ = self.changes.send(change);
        }
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<StoredDocument>> {
        let collection = collection.to_string();
        let id = id.to_string();
        self.blocking(move |conn| {
            let data = load_body(conn, &collection, &id)?;
            Ok(data.map(|data| StoredDocument { id, data }))
        })
        .await
    }

    async fn query(&self, collection: &str, query: &Query) -> StoreResult<Vec<StoredDocument>> {
        query.validate()?;
        let (sql, values) = build_select(collection, query)?;

        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(id, json)| {
                    Ok(StoredDocument {
                        id,
                        data: serde_json::from_str(&json)?,
                    })
                })
                .collect()
        })
        .await
    }

    async fn insert(&self, collection: &str, data: Value) -> StoreResult<String> {
        let body = into_body(data)?;
        let id = uuid::Uuid::now_v7().to_string();

        let owned_collection = collection.to_string();
        let owned_id = id.clone();
        let json = serde_json::to_string(&body)?;
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO documents (collection, id, data) VALUES (?1, ?2, ?3)",
                params![owned_collection, owned_id, json],
            )?;
            Ok(())
        })
        .await?;

        self.publish(vec![Change {
            collection: collection.to_string(),
            id: id.clone(),
            kind: ChangeKind::Added,
            data: Value::Object(body),
        }]);
        Ok(id)
    }

    async fn insert_unless(
        &self,
        collection: &str,
        data: Value,
        conflicts: &[Query],
    ) -> StoreResult<Option<String>> {
        let checks = conflicts
            .iter()
            .map(|q| {
                q.validate()?;
                build_select(collection, q)
            })
            .collect::<StoreResult<Vec<_>>>()?;
        let body = into_body(data)?;
        let id = uuid::Uuid::now_v7().to_string();

        let owned_collection = collection.to_string();
        let owned_id = id.clone();
        let json = serde_json::to_string(&body)?;
        let inserted = self
            .blocking(move |conn| {
                in_transaction(conn, |conn| {
                    for (sql, values) in &checks {
                        let taken = conn
                            .prepare(sql)?
                            .exists(params_from_iter(values.iter()))?;
                        if taken {
                            return Ok(false);
                        }
                    }
                    conn.execute(
                        "INSERT INTO documents (collection, id, data) VALUES (?1, ?2, ?3)",
                        params![owned_collection, owned_id, json],
                    )?;
                    Ok(true)
                })
            })
            .await?;

        if !inserted {
            return Ok(None);
        }
        self.publish(vec![Change {
            collection: collection.to_string(),
            id: id.clone(),
            kind: ChangeKind::Added,
            data: Value::Object(body),
        }]);
        Ok(Some(id))
    }

    async fn put(&self, collection: &str, id: &str, data: Value) -> StoreResult<()> {
        let body = into_body(data)?;
        let json = serde_json::to_string(&body)?;

        let owned_collection = collection.to_string();
        let owned_id = id.to_string();
        let existed = self
            .blocking(move |conn| {
                in_transaction(conn, |conn| {
                    let existed = load_body(conn, &owned_collection, &owned_id)?.is_some();
                    conn.execute(
                        "INSERT INTO documents (collection, id, data) VALUES (?1, ?2, ?3)
                         ON CONFLICT(collection, id) DO UPDATE SET data = excluded.data",
                        params![owned_collection, owned_id, json],
                    )?;
                    Ok(existed)
                })
            })
            .await?;

        self.publish(vec![Change {
            collection: collection.to_string(),
            id: id.to_string(),
            kind: if existed {
                ChangeKind::Modified
            } else {
                ChangeKind::Added
            },
            data: Value::Object(body),
        }]);
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> StoreResult<bool> {
        let patch = into_body(patch)?;

        let owned_collection = collection.to_string();
        let owned_id = id.to_string();
        let updated = self
            .blocking(move |conn| {
                in_transaction(conn, |conn| {
                    merge_one(conn, &owned_collection, &owned_id, &patch)
                })
            })
            .await?;

        match updated {
            Some(data) => {
                self.publish(vec![Change {
                    collection: collection.to_string(),
                    id: id.to_string(),
                    kind: ChangeKind::Modified,
                    data,
                }]);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<bool> {
        let owned_collection = collection.to_string();
        let owned_id = id.to_string();
        let removed = self
            .blocking(move |conn| remove_one(conn, &owned_collection, &owned_id))
            .await?;

        match removed {
            Some(data) => {
                self.publish(vec![Change {
                    collection: collection.to_string(),
                    id: id.to_string(),
                    kind: ChangeKind::Removed,
                    data,
                }]);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn batch_delete(&self, collection: &str, ids: &[String]) -> StoreResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let owned_collection = collection.to_string();
        let owned_ids = ids.to_vec();
        let removed = self
            .blocking(move |conn| {
                in_transaction(conn, |conn| {
                    let mut removed = Vec::new();
                    for id in &owned_ids {
                        if let Some(data) = remove_one(conn, &owned_collection, id)? {
                            removed.push((id.clone(), data));
                        }
                    }
                    Ok(removed)
                })
            })
            .await?;

        let count = removed.len() as u64;
        self.publish(
            removed
                .into_iter()
                .map(|(id, data)| Change {
                    collection: collection.to_string(),
                    id,
                    kind: ChangeKind::Removed,
                    data,
                })
                .collect(),
        );
        Ok(count)
    }

    async fn batch_update(
        &self,
        collection: &str,
        ids: &[String],
        patch: Value,
    ) -> StoreResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let patch = into_body(patch)?;

        let owned_collection = collection.to_string();
        let owned_ids = ids.to_vec();
        let updated = self
            .blocking(move |conn| {
                in_transaction(conn, |conn| {
                    let mut updated = Vec::new();
                    for id in &owned_ids {
                        if let Some(data) = merge_one(conn, &owned_collection, id, &patch)? {
                            updated.push((id.clone(), data));
                        }
                    }
                    Ok(updated)
                })
            })
            .await?;

        let count = updated.len() as u64;
        self.publish(
            updated
                .into_iter()
                .map(|(id, data)| Change {
                    collection: collection.to_string(),
                    id,
                    kind: ChangeKind::Modified,
                    data,
                })
                .collect(),
        );
        Ok(count)
    }

    fn subscribe(&self, collection: &str, query: Query) -> BoxStream<'static, Change> {
        let collection = collection.to_string();
        BroadcastStream::new(self.changes.subscribe())
            .filter_map(move |res| {
                let keep = match res {
                    Ok(change) if change.collection == collection && query.matches(&change.data) => {
                        Some(change)
                    }
                    Ok(_) => None,
                    Err(lagged) => {
                        tracing::warn!("Change subscriber lagged: {}", lagged);
                        None
                    }
                };
                futures::future::ready(keep)
            })
            .boxed()
    }
}

/// BEGIN IMMEDIATE / COMMIT, rolling back on any error including a failed
/// COMMIT. The first error is the one returned.
fn in_transaction<T>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> StoreResult<T>,
) -> StoreResult<T> {
    conn.execute("BEGIN IMMEDIATE", [])?;
    let result = f(conn).and_then(|value| {
        conn.execute("COMMIT", [])?;
        Ok(value)
    });
    if let Err(e) = &result {
        if !conn.is_autocommit() {
            if let Err(rollback) = conn.execute("ROLLBACK", []) {
                tracing::warn!("Rollback after '{}' failed: {}", e, rollback);
            }
        }
    }
    result
}

fn load_body(conn: &Connection, collection: &str, id: &str) -> StoreResult<Option<Value>> {
    let json: Option<String> = conn
        .query_row(
            "SELECT data FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection, id],
            |row| row.get(0),
        )
        .optional()?;

    match json {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

fn remove_one(conn: &Connection, collection: &str, id: &str) -> StoreResult<Option<Value>> {
    let json: Option<String> = conn
        .query_row(
            "DELETE FROM documents WHERE collection = ?1 AND id = ?2 RETURNING data",
            params![collection, id],
            |row| row.get(0),
        )
        .optional()?;

    match json {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

fn merge_one(
    conn: &Connection,
    collection: &str,
    id: &str,
    patch: &Map<String, Value>,
) -> StoreResult<Option<Value>> {
    let Some(mut current) = load_body(conn, collection, id)? else {
        return Ok(None);
    };

    if let Some(map) = current.as_object_mut() {
        for (key, value) in patch {
            map.insert(key.clone(), value.clone());
        }
    }

    conn.execute(
        "UPDATE documents SET data = ?3 WHERE collection = ?1 AND id = ?2",
        params![collection, id, serde_json::to_string(&current)?],
    )?;
    Ok(Some(current))
}

fn into_body(data: Value) -> StoreResult<Map<String, Value>> {
    match data {
        Value::Object(mut map) => {
            map.remove("id");
            Ok(map)
        }
        other => Err(StoreError::InvalidQuery(format!(
            "document body must be an object, got {}",
            other
        ))),
    }
}

fn to_sql_value(value: &Value) -> StoreResult<SqlValue> {
    match value {
        Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(SqlValue::Integer(i)),
            None => Ok(SqlValue::Real(n.as_f64().unwrap_or_default())),
        },
        Value::String(s) => Ok(SqlValue::Text(s.clone())),
        Value::Null => Ok(SqlValue::Null),
        Value::Array(_) | Value::Object(_) => Err(StoreError::InvalidQuery(
            "equality filters only accept scalar values".to_string(),
        )),
    }
}

fn build_select(collection: &str, query: &Query) -> StoreResult<(String, Vec<SqlValue>)> {
    let mut sql = String::from("SELECT id, data FROM documents WHERE collection = ?1");
    let mut values = vec![SqlValue::Text(collection.to_string())];

    for filter in &query.filters {
        match filter {
            Filter::Eq {
                field,
                value: Value::Null,
            } => {
                sql.push_str(&format!(" AND json_extract(data, '$.{}') IS NULL", field));
            }
            Filter::Eq { field, value } => {
                values.push(to_sql_value(value)?);
                sql.push_str(&format!(
                    " AND json_extract(data, '$.{}') = ?{}",
                    field,
                    values.len()
                ));
            }
        }
    }

    match &query.order_by {
        Some(order) => {
            let direction = match order.direction {
                Direction::Asc => "ASC",
                Direction::Desc => "DESC",
            };
            sql.push_str(&format!(
                " ORDER BY json_extract(data, '$.{}') {}, seq ASC",
                order.field, direction
            ));
        }
        None => sql.push_str(" ORDER BY seq ASC"),
    }

    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    Ok((sql, values))
}
