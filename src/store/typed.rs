use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::{StoreError, StoreResult, StoredDocument};

/// A model persisted as one document in a fixed collection.
///
/// The model's `id` field is carried by the store key, not the body.
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: &'static str;

    fn id(&self) -> &str;
}

/// Serialize a model into a document body, dropping its id.
pub fn encode<T: Document>(doc: &T) -> StoreResult<Value> {
    let mut value = serde_json::to_value(doc)?;
    match value.as_object_mut() {
        Some(map) => {
            map.remove("id");
            Ok(value)
        }
        None => Err(StoreError::InvalidQuery(format!(
            "{} documents must serialize to an object",
            T::COLLECTION
        ))),
    }
}

/// Rebuild a model from a stored document, re-attaching its id.
pub fn decode<T: Document>(stored: StoredDocument) -> StoreResult<T> {
    let StoredDocument { id, mut data } = stored;
    if let Some(map) = data.as_object_mut() {
        map.insert("id".to_string(), Value::String(id));
    }
    Ok(serde_json::from_value(data)?)
}
