//! # Document Store
//!
//! Everything the services need from persistence, expressed over JSON
//! documents grouped into named collections.
//!
//! ## Guarantees
//!
//! - Each call touches one document atomically, except `find` and
//!   `delete_many` which scan a collection.
//! - `save` replaces the whole document. Two read-modify-save sequences on the
//!   same document race and the last `save` wins.
//! - `update_list` is the only conditional primitive: the membership check and
//!   the list edit happen as one step inside the store.
//!
//! Backends: [`crate::memory::MemoryStore`] and [`crate::database::RedisStore`].
use std::{marker::PhantomData, sync::Arc};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

pub const ID_FIELD: &str = "_id";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("document has no id")]
    MissingId,

    #[error("malformed document in {0}")]
    Malformed(String),

    #[error("gave up on contended document {0}")]
    Contended(String),
}

/// Conjunction of top-level field equalities. An empty filter matches every
/// document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter(Vec<(String, Value)>);

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::all().and(field, value)
    }

    pub fn by_id(id: Uuid) -> Self {
        Self::eq(ID_FIELD, id.to_string())
    }

    pub fn and(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.push((field.to_string(), value.into()));
        self
    }

    pub fn matches(&self, document: &Value) -> bool {
        self.0
            .iter()
            .all(|(field, value)| document.get(field) == Some(value))
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(field, value)| (field.as_str(), value))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ListOp {
    /// Prepend `entry` unless an element already carries the same `key`.
    PushFrontUnique { key: String, entry: Value },
    /// Remove the first element whose `key` equals `value`.
    PullFirst { key: String, value: Value },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ListUpdate {
    /// The list after the edit.
    Applied(Vec<Value>),
    /// The membership check refused the edit.
    Unchanged,
    /// No document with that id.
    Missing,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError>;

    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>, StoreError>;

    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>, StoreError> {
        Ok(self.find(collection, filter).await?.into_iter().next())
    }

    /// Sets the `patch` fields on the first match. With `upsert` and no match,
    /// inserts `upsert` merged with the filter fields and the patch.
    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: Map<String, Value>,
        upsert: Option<Map<String, Value>>,
    ) -> Result<Option<Value>, StoreError>;

    async fn find_one_and_remove(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Value>, StoreError>;

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError>;

    async fn save(&self, collection: &str, document: Value) -> Result<(), StoreError>;

    async fn update_list(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        op: ListOp,
    ) -> Result<ListUpdate, StoreError>;
}

pub fn document_id(document: &Value) -> Result<&str, StoreError> {
    document
        .get(ID_FIELD)
        .and_then(Value::as_str)
        .ok_or(StoreError::MissingId)
}

pub fn merge_patch(document: &mut Value, patch: Map<String, Value>) {
    if let Some(fields) = document.as_object_mut() {
        fields.extend(patch);
    }
}

/// Builds the document an upsert inserts: defaults, then filter fields, then
/// the patch, with a fresh id when none of them carried one.
pub fn upserted(
    defaults: Map<String, Value>,
    filter: &Filter,
    patch: Map<String, Value>,
) -> Value {
    let mut document = Value::Object(defaults);

    merge_patch(
        &mut document,
        filter
            .fields()
            .map(|(field, value)| (field.to_string(), value.clone()))
            .collect(),
    );
    merge_patch(&mut document, patch);

    if document.get(ID_FIELD).is_none() {
        merge_patch(
            &mut document,
            Map::from_iter([(ID_FIELD.to_string(), Value::from(Uuid::new_v4().to_string()))]),
        );
    }

    document
}

/// Applies `op` to `document[field]` in place. Shared by every backend so the
/// list semantics cannot drift between them.
pub fn apply_list_op(document: &mut Value, field: &str, op: ListOp) -> Result<ListUpdate, StoreError> {
    let fields = document
        .as_object_mut()
        .ok_or_else(|| StoreError::Malformed(field.to_string()))?;

    let list = fields
        .entry(field)
        .or_insert_with(|| Value::Array(Vec::new()))
        .as_array_mut()
        .ok_or_else(|| StoreError::Malformed(field.to_string()))?;

    match op {
        ListOp::PushFrontUnique { key, entry } => {
            let candidate = entry.get(&key);

            if list.iter().any(|item| item.get(&key) == candidate) {
                return Ok(ListUpdate::Unchanged);
            }

            list.insert(0, entry);
        }
        ListOp::PullFirst { key, value } => {
            match list.iter().position(|item| item.get(&key) == Some(&value)) {
                Some(index) => {
                    list.remove(index);
                }
                None => return Ok(ListUpdate::Unchanged),
            }
        }
    }

    Ok(ListUpdate::Applied(list.clone()))
}

pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: &'static str;
}

/// Typed view of one collection.
pub struct Collection<D> {
    store: Arc<dyn DocumentStore>,
    _marker: PhantomData<fn() -> D>,
}

impl<D> Clone for Collection<D> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _marker: PhantomData,
        }
    }
}

impl<D: Document> Collection<D> {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<D>, StoreError> {
        self.store
            .find_by_id(D::COLLECTION, &id.to_string())
            .await?
            .map(decode)
            .transpose()
    }

    pub async fn find(&self, filter: &Filter) -> Result<Vec<D>, StoreError> {
        self.store
            .find(D::COLLECTION, filter)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    pub async fn find_one(&self, filter: &Filter) -> Result<Option<D>, StoreError> {
        self.store
            .find_one(D::COLLECTION, filter)
            .await?
            .map(decode)
            .transpose()
    }

    pub async fn find_one_and_update<P: Serialize>(
        &self,
        filter: &Filter,
        patch: &P,
        upsert: Option<Map<String, Value>>,
    ) -> Result<Option<D>, StoreError> {
        self.store
            .find_one_and_update(D::COLLECTION, filter, to_object(patch)?, upsert)
            .await?
            .map(decode)
            .transpose()
    }

    pub async fn find_one_and_remove(&self, filter: &Filter) -> Result<Option<D>, StoreError> {
        self.store
            .find_one_and_remove(D::COLLECTION, filter)
            .await?
            .map(decode)
            .transpose()
    }

    pub async fn delete_many(&self, filter: &Filter) -> Result<u64, StoreError> {
        self.store.delete_many(D::COLLECTION, filter).await
    }

    pub async fn save(&self, document: &D) -> Result<(), StoreError> {
        self.store
            .save(D::COLLECTION, serde_json::to_value(document)?)
            .await
    }

    pub async fn update_list(&self, id: Uuid, field: &str, op: ListOp) -> Result<ListUpdate, StoreError> {
        self.store
            .update_list(D::COLLECTION, &id.to_string(), field, op)
            .await
    }
}

fn decode<D: DeserializeOwned>(value: Value) -> Result<D, StoreError> {
    Ok(serde_json::from_value(value)?)
}

pub fn to_object<P: Serialize>(patch: &P) -> Result<Map<String, Value>, StoreError> {
    match serde_json::to_value(patch)? {
        Value::Object(fields) => Ok(fields),
        _ => Err(StoreError::Malformed("patch".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_filter_matches() {
        let doc = json!({ "_id": "a", "user": "u1", "text": "hi" });

        assert!(Filter::all().matches(&doc));
        assert!(Filter::eq("user", "u1").matches(&doc));
        assert!(Filter::eq("user", "u1").and("text", "hi").matches(&doc));
        assert!(!Filter::eq("user", "u2").matches(&doc));
        assert!(!Filter::eq("missing", "x").matches(&doc));
    }

    #[test]
    fn test_push_front_unique() {
        let mut doc = json!({ "_id": "p", "likes": [{ "user": "a" }] });

        let op = ListOp::PushFrontUnique {
            key: "user".into(),
            entry: json!({ "user": "b" }),
        };
        assert_eq!(
            apply_list_op(&mut doc, "likes", op.clone()).unwrap(),
            ListUpdate::Applied(vec![json!({ "user": "b" }), json!({ "user": "a" })])
        );

        assert_eq!(apply_list_op(&mut doc, "likes", op).unwrap(), ListUpdate::Unchanged);
        assert_eq!(doc["likes"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_pull_first() {
        let mut doc = json!({ "_id": "p", "likes": [{ "user": "a" }, { "user": "a" }] });

        let op = ListOp::PullFirst {
            key: "user".into(),
            value: json!("a"),
        };
        assert_eq!(
            apply_list_op(&mut doc, "likes", op.clone()).unwrap(),
            ListUpdate::Applied(vec![json!({ "user": "a" })])
        );

        let missing = ListOp::PullFirst {
            key: "user".into(),
            value: json!("z"),
        };
        assert_eq!(apply_list_op(&mut doc, "likes", missing).unwrap(), ListUpdate::Unchanged);
    }

    #[test]
    fn test_list_op_creates_missing_field() {
        let mut doc = json!({ "_id": "p" });

        let op = ListOp::PushFrontUnique {
            key: "user".into(),
            entry: json!({ "user": "a" }),
        };
        assert!(matches!(
            apply_list_op(&mut doc, "likes", op).unwrap(),
            ListUpdate::Applied(_)
        ));

        let mut bad = json!({ "_id": "p", "likes": 3 });
        let op = ListOp::PullFirst {
            key: "user".into(),
            value: json!("a"),
        };
        assert!(apply_list_op(&mut bad, "likes", op).is_err());
    }

    #[test]
    fn test_upserted_layers_fields() {
        let defaults = to_object(&json!({ "experience": [], "status": "draft" })).unwrap();
        let patch = to_object(&json!({ "status": "Developer" })).unwrap();

        let doc = upserted(defaults, &Filter::eq("user", "u1"), patch);

        assert_eq!(doc["user"], "u1");
        assert_eq!(doc["status"], "Developer");
        assert_eq!(doc["experience"], json!([]));
        assert!(document_id(&doc).is_ok());
    }
}
