use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::store::{
    DocumentStore, Filter, ListOp, ListUpdate, StoreError, apply_list_op, document_id,
    merge_patch, upserted,
};

/// Process-local store. Every call takes the lock once, so each call is
/// atomic on its own and nothing spans two calls.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let collections = self.collections.read().await;

        Ok(collections
            .get(collection)
            .and_then(|documents| documents.get(id))
            .cloned())
    }

    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>, StoreError> {
        let collections = self.collections.read().await;

        Ok(collections
            .get(collection)
            .map(|documents| {
                documents
                    .values()
                    .filter(|document| filter.matches(document))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: Map<String, Value>,
        upsert: Option<Map<String, Value>>,
    ) -> Result<Option<Value>, StoreError> {
        let mut collections = self.collections.write().await;
        let documents = collections.entry(collection.to_string()).or_default();

        if let Some(document) = documents.values_mut().find(|document| filter.matches(document)) {
            merge_patch(document, patch);
            return Ok(Some(document.clone()));
        }

        let Some(defaults) = upsert else {
            return Ok(None);
        };

        let document = upserted(defaults, filter, patch);
        documents.insert(document_id(&document)?.to_string(), document.clone());

        Ok(Some(document))
    }

    async fn find_one_and_remove(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Value>, StoreError> {
        let mut collections = self.collections.write().await;

        let Some(documents) = collections.get_mut(collection) else {
            return Ok(None);
        };

        let id = documents
            .iter()
            .find(|(_, document)| filter.matches(document))
            .map(|(id, _)| id.clone());

        Ok(id.and_then(|id| documents.remove(&id)))
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        let mut collections = self.collections.write().await;

        let Some(documents) = collections.get_mut(collection) else {
            return Ok(0);
        };

        let before = documents.len();
        documents.retain(|_, document| !filter.matches(document));

        Ok((before - documents.len()) as u64)
    }

    async fn save(&self, collection: &str, document: Value) -> Result<(), StoreError> {
        let id = document_id(&document)?.to_string();

        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(id, document);

        Ok(())
    }

    async fn update_list(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        op: ListOp,
    ) -> Result<ListUpdate, StoreError> {
        let mut collections = self.collections.write().await;

        match collections
            .get_mut(collection)
            .and_then(|documents| documents.get_mut(id))
        {
            Some(document) => apply_list_op(document, field, op),
            None => Ok(ListUpdate::Missing),
        }
    }
}
