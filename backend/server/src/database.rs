//! # Redis
//!
//! Durable document store.
//!
//! ## Layout
//!
//! - One Redis hash per collection: `connector:<collection>`
//! - Hash field is the document `_id`, value is the JSON document
//! - Filtered reads scan the hash with `HVALS`; collections are small
//!   (users, profiles, posts of one deployment)
//!
//! ## Conditional writes
//!
//! Edits that must not lose a concurrent writer go through a compare-and-swap
//! script: the new JSON is only stored if the hash field still holds the JSON
//! the edit was computed from. A lost race re-reads and recomputes.
//!
//! Upserts that insert claim their filter in `connector:<collection>:claims`
//! in the same script that writes the document, so two upserts racing on one
//! filter insert once. A claim whose document has been deleted is taken over.
//!
//! `save` stays a plain `HSET`, so fetch-then-save callers keep last-write-wins.
use std::{sync::LazyLock, time::Duration};

use async_trait::async_trait;
use redis::{
    AsyncCommands, Client, Script,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use serde_json::{Map, Value};
use tracing::debug;

use crate::store::{
    DocumentStore, Filter, ListOp, ListUpdate, StoreError, apply_list_op, document_id,
    merge_patch, upserted,
};

const KEY_PREFIX: &str = "connector";
const MAX_SWAP_ATTEMPTS: usize = 16;

/// KEYS[1] hash, ARGV[1] field, ARGV[2] expected JSON ("" when absent),
/// ARGV[3] replacement JSON.
static COMPARE_AND_SWAP: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
        local current = redis.call('HGET', KEYS[1], ARGV[1])
        if (not current and ARGV[2] == '') or current == ARGV[2] then
            redis.call('HSET', KEYS[1], ARGV[1], ARGV[3])
            return 1
        end
        return 0
        ",
    )
});

/// KEYS[1] hash, KEYS[2] claims hash, ARGV[1] claim, ARGV[2] id,
/// ARGV[3] document JSON.
static CLAIM_AND_INSERT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
        local holder = redis.call('HGET', KEYS[2], ARGV[1])
        if holder and redis.call('HEXISTS', KEYS[1], holder) == 1 then
            return 0
        end
        if redis.call('HEXISTS', KEYS[1], ARGV[2]) == 1 then
            return 0
        end
        redis.call('HSET', KEYS[2], ARGV[1], ARGV[2])
        redis.call('HSET', KEYS[1], ARGV[2], ARGV[3])
        return 1
        ",
    )
});

pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(1)
            .set_connection_timeout(Duration::from_millis(100));

        let client = Client::open(redis_url)?;
        let connection = client.get_connection_manager_with_config(config).await?;

        Ok(Self { connection })
    }

    async fn raw(&self, collection: &str, id: &str) -> Result<Option<String>, StoreError> {
        let mut connection = self.connection.clone();

        Ok(connection.hget(key(collection), id).await?)
    }

    async fn scan(&self, collection: &str, filter: &Filter) -> Result<Vec<(String, Value)>, StoreError> {
        let mut connection = self.connection.clone();
        let raws: Vec<String> = connection.hvals(key(collection)).await?;

        let mut matches = Vec::new();
        for raw in raws {
            let document: Value = serde_json::from_str(&raw)?;

            if filter.matches(&document) {
                matches.push((raw, document));
            }
        }

        Ok(matches)
    }

    async fn swap(&self, collection: &str, id: &str, expected: &str, document: &Value) -> Result<bool, StoreError> {
        let mut connection = self.connection.clone();

        let swapped: i64 = COMPARE_AND_SWAP
            .key(key(collection))
            .arg(id)
            .arg(expected)
            .arg(document.to_string())
            .invoke_async(&mut connection)
            .await?;

        if swapped == 0 {
            debug!("Lost compare-and-swap on {collection}/{id}");
        }

        Ok(swapped == 1)
    }

    async fn insert_claimed(&self, collection: &str, filter: &Filter, document: &Value) -> Result<bool, StoreError> {
        let mut connection = self.connection.clone();

        let inserted: i64 = CLAIM_AND_INSERT
            .key(key(collection))
            .key(claims_key(collection))
            .arg(claim(filter))
            .arg(document_id(document)?)
            .arg(document.to_string())
            .invoke_async(&mut connection)
            .await?;

        if inserted == 0 {
            debug!("Lost upsert claim on {collection}");
        }

        Ok(inserted == 1)
    }
}

fn key(collection: &str) -> String {
    format!("{KEY_PREFIX}:{collection}")
}

fn claims_key(collection: &str) -> String {
    format!("{KEY_PREFIX}:{collection}:claims")
}

fn claim(filter: &Filter) -> String {
    filter
        .fields()
        .map(|(field, value)| format!("{field}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

#[async_trait]
impl DocumentStore for RedisStore {
    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        self.raw(collection, id)
            .await?
            .map(|raw| serde_json::from_str(&raw).map_err(StoreError::from))
            .transpose()
    }

    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>, StoreError> {
        Ok(self
            .scan(collection, filter)
            .await?
            .into_iter()
            .map(|(_, document)| document)
            .collect())
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: Map<String, Value>,
        upsert: Option<Map<String, Value>>,
    ) -> Result<Option<Value>, StoreError> {
        for _ in 0..MAX_SWAP_ATTEMPTS {
            match self.scan(collection, filter).await?.into_iter().next() {
                Some((expected, mut document)) => {
                    merge_patch(&mut document, patch.clone());
                    let id = document_id(&document)?.to_string();

                    if self.swap(collection, &id, &expected, &document).await? {
                        return Ok(Some(document));
                    }
                }
                None => {
                    let Some(defaults) = &upsert else {
                        return Ok(None);
                    };

                    let document = upserted(defaults.clone(), filter, patch.clone());

                    if self.insert_claimed(collection, filter, &document).await? {
                        return Ok(Some(document));
                    }
                }
            }
        }

        Err(StoreError::Contended(collection.to_string()))
    }

    async fn find_one_and_remove(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Value>, StoreError> {
        let Some((_, document)) = self.scan(collection, filter).await?.into_iter().next() else {
            return Ok(None);
        };

        let mut connection = self.connection.clone();
        let removed: u64 = connection.hdel(key(collection), document_id(&document)?).await?;

        Ok((removed > 0).then_some(document))
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        let ids = self
            .scan(collection, filter)
            .await?
            .iter()
            .map(|(_, document)| document_id(document).map(str::to_string))
            .collect::<Result<Vec<_>, _>>()?;

        if ids.is_empty() {
            return Ok(0);
        }

        let mut connection = self.connection.clone();

        Ok(connection.hdel(key(collection), ids).await?)
    }

    async fn save(&self, collection: &str, document: Value) -> Result<(), StoreError> {
        let id = document_id(&document)?.to_string();
        let mut connection = self.connection.clone();

        let _: () = connection
            .hset(key(collection), id, document.to_string())
            .await?;

        Ok(())
    }

    async fn update_list(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        op: ListOp,
    ) -> Result<ListUpdate, StoreError> {
        for _ in 0..MAX_SWAP_ATTEMPTS {
            let Some(expected) = self.raw(collection, id).await? else {
                return Ok(ListUpdate::Missing);
            };

            let mut document: Value = serde_json::from_str(&expected)?;

            let update = apply_list_op(&mut document, field, op.clone())?;
            if update == ListUpdate::Unchanged {
                return Ok(update);
            }

            if self.swap(collection, id, &expected, &document).await? {
                return Ok(update);
            }
        }

        Err(StoreError::Contended(format!("{collection}/{id}")))
    }
}
