//! Narrow result-sink traits the crawling context pushes into.
//!
//! The on-disk/cloud encoding of datasets and key-value stores is out of
//! scope for this crate (§1); what's defined here is just enough surface for
//! `push_data`/`get_key_value_store` to have a real collaborator in tests
//! and in library use, the way the donor's `SearchResults` is a plain
//! in-memory collection rather than a storage-backed type.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;

/// An append-only sink for structured output items.
#[async_trait]
pub trait Dataset: Send + Sync {
    async fn push_data(&self, item: serde_json::Value) -> Result<()>;
    async fn len(&self) -> usize;
    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
    async fn items(&self) -> Vec<serde_json::Value>;
}

/// In-memory [`Dataset`].
#[derive(Default)]
pub struct InMemoryDataset {
    items: RwLock<Vec<serde_json::Value>>,
}

impl InMemoryDataset {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Dataset for InMemoryDataset {
    async fn push_data(&self, item: serde_json::Value) -> Result<()> {
        self.items.write().await.push(item);
        Ok(())
    }

    async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    async fn items(&self) -> Vec<serde_json::Value> {
        self.items.read().await.clone()
    }
}

/// A simple get/set record store, keyed by string, scoped to an optional
/// named store id (the default store is `None`).
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;
    async fn set(&self, key: &str, value: serde_json::Value) -> Result<()>;
}

#[derive(Default)]
pub struct InMemoryKeyValueStore {
    entries: RwLock<HashMap<String, serde_json::Value>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }
}

/// Registry resolving key-value store ids to instances, created lazily on
/// first access — mirrors `SessionPool`'s lazy-creation-up-to-bound idiom,
/// minus the bound since stores are cheap and caller-scoped.
#[derive(Default)]
pub struct KeyValueStoreRegistry {
    stores: RwLock<HashMap<String, Arc<InMemoryKeyValueStore>>>,
}

impl KeyValueStoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_create(&self, id: Option<&str>) -> Arc<InMemoryKeyValueStore> {
        let key = id.unwrap_or("default").to_string();
        if let Some(store) = self.stores.read().await.get(&key) {
            return store.clone();
        }
        let mut stores = self.stores.write().await;
        stores
            .entry(key)
            .or_insert_with(|| Arc::new(InMemoryKeyValueStore::new()))
            .clone()
    }
}
