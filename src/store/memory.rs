//! In-memory cache store

use super::{validate_generation, CacheEntry, CacheStore};
use crate::error::CampusResult;
use crate::http::RequestKey;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

type Generation = HashMap<RequestKey, CacheEntry>;

/// Process-local store shared by every controller holding the same `Arc`
#[derive(Debug, Default)]
pub struct MemoryStore {
    generations: RwLock<BTreeMap<String, Generation>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn open(&self, generation: &str) -> CampusResult<()> {
        validate_generation(generation)?;
        self.generations
            .write()
            .await
            .entry(generation.to_string())
            .or_default();
        Ok(())
    }

    async fn generations(&self) -> CampusResult<Vec<String>> {
        Ok(self.generations.read().await.keys().cloned().collect())
    }

    async fn delete_generation(&self, generation: &str) -> CampusResult<bool> {
        Ok(self.generations.write().await.remove(generation).is_some())
    }

    async fn get(&self, generation: &str, key: &RequestKey) -> CampusResult<Option<CacheEntry>> {
        Ok(self
            .generations
            .read()
            .await
            .get(generation)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn put(&self, generation: &str, entry: CacheEntry) -> CampusResult<()> {
        validate_generation(generation)?;
        self.generations
            .write()
            .await
            .entry(generation.to_string())
            .or_default()
            .insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn put_if_open(&self, generation: &str, entry: CacheEntry) -> CampusResult<bool> {
        let mut generations = self.generations.write().await;
        match generations.get_mut(generation) {
            Some(entries) => {
                entries.insert(entry.key.clone(), entry);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn put_all(&self, generation: &str, entries: Vec<CacheEntry>) -> CampusResult<()> {
        validate_generation(generation)?;
        let mut generations = self.generations.write().await;
        let target = generations.entry(generation.to_string()).or_default();
        for entry in entries {
            target.insert(entry.key.clone(), entry);
        }
        Ok(())
    }

    async fn entries(&self, generation: &str) -> CampusResult<Vec<CacheEntry>> {
        let mut entries: Vec<CacheEntry> = self
            .generations
            .read()
            .await
            .get(generation)
            .map(|g| g.values().cloned().collect())
            .unwrap_or_default();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }
}
