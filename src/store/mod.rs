//! Versioned cache store
//!
//! A store holds named cache generations. Each generation maps a normalized
//! request key to the full response captured for it. The controller reads
//! only from the generation matching its version; every other generation is
//! stale and removed on activation.
//!
//! # Backends
//!
//! | Backend | Persistence | Use |
//! |---------|-------------|-----|
//! | `MemoryStore` | none | tests, embedding |
//! | `DiskStore` | one JSON file per entry | CLI |

pub mod disk;
pub mod memory;

pub use disk::DiskStore;
pub use memory::MemoryStore;

use crate::error::{CampusError, CampusResult};
use crate::http::{RequestKey, Response};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cached response together with the key it was stored under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: RequestKey,
    pub url: String,
    pub response: Response,
    pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: RequestKey, url: impl Into<String>, response: Response) -> Self {
        Self {
            key,
            url: url.into(),
            response,
            cached_at: Utc::now(),
        }
    }
}

/// Abstract cache store interface
///
/// Individual operations are atomic; there is no cross-operation locking.
/// Concurrent `put`s on one key resolve last-write-wins.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Create the generation if it does not exist
    async fn open(&self, generation: &str) -> CampusResult<()>;

    /// Names of all existing generations, sorted
    async fn generations(&self) -> CampusResult<Vec<String>>;

    /// Delete a generation and all its entries. Returns false if absent.
    async fn delete_generation(&self, generation: &str) -> CampusResult<bool>;

    /// Look up an entry. A missing generation is a miss, not an error.
    async fn get(&self, generation: &str, key: &RequestKey) -> CampusResult<Option<CacheEntry>>;

    /// Insert or overwrite an entry, creating the generation if needed
    async fn put(&self, generation: &str, entry: CacheEntry) -> CampusResult<()>;

    /// Insert or overwrite an entry only if the generation still exists
    ///
    /// Returns false without writing when the generation is absent, so a
    /// late write never recreates an evicted generation.
    async fn put_if_open(&self, generation: &str, entry: CacheEntry) -> CampusResult<bool> {
        if !self.generations().await?.iter().any(|g| g == generation) {
            return Ok(false);
        }
        self.put(generation, entry).await?;
        Ok(true)
    }

    /// Insert several entries
    async fn put_all(&self, generation: &str, entries: Vec<CacheEntry>) -> CampusResult<()> {
        for entry in entries {
            self.put(generation, entry).await?;
        }
        Ok(())
    }

    /// All entries of a generation, sorted by key
    async fn entries(&self, generation: &str) -> CampusResult<Vec<CacheEntry>>;
}

/// Validate a generation name (it doubles as a directory name on disk)
pub fn validate_generation(name: &str) -> CampusResult<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(CampusError::InvalidGeneration(name.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::io;

    /// Store whose reads and deletions fail while writes succeed
    #[derive(Default)]
    pub(crate) struct FailingStore {
        pub(crate) inner: MemoryStore,
    }

    fn broken(context: &str) -> CampusError {
        CampusError::io(context, io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"))
    }

    #[async_trait]
    impl CacheStore for FailingStore {
        async fn open(&self, generation: &str) -> CampusResult<()> {
            self.inner.open(generation).await
        }
        async fn generations(&self) -> CampusResult<Vec<String>> {
            self.inner.generations().await
        }
        async fn delete_generation(&self, generation: &str) -> CampusResult<bool> {
            Err(broken(&format!("deleting generation {generation}")))
        }
        async fn get(&self, generation: &str, _: &RequestKey) -> CampusResult<Option<CacheEntry>> {
            Err(broken(&format!("reading generation {generation}")))
        }
        async fn put(&self, generation: &str, entry: CacheEntry) -> CampusResult<()> {
            self.inner.put(generation, entry).await
        }
        async fn entries(&self, generation: &str) -> CampusResult<Vec<CacheEntry>> {
            self.inner.entries(generation).await
        }
    }
}
