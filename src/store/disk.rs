//! Filesystem-backed cache store
//!
//! Layout: `<root>/<generation>/<sha256(key)>.json`. Entries are written to
//! a temporary sibling and renamed into place, so readers see either the old
//! or the new entry, never a partial one.

use super::{validate_generation, CacheEntry, CacheStore};
use crate::error::{CampusError, CampusResult};
use crate::http::RequestKey;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

/// Cache store persisted under a root directory
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn generation_dir(&self, generation: &str) -> CampusResult<PathBuf> {
        validate_generation(generation)?;
        Ok(self.root.join(generation))
    }

    fn entry_file_name(key: &RequestKey) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_str().as_bytes());
        format!("{}.json", hex::encode(hasher.finalize()))
    }

    /// Write to a temporary sibling, then rename over the entry file
    async fn write_entry(dir: &Path, generation: &str, entry: &CacheEntry) -> CampusResult<()> {
        let file_name = Self::entry_file_name(&entry.key);
        let path = dir.join(&file_name);
        let tmp = dir.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));
        let content = serde_json::to_vec(entry)?;

        let write_failed = |e: std::io::Error| CampusError::CacheWrite {
            key: entry.key.to_string(),
            reason: e.to_string(),
        };

        fs::write(&tmp, content).await.map_err(write_failed)?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(write_failed(e));
        }

        debug!("Stored {} in {}", entry.key, generation);
        Ok(())
    }

    async fn read_entry(path: &Path) -> CampusResult<CacheEntry> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| CampusError::io(format!("reading cache entry {}", path.display()), e))?;

        serde_json::from_str(&content).map_err(|e| CampusError::CacheCorrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl CacheStore for DiskStore {
    async fn open(&self, generation: &str) -> CampusResult<()> {
        let dir = self.generation_dir(generation)?;
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| CampusError::io(format!("creating generation {}", dir.display()), e))
    }

    async fn generations(&self) -> CampusResult<Vec<String>> {
        if !self.root.exists() {
            return Ok(vec![]);
        }

        let mut names = vec![];
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|e| CampusError::io("reading cache root", e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CampusError::io("reading cache root entry", e))?
        {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if validate_generation(name).is_ok() {
                    names.push(name.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }

    async fn delete_generation(&self, generation: &str) -> CampusResult<bool> {
        let dir = self.generation_dir(generation)?;
        if !dir.exists() {
            return Ok(false);
        }

        fs::remove_dir_all(&dir)
            .await
            .map_err(|e| CampusError::io(format!("deleting generation {}", dir.display()), e))?;
        debug!("Deleted generation directory {}", dir.display());
        Ok(true)
    }

    async fn get(&self, generation: &str, key: &RequestKey) -> CampusResult<Option<CacheEntry>> {
        let path = self.generation_dir(generation)?.join(Self::entry_file_name(key));
        if !path.exists() {
            return Ok(None);
        }

        let entry = Self::read_entry(&path).await?;
        // Hash collision or hand-edited file
        if &entry.key != key {
            warn!("Cache entry {} holds key {}, expected {}", path.display(), entry.key, key);
            return Ok(None);
        }
        Ok(Some(entry))
    }

    async fn put(&self, generation: &str, entry: CacheEntry) -> CampusResult<()> {
        let dir = self.generation_dir(generation)?;
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| CampusError::io(format!("creating generation {}", dir.display()), e))?;

        Self::write_entry(&dir, generation, &entry).await
    }

    async fn put_if_open(&self, generation: &str, entry: CacheEntry) -> CampusResult<bool> {
        let dir = self.generation_dir(generation)?;
        if !dir.is_dir() {
            return Ok(false);
        }

        match Self::write_entry(&dir, generation, &entry).await {
            Ok(()) => Ok(true),
            // Evicted between the check and the write
            Err(_) if !dir.is_dir() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn entries(&self, generation: &str) -> CampusResult<Vec<CacheEntry>> {
        let dir = self.generation_dir(generation)?;
        if !dir.exists() {
            return Ok(vec![]);
        }

        let mut result = vec![];
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| CampusError::io(format!("reading generation {}", dir.display()), e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CampusError::io("reading generation entry", e))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                match Self::read_entry(&path).await {
                    Ok(cached) => result.push(cached),
                    Err(e) => warn!("Skipping unreadable cache entry: {}", e),
                }
            }
        }

        result.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(result)
    }
}
