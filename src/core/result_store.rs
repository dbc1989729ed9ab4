//! Durable store of completed transcripts.
//!
//! `results.jsonl` holds one line per saved transcript plus tombstones
//! for deletions; the live set is derived by replay.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::jsonl;
use crate::domain::Transcript;
use crate::error::StoreError;

/// One line of the result log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum ResultLogEntry {
    Saved {
        transcript: Transcript,
    },
    Deleted {
        id: Uuid,
        deleted_at: DateTime<Utc>,
    },
}

/// JSONL-backed transcript store
#[derive(Debug)]
pub struct ResultStore {
    path: PathBuf,
    results: RwLock<HashMap<Uuid, Transcript>>,
}

impl ResultStore {
    /// Open (or create) a store at `path`, replaying any existing log
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut results = HashMap::new();
        for entry in jsonl::read_all::<ResultLogEntry>(&path).await? {
            match entry {
                ResultLogEntry::Saved { transcript } => {
                    results.insert(transcript.id, transcript);
                }
                ResultLogEntry::Deleted { id, .. } => {
                    results.remove(&id);
                }
            }
        }

        Ok(Self {
            path,
            results: RwLock::new(results),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist a transcript and return its id
    pub async fn save(&self, transcript: Transcript) -> Result<Uuid, StoreError> {
        let id = transcript.id;
        let mut results = self.results.write().await;

        let entry = ResultLogEntry::Saved { transcript };
        jsonl::append_locked(&self.path, &entry).await?;

        if let ResultLogEntry::Saved { transcript } = entry {
            results.insert(id, transcript);
        }
        Ok(id)
    }

    /// Get a transcript by id
    pub async fn get(&self, id: Uuid) -> Option<Transcript> {
        self.results.read().await.get(&id).cloned()
    }

    /// An owner's transcripts, most recent first
    pub async fn list_by_owner(&self, owner: &str) -> Vec<Transcript> {
        let results = self.results.read().await;
        let mut found: Vec<Transcript> = results
            .values()
            .filter(|t| t.owner == owner)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found
    }

    /// Delete a transcript owned by `owner`; returns whether anything was removed
    pub async fn delete(&self, id: Uuid, owner: &str) -> Result<bool, StoreError> {
        let mut results = self.results.write().await;
        match results.get(&id) {
            Some(t) if t.owner == owner => {}
            _ => return Ok(false),
        }

        Self::tombstone(&self.path, id).await?;
        results.remove(&id);
        Ok(true)
    }

    /// Withdraw a transcript whose task could not be marked completed
    pub(crate) async fn discard(&self, id: Uuid) -> Result<(), StoreError> {
        let mut results = self.results.write().await;
        if results.contains_key(&id) {
            Self::tombstone(&self.path, id).await?;
            results.remove(&id);
        }
        Ok(())
    }

    async fn tombstone(path: &Path, id: Uuid) -> Result<(), StoreError> {
        jsonl::append_locked(
            path,
            &ResultLogEntry::Deleted {
                id,
                deleted_at: Utc::now(),
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ParticipantMetadata;
    use tempfile::TempDir;

    fn transcript(owner: &str, content: &str) -> Transcript {
        Transcript::new(
            owner.to_string(),
            "rec.webm".to_string(),
            Uuid::new_v4(),
            ParticipantMetadata::default(),
            content.to_string(),
        )
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let temp = TempDir::new().unwrap();
        let store = ResultStore::open(temp.path().join("results.jsonl")).await.unwrap();

        let t = transcript("alice", "Interviewer: hi");
        let id = store.save(t.clone()).await.unwrap();

        assert_eq!(store.get(id).await, Some(t));
        assert!(store.get(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn test_delete_requires_owner_and_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("results.jsonl");

        let (kept, deleted) = {
            let store = ResultStore::open(&path).await.unwrap();
            let kept = store.save(transcript("alice", "one")).await.unwrap();
            let deleted = store.save(transcript("alice", "two")).await.unwrap();

            assert!(!store.delete(deleted, "mallory").await.unwrap());
            assert!(store.delete(deleted, "alice").await.unwrap());
            assert!(!store.delete(deleted, "alice").await.unwrap());
            (kept, deleted)
        };

        let store = ResultStore::open(&path).await.unwrap();
        assert!(store.get(kept).await.is_some());
        assert!(store.get(deleted).await.is_none());
    }

    #[tokio::test]
    async fn test_discard_ignores_owner_and_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("results.jsonl");

        let id = {
            let store = ResultStore::open(&path).await.unwrap();
            let id = store.save(transcript("alice", "orphan")).await.unwrap();
            store.discard(id).await.unwrap();
            store.discard(id).await.unwrap();
            assert!(store.get(id).await.is_none());
            id
        };

        let store = ResultStore::open(&path).await.unwrap();
        assert!(store.get(id).await.is_none());
        assert!(store.list_by_owner("alice").await.is_empty());
    }

    #[tokio::test]
    async fn test_list_by_owner_newest_first() {
        let temp = TempDir::new().unwrap();
        let store = ResultStore::open(temp.path().join("results.jsonl")).await.unwrap();

        let older = store.save(transcript("alice", "older")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let newer = store.save(transcript("alice", "newer")).await.unwrap();
        store.save(transcript("bob", "other")).await.unwrap();

        let ids: Vec<Uuid> = store
            .list_by_owner("alice")
            .await
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec![newer, older]);
    }
}
