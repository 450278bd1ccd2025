//! On-disk checkpoint store
//!
//! Pending checkpoints are written as one JSON file each so that a later
//! process can still commit or roll them back. The snapshot is kept as
//! document text together with its md5 checksum, which is verified when
//! the record is loaded.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use netstate_core::{NetstateError, NetworkState, Result};

/// Persisted form of a pending checkpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCheckpoint {
    /// Checkpoint identifier
    pub id: String,
    /// Creation time
    pub created: DateTime<Utc>,
    /// Expiry timeout in milliseconds
    pub timeout_ms: u64,
    /// Wall clock expiry deadline
    pub deadline: DateTime<Utc>,
    /// Snapshot as JSON document text
    pub snapshot: String,
    /// md5 of `snapshot`
    pub checksum: String,
}

impl StoredCheckpoint {
    pub fn new(
        id: &str,
        created: DateTime<Utc>,
        timeout: std::time::Duration,
        deadline: DateTime<Utc>,
        snapshot: &NetworkState,
    ) -> Result<Self> {
        let snapshot = serde_json::to_string(snapshot)
            .map_err(|e| NetstateError::Bug(format!("failed to serialize snapshot: {}", e)))?;
        let checksum = format!("{:x}", md5::compute(snapshot.as_bytes()));
        Ok(Self {
            id: id.to_string(),
            created,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            deadline,
            snapshot,
            checksum,
        })
    }

    /// Decode the snapshot after checking its integrity.
    pub fn snapshot(&self) -> Result<NetworkState> {
        let checksum = format!("{:x}", md5::compute(self.snapshot.as_bytes()));
        if checksum != self.checksum {
            return Err(NetstateError::MalformedDocument(format!(
                "checkpoint {} snapshot checksum mismatch",
                self.id
            )));
        }
        serde_json::from_str(&self.snapshot)
            .map_err(|e| NetstateError::MalformedDocument(format!("checkpoint {}: {}", self.id, e)))
    }
}

/// Directory holding one file per pending checkpoint
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Open the store, creating the directory if needed
    pub async fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, id: &str) -> PathBuf {
        let name = id.rsplit('/').next().unwrap_or(id);
        self.dir.join(format!("{}.json", name))
    }

    pub async fn save(&self, record: &StoredCheckpoint) -> io::Result<()> {
        let data = serde_json::to_string_pretty(record)?;
        fs::write(self.path(&record.id), data).await?;
        debug!("stored checkpoint {}", record.id);
        Ok(())
    }

    /// Remove a record, missing files are not an error.
    pub async fn remove(&self, id: &str) -> io::Result<()> {
        match fs::remove_file(self.path(id)).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// All readable records, newest first. Unreadable files are skipped.
    pub async fn load_all(&self) -> io::Result<Vec<StoredCheckpoint>> {
        let mut records = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            match load_record(&path).await {
                Ok(record) => records.push(record),
                Err(e) => warn!("Failed to load checkpoint from {:?}: {}", path, e),
            }
        }

        records.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(records)
    }
}

async fn load_record(path: &Path) -> io::Result<StoredCheckpoint> {
    let content = fs::read_to_string(path).await?;
    let record = serde_json::from_str(&content)?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use netstate_core::{Interface, InterfaceType};
    use std::time::Duration;
    use tempfile::TempDir;

    fn record(id: &str) -> StoredCheckpoint {
        let snapshot =
            NetworkState::new().with_interface(Interface::new("eth1", InterfaceType::Ethernet));
        let now = Utc::now();
        StoredCheckpoint::new(id, now, Duration::from_secs(60), now, &snapshot).unwrap()
    }

    #[tokio::test]
    async fn test_save_load_remove() {
        let temp_dir = TempDir::new().unwrap();
        let store = CheckpointStore::open(temp_dir.path().join("checkpoints"))
            .await
            .unwrap();

        let record = record("/netstate/checkpoint/1-1");
        store.save(&record).await.unwrap();
        assert!(store.dir().join("1-1.json").exists());

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, record.id);
        assert!(loaded[0].snapshot().unwrap().interface("eth1").is_some());

        store.remove(&record.id).await.unwrap();
        store.remove(&record.id).await.unwrap();
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[test]
    fn test_checksum_verified() {
        let mut record = record("/netstate/checkpoint/1-1");
        record.snapshot = record.snapshot.replace("eth1", "eth2");
        let err = record.snapshot().unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[tokio::test]
    async fn test_garbage_files_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let store = CheckpointStore::open(temp_dir.path()).await.unwrap();
        std::fs::write(temp_dir.path().join("broken.json"), "{not json").unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), "ignored").unwrap();
        assert!(store.load_all().await.unwrap().is_empty());
    }
}
