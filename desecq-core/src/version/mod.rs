//! Content-addressed, append-only snapshot log per zone (§4.5).
//!
//! The spec's own framing (§1, §9) treats this as "any equivalent
//! append-only content store" standing in for a VCS; this implementation
//! keeps it to plain hashed JSON files rather than pulling in a real
//! content-store dependency, since the store never needs random access
//! by anything but hash and the whole log for one zone is small.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::StorageError;
use crate::model::RRset;
use crate::queue::{ApiQueue, Handle, QueueItemSpec};
use crate::model::{ApiRequest, Method, Priority};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CanonicalRRset {
    subname: String,
    #[serde(rename = "type")]
    record_type: String,
    ttl: u32,
    records: Vec<String>,
}

/// One line of `list(zone)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub hash: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotFile {
    zone: String,
    message: String,
    timestamp: DateTime<Utc>,
    state_hash: String,
    state_blob: String,
}

pub struct VersionStore {
    root: PathBuf,
}

impl VersionStore {
    pub fn new(root: PathBuf) -> Self {
        VersionStore { root }
    }

    fn zone_dir(&self, zone: &str) -> PathBuf {
        self.root.join(zone)
    }

    fn index_path(&self, zone: &str) -> PathBuf {
        self.zone_dir(zone).join("index.json")
    }

    fn snapshot_path(&self, zone: &str, hash: &str) -> PathBuf {
        self.zone_dir(zone).join(format!("{hash}.json"))
    }

    fn canonical_blob(rrsets: &[RRset]) -> String {
        let mut canonical: Vec<CanonicalRRset> = rrsets
            .iter()
            .map(|r| CanonicalRRset {
                subname: r.subname.clone(),
                record_type: r.record_type.clone(),
                ttl: r.ttl,
                records: r.records.clone(),
            })
            .collect();
        canonical.sort_by(|a, b| (a.subname.as_str(), a.record_type.as_str()).cmp(&(b.subname.as_str(), b.record_type.as_str())));
        serde_json::to_string(&canonical).expect("canonical rrsets are always serializable")
    }

    fn hash_blob(blob: &str) -> String {
        let digest = Sha256::digest(blob.as_bytes());
        hex::encode(digest)
    }

    async fn read_index(&self, zone: &str) -> Result<Vec<Entry>, StorageError> {
        match tokio::fs::read(self.index_path(zone)).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_index(&self, zone: &str, entries: &[Entry]) -> Result<(), StorageError> {
        let dir = self.zone_dir(zone);
        tokio::fs::create_dir_all(&dir).await?;
        let path = self.index_path(zone);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(entries)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Idempotent: if the computed hash equals the most recent entry's
    /// hash, this is a no-op and returns `Ok(None)`.
    pub async fn snapshot(
        &self,
        zone: &str,
        message: &str,
        rrsets: &[RRset],
    ) -> Result<Option<Entry>, StorageError> {
        let blob = Self::canonical_blob(rrsets);
        let hash = Self::hash_blob(&blob);

        let mut index = self.read_index(zone).await?;
        if index.first().map(|e| e.hash.as_str()) == Some(hash.as_str()) {
            debug!(zone, %hash, "snapshot unchanged, skipping");
            return Ok(None);
        }

        let timestamp = Utc::now();
        let file = SnapshotFile {
            zone: zone.to_string(),
            message: message.to_string(),
            timestamp,
            state_hash: hash.clone(),
            state_blob: blob,
        };
        tokio::fs::create_dir_all(self.zone_dir(zone)).await?;
        let path = self.snapshot_path(zone, &hash);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&file)?).await?;
        tokio::fs::rename(&tmp, &path).await?;

        let entry = Entry {
            hash,
            timestamp,
            message: message.to_string(),
        };
        index.insert(0, entry.clone());
        self.write_index(zone, &index).await?;
        Ok(Some(entry))
    }

    /// Newest first.
    pub async fn list(&self, zone: &str) -> Result<Vec<Entry>, StorageError> {
        self.read_index(zone).await
    }

    pub async fn read(&self, zone: &str, hash: &str) -> Result<Vec<RRset>, StorageError> {
        let bytes = tokio::fs::read(self.snapshot_path(zone, hash)).await?;
        let file: SnapshotFile = serde_json::from_slice(&bytes)?;
        let canonical: Vec<CanonicalRRset> = serde_json::from_str(&file.state_blob)?;
        Ok(canonical
            .into_iter()
            .map(|c| RRset {
                zone: zone.to_string(),
                subname: c.subname,
                record_type: c.record_type,
                ttl: c.ttl,
                records: c.records,
                created: file.timestamp,
                touched: file.timestamp,
            })
            .collect())
    }

    /// Emits a single bulk-put queue item replacing all RRsets of `zone`
    /// with the state captured at `hash`. The store itself never
    /// mutates the service.
    pub async fn restore(&self, zone: &str, hash: &str, queue: &ApiQueue) -> Result<Handle, StorageError> {
        let target = self.read(zone, hash).await?;
        let body = serde_json::to_value(&target)?;
        let request = ApiRequest::new(Method::Put, format!("/domains/{zone}/rrsets/")).with_body(body);
        Ok(queue.submit(QueueItemSpec {
            priority: Priority::High,
            category: format!("records:mutate:{zone}"),
            action: format!("restore {zone} to {hash}"),
            request,
        }))
    }

    pub async fn delete_history(&self, zone: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_dir_all(self.zone_dir(zone)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn rrset(subname: &str, record_type: &str) -> RRset {
        RRset {
            zone: "example.com.".into(),
            subname: subname.into(),
            record_type: record_type.into(),
            ttl: 3600,
            records: vec!["1.2.3.4".into()],
            created: Utc::now(),
            touched: Utc::now(),
        }
    }

    #[tokio::test]
    async fn snapshot_idempotence() {
        let dir = tempfile::tempdir().unwrap();
        let store = VersionStore::new(dir.path().to_path_buf());
        let rrsets = vec![rrset("www", "A")];

        let first = store.snapshot("example.com.", "m1", &rrsets).await.unwrap();
        assert!(first.is_some());
        let second = store.snapshot("example.com.", "m2", &rrsets).await.unwrap();
        assert!(second.is_none(), "unchanged state must not append a new entry");

        let entries = store.list("example.com.").await.unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn read_round_trips_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = VersionStore::new(dir.path().to_path_buf());
        let rrsets = vec![rrset("www", "A"), rrset("", "MX")];
        let entry = store.snapshot("example.com.", "m1", &rrsets).await.unwrap().unwrap();

        let read_back = store.read("example.com.", &entry.hash).await.unwrap();
        assert_eq!(read_back.len(), 2);
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = VersionStore::new(dir.path().to_path_buf());
        store.snapshot("example.com.", "m1", &[rrset("www", "A")]).await.unwrap();
        store
            .snapshot("example.com.", "m2", &[rrset("www", "A"), rrset("mail", "MX")])
            .await
            .unwrap();

        let entries = store.list("example.com.").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "m2");
    }
}
