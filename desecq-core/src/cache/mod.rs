//! Three-layer cache (§4.3): in-memory index, binary disk layer, and a
//! textual fallback layer used when the binary layer fails to
//! deserialize (schema drift).

mod layer;

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::model::{RRset, Zone};

pub use layer::PersistedRecords;
pub use layer::PersistedZones;

pub const DEFAULT_SYNC_INTERVAL_MINUTES: i64 = 15;
const RECORDS_STALE_AFTER_MINUTES: i64 = 5;

struct ZonesEntry {
    list: Vec<Zone>,
    index: HashMap<String, usize>,
    fetched_at: DateTime<Utc>,
}

struct RecordsEntry {
    list: Vec<RRset>,
    index: HashMap<(String, String), usize>,
    fetched_at: DateTime<Utc>,
}

#[derive(Default)]
struct L1 {
    zones: Option<ZonesEntry>,
    records: HashMap<String, RecordsEntry>,
}

pub struct ZonesRead {
    pub zones: Vec<Zone>,
    pub stale: bool,
}

pub struct RecordsRead {
    pub records: Vec<RRset>,
    pub stale: bool,
}

pub struct Cache {
    dir: PathBuf,
    sync_interval_minutes: i64,
    l1: Mutex<L1>,
}

impl Cache {
    pub fn new(dir: PathBuf, sync_interval_minutes: i64) -> Self {
        Cache {
            dir,
            sync_interval_minutes,
            l1: Mutex::new(L1::default()),
        }
    }

    fn zones_bin(&self) -> PathBuf {
        self.dir.join("zones.bin")
    }

    fn zones_json(&self) -> PathBuf {
        self.dir.join("zones.json")
    }

    fn records_bin(&self, domain: &str) -> PathBuf {
        self.dir.join(format!("records_{domain}.bin"))
    }

    fn records_json(&self, domain: &str) -> PathBuf {
        self.dir.join(format!("records_{domain}.json"))
    }

    /// L1 hit -> return; else L2 -> populate L1; else L3 -> populate L1;
    /// else miss.
    pub async fn read_zones(&self) -> Option<ZonesRead> {
        if let Some(entry) = &self.l1.lock().zones {
            return Some(ZonesRead {
                zones: entry.list.clone(),
                stale: self.zones_stale(entry.fetched_at),
            });
        }

        let loaded = match layer::load_bincode::<PersistedZones>(&self.zones_bin()).await {
            Ok(Some(persisted)) => Some(persisted),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "zones.bin failed to deserialize, falling back to zones.json");
                None
            }
        };
        let loaded = match loaded {
            Some(p) => Some(p),
            None => layer::load_json::<PersistedZones>(&self.zones_json())
                .await
                .ok()
                .flatten(),
        };

        let persisted = loaded?;
        let stale = self.zones_stale(persisted.fetched_at);
        self.populate_zones_l1(persisted.zones.clone(), persisted.fetched_at);
        Some(ZonesRead {
            zones: persisted.zones,
            stale,
        })
    }

    pub async fn store_zones(&self, zones: Vec<Zone>) -> Result<(), StorageError> {
        let fetched_at = Utc::now();
        self.populate_zones_l1(zones.clone(), fetched_at);
        let persisted = PersistedZones { zones, fetched_at };
        layer::save_bincode(&self.zones_bin(), &persisted).await?;
        layer::save_json(&self.zones_json(), &persisted).await?;
        Ok(())
    }

    /// Event-based invalidation: any zone add/delete evicts the full
    /// zone cache across all three layers.
    pub async fn invalidate_zones(&self) -> Result<(), StorageError> {
        self.l1.lock().zones = None;
        layer::remove_if_exists(&self.zones_bin()).await?;
        layer::remove_if_exists(&self.zones_json()).await?;
        debug!("zone cache invalidated");
        Ok(())
    }

    pub async fn read_records(&self, domain: &str) -> Option<RecordsRead> {
        if let Some(entry) = self.l1.lock().records.get(domain) {
            return Some(RecordsRead {
                records: entry.list.clone(),
                stale: self.records_stale(entry.fetched_at),
            });
        }

        let loaded = match layer::load_bincode::<PersistedRecords>(&self.records_bin(domain)).await {
            Ok(Some(persisted)) => Some(persisted),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, domain, "records cache failed to deserialize, falling back to json");
                None
            }
        };
        let loaded = match loaded {
            Some(p) => Some(p),
            None => layer::load_json::<PersistedRecords>(&self.records_json(domain))
                .await
                .ok()
                .flatten(),
        };

        let persisted = loaded?;
        let stale = self.records_stale(persisted.fetched_at);
        self.populate_records_l1(domain, persisted.records.clone(), persisted.fetched_at);
        Some(RecordsRead {
            records: persisted.records,
            stale,
        })
    }

    pub async fn store_records(&self, domain: &str, records: Vec<RRset>) -> Result<(), StorageError> {
        let fetched_at = Utc::now();
        self.populate_records_l1(domain, records.clone(), fetched_at);
        let persisted = PersistedRecords { records, fetched_at };
        layer::save_bincode(&self.records_bin(domain), &persisted).await?;
        layer::save_json(&self.records_json(domain), &persisted).await?;
        Ok(())
    }

    /// Event-based invalidation: any successful record mutation in
    /// domain `d` evicts `records[d]` from all three layers.
    pub async fn invalidate_records(&self, domain: &str) -> Result<(), StorageError> {
        self.l1.lock().records.remove(domain);
        layer::remove_if_exists(&self.records_bin(domain)).await?;
        layer::remove_if_exists(&self.records_json(domain)).await?;
        debug!(domain, "records cache invalidated");
        Ok(())
    }

    fn populate_zones_l1(&self, zones: Vec<Zone>, fetched_at: DateTime<Utc>) {
        let index = zones
            .iter()
            .enumerate()
            .map(|(i, z)| (z.name.clone(), i))
            .collect();
        self.l1.lock().zones = Some(ZonesEntry {
            list: zones,
            index,
            fetched_at,
        });
    }

    fn populate_records_l1(&self, domain: &str, records: Vec<RRset>, fetched_at: DateTime<Utc>) {
        let index = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.key(), i))
            .collect();
        self.l1.lock().records.insert(
            domain.to_string(),
            RecordsEntry {
                list: records,
                index,
                fetched_at,
            },
        );
    }

    /// O(1) single-zone lookup against the in-memory index (§3/§4.3).
    /// Only consults L1; a miss here does not fall through to L2/L3 since
    /// those only ever populate L1 on a `read_zones`/`read_records` call.
    pub fn get_zone(&self, name: &str) -> Option<Zone> {
        let l1 = self.l1.lock();
        let entry = l1.zones.as_ref()?;
        let &i = entry.index.get(name)?;
        entry.list.get(i).cloned()
    }

    /// O(1) single-record lookup keyed by `(subname, type)` within `domain`.
    pub fn get_record(&self, domain: &str, subname: &str, record_type: &str) -> Option<RRset> {
        let l1 = self.l1.lock();
        let entry = l1.records.get(domain)?;
        let key = (subname.to_string(), record_type.to_string());
        let &i = entry.index.get(&key)?;
        entry.list.get(i).cloned()
    }

    fn zones_stale(&self, fetched_at: DateTime<Utc>) -> bool {
        Utc::now() - fetched_at > ChronoDuration::minutes(self.sync_interval_minutes)
    }

    fn records_stale(&self, fetched_at: DateTime<Utc>) -> bool {
        Utc::now() - fetched_at > ChronoDuration::minutes(RECORDS_STALE_AFTER_MINUTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn zone(name: &str) -> Zone {
        Zone {
            name: name.to_string(),
            created: Utc::now(),
            published: true,
            minimum_ttl: None,
            dnssec: None,
        }
    }

    #[tokio::test]
    async fn read_through_then_l1_hit() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path().to_path_buf(), DEFAULT_SYNC_INTERVAL_MINUTES);
        assert!(cache.read_zones().await.is_none());

        cache.store_zones(vec![zone("example.com.")]).await.unwrap();
        let read = cache.read_zones().await.unwrap();
        assert_eq!(read.zones.len(), 1);
        assert!(!read.stale);
    }

    #[tokio::test]
    async fn layer_fallback_when_bin_corrupted() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path().to_path_buf(), DEFAULT_SYNC_INTERVAL_MINUTES);
        cache.store_zones(vec![zone("example.com.")]).await.unwrap();

        // Corrupt the binary layer; JSON layer is untouched.
        std::fs::write(cache.zones_bin(), b"not bincode at all").unwrap();
        cache.l1.lock().zones = None; // force a read-through past L1

        let read = cache.read_zones().await.unwrap();
        assert_eq!(read.zones[0].name, "example.com.");
    }

    #[tokio::test]
    async fn event_invalidation_forces_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path().to_path_buf(), DEFAULT_SYNC_INTERVAL_MINUTES);
        cache.store_records("example.com.", vec![]).await.unwrap();
        cache.invalidate_records("example.com.").await.unwrap();
        assert!(cache.read_records("example.com.").await.is_none());
    }

    fn rrset(domain: &str, subname: &str, record_type: &str) -> RRset {
        RRset {
            zone: domain.to_string(),
            subname: subname.to_string(),
            record_type: record_type.to_string(),
            ttl: 3600,
            records: vec!["1.2.3.4".to_string()],
            created: Utc::now(),
            touched: Utc::now(),
        }
    }

    #[tokio::test]
    async fn get_zone_hits_the_l1_index() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path().to_path_buf(), DEFAULT_SYNC_INTERVAL_MINUTES);
        assert!(cache.get_zone("example.com.").is_none());

        cache.store_zones(vec![zone("example.com."), zone("other.example.")]).await.unwrap();
        assert_eq!(cache.get_zone("other.example.").unwrap().name, "other.example.");
        assert!(cache.get_zone("missing.example.").is_none());
    }

    #[tokio::test]
    async fn get_record_hits_the_l1_index() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path().to_path_buf(), DEFAULT_SYNC_INTERVAL_MINUTES);
        cache
            .store_records("example.com.", vec![rrset("example.com.", "www", "A"), rrset("example.com.", "api", "A")])
            .await
            .unwrap();

        let found = cache.get_record("example.com.", "api", "A").unwrap();
        assert_eq!(found.subname, "api");
        assert!(cache.get_record("example.com.", "api", "AAAA").is_none());
        assert!(cache.get_record("other.example.", "api", "A").is_none());
    }
}
