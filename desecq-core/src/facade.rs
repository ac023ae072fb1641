//! Core façade (§4.7): the single entry point a UI layer talks to.
//!
//! Wires together the profile store, HTTP client, cache, version store,
//! and API queue in the dependency order of §2, and republishes queue
//! activity as the façade-level signal set.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cache::Cache;
use crate::catalogue;
use crate::error::{StorageError, ValidationError};
use crate::http::ApiClient;
use crate::model::{AccountInfo, ApiRequest, Method, Priority, RRset, Zone};
use crate::profile::{Config, ProfileMeta, ProfileStore, DEFAULT_PROFILE};
use crate::queue::{ApiQueue, Handle, QueueItemSpec, DEFAULT_HISTORY_CAP};
use crate::version::{Entry as VersionEntry, VersionStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub enum Signal {
    OnlineChanged(bool),
    RateLimited(u64),
    QueueChanged,
    CacheInvalidated(String),
    Notify(NotifyLevel, String, String),
}

/// Aborts the cache-sync background task when the owning `Runtime` (and
/// therefore the profile it serves) is replaced or dropped.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

struct Runtime {
    profile_name: String,
    client: Arc<ApiClient>,
    cache: Arc<Cache>,
    queue: Arc<ApiQueue>,
    versions: Arc<VersionStore>,
    /// Set when `config.queue_history_persist` is on; `close()` and
    /// `switch_profile()` write the in-memory history here before the
    /// runtime is torn down.
    history_path: Option<PathBuf>,
    _sync_task: AbortOnDrop,
}

pub struct Facade {
    root: PathBuf,
    profiles: ProfileStore,
    runtime: RwLock<Runtime>,
    signals: tokio::sync::broadcast::Sender<Signal>,
    offline: AtomicBool,
}

impl Facade {
    /// Opens the application root, migrating a legacy single-profile
    /// layout and creating a `default` profile if none exist yet, then
    /// boots the active profile's subsystems. `password` unseals the
    /// active profile's stored token (§4.6); it is never itself written
    /// to disk.
    pub async fn open(root: PathBuf, password: &str) -> Result<Arc<Facade>, StorageError> {
        let profiles = ProfileStore::new(root.clone());
        profiles.migrate_legacy().await?;
        if profiles.list().await?.is_empty() {
            profiles.create(DEFAULT_PROFILE, "Default").await?;
        }
        let active = profiles
            .active()
            .await?
            .unwrap_or_else(|| DEFAULT_PROFILE.to_string());

        let (signals, _rx) = tokio::sync::broadcast::channel(1024);
        let runtime = build_runtime(&profiles, &active, &signals, password).await?;

        Ok(Arc::new(Facade {
            root,
            profiles,
            runtime: RwLock::new(runtime),
            signals,
            offline: AtomicBool::new(false),
        }))
    }

    /// Flushes the active profile's queue history to disk if
    /// `queue_history_persist` is on for it. Call before the process
    /// exits (§4.2/§6).
    pub fn close(&self) -> Result<(), StorageError> {
        let runtime = self.runtime.read();
        match &runtime.history_path {
            Some(path) => runtime.queue.persist_history(path),
            None => Ok(()),
        }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Signal> {
        self.signals.subscribe()
    }

    fn emit(&self, signal: Signal) {
        let _ = self.signals.send(signal);
    }

    fn handles(&self) -> (Arc<ApiClient>, Arc<Cache>, Arc<ApiQueue>, Arc<VersionStore>) {
        let runtime = self.runtime.read();
        (
            runtime.client.clone(),
            runtime.cache.clone(),
            runtime.queue.clone(),
            runtime.versions.clone(),
        )
    }

    // -- Queue ------------------------------------------------------

    pub fn submit(&self, spec: QueueItemSpec) -> Handle {
        let (_, _, queue, _) = self.handles();
        queue.submit(spec)
    }

    pub fn pause(&self) {
        let (_, _, queue, _) = self.handles();
        queue.pause();
    }

    pub fn resume(&self) {
        let (_, _, queue, _) = self.handles();
        queue.resume();
    }

    pub fn set_rate(&self, rate: f64) {
        let (_, _, queue, _) = self.handles();
        queue.set_rate(rate);
    }

    pub fn is_paused(&self) -> bool {
        let (_, _, queue, _) = self.handles();
        queue.is_paused()
    }

    // -- Offline mode (§5) -------------------------------------------

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    pub fn set_offline(&self, offline: bool) {
        if self.offline.swap(offline, Ordering::SeqCst) == offline {
            return;
        }
        let (_, _, queue, _) = self.handles();
        if offline {
            queue.pause();
        } else {
            queue.resume();
            queue.submit(QueueItemSpec {
                priority: Priority::High,
                category: "account:list".to_string(),
                action: "connectivity check".to_string(),
                request: ApiRequest::new(Method::Get, "/auth/account/"),
            });
        }
        self.emit(Signal::OnlineChanged(!offline));
    }

    // -- Cache-first readers (§4.7) -----------------------------------

    pub async fn zones(&self) -> Vec<Zone> {
        let (_, cache, queue, _) = self.handles();
        match cache.read_zones().await {
            Some(read) => {
                if read.stale {
                    enqueue_zones_refresh(&queue);
                }
                read.zones
            }
            None => {
                enqueue_zones_refresh(&queue);
                Vec::new()
            }
        }
    }

    pub async fn records(&self, domain: &str) -> Vec<RRset> {
        let (_, cache, queue, _) = self.handles();
        match cache.read_records(domain).await {
            Some(read) => {
                if read.stale {
                    enqueue_records_refresh(&queue, domain);
                }
                read.records
            }
            None => {
                enqueue_records_refresh(&queue, domain);
                Vec::new()
            }
        }
    }

    /// O(1) single-zone cache lookup, for callers that already know the
    /// name and don't need the whole list (e.g. a detail view). Does not
    /// itself trigger a refresh; call `zones()` first to warm the cache.
    pub fn zone(&self, name: &str) -> Option<Zone> {
        let (_, cache, _, _) = self.handles();
        cache.get_zone(name)
    }

    /// O(1) single-record cache lookup by `(domain, subname, type)`.
    pub fn record(&self, domain: &str, subname: &str, record_type: &str) -> Option<RRset> {
        let (_, cache, _, _) = self.handles();
        cache.get_record(domain, subname, record_type)
    }

    /// Account info has no disk cache layer (§6 lists only zone/record
    /// cache files), so this always round-trips through the queue.
    pub async fn account(&self) -> Option<AccountInfo> {
        let (_, _, queue, _) = self.handles();
        let handle = queue.submit(QueueItemSpec {
            priority: Priority::Normal,
            category: "account:list".to_string(),
            action: "get account".to_string(),
            request: ApiRequest::new(Method::Get, "/auth/account/"),
        });
        let snapshot = handle.result().await?;
        let response = snapshot.response?;
        serde_json::from_value(response).ok()
    }

    // -- Validation + mutation convenience (§4.4) ---------------------

    /// Validates locally before ever touching the network, per §7's
    /// "validation is produced locally; never reaches the network."
    pub fn validate_record(type_name: &str, ttl: u32, records: &[String]) -> Result<(), ValidationError> {
        catalogue::validate(type_name, ttl, records)
    }

    pub fn submit_create_rrset(
        &self,
        zone: &str,
        subname: &str,
        record_type: &str,
        ttl: u32,
        records: Vec<String>,
    ) -> Result<Handle, ValidationError> {
        catalogue::validate(record_type, ttl, &records)?;
        let body = serde_json::json!({
            "subname": subname,
            "type": record_type,
            "ttl": ttl,
            "records": records,
        });
        Ok(self.submit(QueueItemSpec {
            priority: Priority::Normal,
            category: format!("records:mutate:{zone}"),
            action: format!("create {record_type} {subname}.{zone}"),
            request: ApiRequest::new(Method::Post, format!("/domains/{zone}/rrsets/")).with_body(body),
        }))
    }

    // -- Version store (§4.5) ------------------------------------------

    pub async fn snapshots(&self, zone: &str) -> Result<Vec<VersionEntry>, StorageError> {
        let (_, _, _, versions) = self.handles();
        versions.list(zone).await
    }

    pub async fn restore(&self, zone: &str, hash: &str) -> Result<Handle, StorageError> {
        let (_, _, queue, versions) = self.handles();
        versions.restore(zone, hash, &queue).await
    }

    // -- Profiles (§4.6) ------------------------------------------------

    pub async fn profiles(&self) -> Result<Vec<ProfileMeta>, StorageError> {
        self.profiles.list().await
    }

    pub async fn switch_profile(&self, name: &str, password: &str) -> Result<(), StorageError> {
        self.profiles.switch(name).await?;
        let new_runtime = build_runtime(&self.profiles, name, &self.signals, password).await?;
        self.close()?;
        *self.runtime.write() = new_runtime;
        info!(profile = name, "switched active profile");
        self.emit(Signal::Notify(
            NotifyLevel::Info,
            "Profile switched".to_string(),
            format!("now using profile '{name}'"),
        ));
        Ok(())
    }

    pub fn active_profile(&self) -> String {
        self.runtime.read().profile_name.clone()
    }
}

fn enqueue_zones_refresh(queue: &ApiQueue) {
    queue.submit(QueueItemSpec {
        priority: Priority::Low,
        category: "zones:list".to_string(),
        action: "refresh zones".to_string(),
        request: ApiRequest::new(Method::Get, "/domains/"),
    });
}

fn enqueue_records_refresh(queue: &ApiQueue, domain: &str) {
    queue.submit(QueueItemSpec {
        priority: Priority::Low,
        category: format!("records:list:{domain}"),
        action: format!("refresh records for {domain}"),
        request: ApiRequest::new(Method::Get, format!("/domains/{domain}/rrsets/")),
    });
}

async fn build_runtime(
    profiles: &ProfileStore,
    name: &str,
    signals: &tokio::sync::broadcast::Sender<Signal>,
    password: &str,
) -> Result<Runtime, StorageError> {
    let mut config: Config = profiles.load_config(name).await?;
    config.clamp();
    let token = profiles.unseal_token(name, &config, password).await?.unwrap_or_default();

    let client = ApiClient::new(config.base_url.clone(), &token, config.rate_limit)
        .map_err(|e| StorageError::Other(e.to_string()))?;
    let client = Arc::new(client);
    let cache = Arc::new(Cache::new(profiles.cache_dir(name), config.sync_interval_minutes as i64));
    let versions = Arc::new(VersionStore::new(profiles.versions_dir(name)));
    let history_path = if config.queue_history_persist {
        Some(profiles.queue_history_path(name))
    } else {
        None
    };
    let history_cap = if config.queue_history_persist {
        config.queue_history_cap
    } else {
        DEFAULT_HISTORY_CAP
    };
    let queue = ApiQueue::new(client.clone(), history_cap);
    if let Some(path) = &history_path {
        if let Err(e) = queue.restore_history(path) {
            warn!(profile = name, error = %e, "failed to load persisted queue history");
        }
    }

    let sync_task = tokio::spawn(run_cache_sync(
        queue.clone(),
        cache.clone(),
        client.clone(),
        versions.clone(),
        signals.clone(),
    ));

    Ok(Runtime {
        profile_name: name.to_string(),
        client,
        cache,
        queue,
        versions,
        history_path,
        _sync_task: AbortOnDrop(sync_task),
    })
}

/// Bridges queue completions into cache writes/invalidation and façade
/// signals. Category strings follow the `<area>:<kind>[:<key>]`
/// convention used by `enqueue_*_refresh` and `submit_create_rrset`.
async fn run_cache_sync(
    queue: Arc<ApiQueue>,
    cache: Arc<Cache>,
    client: Arc<ApiClient>,
    versions: Arc<VersionStore>,
    signals: tokio::sync::broadcast::Sender<Signal>,
) {
    let mut events = queue.subscribe();
    loop {
        let snapshot = match events.recv().await {
            Ok(snapshot) => snapshot,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
        };

        let _ = signals.send(Signal::QueueChanged);

        if let Some(error) = &snapshot.error {
            if let Some(retry_after) = error.retry_after {
                let _ = signals.send(Signal::RateLimited(retry_after));
            }
        }

        if snapshot.status != crate::model::QueueStatus::Ok {
            continue;
        }

        let mut parts = snapshot.category.splitn(3, ':');
        let (area, kind, key) = (parts.next(), parts.next(), parts.next());

        match (area, kind) {
            (Some("zones"), Some("list")) => {
                if let Some(response) = &snapshot.response {
                    if let Ok(zones) = serde_json::from_value::<Vec<Zone>>(response.clone()) {
                        if let Err(e) = cache.store_zones(zones).await {
                            warn!(error = %e, "failed to persist zone cache after refresh");
                        }
                        let _ = signals.send(Signal::CacheInvalidated("zones".to_string()));
                    }
                }
            }
            (Some("zones"), Some("mutate")) => {
                if let Err(e) = cache.invalidate_zones().await {
                    warn!(error = %e, "failed to invalidate zone cache");
                }
                let _ = signals.send(Signal::CacheInvalidated("zones".to_string()));
            }
            (Some("records"), Some("list")) => {
                if let (Some(domain), Some(response)) = (key, &snapshot.response) {
                    if let Ok(records) = serde_json::from_value::<Vec<RRset>>(response.clone()) {
                        if let Err(e) = cache.store_records(domain, records).await {
                            warn!(error = %e, domain, "failed to persist records cache after refresh");
                        }
                        let _ = signals.send(Signal::CacheInvalidated(format!("records:{domain}")));
                    }
                }
            }
            (Some("records"), Some("mutate")) => {
                if let Some(domain) = key {
                    if let Err(e) = cache.invalidate_records(domain).await {
                        warn!(error = %e, domain, "failed to invalidate records cache");
                    }
                    let _ = signals.send(Signal::CacheInvalidated(format!("records:{domain}")));

                    // Re-fetch the zone's current state once so the cache
                    // and version log stay consistent with the server
                    // without waiting for the caller's next `records()`
                    // read to notice the cache is empty.
                    match client.list_rrsets(domain).await {
                        Ok(rrsets) => {
                            if let Err(e) = cache.store_records(domain, rrsets.clone()).await {
                                warn!(error = %e, domain, "failed to persist records cache after mutation");
                            }
                            match versions.snapshot(domain, &snapshot.action, &rrsets).await {
                                Ok(Some(_)) => {}
                                Ok(None) => {}
                                Err(e) => warn!(error = %e, domain, "failed to snapshot zone state after mutation"),
                            }
                        }
                        Err(e) => warn!(error = %e, domain, "failed to re-fetch records after mutation"),
                    }
                }
            }
            _ => {}
        }
    }
}
