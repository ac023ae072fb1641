//! Façade-level end-to-end scenarios: cache population, auto-snapshot on
//! mutation, and profile isolation (§8).

use desecq_core::facade::Facade;
use desecq_core::profile::{Config, ProfileStore, DEFAULT_PROFILE};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn seed_profile_pointing_at(root: &std::path::Path, server_uri: &str) {
    let store = ProfileStore::new(root.to_path_buf());
    store.create(DEFAULT_PROFILE, "Default").await.unwrap();
    let mut config: Config = store.load_config(DEFAULT_PROFILE).await.unwrap();
    config.base_url = server_uri.to_string();
    config.rate_limit = 0.0;
    store.save_config(DEFAULT_PROFILE, &config).await.unwrap();
}

fn rrset_json() -> serde_json::Value {
    serde_json::json!({
        "zone": "example.com.", "subname": "www", "type": "A", "ttl": 3600,
        "records": ["1.2.3.4"], "created": "2024-01-01T00:00:00Z", "touched": "2024-01-01T00:00:00Z",
    })
}

#[tokio::test]
async fn create_record_populates_cache_and_version_log() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/domains/example.com./rrsets/"))
        .respond_with(ResponseTemplate::new(201).set_body_json(rrset_json()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/domains/example.com./rrsets/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([rrset_json()])))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    seed_profile_pointing_at(dir.path(), &server.uri()).await;
    let facade = Facade::open(dir.path().to_path_buf(), "").await.unwrap();

    let handle = facade
        .submit_create_rrset("example.com.", "www", "A", 3600, vec!["1.2.3.4".to_string()])
        .unwrap();
    let result = handle.result().await.unwrap();
    assert_eq!(result.status, desecq_core::model::QueueStatus::Ok);

    // The façade's background sync task re-fetches and snapshots the
    // zone asynchronously; give it a moment to run.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let records = facade.records("example.com.").await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].subname, "www");

    let snapshots = facade.snapshots("example.com.").await.unwrap();
    assert_eq!(snapshots.len(), 1);
}

#[tokio::test]
async fn ttl_validation_rejects_before_any_network_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).respond_with(ResponseTemplate::new(201)).expect(0).mount(&server).await;

    let dir = tempfile::tempdir().unwrap();
    seed_profile_pointing_at(dir.path(), &server.uri()).await;
    let facade = Facade::open(dir.path().to_path_buf(), "").await.unwrap();

    let result = facade.submit_create_rrset("example.com.", "www", "A", 60, vec!["1.2.3.4".to_string()]);
    assert!(result.is_err());

    server.verify().await;
}

fn rrset_json_for(subname: &str) -> serde_json::Value {
    serde_json::json!({
        "zone": "example.com.", "subname": subname, "type": "A", "ttl": 3600,
        "records": ["1.2.3.4"], "created": "2024-01-01T00:00:00Z", "touched": "2024-01-01T00:00:00Z",
    })
}

#[tokio::test]
async fn restore_round_trip_brings_back_the_snapshotted_state() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/domains/example.com./rrsets/"))
        .respond_with(ResponseTemplate::new(201).set_body_json(rrset_json()))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/domains/example.com./rrsets/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([rrset_json()])))
        .mount(&server)
        .await;

    // First re-fetch (after creating "www") sees one record; second
    // (after creating "api") sees two; the restore's re-fetch must see
    // the single-record state again, matching what was snapshotted at h1.
    Mock::given(method("GET"))
        .and(path("/domains/example.com./rrsets/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([rrset_json_for("www")])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/domains/example.com./rrsets/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([rrset_json_for("www"), rrset_json_for("api")])),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/domains/example.com./rrsets/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([rrset_json_for("www")])))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    seed_profile_pointing_at(dir.path(), &server.uri()).await;
    let facade = Facade::open(dir.path().to_path_buf(), "").await.unwrap();

    let handle = facade
        .submit_create_rrset("example.com.", "www", "A", 3600, vec!["1.2.3.4".to_string()])
        .unwrap();
    handle.result().await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let handle = facade
        .submit_create_rrset("example.com.", "api", "A", 3600, vec!["1.2.3.4".to_string()])
        .unwrap();
    handle.result().await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let snapshots = facade.snapshots("example.com.").await.unwrap();
    assert_eq!(snapshots.len(), 2);
    let h1 = snapshots.last().unwrap().hash.clone();

    let restore_handle = facade.restore("example.com.", &h1).await.unwrap();
    restore_handle.result().await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let records = facade.records("example.com.").await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].subname, "www");
}

#[tokio::test]
async fn profile_isolation_keeps_caches_separate() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/domains/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            { "name": "a.example.", "created": "2024-01-01T00:00:00Z", "published": true, "minimum_ttl": null, "dnssec": null }
        ])))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = ProfileStore::new(dir.path().to_path_buf());
    store.create(DEFAULT_PROFILE, "Default").await.unwrap();
    store.create("work", "Work").await.unwrap();

    for name in [DEFAULT_PROFILE, "work"] {
        let mut config = store.load_config(name).await.unwrap();
        config.base_url = server.uri();
        store.save_config(name, &config).await.unwrap();
    }

    let facade = Facade::open(dir.path().to_path_buf(), "").await.unwrap();
    let _ = facade.zones().await;
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(facade.zones().await.len(), 1);

    facade.switch_profile("work", "").await.unwrap();
    // A freshly switched-to profile has never synced, so its cache
    // starts empty regardless of what `default` holds.
    assert!(facade.records("a.example.").await.is_empty());
    assert_eq!(facade.active_profile(), "work");
}
