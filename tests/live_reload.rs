//! Live reload tests driven by real filesystem events.

use std::fs;

use hostmap::config::LiveMap;
use hostmap::http::Headers;
use hostmap::routing::{Resolution, ServiceRecord, ServiceRouter};
use hostmap::security::{AccessControl, Decision, DenyReason};

mod common;

use common::{wait_until, write_service, RELOAD_TIMEOUT};

#[tokio::test]
async fn test_service_lifecycle_follows_files() {
    let dir = tempfile::tempdir().unwrap();
    write_service(dir.path(), "blog", &["blog.test"]);

    let router = ServiceRouter::open(dir.path(), "json").unwrap();
    router.start_watch().unwrap();
    assert!(router.resolve(Some("shop.test"), "/", None).is_none());

    // Create.
    let shop = write_service(dir.path(), "shop", &["shop.test"]);
    assert!(wait_until(RELOAD_TIMEOUT, || router.resolve(Some("shop.test"), "/", None).is_some()).await);

    // Modify.
    write_service(dir.path(), "shop", &["store.test"]);
    assert!(wait_until(RELOAD_TIMEOUT, || router.resolve(Some("store.test"), "/", None).is_some()).await);
    assert!(router.resolve(Some("shop.test"), "/", None).is_none());

    // Delete.
    fs::remove_file(&shop).unwrap();
    assert!(wait_until(RELOAD_TIMEOUT, || router.get("shop").is_none()).await);

    // Re-create.
    write_service(dir.path(), "shop", &["shop.test"]);
    assert!(wait_until(RELOAD_TIMEOUT, || router.get("shop").is_some()).await);
    assert_eq!(router.services().keys(), vec!["blog", "shop"]);

    router.stop_watch();
}

#[tokio::test]
async fn test_identical_writes_keep_one_entry() {
    let dir = tempfile::tempdir().unwrap();
    let map: LiveMap<ServiceRecord> = LiveMap::open(dir.path(), "json").unwrap();
    map.start_watch().unwrap();

    write_service(dir.path(), "api", &["api.test"]);
    write_service(dir.path(), "api", &["api.test"]);
    assert!(wait_until(RELOAD_TIMEOUT, || map.get("api").is_some()).await);

    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert_eq!(map.len(), 1);
    assert_eq!(map.entries()[0].0, "api");
}

#[tokio::test]
async fn test_broken_write_keeps_previous_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_service(dir.path(), "api", &["api.test"]);

    let router = ServiceRouter::open(dir.path(), "json").unwrap();
    router.start_watch().unwrap();

    fs::write(&path, "{ \"proxyHostnames\": [").unwrap();
    // Follow with a sentinel so we know the broken event was processed.
    write_service(dir.path(), "sentinel", &["sentinel.test"]);
    assert!(wait_until(RELOAD_TIMEOUT, || router.get("sentinel").is_some()).await);

    let hit = router.resolve(Some("api.test"), "/", None).unwrap();
    assert_eq!(hit.service().name, "api");
}

#[tokio::test]
async fn test_drafts_and_other_extensions_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let router = ServiceRouter::open(dir.path(), "json").unwrap();
    router.start_watch().unwrap();

    write_service(dir.path(), "_draft", &["draft.test"]);
    fs::write(dir.path().join("notes.txt"), "{}").unwrap();
    write_service(dir.path(), "live", &["live.test"]);
    assert!(wait_until(RELOAD_TIMEOUT, || router.get("live").is_some()).await);

    assert_eq!(router.services().keys(), vec!["live"]);
}

#[tokio::test]
async fn test_stop_watch_freezes_map() {
    let dir = tempfile::tempdir().unwrap();
    let router = ServiceRouter::open(dir.path(), "json").unwrap();
    router.start_watch().unwrap();
    router.start_watch().unwrap();

    router.stop_watch();
    router.stop_watch();
    assert!(!router.services().is_watching());

    write_service(dir.path(), "late", &["late.test"]);
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    assert!(router.get("late").is_none());

    // Restarting picks up later changes again.
    router.start_watch().unwrap();
    write_service(dir.path(), "later", &["later.test"]);
    assert!(wait_until(RELOAD_TIMEOUT, || router.get("later").is_some()).await);
}

#[tokio::test]
async fn test_referer_fallback_through_router() {
    let dir = tempfile::tempdir().unwrap();
    write_service(dir.path(), "cod", &["@/cod"]);
    let router = ServiceRouter::open(dir.path(), "json").unwrap();

    let headers = Headers::from_lines(["Host: 10.0.0.5", "Referer: http://10.0.0.5/cod/page"]);
    match router.resolve(Some("10.0.0.5"), "/asset.js", Some(&headers)) {
        Some(Resolution::IpMapped { service, strip_path }) => {
            assert_eq!(service.name, "cod");
            assert_eq!(strip_path, "/cod");
            assert_eq!(service.target["proxyTarget"], "http://127.0.0.1:9000/cod");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_access_lists_reload() {
    let dir = tempfile::tempdir().unwrap();
    let black = dir.path().join("black.txt");
    fs::write(&black, "# none yet\n").unwrap();

    let access = AccessControl::from_paths(None, Some(&black));
    access.start_watch().unwrap();
    assert_eq!(access.check("198.51.100.7"), Decision::Allow);

    fs::write(&black, "198.51.100.0/24\n").unwrap();
    assert!(wait_until(RELOAD_TIMEOUT, || !access.check("198.51.100.7").is_allowed()).await);
    assert_eq!(
        access.check("198.51.100.7"),
        Decision::Deny(DenyReason::Blacklisted("198.51.100.0/24".into()))
    );

    access.stop_watch();
}

#[tokio::test]
async fn test_unreadable_list_keeps_last_good_list() {
    let dir = tempfile::tempdir().unwrap();
    let black = dir.path().join("black.txt");
    fs::write(&black, "198.51.100.0/24\n").unwrap();

    let access = AccessControl::from_paths(None, Some(&black));
    access.start_watch().unwrap();
    assert!(!access.check("198.51.100.7").is_allowed());

    // Not UTF-8: the read fails and the previous list stays in force.
    // Swapped in by rename so no half-written file is ever visible.
    let staged = dir.path().join("black.staged");
    fs::write(&staged, [0xff, 0xfe, 0x00, 0x41]).unwrap();
    fs::rename(&staged, &black).unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    assert!(!access.check("198.51.100.7").is_allowed());

    // A readable write afterwards is picked up again.
    fs::write(&black, "203.0.113.0/24\n").unwrap();
    assert!(wait_until(RELOAD_TIMEOUT, || !access.check("203.0.113.9").is_allowed()).await);
    assert!(access.check("198.51.100.7").is_allowed());

    access.stop_watch();
}
