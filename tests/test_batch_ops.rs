// tests/test_batch_ops.rs
//
// Batch download/delete through BlobEngine against the instrumented
// in-memory store: partitioning, the concurrency bound, and validation.

mod common;

use anyhow::Result;
use blobbatch::{BlobEngine, EngineConfig};
use common::MemoryStore;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn engine_with(store: Arc<MemoryStore>, concurrency: usize) -> BlobEngine {
    let config = EngineConfig {
        concurrency,
        operation_timeout: Duration::from_secs(10),
        ..EngineConfig::default()
    };
    BlobEngine::new(store, config)
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_every_item_lands_in_exactly_one_partition() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    store.insert("a.pdf", b"a");
    store.insert("c.pdf", b"c");
    let engine = engine_with(store.clone(), 4);

    let input = names(&["a.pdf", "b.pdf", "c.pdf", "d.pdf"]);
    let r = engine.delete_many(&input).await?;

    assert_eq!(r.succeeded, vec!["a.pdf", "c.pdf"]);
    assert_eq!(r.failed, vec!["b.pdf", "d.pdf"]);
    assert_eq!(r.summary.total, input.len());
    assert_eq!(r.summary.succeeded + r.summary.failed, r.summary.total);
    for name in &input {
        let hits = r.succeeded.iter().chain(r.failed.iter()).filter(|n| *n == name).count();
        assert_eq!(hits, 1, "{} must appear exactly once", name);
    }
    assert!(store.names().is_empty());

    println!("✅ batch partition holds: {}", r.message("deleted"));
    Ok(())
}

#[tokio::test]
async fn test_delete_missing_blob_is_failure() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_with(store, 2);

    let r = engine.delete_many(&names(&["ghost.pdf"])).await?;
    assert!(r.succeeded.is_empty());
    assert_eq!(r.failed, vec!["ghost.pdf"]);
    assert!(r.errors["ghost.pdf"].contains("not found"));
    assert_eq!(r.message("deleted"), "Deleted 0/1 items. 1 operations failed");
    Ok(())
}

#[tokio::test]
async fn test_concurrency_never_exceeds_limit() -> Result<()> {
    let store = Arc::new(MemoryStore::with_latency(Duration::from_millis(20)));
    let input: Vec<String> = (0..24).map(|i| format!("blob-{:02}", i)).collect();
    for n in &input {
        store.insert(n, b"x");
    }
    let engine = engine_with(store.clone(), 3);

    let r = engine.delete_many(&input).await?;
    assert!(r.all_succeeded());
    assert_eq!(r.summary.succeeded, 24);

    let peak = store.max_in_flight();
    assert!(peak <= 3, "peak in-flight {} exceeded the limit", peak);
    assert!(peak >= 1);
    println!("✅ peak in-flight {} with limit 3", peak);
    Ok(())
}

#[tokio::test]
async fn test_single_item_batch_runs_with_one_permit() -> Result<()> {
    let store = Arc::new(MemoryStore::with_latency(Duration::from_millis(5)));
    store.insert("only.pdf", b"x");
    let engine = engine_with(store.clone(), 16);

    let r = engine.delete_many(&names(&["only.pdf"])).await?;
    assert_eq!(r.succeeded, vec!["only.pdf"]);
    assert_eq!(store.max_in_flight(), 1);
    Ok(())
}

#[tokio::test]
async fn test_download_many_writes_files() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    store.insert("docs/a.pdf", b"alpha");
    store.insert("b.pdf", b"beta");
    let engine = engine_with(store, 4);

    let tmp = TempDir::new()?;
    let dest = tmp.path().join("out");
    let r = engine
        .download_many(&names(&["docs/a.pdf", "b.pdf", "missing.pdf"]), dest.to_str().unwrap())
        .await?;

    assert_eq!(r.succeeded, vec!["docs/a.pdf", "b.pdf"]);
    assert_eq!(r.failed, vec!["missing.pdf"]);
    assert_eq!(std::fs::read(dest.join("a.pdf"))?, b"alpha");
    assert_eq!(std::fs::read(dest.join("b.pdf"))?, b"beta");
    Ok(())
}

#[tokio::test]
async fn test_repeated_names_are_processed_once() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    store.insert("a.pdf", b"a");
    let engine = engine_with(store, 4);

    let r = engine.delete_many(&names(&["a.pdf", "a.pdf"])).await?;
    assert_eq!(r.succeeded, vec!["a.pdf"]);
    assert!(r.failed.is_empty());
    assert_eq!(r.summary.total, 1);
    Ok(())
}

#[tokio::test]
async fn test_invalid_input_fails_before_any_remote_call() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_with(store.clone(), 4);

    let err = engine.delete_many(&[]).await.unwrap_err();
    assert!(err.is_invalid_argument());

    let err = engine.delete_many(&names(&["a.pdf", ""])).await.unwrap_err();
    assert!(err.is_invalid_argument());

    let err = engine.download_many(&names(&["a.pdf"]), "").await.unwrap_err();
    assert!(err.is_invalid_argument());

    let err = engine.upload_many(&[], 2).await.unwrap_err();
    assert!(err.is_invalid_argument());

    let err = engine.copy("a.pdf", "a.pdf").await.unwrap_err();
    assert!(err.is_invalid_argument());

    let err = engine.rename("", "b.pdf").await.unwrap_err();
    assert!(err.is_invalid_argument());

    assert_eq!(store.max_in_flight(), 0);
    assert_eq!(store.put_calls(), 0);
}

#[tokio::test]
async fn test_url_and_listing_validation() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    store.insert("reports/a.pdf", b"a");
    store.insert("reports/b.txt", b"b");
    store.insert("other/c.pdf", b"c");
    let engine = engine_with(store, 4);

    let blobs = engine.list_blobs(Some("reports/"), Some(r"\.pdf$"), 0).await?;
    let listed: Vec<_> = blobs.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(listed, vec!["reports/a.pdf"]);

    let capped = engine.list_blobs(None, None, 2).await?;
    assert_eq!(capped.len(), 2);

    assert!(engine.list_blobs(None, Some("("), 0).await.unwrap_err().is_invalid_argument());

    let url = engine
        .generate_url("reports/a.pdf", Some(2), blobbatch::UrlPermissions::default())
        .await?;
    assert_eq!(url.duration_hours, 2);
    assert!(url.url.contains("ttl=7200"));

    let perms = blobbatch::UrlPermissions::default();
    assert!(engine.generate_url("reports/a.pdf", Some(0), perms).await.unwrap_err().is_invalid_argument());
    assert!(engine.generate_url("reports/a.pdf", Some(169), perms).await.unwrap_err().is_invalid_argument());
    let none = blobbatch::UrlPermissions { read: false, write: false, delete: false };
    assert!(engine.generate_url("reports/a.pdf", None, none).await.unwrap_err().is_invalid_argument());
    Ok(())
}
